//! Partner and organization records

use serde::Serialize;
use uuid::Uuid;

/// Tenant boundary. Owns the upstream service URLs and the OAuth
/// credentials used to talk to them.
#[derive(Debug, Clone)]
pub struct Partner {
    pub id: i64,
    pub short_code: String,
    pub name: String,
    pub courses_api_url: String,
    pub ecommerce_api_url: String,
    pub programs_api_url: String,
    pub organizations_api_url: String,
    pub token_url: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
}

/// An institution offering content, identified by a short key (e.g. `MITx`)
/// within its partner.
#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub id: i64,
    pub uuid: Uuid,
    pub partner_id: i64,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_image_url: Option<String>,
    pub marketing_url: Option<String>,
}
