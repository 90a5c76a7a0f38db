//! Organizations API payload shapes

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub short_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}
