//! Shared fixtures for store unit tests

use crate::models::Partner;
use crate::store;
use sqlx::SqlitePool;

/// In-memory pool with the full schema and one partner row
pub async fn fixture_pool() -> (SqlitePool, Partner) {
    let pool = lumo_common::db::init_memory_pool()
        .await
        .expect("in-memory pool");
    store::init_schema(&pool).await.expect("schema init");

    let partner = store::partners::upsert(
        &pool,
        &Partner {
            id: 0,
            short_code: "edu".to_string(),
            name: "Test Partner".to_string(),
            courses_api_url: "http://lms.test/api/courses/v1/courses/".to_string(),
            ecommerce_api_url: "http://shop.test/api/v2/".to_string(),
            programs_api_url: "http://programs.test/api/v1/programs/".to_string(),
            organizations_api_url: "http://orgs.test/api/v1/organizations/".to_string(),
            token_url: "http://auth.test/oauth2/access_token".to_string(),
            oauth_client_id: "client".to_string(),
            oauth_client_secret: "secret".to_string(),
        },
    )
    .await
    .expect("partner upsert");

    (pool, partner)
}
