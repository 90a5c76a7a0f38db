//! Shared fixtures for integration tests
#![allow(dead_code)]

use axum::Router;
use lumo_catalog::models::Partner;
use lumo_catalog::store;
use sqlx::SqlitePool;
use std::net::SocketAddr;

/// In-memory pool with the full schema applied
pub async fn test_pool() -> SqlitePool {
    let pool = lumo_common::db::init_memory_pool().await.expect("pool");
    store::init_schema(&pool).await.expect("schema");
    pool
}

/// Store a partner whose upstream URLs point at the given mock server
pub async fn test_partner(pool: &SqlitePool, base_url: &str) -> Partner {
    store::partners::upsert(
        pool,
        &Partner {
            id: 0,
            short_code: "edu".to_string(),
            name: "Test Partner".to_string(),
            courses_api_url: format!("{base_url}/api/courses"),
            ecommerce_api_url: format!("{base_url}/api/products"),
            programs_api_url: format!("{base_url}/api/programs"),
            organizations_api_url: format!("{base_url}/api/organizations"),
            token_url: format!("{base_url}/oauth2/access_token"),
            oauth_client_id: "client".to_string(),
            oauth_client_secret: "secret".to_string(),
        },
    )
    .await
    .expect("partner")
}

/// Serve a router on an ephemeral port, returning its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

/// Single-page envelope body
pub fn page(results: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "count": results.as_array().map(|a| a.len()).unwrap_or(0),
        "next": null,
        "results": results,
    })
}

/// Standard token endpoint response
pub fn token_response() -> serde_json::Value {
    serde_json::json!({
        "access_token": "test-token",
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}
