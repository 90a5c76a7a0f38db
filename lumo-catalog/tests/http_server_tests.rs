//! Operational HTTP surface tests

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::test_pool;
use http_body_util::BodyExt;
use lumo_catalog::cache::ResponseCache;
use lumo_catalog::{build_router, AppState};
use lumo_common::config::CatalogConfig;
use lumo_common::events::EventBus;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let pool = test_pool().await;
    AppState::new(
        pool,
        EventBus::new(64),
        ResponseCache::new(),
        CatalogConfig::default(),
    )
}

#[tokio::test]
async fn health_reports_ok() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], true);
}

#[tokio::test]
async fn refresh_unknown_partner_is_404() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/refresh?partner=nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_without_active_refresh_is_404() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/refresh/cancel")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
