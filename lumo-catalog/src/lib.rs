//! lumo-catalog library interface
//!
//! Exposes the catalog model, store, loaders, and pipeline for the binary
//! and for integration testing.

pub mod api;
pub mod cache;
pub mod editorial;
pub mod error;
pub mod loaders;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod upstream;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use cache::ResponseCache;
use chrono::{DateTime, Utc};
use lumo_common::config::CatalogConfig;
use lumo_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Change-notification bus
    pub bus: EventBus,
    /// Response cache holding the global ingest timestamp
    pub cache: ResponseCache,
    /// Service configuration
    pub config: Arc<CatalogConfig>,
    /// Cancellation token of the in-flight refresh, if any
    pub active_refresh: Arc<RwLock<Option<CancellationToken>>>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, bus: EventBus, cache: ResponseCache, config: CatalogConfig) -> Self {
        Self {
            db,
            bus,
            cache,
            config: Arc::new(config),
            active_refresh: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    api::routes()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
