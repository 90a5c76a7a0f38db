//! Operational HTTP surface
//!
//! Health, refresh triggering, and an SSE stream of record-change events.
//! The catalog query API proper is a separate serialization layer and not
//! part of this service.

mod health;
mod refresh;
mod sse;

pub use health::health;
pub use refresh::{cancel_refresh, trigger_refresh};
pub use sse::event_stream;

use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/refresh", post(trigger_refresh))
        .route("/refresh/cancel", post(cancel_refresh))
        .route("/events", get(event_stream))
}
