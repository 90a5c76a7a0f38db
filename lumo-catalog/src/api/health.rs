//! Health check endpoint

use crate::error::ApiResult;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    // A trivial query proves the database is reachable
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    Ok(Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": (chrono::Utc::now() - state.startup_time).num_seconds(),
    })))
}
