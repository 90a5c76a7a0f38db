//! Refresh trigger endpoint

use crate::error::{ApiError, ApiResult};
use crate::upstream::{RetryPolicy, UpstreamClient};
use crate::{pipeline, store, AppState};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    pub partner: String,
    #[serde(default)]
    pub parallel: Option<bool>,
}

/// Kick off a background refresh for one partner. Returns 409 while a
/// refresh is already in flight.
pub async fn trigger_refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let partner = store::partners::get_by_code(&state.db, &params.partner)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("partner {}", params.partner)))?;

    {
        let active = state.active_refresh.read().await;
        if active.is_some() {
            return Err(ApiError::Conflict("a refresh is already running".to_string()));
        }
    }

    let mut config = (*state.config).clone();
    if let Some(parallel) = params.parallel {
        config.parallel = parallel;
    }

    let client = UpstreamClient::new(
        partner.token_url.clone(),
        partner.oauth_client_id.clone(),
        partner.oauth_client_secret.clone(),
        Duration::from_secs(config.upstream_timeout_seconds),
        RetryPolicy {
            max_attempts: config.retry_max_attempts,
            initial_backoff: Duration::from_millis(config.retry_backoff_initial_ms),
        },
    )
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let cancel = CancellationToken::new();
    *state.active_refresh.write().await = Some(cancel.clone());

    let partner_code = partner.short_code.clone();
    let state_for_task = state.clone();
    tokio::spawn(async move {
        let outcome = pipeline::refresh(
            &state_for_task.db,
            &state_for_task.bus,
            &state_for_task.cache,
            &client,
            &partner,
            &config,
            cancel,
        )
        .await;
        match outcome {
            Ok(outcome) if outcome.success => {
                info!(partner = %partner_code, "Refresh succeeded")
            }
            Ok(outcome) => error!(
                partner = %partner_code,
                cancelled = outcome.cancelled,
                failures = ?outcome.loader_failures,
                "Refresh finished with failures"
            ),
            Err(e) => error!(partner = %partner_code, "Refresh aborted: {}", e),
        }
        *state_for_task.active_refresh.write().await = None;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "partner": params.partner })),
    ))
}

/// Cancel the in-flight refresh, if any. In-flight upstream requests stop
/// at their next suspension point.
pub async fn cancel_refresh(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let active = state.active_refresh.read().await;
    match active.as_ref() {
        Some(token) => {
            token.cancel();
            Ok(Json(json!({ "status": "cancelling" })))
        }
        None => Err(ApiError::NotFound("no refresh is running".to_string())),
    }
}
