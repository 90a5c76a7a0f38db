//! OAuth2 client-credentials token acquisition with caching
//!
//! Tokens are fetched once and reused until shortly before expiry; a
//! refresh happens inline on the next request after the slack window
//! opens. All loaders of a partner share one cache.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lumo_common::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh this long before the reported expiry
const EXPIRY_SLACK_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared bearer-token cache for one partner's OAuth provider
#[derive(Clone)]
pub struct TokenCache {
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl TokenCache {
    pub fn new(token_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            token_url,
            client_id,
            client_secret,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Current bearer token, refreshing through the client-credentials
    /// flow when absent or near expiry
    pub async fn bearer(&self, http: &reqwest::Client) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!(token_url = %self.token_url, "Acquiring OAuth2 access token");

        let response = http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::TransientUpstream(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FatalUpstream(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::FatalUpstream(format!("malformed token response: {e}")))?;

        let lifetime = parsed.expires_in.unwrap_or(3600).max(EXPIRY_SLACK_SECONDS + 1);
        let token = CachedToken {
            access_token: parsed.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime - EXPIRY_SLACK_SECONDS),
        };
        let bearer = token.access_token.clone();
        *cached = Some(token);
        Ok(bearer)
    }
}
