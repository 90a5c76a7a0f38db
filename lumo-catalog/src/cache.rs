//! Response cache and cache-key construction
//!
//! The backing store is an in-process concurrent map standing in for the
//! deployment's cache cluster. One well-known entry holds the global
//! `api_timestamp`; every response key folds it in, so bumping the
//! timestamp after an ingest invalidates all cached responses by
//! construction. Cached values are rendered byte bodies plus a small
//! header map, never serialized in-memory objects.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const API_TIMESTAMP_KEY: &str = "api_timestamp";

/// A cached rendered response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub status: u16,
}

#[derive(Default)]
struct CacheInner {
    timestamp_micros: Option<i64>,
    responses: HashMap<String, CachedResponse>,
}

/// Shared response cache with the global ingest timestamp
#[derive(Clone, Default)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `api_timestamp`, initialized on first read
    pub async fn api_timestamp(&self) -> i64 {
        {
            let inner = self.inner.read().await;
            if let Some(ts) = inner.timestamp_micros {
                return ts;
            }
        }
        let mut inner = self.inner.write().await;
        *inner
            .timestamp_micros
            .get_or_insert_with(|| Utc::now().timestamp_micros())
    }

    /// Advance the timestamp. Monotonic even when the clock is not:
    /// the new value is strictly greater than the previous one.
    pub async fn bump_api_timestamp(&self) -> i64 {
        let mut inner = self.inner.write().await;
        let now = Utc::now().timestamp_micros();
        let next = match inner.timestamp_micros {
            Some(previous) => now.max(previous + 1),
            None => now,
        };
        inner.timestamp_micros = Some(next);
        tracing::debug!(api_timestamp = next, "Bumped global ingest timestamp");
        next
    }

    /// Build a response-cache key from the full query-parameter list and
    /// the requesting user. All parameters participate (restricting the
    /// set causes collisions between distinct requests) and the user
    /// identity keeps personalized responses from leaking across users.
    pub async fn response_key(
        &self,
        path: &str,
        query_params: &[(String, String)],
        user: &str,
    ) -> String {
        let timestamp = self.api_timestamp().await;

        let mut params: Vec<&(String, String)> = query_params.iter().collect();
        params.sort();

        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update([0]);
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update([1]);
            hasher.update(value.as_bytes());
            hasher.update([2]);
        }
        hasher.update(user.as_bytes());

        format!("{API_TIMESTAMP_KEY}:{timestamp}:{:x}", hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        self.inner.read().await.responses.get(key).cloned()
    }

    pub async fn put(&self, key: String, response: CachedResponse) {
        self.inner.write().await.responses.insert(key, response);
    }
}
