//! Upstream API clients
//!
//! Each upstream (courses, e-commerce, programs, organizations) is consumed
//! as a lazy paged sequence of JSON records. Every call carries a cached
//! OAuth2 bearer token, a per-request timeout, and a retry budget for
//! transient failures; a semaphore caps concurrent paged fetches so
//! parallel loaders cannot dogpile one upstream.

pub mod courses;
pub mod ecommerce;
pub mod oauth;
pub mod organizations;
pub mod programs;

use lumo_common::{Error, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("lumo-catalog/", env!("CARGO_PKG_VERSION"));
const DEFAULT_ENDPOINT_CONCURRENCY: usize = 4;

/// Retry policy for idempotent GETs
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Standard paginated envelope returned by all upstreams
#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

/// Authenticated, retrying HTTP client shared by all loaders of a partner
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    token: oauth::TokenCache,
    retry: RetryPolicy,
    endpoint_permits: Arc<Semaphore>,
}

impl UpstreamClient {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            http,
            token: oauth::TokenCache::new(token_url, client_id, client_secret),
            retry,
            endpoint_permits: Arc::new(Semaphore::new(DEFAULT_ENDPOINT_CONCURRENCY)),
        })
    }

    /// GET a JSON document with bearer auth and the retry policy applied
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let _permit = self
            .endpoint_permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("endpoint semaphore closed".to_string()))?;

        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(body) => {
                    return serde_json::from_str(&body).map_err(|e| {
                        Error::FatalUpstream(format!("GET {url}: malformed response: {e}"))
                    });
                }
                Err(RequestFailure::Fatal(message)) => {
                    return Err(Error::FatalUpstream(format!("GET {url}: {message}")));
                }
                Err(RequestFailure::Transient { message, retry_after }) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(Error::TransientUpstream(format!(
                            "GET {url}: {message} (after {attempt} attempts)"
                        )));
                    }
                    // 429 waits out the server's own hint when it gave one
                    let wait = retry_after.unwrap_or_else(|| jittered(backoff));
                    warn!(
                        url = %url,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Transient upstream failure, will retry: {}",
                        message
                    );
                    tokio::time::sleep(wait).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> std::result::Result<String, RequestFailure> {
        let bearer = self
            .token
            .bearer(&self.http)
            .await
            .map_err(|e| RequestFailure::Transient {
                message: format!("token acquisition failed: {e}"),
                retry_after: None,
            })?;

        debug!(url = %url, "Fetching upstream page");

        let response = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| RequestFailure::Transient {
                message: format!("transport error: {e}"),
                retry_after: None,
            })?;

        let status = response.status();

        if status.is_success() {
            return response.text().await.map_err(|e| RequestFailure::Transient {
                message: format!("body read failed: {e}"),
                retry_after: None,
            });
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RequestFailure::Transient {
                message: "rate limited (429)".to_string(),
                retry_after,
            });
        }

        if status.is_server_error() {
            return Err(RequestFailure::Transient {
                message: format!("server error {status}"),
                retry_after: None,
            });
        }

        // Remaining 4xx statuses are not retried
        let body = response.text().await.unwrap_or_default();
        Err(RequestFailure::Fatal(format!("status {status}: {body}")))
    }

    /// Lazy paged walk over an endpoint, following `next` cursors
    pub fn pages<T: DeserializeOwned>(&self, first_url: &str) -> Pager<'_, T> {
        Pager {
            client: self,
            next_url: Some(first_url.to_string()),
            _marker: std::marker::PhantomData,
        }
    }
}

enum RequestFailure {
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
    Fatal(String),
}

fn jittered(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    base.mul_f64(1.0 + jitter)
}

/// Cursor-following page iterator. Upstream pagination order is preserved;
/// the caller drives it one page at a time so cancellation can be observed
/// between pages.
pub struct Pager<'a, T> {
    client: &'a UpstreamClient,
    next_url: Option<String>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> Pager<'_, T> {
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        let url = match self.next_url.take() {
            Some(url) => url,
            None => return Ok(None),
        };
        let envelope: PageEnvelope<T> = self.client.get_json(&url).await?;
        self.next_url = envelope.next.clone();
        Ok(Some(envelope.results))
    }
}
