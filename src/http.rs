//! Document fetching with per-host politeness.
//!
//! [`DocumentFetcher`] is the contract every strategy and the content
//! extractor fetch through. [`HttpFetcher`] implements it with one shared
//! `reqwest::Client` whose lifetime is one pipeline run, and a
//! [`HostThrottle`] that caps in-flight requests per host and spaces request
//! starts to the same host by a minimum delay.

use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

/// Anything that can turn a URL into raw bytes.
pub trait DocumentFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;

    /// Fetch and decode as UTF-8, replacing invalid sequences.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let bytes = self.fetch(url, timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

struct HostSlot {
    next_start: Instant,
    permits: Arc<Semaphore>,
}

/// Per-host concurrency cap plus minimum spacing between request starts.
pub struct HostThrottle {
    min_delay: Duration,
    max_per_host: usize,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostThrottle {
    pub fn new(min_delay: Duration, max_per_host: usize) -> Self {
        Self {
            min_delay,
            max_per_host: max_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for this host's turn. The permit must be held for the whole request.
    pub async fn acquire(&self, host: &str) -> Result<OwnedSemaphorePermit> {
        let permits = {
            let mut hosts = self
                .hosts
                .lock()
                .map_err(|_| PipelineError::network(host, "throttle lock poisoned"))?;
            let slot = hosts.entry(host.to_string()).or_insert_with(|| HostSlot {
                next_start: Instant::now(),
                permits: Arc::new(Semaphore::new(self.max_per_host)),
            });
            Arc::clone(&slot.permits)
        };
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::network(host, "throttle closed"))?;

        // Reserve the next start slot before sleeping so concurrent callers queue up.
        let wait = {
            let mut hosts = self
                .hosts
                .lock()
                .map_err(|_| PipelineError::network(host, "throttle lock poisoned"))?;
            let now = Instant::now();
            match hosts.get_mut(host) {
                Some(slot) => {
                    let start = slot.next_start.max(now);
                    slot.next_start = start + self.min_delay;
                    start - now
                }
                None => Duration::ZERO,
            }
        };
        if !wait.is_zero() {
            debug!(host, wait_ms = wait.as_millis() as u64, "Throttling request");
            tokio::time::sleep(wait).await;
        }
        Ok(permit)
    }
}

/// reqwest-backed [`DocumentFetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    throttle: HostThrottle,
}

impl HttpFetcher {
    /// Build the shared client from the HTTP section of the config.
    ///
    /// Configured headers that are not valid HTTP headers are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// `Config` when the client cannot be built (for example, a user agent
    /// that is not a valid header value).
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => warn!(header = %name, "Ignoring invalid configured header"),
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            throttle: HostThrottle::new(config.min_delay(), config.max_per_host),
        })
    }
}

impl DocumentFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| PipelineError::network(url, e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| PipelineError::network(url, "URL has no host"))?
            .to_string();

        let _permit = self.throttle.acquire(&host).await?;
        let response = self.client.get(parsed).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::network(url, format!("HTTP {}", status.as_u16())));
        }
        let body = response.bytes().await?;
        debug!(bytes = body.len(), "Fetched document");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_throttle_spaces_same_host() {
        let throttle = HostThrottle::new(Duration::from_millis(40), 4);
        let t0 = std::time::Instant::now();
        for _ in 0..3 {
            let _p = throttle.acquire("a.example").await.unwrap();
        }
        assert!(t0.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_throttle_hosts_are_independent() {
        let throttle = HostThrottle::new(Duration::from_millis(500), 1);
        let t0 = std::time::Instant::now();
        let _a = throttle.acquire("a.example").await.unwrap();
        let _b = throttle.acquire("b.example").await.unwrap();
        assert!(t0.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_http_fetcher_builds_from_defaults() {
        assert!(HttpFetcher::new(&HttpConfig::default()).is_ok());
    }
}
