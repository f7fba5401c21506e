//! Rate-limited HTTP client with retry/backoff and SSRF guard.
//!
//! Collectors whose source SDKs already rate-limit internally skip this
//! crate entirely; the orchestrator treats it as optional. Everyone else
//! funnels outbound requests through [`Client`], which enforces request
//! spacing, per-request timeouts, URL safety, and the retry policy in one
//! place.

mod ratelimit;
mod retry;
mod ssrf;

use std::time::Duration;

use tokio::sync::Mutex;

use gleaner_types::{Error, Result};

pub use ratelimit::RateLimiter;
pub use retry::{RetryConfig, calculate_retry_delay, is_retryable_status, parse_retry_after,
    send_with_retry};
pub use ssrf::check_url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = concat!("gleaner/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Minimum spacing between requests, from `rate_limit_seconds`.
    pub rate_limit: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub user_agent: String,
    /// Run every URL through the SSRF guard before sending. Disabled only
    /// for adapters that talk to a fixed, known API host.
    pub check_urls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rate_limit: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            check_urls: true,
        }
    }
}

/// A session: one reqwest client (connection reuse) plus the rate limiter
/// and retry policy. Cheap to share by reference for the life of a run.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    limiter: Mutex<RateLimiter>,
    retry: RetryConfig,
    check_urls: bool,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            limiter: Mutex::new(RateLimiter::new(config.rate_limit)),
            retry: config.retry,
            check_urls: config.check_urls,
        })
    }

    /// GET a URL through the guard, the rate limiter, and the retry policy.
    ///
    /// Returns any non-transient response as-is; transient failures that
    /// exhaust the retry budget surface as `rate_limit` or `network` errors.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        if self.check_urls {
            check_url(url).await?;
        }

        self.limiter.lock().await.acquire().await;

        send_with_retry(|| self.http.get(url), &self.retry).await
    }

    #[must_use]
    pub fn inner(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(max_retries: u32) -> Client {
        Client::new(ClientConfig {
            rate_limit: Duration::ZERO,
            timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                jitter_factor: 0.0,
            },
            user_agent: "gleaner-test/0".to_string(),
            // Mock servers live on loopback, which the guard blocks.
            check_urls: false,
        })
        .expect("client")
    }

    #[tokio::test]
    async fn success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(2);
        let response = client.get(&format!("{}/item", server.uri())).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retries_transient_statuses_then_succeeds() {
        let server = MockServer::start().await;
        let attempt = AtomicU32::new(0);

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(move |_: &wiremock::Request| {
                let n = attempt.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_string("recovered")
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(3);
        let response = client.get(&format!("{}/flaky", server.uri())).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn exhausted_429_is_rate_limit_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/throttled"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(2);
        let err = client
            .get(&format!("{}/throttled", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_limit");
    }

    #[tokio::test]
    async fn exhausted_5xx_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(1);
        let err = client.get(&format!("{}/down", server.uri())).await.unwrap_err();
        assert_eq!(err.code(), "network");
    }

    #[tokio::test]
    async fn non_retryable_status_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(3);
        let response = client
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn guard_blocks_loopback_when_enabled() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let err = client.get("http://127.0.0.1:9/").await.unwrap_err();
        assert_eq!(err.code(), "ssrf");
    }

    #[tokio::test]
    async fn requests_are_spaced_by_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new(ClientConfig {
            rate_limit: Duration::from_millis(50),
            check_urls: false,
            ..Default::default()
        })
        .unwrap();

        let start = std::time::Instant::now();
        client.get(&server.uri()).await.unwrap();
        client.get(&server.uri()).await.unwrap();
        client.get(&server.uri()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
