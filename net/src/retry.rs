//! Retry policy with exponential backoff.
//!
//! # Retry Policy
//!
//! - Retries HTTP {429, 500, 502, 503, 504} and transport errors.
//! - Exponential backoff with down-jitter (multiplier in [0.75, 1.0]).
//! - Server `Retry-After` honored when present and sane.
//! - A 429 that survives the whole budget surfaces as a rate-limit error;
//!   everything else transient surfaces as a network error.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode, header::HeaderMap};

use gleaner_types::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial request).
    pub max_retries: u32,
    /// Initial backoff delay before the first retry.
    pub initial_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
            jitter_factor: 0.25,
        }
    }
}

/// Statuses the client treats as transient.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Parse a `Retry-After` header in seconds form.
///
/// Returns `Some` only for values in `(0, 120]`; anything else falls back to
/// computed backoff.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
        && secs > 0
        && secs <= 120
    {
        return Some(Duration::from_secs(secs));
    }
    None
}

/// Backoff delay before retry number `backoff_step` (0-based), honoring a
/// server-provided `Retry-After` when present.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(headers) = headers
        && let Some(delay) = parse_retry_after(headers)
    {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Send a request with automatic retries.
///
/// `build_request` is called once per attempt. A response with a
/// non-retryable status (including 4xx other than 429) is returned to the
/// caller as-is; deciding what a 404 means is the adapter's business.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> Result<reqwest::Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_status: Option<StatusCode> = None;
    let mut last_retry_after: Option<Duration> = None;

    for retry_count in 0..=config.max_retries {
        let is_last = retry_count == config.max_retries;

        match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if !is_retryable_status(status) {
                    return Ok(response);
                }

                last_status = Some(status);
                last_retry_after = parse_retry_after(response.headers());

                if is_last {
                    break;
                }

                let delay = calculate_retry_delay(retry_count, config, Some(response.headers()));
                tracing::debug!(
                    status = %status,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if is_last || !is_retryable_error(&e) {
                    return Err(Error::network(format!(
                        "request failed after {} attempts: {e}",
                        retry_count + 1
                    ))
                    .with_context("attempts", (retry_count + 1).to_string()));
                }

                let delay = calculate_retry_delay(retry_count, config, None);
                tracing::debug!(
                    error = %e,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    let attempts = config.max_retries + 1;
    match last_status {
        Some(status) if status == StatusCode::TOO_MANY_REQUESTS => Err(Error::rate_limit(
            format!("rate limited after {attempts} attempts"),
            last_retry_after,
        )
        .with_context("attempts", attempts.to_string())),
        Some(status) => Err(Error::network(format!(
            "server error {status} after {attempts} attempts"
        ))
        .with_context("status", status.as_u16().to_string())
        .with_context("attempts", attempts.to_string())),
        None => Err(Error::network(format!("request failed after {attempts} attempts"))),
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
