//! Single-process request spacing.
//!
//! Each acquisition blocks until `now - last_request >= min_interval`, so a
//! collector configured with `rate_limit_seconds: 2` never sends two
//! requests less than two seconds apart, regardless of how fast the source
//! responds.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// Build from the config's `rate_limit_seconds`. Non-positive values
    /// disable spacing.
    #[must_use]
    pub fn from_seconds(seconds: f64) -> Self {
        let interval = if seconds > 0.0 {
            Duration::from_secs_f64(seconds)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    /// Wait until the next request is allowed, then claim the slot.
    pub async fn acquire(&mut self) {
        if self.min_interval.is_zero() {
            self.last_request = Some(Instant::now());
            return;
        }

        if let Some(last) = self.last_request {
            let ready_at = last + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
