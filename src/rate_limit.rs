//! Rate limiting for geocoding requests
//!
//! One limiter is shared by every worker of a run, so the spacing holds
//! between any two provider calls, not per worker.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Gate every external call has to pass first
#[async_trait]
pub trait RequestGate: Send + Sync {
    /// Wait until the next request is allowed and record the grant
    async fn acquire(&self);

    /// Guaranteed spacing between grants
    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}

/// Minimum-interval rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// Time of the previous grant
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RequestGate for RateLimiter {
    async fn acquire(&self) {
        // The lock is held while sleeping: waiters queue up behind it in FIFO
        // order and each one measures from the grant before it.
        let mut last_grant = self.last_grant.lock().await;
        if let Some(prev) = *last_grant {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                debug!(
                    "Rate limit: waiting {:.3}s",
                    ready_at.saturating_duration_since(Instant::now()).as_secs_f64()
                );
                sleep_until(ready_at).await;
            }
        }
        *last_grant = Some(Instant::now());
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
