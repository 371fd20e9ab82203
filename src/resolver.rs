//! Label resolution against the geocoding provider
//!
//! Wraps one provider lookup per attempt: gate, timeout, classify, and retry
//! transient failures with exponential backoff. A definitive "no match" is
//! never retried, and an exhausted retry budget degrades to a reported
//! failure.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::RngExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::cancel::CancelSignal;
use crate::geocoding::{GeocodingMatch, GeocodingProvider, ProviderError};
use crate::models::{Coordinates, FailureReason, ResolutionResult};
use crate::rate_limit::RequestGate;
use crate::{GeoTallyError, Result};

/// Retry and timeout settings for one label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per label, first try included
    pub max_attempts: u32,
    /// Upper bound on a single provider call
    pub call_timeout: Duration,
    /// Backoff before the first retry, doubled for each retry after that
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            call_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Shortest wait before a retry, used when base and interval are both zero
pub const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Longest wait before a retry, unless the gate interval itself is longer
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), without jitter
    ///
    /// At least twice the gate interval, so a retry always waits strictly
    /// longer than ordinary request spacing, and at most [`MAX_BACKOFF`]
    /// otherwise.
    #[must_use]
    pub fn backoff(&self, retry: u32, min_interval: Duration) -> Duration {
        let base = self.backoff_base.max(min_interval).max(MIN_BACKOFF);
        base.saturating_mul(2_u32.saturating_pow(retry.clamp(1, 16)))
            .min(MAX_BACKOFF)
            .max(min_interval.saturating_mul(2))
            .max(MIN_BACKOFF)
    }
}

/// Spread retries by +-10%
fn with_jitter(backoff: Duration) -> Duration {
    let jitter: f64 = rand::rng().random_range(0.9..1.1);
    Duration::try_from_secs_f64(backoff.as_secs_f64() * jitter).unwrap_or(backoff)
}

/// Resolves labels through a rate-limited provider
pub struct ResolverClient {
    provider: Arc<dyn GeocodingProvider>,
    gate: Arc<dyn RequestGate>,
    policy: RetryPolicy,
    cancel: CancelSignal,
    external_calls: AtomicUsize,
}

impl ResolverClient {
    #[must_use]
    pub fn new(
        provider: Arc<dyn GeocodingProvider>,
        gate: Arc<dyn RequestGate>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            gate,
            policy,
            cancel: CancelSignal::never(),
            external_calls: AtomicUsize::new(0),
        }
    }

    /// Observe `cancel` while waiting
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Provider calls made so far, retries included
    #[must_use]
    pub fn external_calls(&self) -> usize {
        self.external_calls.load(Ordering::Relaxed)
    }

    /// Resolve one label
    ///
    /// Only cancellation is an error; every provider outcome is folded into
    /// the returned [`ResolutionResult`].
    #[tracing::instrument(name = "resolve_label", level = "debug", skip(self))]
    pub async fn resolve(&self, label: &str) -> Result<ResolutionResult> {
        let label = label.trim();
        if label.is_empty() {
            debug!("Empty label, skipping lookup");
            return Ok(ResolutionResult::NotFound);
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_transient = FailureReason::ServiceError;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff =
                    with_jitter(self.policy.backoff(attempt - 1, self.gate.min_interval()));
                debug!(
                    "Backoff before attempt {}/{}: waiting {:.1}s",
                    attempt,
                    max_attempts,
                    backoff.as_secs_f64()
                );
                self.until_cancelled(sleep(backoff)).await?;
            }

            self.until_cancelled(self.gate.acquire()).await?;
            self.external_calls.fetch_add(1, Ordering::Relaxed);

            let outcome = self
                .until_cancelled(timeout(self.policy.call_timeout, self.provider.lookup(label)))
                .await?
                .unwrap_or(Err(ProviderError::Timeout));

            match outcome {
                Ok(Some(found)) => return Ok(Self::classify_match(label, found)),
                Ok(None) => {
                    debug!("No match for '{}'", label);
                    return Ok(ResolutionResult::NotFound);
                }
                Err(err) if err.is_transient() => {
                    last_transient = match err {
                        ProviderError::Timeout => FailureReason::Timeout,
                        _ => FailureReason::ServiceError,
                    };
                    warn!(
                        "Transient failure for '{}' on attempt {}/{}: {}",
                        label, attempt, max_attempts, err
                    );
                }
                Err(err) => {
                    error!("Lookup for '{}' failed: {}", label, err);
                    return Ok(ResolutionResult::failed(FailureReason::Unknown));
                }
            }
        }

        warn!(
            "Giving up on '{}' after {} attempts ({})",
            label, max_attempts, last_transient
        );
        Ok(ResolutionResult::failed(last_transient))
    }

    /// Preflight check that the provider is reachable
    ///
    /// Goes through the gate like any lookup but is not counted as a
    /// resolution call.
    pub async fn health_check(&self) -> Result<()> {
        self.until_cancelled(self.gate.acquire()).await?;
        let name = self.provider.name();
        match self
            .until_cancelled(timeout(self.policy.call_timeout, self.provider.health_check()))
            .await?
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GeoTallyError::service_unavailable(format!(
                "{name} health check failed: {e}"
            ))),
            Err(_) => Err(GeoTallyError::service_unavailable(format!(
                "{name} health check timed out"
            ))),
        }
    }

    fn classify_match(label: &str, found: GeocodingMatch) -> ResolutionResult {
        match Coordinates::new(found.latitude, found.longitude) {
            Ok(coordinates) => {
                debug!(
                    "Resolved '{}' to {} ({})",
                    label,
                    found.name,
                    coordinates.format_coordinates()
                );
                ResolutionResult::resolved(coordinates)
            }
            Err(e) => {
                warn!("Unusable coordinates for '{}': {}", label, e);
                ResolutionResult::failed(FailureReason::Unknown)
            }
        }
    }

    async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GeoTallyError::Cancelled),
            output = fut => Ok(output),
        }
    }
}
