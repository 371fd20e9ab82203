//! Pipeline orchestration
//!
//! Drives aggregated labels through cache-then-resolver with a bounded pool
//! of workers and assembles the report. A `Pipeline` is the state of one run:
//! it owns its cache and rate limiter and is consumed by [`Pipeline::run`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::aggregate::{LabelCounts, NormalizationPolicy, aggregate};
use crate::cache::{PersistentCache, ResolutionCache};
use crate::cancel::CancelSignal;
use crate::config::GeoTallyConfig;
use crate::geocoding::GeocodingProvider;
use crate::models::{LabelCount, LabelOutcome, PipelineReport, ResolutionResult, RunStats};
use crate::rate_limit::RateLimiter;
use crate::resolver::{ResolverClient, RetryPolicy};
use crate::{GeoTallyError, Result};

struct DurableStore {
    cache: PersistentCache,
    ttl: Duration,
}

/// One aggregation and resolution run
pub struct Pipeline {
    resolver: ResolverClient,
    cache: ResolutionCache,
    persistent: Option<DurableStore>,
    normalization: NormalizationPolicy,
    workers: usize,
    preflight: bool,
    cancel: CancelSignal,
    cache_hits: AtomicUsize,
    /// Results fetched from the provider during this run, to flush at the end
    fresh_results: Mutex<Vec<(String, ResolutionResult)>>,
}

impl Pipeline {
    /// Pipeline around an already configured resolver
    #[must_use]
    pub fn new(resolver: ResolverClient) -> Self {
        Self {
            resolver,
            cache: ResolutionCache::new(),
            persistent: None,
            normalization: NormalizationPolicy::default(),
            workers: 1,
            preflight: false,
            cancel: CancelSignal::never(),
            cache_hits: AtomicUsize::new(0),
            fresh_results: Mutex::new(Vec::new()),
        }
    }

    /// Pipeline with its own minimum-interval rate limiter
    #[must_use]
    pub fn rate_limited(
        provider: Arc<dyn GeocodingProvider>,
        min_interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let gate = Arc::new(RateLimiter::new(min_interval));
        Self::new(ResolverClient::new(provider, gate, retry))
    }

    /// Build a pipeline from configuration, opening the persistent cache if enabled
    pub fn from_config(
        config: &GeoTallyConfig,
        provider: Arc<dyn GeocodingProvider>,
    ) -> Result<Self> {
        let mut pipeline = Self::rate_limited(
            provider,
            config.geocoding.min_interval(),
            config.geocoding.retry_policy(),
        )
        .with_workers(config.pipeline.workers as usize)
        .with_normalization(config.pipeline.normalization())
        .with_preflight(config.pipeline.preflight);

        if config.cache.persistent {
            let location = config.cache.resolved_location();
            std::fs::create_dir_all(&location).map_err(|e| {
                GeoTallyError::cache(format!(
                    "Failed to create cache directory {}: {e}",
                    location.display()
                ))
            })?;
            let store = PersistentCache::open(&location).map_err(|e| {
                GeoTallyError::cache(format!(
                    "Failed to open cache database at {}: {e:#}",
                    location.display()
                ))
            })?;
            pipeline = pipeline.with_persistent_cache(store, config.cache.ttl());
        }

        Ok(pipeline)
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: NormalizationPolicy) -> Self {
        self.normalization = normalization;
        self
    }

    /// Run a provider health check before resolving anything
    #[must_use]
    pub fn with_preflight(mut self, preflight: bool) -> Self {
        self.preflight = preflight;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.resolver = self.resolver.with_cancel(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Consult and fill `cache` across runs
    #[must_use]
    pub fn with_persistent_cache(mut self, cache: PersistentCache, ttl: Duration) -> Self {
        self.persistent = Some(DurableStore { cache, ttl });
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Provider calls made so far, retries included
    #[must_use]
    pub fn external_calls(&self) -> usize {
        self.resolver.external_calls()
    }

    /// Aggregate `records` and resolve every distinct label
    pub async fn run<R, I, F>(self, records: I, extract: F) -> Result<PipelineReport>
    where
        I: IntoIterator<Item = R>,
        F: FnMut(&R) -> Option<String>,
    {
        let counts = aggregate(records, extract, &self.normalization);
        self.run_counts(counts).await
    }

    /// Resolve already aggregated label counts
    pub async fn run_counts(self, counts: LabelCounts) -> Result<PipelineReport> {
        if self.cancel.is_cancelled() {
            return Err(GeoTallyError::Cancelled);
        }

        let start_time = Instant::now();
        let total_rows = counts.total();
        let skipped_rows = counts.skipped();
        let labels = counts.into_sorted();
        let distinct_labels = labels.len();

        info!(
            "Resolving {} distinct labels from {} rows ({} skipped) with {} worker(s)",
            distinct_labels, total_rows, skipped_rows, self.workers
        );

        if self.preflight && !labels.is_empty() {
            self.resolver.health_check().await?;
        }

        let outcomes: Result<Vec<LabelOutcome>> = stream::iter(labels)
            .map(|label_count| self.process(label_count))
            .buffer_unordered(self.workers)
            .try_collect()
            .await;

        // Results fetched before a cancellation are kept for the next run
        self.flush().await;
        let outcomes = outcomes?;

        let stats = RunStats {
            total_rows,
            skipped_rows,
            distinct_labels,
            external_calls: self.resolver.external_calls(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        };
        let report = PipelineReport::from_outcomes(outcomes, stats);

        info!(
            "Resolved {}/{} labels ({} rows); {} unresolved; {} calls, {} cache hits in {:.1}s",
            report.records.len(),
            distinct_labels,
            report.resolved_rows(),
            report.unresolved.len(),
            report.stats.external_calls,
            report.stats.cache_hits,
            start_time.elapsed().as_secs_f64()
        );

        Ok(report)
    }

    async fn process(&self, label_count: LabelCount) -> Result<LabelOutcome> {
        let result = self.resolve_label(&label_count.label).await?;
        if result.coordinates().is_none() {
            debug!("Label '{}' unresolved: {:?}", label_count.label, result);
        }
        Ok(LabelOutcome::from_result(label_count, result))
    }

    /// Resolve one normalized label through the cache
    ///
    /// The provider is asked at most once per label for the lifetime of this
    /// pipeline, however often and however concurrently the label is requested.
    pub async fn resolve_label(&self, label: &str) -> Result<ResolutionResult> {
        if let Some(hit) = self.cache.lookup(label) {
            debug!("Cache hit for '{}'", label);
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let (result, fresh) = self
            .cache
            .get_or_resolve(label, || self.resolve_uncached(label))
            .await?;
        if !fresh {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(result)
    }

    async fn resolve_uncached(&self, label: &str) -> Result<ResolutionResult> {
        if let Some(store) = &self.persistent {
            match store.cache.get_result(label).await {
                Ok(Some(result)) => {
                    debug!("Persistent cache hit for '{}'", label);
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(result);
                }
                Ok(None) => {}
                Err(e) => warn!("Persistent cache lookup failed for '{}': {:#}", label, e),
            }
        }

        let result = self.resolver.resolve(label).await?;
        if self.persistent.is_some() {
            if let Ok(mut fresh) = self.fresh_results.lock() {
                fresh.push((label.to_string(), result));
            }
        }
        Ok(result)
    }

    /// Write this run's durable results to the persistent cache
    async fn flush(&self) {
        let Some(store) = &self.persistent else {
            return;
        };

        let fresh = match self.fresh_results.lock() {
            Ok(mut fresh) => std::mem::take(&mut *fresh),
            Err(_) => return,
        };

        let mut written = 0;
        for (label, result) in fresh {
            match store.cache.put_result(&label, result, store.ttl).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to persist result for '{}': {:#}", label, e),
            }
        }
        debug!("Flushed {} results to the persistent cache", written);
    }
}
