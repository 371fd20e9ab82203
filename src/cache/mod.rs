//! Per-run resolution cache
//!
//! Maps normalized labels to their [`ResolutionResult`], negative results
//! included. Each label owns a once-cell: the first worker to claim it runs
//! the resolution, any concurrent worker asking for the same label waits for
//! that result instead of calling the provider again.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::Result;
use crate::models::ResolutionResult;

pub mod persistent;

pub use persistent::PersistentCache;

/// Label to result store owned by a single run
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<String, Arc<OnceCell<ResolutionResult>>>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored result for `label`, `None` if never resolved
    #[must_use]
    pub fn lookup(&self, label: &str) -> Option<ResolutionResult> {
        self.entries
            .get(label)
            .and_then(|cell| cell.get().copied())
    }

    /// Store a result unless one is already present
    ///
    /// Returns `false` and keeps the existing result if the label was already
    /// resolved.
    pub fn store(&self, label: &str, result: ResolutionResult) -> bool {
        let stored = self.cell(label).set(result).is_ok();
        if !stored {
            debug!("Label '{}' already cached, keeping existing result", label);
        }
        stored
    }

    /// Return the cached result, or run `resolve` exactly once for this label
    ///
    /// The boolean is `true` when this call ran `resolve`. If `resolve` fails
    /// the label stays absent and the error is returned.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        label: &str,
        resolve: F,
    ) -> Result<(ResolutionResult, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolutionResult>>,
    {
        // Clone the cell out so no map shard stays locked across the await.
        let cell = self.cell(label);
        let mut fresh = false;
        let result = cell
            .get_or_try_init(|| {
                fresh = true;
                resolve()
            })
            .await?;
        Ok((*result, fresh))
    }

    /// Number of labels with a stored result
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, label: &str) -> Arc<OnceCell<ResolutionResult>> {
        self.entries
            .entry(label.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoTallyError;
    use crate::models::FailureReason;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn paris() -> ResolutionResult {
        ResolutionResult::Resolved {
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }

    #[test]
    fn test_lookup_absent() {
        let cache = ResolutionCache::new();
        assert!(cache.lookup("Paris").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_never_overwrites() {
        let cache = ResolutionCache::new();
        assert!(cache.store("Atlantis", ResolutionResult::NotFound));
        assert!(!cache.store("Atlantis", paris()));
        assert_eq!(cache.lookup("Atlantis"), Some(ResolutionResult::NotFound));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_memoized() {
        let cache = ResolutionCache::new();
        let failed = ResolutionResult::failed(FailureReason::Timeout);
        cache.store("Nowhere", failed);
        assert_eq!(cache.lookup("Nowhere"), Some(failed));
    }

    #[tokio::test]
    async fn test_get_or_resolve_runs_once() {
        let cache = ResolutionCache::new();
        let calls = AtomicUsize::new(0);

        let (first, fresh) = cache
            .get_or_resolve("Paris", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(paris())
            })
            .await
            .unwrap();
        assert_eq!(first, paris());
        assert!(fresh);

        let (second, fresh) = cache
            .get_or_resolve("Paris", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ResolutionResult::NotFound)
            })
            .await
            .unwrap();
        assert_eq!(second, paris());
        assert!(!fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_claims_resolve_once() {
        let cache = Arc::new(ResolutionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve("Paris", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(paris())
                    })
                    .await
                    .unwrap()
                    .0
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), paris());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolve_leaves_label_absent() {
        let cache = ResolutionCache::new();
        let result = cache
            .get_or_resolve("Paris", || async { Err(GeoTallyError::Cancelled) })
            .await;
        assert!(matches!(result, Err(GeoTallyError::Cancelled)));
        assert!(cache.lookup("Paris").is_none());
        assert!(cache.store("Paris", paris()));
    }
}
