//! `GeoTally` - place-name aggregation and cached, rate-limited geocoding
//!
//! This library counts free-text place names appearing in tabular records and
//! resolves each distinct name to coordinates exactly once, through a single
//! rate-limited geocoding provider with bounded retries.

pub mod aggregate;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod input;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod report;
pub mod resolver;

// Re-export core types for public API
pub use aggregate::{LabelCounts, NormalizationPolicy, aggregate};
pub use cache::ResolutionCache;
pub use cancel::{CancelHandle, CancelSignal};
pub use config::GeoTallyConfig;
pub use error::GeoTallyError;
pub use geocoding::{GeocodingProvider, OpenMeteoGeocoder, ProviderError, TableGeocoder};
pub use models::{
    Coordinates, FailureReason, LabelCount, OutputRecord, PipelineReport, ResolutionResult,
    Unresolved, UnresolvedReason,
};
pub use pipeline::Pipeline;
pub use rate_limit::{RateLimiter, RequestGate};
pub use resolver::{ResolverClient, RetryPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, GeoTallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
