//! Geocoding providers
//!
//! A provider performs exactly one lookup per call and reports what the
//! service said. Retrying, rate limiting and coordinate validation belong to
//! [`crate::resolver`].

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocodingConfig;

pub mod open_meteo;
pub mod table;

pub use open_meteo::OpenMeteoGeocoder;
pub use table::TableGeocoder;

/// Best match returned by a provider, before validation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodingMatch {
    /// Name the service matched, for logging
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Failure of a single provider call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    /// Rate limited, overloaded, or unreachable
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service refused the request and will keep refusing it
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Whether a retry might succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Unavailable(_))
    }
}

/// A place-name lookup service
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Look up one place name. `Ok(None)` means the service has no match.
    async fn lookup(&self, query: &str) -> Result<Option<GeocodingMatch>, ProviderError>;

    /// Check the service is reachable before a run starts
    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Build the provider named in `config`
pub fn provider_from_config(
    config: &GeocodingConfig,
) -> anyhow::Result<Arc<dyn GeocodingProvider>> {
    match config.provider.as_str() {
        "open-meteo" => Ok(Arc::new(OpenMeteoGeocoder::new(config)?)),
        "table" => {
            let path = config
                .table_path
                .as_deref()
                .context("The table provider needs geocoding.table_path")?;
            Ok(Arc::new(TableGeocoder::from_json_file(path)?))
        }
        other => bail!("Unknown geocoding provider: {other}"),
    }
}
