//! Configuration management for `GeoTally`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::GeoTallyError;
use crate::aggregate::NormalizationPolicy;
use crate::resolver::RetryPolicy;

/// Root configuration structure for `GeoTally`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoTallyConfig {
    /// Geocoding provider and request policy
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Aggregation and worker settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Persistent cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Geocoding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Provider name ("open-meteo" or "table")
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL for the geocoding API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Result language requested from the API
    #[serde(default = "default_language")]
    pub language: String,
    /// JSON lookup table, required by the "table" provider
    #[serde(default)]
    pub table_path: Option<String>,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Attempts per label, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing between any two requests, in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Base retry backoff in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent resolver workers
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Merge labels that differ only in case
    #[serde(default)]
    pub case_insensitive: bool,
    /// Strip administrative suffixes such as "省" or " Province"
    #[serde(default)]
    pub strip_admin_suffixes: bool,
    /// Check the provider is reachable before resolving anything
    #[serde(default = "default_preflight")]
    pub preflight: bool,
}

/// Persistent cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keep resolutions across runs
    #[serde(default)]
    pub persistent: bool,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Cache TTL in hours
    #[serde(default = "default_cache_ttl")]
    pub ttl_hours: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_provider() -> String {
    "open-meteo".to_string()
}

fn default_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timeout() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_workers() -> u32 {
    1
}

fn default_preflight() -> bool {
    true
}

fn default_cache_location() -> String {
    "~/.cache/geotally".to_string()
}

fn default_cache_ttl() -> u32 {
    720
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            language: default_language(),
            table_path: None,
            timeout_seconds: default_timeout(),
            max_attempts: default_max_attempts(),
            min_interval_ms: default_min_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            case_insensitive: false,
            strip_admin_suffixes: false,
            preflight: default_preflight(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            location: default_cache_location(),
            ttl_hours: default_cache_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl GeocodingConfig {
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            call_timeout: Duration::from_secs(self.timeout_seconds.into()),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn normalization(&self) -> NormalizationPolicy {
        NormalizationPolicy {
            case_insensitive: self.case_insensitive,
            strip_admin_suffixes: self.strip_admin_suffixes,
        }
    }
}

impl CacheConfig {
    /// Cache directory with a leading `~` expanded
    #[must_use]
    pub fn resolved_location(&self) -> PathBuf {
        match self.location.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.location)),
            None => PathBuf::from(&self.location),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_hours) * 60 * 60)
    }
}

impl GeoTallyConfig {
    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("geotally.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. GEOTALLY_GEOCODING__MAX_ATTEMPTS=5
        builder = builder.add_source(
            Environment::with_prefix("GEOTALLY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: GeoTallyConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for missing values
        config.apply_defaults();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("geotally").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.geocoding.provider.is_empty() {
            self.geocoding.provider = default_provider();
        }
        if self.geocoding.base_url.is_empty() {
            self.geocoding.base_url = default_base_url();
        }
        if self.geocoding.language.is_empty() {
            self.geocoding.language = default_language();
        }
        if self.geocoding.timeout_seconds == 0 {
            self.geocoding.timeout_seconds = default_timeout();
        }
        if self.geocoding.max_attempts == 0 {
            self.geocoding.max_attempts = default_max_attempts();
        }
        if self.pipeline.workers == 0 {
            self.pipeline.workers = default_workers();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.geocoding.timeout_seconds > 300 {
            return Err(
                GeoTallyError::config("Geocoding timeout cannot exceed 300 seconds").into(),
            );
        }

        if !(1..=10).contains(&self.geocoding.max_attempts) {
            return Err(
                GeoTallyError::config("Geocoding max attempts must be between 1 and 10").into(),
            );
        }

        if self.geocoding.min_interval_ms > 60_000 {
            return Err(GeoTallyError::config(
                "Minimum request interval cannot exceed 60000 ms",
            )
            .into());
        }

        if self.geocoding.backoff_base_ms > 60_000 {
            return Err(
                GeoTallyError::config("Retry backoff base cannot exceed 60000 ms").into(),
            );
        }

        if !(1..=32).contains(&self.pipeline.workers) {
            return Err(GeoTallyError::config("Workers must be between 1 and 32").into());
        }

        if self.cache.ttl_hours > 8760 {
            return Err(
                GeoTallyError::config("Cache TTL cannot exceed 8760 hours (1 year)").into(),
            );
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(GeoTallyError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(GeoTallyError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        match self.geocoding.provider.as_str() {
            "open-meteo" => {
                if !self.geocoding.base_url.starts_with("http://")
                    && !self.geocoding.base_url.starts_with("https://")
                {
                    return Err(GeoTallyError::config(
                        "Geocoding base URL must be a valid HTTP or HTTPS URL",
                    )
                    .into());
                }
            }
            "table" => {
                if self.geocoding.table_path.as_deref().is_none_or(str::is_empty) {
                    return Err(GeoTallyError::config(
                        "The table provider requires geocoding.table_path",
                    )
                    .into());
                }
            }
            other => {
                return Err(GeoTallyError::config(format!(
                    "Invalid geocoding provider '{other}'. Must be one of: open-meteo, table"
                ))
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GeoTallyConfig::default();
        assert_eq!(config.geocoding.base_url, "https://geocoding-api.open-meteo.com/v1");
        assert_eq!(config.geocoding.provider, "open-meteo");
        assert_eq!(config.geocoding.max_attempts, 3);
        assert_eq!(config.geocoding.min_interval(), Duration::from_secs(1));
        assert_eq!(config.pipeline.workers, 1);
        assert!(!config.pipeline.case_insensitive);
        assert!(!config.cache.persistent);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = GeoTallyConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = GeoTallyConfig::default();
        config.geocoding.timeout_seconds = 500;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout cannot exceed"));

        let mut config = GeoTallyConfig::default();
        config.pipeline.workers = 64;
        assert!(config.validate().is_err());

        let mut config = GeoTallyConfig::default();
        config.geocoding.max_attempts = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_base_is_bounded() {
        let mut config = GeoTallyConfig::default();
        config.geocoding.backoff_base_ms = u64::MAX;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("backoff base cannot exceed"));

        config.geocoding.backoff_base_ms = 60_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_provider_requires_path() {
        let mut config = GeoTallyConfig::default();
        config.geocoding.provider = "table".to_string();
        assert!(config.validate().is_err());

        config.geocoding.table_path = Some("places.json".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = GeoTallyConfig::default();
        config.geocoding.provider = "nominatim".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid geocoding provider"));
    }

    #[test]
    fn test_apply_defaults() {
        let mut config = GeoTallyConfig::default();
        config.geocoding.max_attempts = 0;
        config.pipeline.workers = 0;
        config.logging.format = String::new();
        config.apply_defaults();
        assert_eq!(config.geocoding.max_attempts, 3);
        assert_eq!(config.pipeline.workers, 1);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[geocoding]
max_attempts = 5
min_interval_ms = 250

[pipeline]
workers = 4
case_insensitive = true
"#
        )
        .unwrap();

        let config = GeoTallyConfig::load_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.geocoding.max_attempts, 5);
        assert_eq!(config.geocoding.min_interval(), Duration::from_millis(250));
        assert_eq!(config.pipeline.workers, 4);
        assert!(config.pipeline.normalization().case_insensitive);
        // Untouched sections keep their defaults
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = GeoTallyConfig::default();
        let policy = config.geocoding.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_cache_location_expands_home() {
        let config = GeoTallyConfig::default();
        let location = config.cache.resolved_location();
        assert!(location.to_string_lossy().ends_with(".cache/geotally"));
        if dirs::home_dir().is_some() {
            assert!(!location.to_string_lossy().starts_with('~'));
        }

        let mut config = GeoTallyConfig::default();
        config.cache.location = "/var/cache/geotally".to_string();
        assert_eq!(config.cache.resolved_location(), PathBuf::from("/var/cache/geotally"));
    }

    #[test]
    fn test_config_path_generation() {
        let path = GeoTallyConfig::get_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("geotally"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}
