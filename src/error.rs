//! Error types and handling for the `GeoTally` pipeline

use thiserror::Error;

/// Main error type for the `GeoTally` library
///
/// Per-label problems never show up here: they are reported as
/// [`crate::Unresolved`] entries. These variants are for conditions that stop
/// a whole run or fail a collaborator (config, input file, cache store).
#[derive(Error, Debug)]
pub enum GeoTallyError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The geocoding service failed its preflight check
    #[error("Geocoding service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Input table errors (missing file, bad column)
    #[error("Input error: {message}")]
    Input { message: String },

    /// Persistent cache errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// The run was cancelled by the operator
    #[error("Run cancelled")]
    Cancelled,
}

impl GeoTallyError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new input error
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            GeoTallyError::Config { .. } => {
                "Configuration error. Please check your config file and environment.".to_string()
            }
            GeoTallyError::ServiceUnavailable { .. } => {
                "Unable to reach the geocoding service. Please check your internet connection."
                    .to_string()
            }
            GeoTallyError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            GeoTallyError::Input { message } => {
                format!("Could not read the input table: {message}")
            }
            GeoTallyError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            GeoTallyError::Cancelled => "Run cancelled before completion.".to_string(),
        }
    }
}
