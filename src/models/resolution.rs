//! Resolution outcome model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Coordinates;

/// Why a resolution attempt failed
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Every attempt timed out
    Timeout,
    /// The service kept reporting transient errors until attempts ran out
    ServiceError,
    /// A hard failure that retrying would not fix
    Unknown,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ServiceError => "service-error",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one label
///
/// Cached as-is for the rest of the run, negative outcomes included.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionResult {
    Resolved { latitude: f64, longitude: f64 },
    NotFound,
    Failed { reason: FailureReason },
}

impl ResolutionResult {
    #[must_use]
    pub fn resolved(coordinates: Coordinates) -> Self {
        Self::Resolved {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        }
    }

    #[must_use]
    pub fn failed(reason: FailureReason) -> Self {
        Self::Failed { reason }
    }

    /// Coordinates if resolved
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match *self {
            ResolutionResult::Resolved {
                latitude,
                longitude,
            } => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Whether this outcome may be kept across runs
    ///
    /// Failures are run-scoped: the next run should try again.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !matches!(self, ResolutionResult::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_labels() {
        assert_eq!(FailureReason::Timeout.to_string(), "timeout");
        assert_eq!(FailureReason::ServiceError.to_string(), "service-error");
        assert_eq!(FailureReason::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_coordinates_only_for_resolved() {
        let resolved = ResolutionResult::Resolved {
            latitude: 48.85,
            longitude: 2.35,
        };
        assert_eq!(resolved.coordinates().unwrap().latitude, 48.85);
        assert!(ResolutionResult::NotFound.coordinates().is_none());
        assert!(
            ResolutionResult::failed(FailureReason::Timeout)
                .coordinates()
                .is_none()
        );
    }

    #[test]
    fn test_durability() {
        assert!(ResolutionResult::NotFound.is_durable());
        assert!(
            ResolutionResult::Resolved {
                latitude: 0.0,
                longitude: 0.0
            }
            .is_durable()
        );
        assert!(!ResolutionResult::failed(FailureReason::ServiceError).is_durable());
    }

    #[test]
    fn test_json_shape() {
        let json =
            serde_json::to_value(ResolutionResult::failed(FailureReason::ServiceError)).unwrap();
        assert_eq!(json["failed"]["reason"], "service-error");
        assert_eq!(
            serde_json::to_value(ResolutionResult::NotFound).unwrap(),
            "not-found"
        );
    }
}
