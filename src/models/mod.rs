//! Data models for the GeoTally pipeline
//!
//! This module contains the core domain models organized by concern:
//! - Location: Geographic coordinates and range validation
//! - Resolution: The per-label outcome of a geocoding attempt
//! - Record: Aggregated counts, output records and the run report

pub mod location;
pub mod record;
pub mod resolution;

// Re-export all public types for convenient access
pub use location::Coordinates;
pub use record::{
    LabelCount, LabelOutcome, OutputRecord, PipelineReport, RunStats, Unresolved, UnresolvedReason,
};
pub use resolution::{FailureReason, ResolutionResult};
