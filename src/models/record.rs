//! Aggregated counts, output records and the run report

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FailureReason, ResolutionResult};

/// One distinct normalized label and how many rows carried it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// A resolved label, ready for plotting
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputRecord {
    pub label: String,
    pub count: u64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Why a label did not make it into the output records
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    NotFound,
    Timeout,
    ServiceError,
    Unknown,
}

impl From<FailureReason> for UnresolvedReason {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Timeout => UnresolvedReason::Timeout,
            FailureReason::ServiceError => UnresolvedReason::ServiceError,
            FailureReason::Unknown => UnresolvedReason::Unknown,
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnresolvedReason::NotFound => "not-found",
            UnresolvedReason::Timeout => "timeout",
            UnresolvedReason::ServiceError => "service-error",
            UnresolvedReason::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Diagnostics entry for a label that could not be resolved
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub label: String,
    /// Rows carrying this label, so nothing is dropped silently
    pub count: u64,
    pub reason: UnresolvedReason,
}

/// Either an output record or a diagnostics entry for one label
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOutcome {
    Record(OutputRecord),
    Unresolved(Unresolved),
}

impl LabelOutcome {
    /// Pair a label count with its resolution
    #[must_use]
    pub fn from_result(label_count: LabelCount, result: ResolutionResult) -> Self {
        let LabelCount { label, count } = label_count;
        match result {
            ResolutionResult::Resolved {
                latitude,
                longitude,
            } => LabelOutcome::Record(OutputRecord {
                label,
                count,
                latitude,
                longitude,
            }),
            ResolutionResult::NotFound => LabelOutcome::Unresolved(Unresolved {
                label,
                count,
                reason: UnresolvedReason::NotFound,
            }),
            ResolutionResult::Failed { reason } => LabelOutcome::Unresolved(Unresolved {
                label,
                count,
                reason: reason.into(),
            }),
        }
    }
}

/// Counters describing one run
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Rows with a valid label
    pub total_rows: u64,
    /// Rows dropped for an empty or missing label
    pub skipped_rows: u64,
    pub distinct_labels: usize,
    /// Provider calls made, retries included
    pub external_calls: usize,
    /// Labels answered without an external call
    pub cache_hits: usize,
}

/// Everything a run hands to the rendering side
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    /// Resolved labels, highest count first
    pub records: Vec<OutputRecord>,
    /// Unresolved labels with their reason, highest count first
    pub unresolved: Vec<Unresolved>,
    pub stats: RunStats,
}

impl PipelineReport {
    /// Build a report from per-label outcomes, ordering both lists by count
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<LabelOutcome>, stats: RunStats) -> Self {
        let mut records = Vec::new();
        let mut unresolved = Vec::new();
        for outcome in outcomes {
            match outcome {
                LabelOutcome::Record(record) => records.push(record),
                LabelOutcome::Unresolved(entry) => unresolved.push(entry),
            }
        }

        records.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        unresolved.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        Self {
            generated_at: Utc::now(),
            records,
            unresolved,
            stats,
        }
    }

    /// Rows accounted for by resolved labels
    #[must_use]
    pub fn resolved_rows(&self) -> u64 {
        self.records.iter().map(|r| r.count).sum()
    }

    /// Rows accounted for by unresolved labels
    #[must_use]
    pub fn unresolved_rows(&self) -> u64 {
        self.unresolved.iter().map(|u| u.count).sum()
    }
}
