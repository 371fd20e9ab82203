//! Label aggregation
//!
//! Groups raw rows by their normalized label and counts occurrences. Rows
//! whose label is missing or blank are dropped here and never reach the
//! resolver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::LabelCount;

/// Administrative suffixes removed when `strip_admin_suffixes` is on.
/// Longest first so "壮族自治区" wins over "自治区".
const ADMIN_SUFFIXES: &[&str] = &[
    "维吾尔自治区",
    "壮族自治区",
    "回族自治区",
    "特别行政区",
    "自治区",
    "省",
    "市",
    " Province",
    " City",
];

/// How raw labels are turned into cache keys
///
/// The default only trims whitespace, so "Paris" and "paris" stay distinct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    /// Lowercase labels before counting
    #[serde(default)]
    pub case_insensitive: bool,
    /// Drop one trailing administrative suffix ("广东省" -> "广东")
    #[serde(default)]
    pub strip_admin_suffixes: bool,
}

impl NormalizationPolicy {
    /// Normalize a raw label, or `None` if it is not a usable label
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let mut label = raw.trim();
        if label.is_empty() {
            return None;
        }

        if self.strip_admin_suffixes {
            label = strip_admin_suffix(label);
        }

        if self.case_insensitive {
            Some(label.to_lowercase())
        } else {
            Some(label.to_string())
        }
    }
}

fn strip_admin_suffix(label: &str) -> &str {
    for suffix in ADMIN_SUFFIXES {
        let Some(split) = label.len().checked_sub(suffix.len()) else {
            continue;
        };
        if !label.is_char_boundary(split) {
            continue;
        }
        let (head, tail) = label.split_at(split);
        if tail.eq_ignore_ascii_case(suffix) {
            let head = head.trim_end();
            if head.is_empty() {
                return label;
            }
            return head;
        }
    }
    label
}

/// Occurrence counts per distinct normalized label
#[derive(Debug, Clone, Default)]
pub struct LabelCounts {
    counts: HashMap<String, u64>,
    skipped: u64,
}

impl LabelCounts {
    /// Number of distinct labels
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for one normalized label
    #[must_use]
    pub fn get(&self, label: &str) -> Option<u64> {
        self.counts.get(label).copied()
    }

    /// Rows with a valid label
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Rows dropped because the label was blank or missing
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Label counts ordered by count (highest first), then label
    #[must_use]
    pub fn into_sorted(self) -> Vec<LabelCount> {
        let mut counts: Vec<LabelCount> = self
            .counts
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        counts
    }
}

/// Count rows per normalized label
///
/// `extract` pulls the raw label out of a row; `None` marks the row invalid.
pub fn aggregate<R, I, F>(records: I, mut extract: F, policy: &NormalizationPolicy) -> LabelCounts
where
    I: IntoIterator<Item = R>,
    F: FnMut(&R) -> Option<String>,
{
    let mut result = LabelCounts::default();

    for record in records {
        match extract(&record).and_then(|raw| policy.normalize(&raw)) {
            Some(label) => *result.counts.entry(label).or_insert(0) += 1,
            None => result.skipped += 1,
        }
    }

    debug!(
        "Aggregated {} rows into {} distinct labels ({} skipped)",
        result.total(),
        result.len(),
        result.skipped
    );

    result
}
