//! Rendering of a finished run
//!
//! JSON for downstream plotting and a plain-text summary for the console.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::PipelineReport;

/// Write `report` as pretty-printed JSON to `path`
pub fn write_json(report: &PipelineReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    writer.flush()?;

    info!(
        "Wrote {} records and {} unresolved labels to {}",
        report.records.len(),
        report.unresolved.len(),
        path.display()
    );
    Ok(())
}

/// Console summary listing every label and the run counters
#[must_use]
pub fn summary(report: &PipelineReport) -> String {
    let mut out = String::new();
    let stats = &report.stats;

    let _ = writeln!(
        out,
        "{} rows ({} skipped), {} distinct labels",
        stats.total_rows, stats.skipped_rows, stats.distinct_labels
    );
    let _ = writeln!(
        out,
        "{} external calls, {} cache hits",
        stats.external_calls, stats.cache_hits
    );

    if !report.records.is_empty() {
        let _ = writeln!(
            out,
            "\nResolved ({} labels, {} rows):",
            report.records.len(),
            report.resolved_rows()
        );
        for record in &report.records {
            let _ = writeln!(
                out,
                "  {:>6}  {} ({:.4}, {:.4})",
                record.count, record.label, record.latitude, record.longitude
            );
        }
    }

    if !report.unresolved.is_empty() {
        let _ = writeln!(
            out,
            "\nUnresolved ({} labels, {} rows):",
            report.unresolved.len(),
            report.unresolved_rows()
        );
        for entry in &report.unresolved {
            let _ = writeln!(out, "  {:>6}  {} [{}]", entry.count, entry.label, entry.reason);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabelCount, LabelOutcome, ResolutionResult, RunStats};
    use tempfile::TempDir;

    fn report() -> PipelineReport {
        let outcomes = vec![
            LabelOutcome::from_result(
                LabelCount {
                    label: "Paris".to_string(),
                    count: 2,
                },
                ResolutionResult::Resolved {
                    latitude: 48.8566,
                    longitude: 2.3522,
                },
            ),
            LabelOutcome::from_result(
                LabelCount {
                    label: "Atlantis".to_string(),
                    count: 1,
                },
                ResolutionResult::NotFound,
            ),
        ];
        PipelineReport::from_outcomes(
            outcomes,
            RunStats {
                total_rows: 3,
                skipped_rows: 1,
                distinct_labels: 2,
                external_calls: 2,
                cache_hits: 0,
            },
        )
    }

    #[test]
    fn test_write_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("report.json");

        write_json(&report(), &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["records"][0]["label"], "Paris");
        assert_eq!(json["records"][0]["count"], 2);
        assert_eq!(json["unresolved"][0]["reason"], "not-found");
        assert_eq!(json["stats"]["total_rows"], 3);
    }

    #[test]
    fn test_summary_lists_unresolved_reason() {
        let text = summary(&report());
        assert!(text.contains("3 rows (1 skipped), 2 distinct labels"));
        assert!(text.contains("Paris (48.8566, 2.3522)"));
        assert!(text.contains("Atlantis [not-found]"));
    }
}
