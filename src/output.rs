//! Reporting and persistence for import summaries and comparison results.
//!
//! Supports log output, pretty JSON files for the chart front end, and CSV
//! append.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::GroupStat;
use crate::normalize::ImportSummary;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs any record using the debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs the end-of-import report, one line per skip reason and per year.
pub fn log_import_summary(summary: &ImportSummary) {
    info!(
        rows_processed = summary.rows_processed,
        rows_accepted = summary.rows_accepted,
        rows_skipped = summary.rows_skipped,
        unique_courses = summary.unique_courses,
        out_of_range_rows = summary.out_of_range_rows,
        "Import summary"
    );
    for (reason, count) in &summary.skipped_by_reason {
        info!(%reason, count, "Rows skipped");
    }
    for (year, count) in &summary.per_year_counts {
        info!(year, count, "Year distribution");
    }
}

/// Logs comparison rows in ranked order.
pub fn log_results(stats: &[GroupStat]) {
    if stats.is_empty() {
        info!("No data for this comparison");
        return;
    }
    for (rank, stat) in stats.iter().enumerate() {
        info!(
            rank = rank + 1,
            key = %stat.key,
            average = format_args!("{:.2}", stat.average),
            count = stat.count,
            "Result"
        );
    }
}

/// Writes `value` as pretty JSON, replacing any existing file.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "Wrote JSON report");
    Ok(())
}

/// Appends records as rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
    let path = path.as_ref();
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ComparisonQuery, ComparisonReport};
    use crate::records::Metric;
    use std::fs;
    use tempfile::TempDir;

    fn stats() -> Vec<GroupStat> {
        vec![
            GroupStat {
                key: "Ann Lee".into(),
                average: 80.0,
                count: 2,
            },
            GroupStat {
                key: "Bo Park".into(),
                average: 40.0,
                count: 1,
            },
        ]
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&stats());
        log_results(&stats());
        log_results(&[]);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&stats()).unwrap();
    }

    #[test]
    fn test_append_records_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        append_records(&path, &stats()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("key,average,count"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        append_records(&path, &stats()).unwrap();
        append_records(&path, &stats()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("key,")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_write_json_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/math111.json");
        let report = ComparisonReport::new(
            ComparisonQuery::by_course("MATH", 111, Metric::PercentA),
            stats(),
        );

        write_json(&path, &report).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["results"][0]["key"], "Ann Lee");
        assert!(json["generated_at"].is_string());
    }
}
