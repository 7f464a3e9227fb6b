//! Final dataset assembly
//!
//! Inner join of the metadata snapshot with the summary table on the
//! repository identifier, plus the derived columns the merged dataset adds.
//! Rows without a counterpart are dropped from the output but always counted
//! and reported, never silently discarded.

use chrono::{DateTime, Utc};
use harvest_core::{AnalysisSummary, FinalRecord, HarvestResult, RepositoryRecord};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

const DAYS_PER_YEAR: f64 = 365.25;
/// Defined value for repositories that never had an issue
const NO_ISSUES_CLOSED_PCT: f64 = 100.0;

/// Join outcome counts, reported alongside the merged rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateReport {
    pub rows: usize,
    /// Metadata records with no summary row
    pub metadata_dropped: usize,
    /// Summary rows with no metadata record
    pub summaries_dropped: usize,
}

impl AggregateReport {
    pub fn summary(&self) -> String {
        format!(
            "{} rows merged; dropped {} metadata records without analysis and {} summaries without metadata",
            self.rows, self.metadata_dropped, self.summaries_dropped
        )
    }
}

/// Join metadata and summaries into final dataset rows, as of now
pub fn aggregate(
    records: &[RepositoryRecord],
    summaries: &[AnalysisSummary],
) -> (Vec<FinalRecord>, AggregateReport) {
    aggregate_at(records, summaries, Utc::now())
}

/// Join metadata and summaries, deriving repository age against the given
/// clock. Metadata order is preserved in the output.
pub fn aggregate_at(
    records: &[RepositoryRecord],
    summaries: &[AnalysisSummary],
    now: DateTime<Utc>,
) -> (Vec<FinalRecord>, AggregateReport) {
    let by_name: HashMap<&str, &AnalysisSummary> = summaries
        .iter()
        .map(|s| (s.full_name.as_str(), s))
        .collect();
    let record_names: HashSet<&str> = records.iter().map(|r| r.full_name.as_str()).collect();

    let mut rows = Vec::new();
    let mut report = AggregateReport::default();

    for record in records {
        match by_name.get(record.full_name.as_str()) {
            Some(summary) => rows.push(merge_row(record, summary, now)),
            None => report.metadata_dropped += 1,
        }
    }
    report.summaries_dropped = summaries
        .iter()
        .filter(|s| !record_names.contains(s.full_name.as_str()))
        .count();
    report.rows = rows.len();

    info!(
        rows = report.rows,
        metadata_dropped = report.metadata_dropped,
        summaries_dropped = report.summaries_dropped,
        "Merged metadata with analysis summaries"
    );

    (rows, report)
}

fn merge_row(record: &RepositoryRecord, summary: &AnalysisSummary, now: DateTime<Utc>) -> FinalRecord {
    let age_days = (now - record.created_at).num_days() as f64;
    let closed_issues_pct = if record.total_issues == 0 {
        NO_ISSUES_CLOSED_PCT
    } else {
        round2(record.closed_issues as f64 / record.total_issues as f64 * 100.0)
    };

    FinalRecord {
        full_name: record.full_name.clone(),
        stars: record.stars,
        age_years: round2(age_days / DAYS_PER_YEAR),
        primary_language: record.primary_language.clone(),
        releases: record.releases,
        merged_pull_requests: record.merged_pull_requests,
        total_issues: record.total_issues,
        closed_issues_pct,
        cbo_median: summary.cbo_median,
        cbo_mean: summary.cbo_mean,
        cbo_stddev: summary.cbo_stddev,
        dit_median: summary.dit_median,
        dit_mean: summary.dit_mean,
        dit_stddev: summary.dit_stddev,
        lcom_median: summary.lcom_median,
        lcom_mean: summary.lcom_mean,
        lcom_stddev: summary.lcom_stddev,
        loc_total: summary.loc_total,
        classes: summary.classes,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write the merged dataset in one pass, header first
pub fn write_dataset(path: &Path, rows: &[FinalRecord]) -> HarvestResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(rows = rows.len(), path = %path.display(), "Dataset written");
    Ok(())
}
