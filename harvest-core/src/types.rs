//! Core data type definitions

use crate::async_utils::RetryConfig;
use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Metadata for one repository as returned by the search API
///
/// Immutable once collected; a re-fetch replaces the whole record. The
/// `full_name` (`owner/name`) is the identifier every later stage joins on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub full_name: String,
    pub stars: u64,
    pub created_at: DateTime<Utc>,
    pub pushed_at: DateTime<Utc>,
    pub primary_language: Option<String>,
    /// Release count; None when the fact could not be determined
    pub releases: Option<u64>,
    pub merged_pull_requests: u64,
    pub total_issues: u64,
    pub closed_issues: u64,
}

/// Progress of the metadata collection loop
///
/// Invariants: no two records share a `full_name`; the cursor always points
/// past the last fully consumed page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionState {
    pub cursor: Option<String>,
    pub records: Vec<RepositoryRecord>,
}

impl CollectionState {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.records.iter().any(|r| r.full_name == full_name)
    }

    /// Append records, skipping identifiers already present. Re-adding an
    /// existing identifier is a no-op, so overlapping pages after a resume
    /// cannot corrupt the set. Returns how many records were actually added.
    pub fn append(&mut self, items: Vec<RepositoryRecord>) -> usize {
        let mut seen: HashSet<String> = self
            .records
            .iter()
            .map(|r| r.full_name.clone())
            .collect();

        let mut added = 0;
        for record in items {
            if seen.insert(record.full_name.clone()) {
                self.records.push(record);
                added += 1;
            }
        }
        added
    }

    /// Drop duplicate identifiers, keeping the first occurrence. Snapshots
    /// written partially twice load back clean through this.
    pub fn dedup_by_identifier(&mut self) {
        let mut seen = HashSet::new();
        self.records.retain(|r| seen.insert(r.full_name.clone()));
    }
}

/// Lifecycle of one analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Acquiring,
    Analyzing,
    Summarizing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Acquiring => "acquiring",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Summarizing => "summarizing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One analysis job: a repository identifier plus its current status.
/// Exactly one job owns the working slot at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub full_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    /// Failure reason once the job has transitioned to `Failed`
    pub error: Option<String>,
}

impl AnalysisJob {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            error: None,
        }
    }

    pub fn advance(&mut self, status: JobStatus) {
        tracing::debug!(
            repo = %self.full_name,
            from = %self.status,
            to = %status,
            "Job status transition"
        );
        self.status = status;
    }

    pub fn mark_failed(&mut self, reason: &str) {
        self.error = Some(reason.to_string());
        self.advance(JobStatus::Failed);
    }
}

/// Aggregate metrics for one analyzed repository
///
/// All metric fields are None when the job completed with no analyzable
/// output (degraded), which is distinct from a failed job: failed jobs never
/// produce a summary at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub full_name: String,
    pub cbo_median: Option<f64>,
    pub cbo_mean: Option<f64>,
    pub cbo_stddev: Option<f64>,
    pub dit_median: Option<f64>,
    pub dit_mean: Option<f64>,
    pub dit_stddev: Option<f64>,
    pub lcom_median: Option<f64>,
    pub lcom_mean: Option<f64>,
    pub lcom_stddev: Option<f64>,
    pub loc_total: Option<u64>,
    /// Number of classes the tool reported on
    pub classes: Option<u64>,
}

impl AnalysisSummary {
    /// Summary for a job that found no analyzable code
    pub fn degraded(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            cbo_median: None,
            cbo_mean: None,
            cbo_stddev: None,
            dit_median: None,
            dit_mean: None,
            dit_stddev: None,
            lcom_median: None,
            lcom_mean: None,
            lcom_stddev: None,
            loc_total: None,
            classes: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.cbo_median.is_none()
    }
}

/// Terminal result of one analysis job
#[derive(Debug)]
pub enum JobOutcome {
    /// Job ran to completion; the summary may still be degraded
    Done(AnalysisSummary),
    /// Acquisition or tool execution broke; no summary exists
    Failed(HarvestError),
}

/// One row of the final merged dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub full_name: String,
    pub stars: u64,
    /// Age in years at aggregation time, derived from `created_at`
    pub age_years: f64,
    pub primary_language: Option<String>,
    pub releases: Option<u64>,
    pub merged_pull_requests: u64,
    pub total_issues: u64,
    /// Percentage of issues closed; 100.0 when the repository has no issues
    pub closed_issues_pct: f64,
    pub cbo_median: Option<f64>,
    pub cbo_mean: Option<f64>,
    pub cbo_stddev: Option<f64>,
    pub dit_median: Option<f64>,
    pub dit_mean: Option<f64>,
    pub dit_stddev: Option<f64>,
    pub lcom_median: Option<f64>,
    pub lcom_mean: Option<f64>,
    pub lcom_stddev: Option<f64>,
    pub loc_total: Option<u64>,
    pub classes: Option<u64>,
}

/// Reason a job ended up failed, kept for the end-of-run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub full_name: String,
    pub reason: String,
}

/// Outcome counts for one analysis run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    /// Jobs that completed DONE but with null metrics
    pub degraded: usize,
    /// Identifiers skipped because a previous run already summarized them
    pub skipped: usize,
    pub interrupted: bool,
    pub failures: Vec<JobFailure>,
}

impl RunReport {
    pub fn record_done(&mut self, degraded: bool) {
        self.done += 1;
        if degraded {
            self.degraded += 1;
        }
    }

    pub fn record_failure(&mut self, full_name: &str, reason: &str) {
        self.failed += 1;
        self.failures.push(JobFailure {
            full_name: full_name.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} jobs: {} done ({} degraded), {} failed, {} skipped",
            self.total, self.done, self.degraded, self.failed, self.skipped
        );
        if self.interrupted {
            line.push_str(" [interrupted]");
        }
        line
    }
}

/// Top-level configuration, constructed once at startup and passed by
/// reference into every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub github: GithubConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub retry: RetryConfig,
}

/// Search API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// GraphQL endpoint URL
    pub api_url: String,
    /// Search query expression, e.g. "language:java sort:stars-desc"
    pub search_query: String,
    /// Total number of repositories to collect
    pub target_count: usize,
    /// Records requested per page
    pub page_size: u32,
    /// Pacing delay between page requests
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

/// On-disk dataset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Tabular metadata snapshot, preferred on load
    pub metadata_csv: String,
    /// Structured metadata snapshot (also carries the cursor)
    pub metadata_json: String,
    /// Per-job analysis summary table
    pub summaries_csv: String,
    /// Final merged dataset
    pub dataset_csv: String,
}

impl StorageConfig {
    pub fn metadata_csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_csv)
    }

    pub fn metadata_json_path(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_json)
    }

    pub fn summaries_csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.summaries_csv)
    }

    pub fn dataset_csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.dataset_csv)
    }
}

/// Acquisition and analysis-tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Exclusive working directory for the in-flight job
    pub work_dir: PathBuf,
    /// Base URL clone URLs are built from
    pub clone_base_url: String,
    pub clone_timeout_secs: u64,
    pub java_command: String,
    /// Path to the CK analysis jar
    pub ck_jar: PathBuf,
    /// CK positional flag: look inside jar dependencies
    pub use_jars: bool,
    /// CK positional flag: max files per partition (0 = automatic)
    pub max_files_per_partition: u32,
    /// CK positional flag: include variable/field-level metrics
    pub variables_and_fields: bool,
    pub tool_timeout_secs: u64,
    /// Pacing delay between jobs (0 disables)
    pub job_delay_ms: u64,
    /// File extension of the language under analysis, without the dot
    pub source_language_ext: String,
    /// Conventional source layout suffix preferred during root detection
    pub conventional_source_dir: String,
}

impl AnalysisConfig {
    /// Working slot the current job clones into
    pub fn clone_slot(&self) -> PathBuf {
        self.work_dir.join("clone")
    }

    /// Directory the analysis tool writes its output files into
    pub fn tool_output_dir(&self) -> PathBuf {
        self.work_dir.join("tool-output")
    }
}
