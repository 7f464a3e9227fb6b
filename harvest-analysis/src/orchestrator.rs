//! Sequential job loop over acquisition, analysis and summarizing

use crate::acquire::{GitAcquirer, SourceAcquirer};
use crate::cleanup::force_remove_dir_all;
use crate::source_root::find_source_root;
use crate::summary::summarize_class_report;
use crate::tool::{AnalysisTool, CkTool, ToolOutcome};
use harvest_core::{
    AnalysisConfig, AnalysisJob, AnalysisSummary, HarvestResult, JobOutcome, JobStatus, RunReport,
    SummarySink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Drives analysis jobs one at a time over a single exclusive working slot
pub struct AnalysisRunner {
    acquirer: Arc<dyn SourceAcquirer>,
    tool: Arc<dyn AnalysisTool>,
    config: AnalysisConfig,
}

impl AnalysisRunner {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self::with_components(
            config,
            Arc::new(GitAcquirer::new(config)),
            Arc::new(CkTool::new(config)),
        )
    }

    /// Construction seam for tests and alternative acquirers or tools
    pub fn with_components(
        config: &AnalysisConfig,
        acquirer: Arc<dyn SourceAcquirer>,
        tool: Arc<dyn AnalysisTool>,
    ) -> Self {
        Self {
            acquirer,
            tool,
            config: config.clone(),
        }
    }

    /// Run every job in order, isolating per-job failures.
    ///
    /// Identifiers the sink already holds are skipped, so a rerun never
    /// writes a second row for the same repository. The interrupt flag is
    /// observed between jobs only: the in-flight job always finishes its
    /// cleanup before the loop stops.
    pub async fn run_all(
        &self,
        identifiers: &[String],
        sink: &dyn SummarySink,
        interrupt: &AtomicBool,
    ) -> HarvestResult<RunReport> {
        let already = sink.existing_identifiers()?;
        let mut report = RunReport {
            total: identifiers.len(),
            ..Default::default()
        };

        info!(
            jobs = identifiers.len(),
            already_summarized = already.len(),
            "Starting analysis run"
        );

        for (index, full_name) in identifiers.iter().enumerate() {
            if interrupt.load(Ordering::Relaxed) {
                warn!("Interrupt requested; stopping before the next job");
                report.interrupted = true;
                break;
            }
            if already.contains(full_name) {
                debug!(repo = %full_name, "Already summarized; skipping");
                report.skipped += 1;
                continue;
            }

            info!(
                repo = %full_name,
                position = index + 1,
                total = identifiers.len(),
                "Processing repository"
            );

            match self.run_job(full_name).await {
                JobOutcome::Done(summary) => {
                    let degraded = summary.is_degraded();
                    if degraded {
                        warn!(repo = %full_name, "Job finished without analyzable output");
                    }
                    sink.append(&summary)?;
                    report.record_done(degraded);
                }
                JobOutcome::Failed(error) => {
                    warn!(
                        repo = %full_name,
                        error = %error,
                        "Job failed; continuing with the next repository"
                    );
                    report.record_failure(full_name, &error.to_string());
                }
            }

            if self.config.job_delay_ms > 0 && index + 1 < identifiers.len() {
                sleep(Duration::from_millis(self.config.job_delay_ms)).await;
            }
        }

        info!(outcome = %report.summary(), "Analysis run finished");
        Ok(report)
    }

    /// Execute one job through its full state machine.
    ///
    /// Cleanup of the working slot always runs, whatever the outcome; a
    /// failed cleanup is reported and the result stands.
    pub async fn run_job(&self, full_name: &str) -> JobOutcome {
        let mut job = AnalysisJob::new(full_name);
        let result = self.execute(&mut job).await;
        self.cleanup_job_state(full_name);

        match result {
            Ok(summary) => {
                job.advance(JobStatus::Done);
                JobOutcome::Done(summary)
            }
            Err(error) => {
                job.mark_failed(&error.to_string());
                JobOutcome::Failed(error)
            }
        }
    }

    async fn execute(&self, job: &mut AnalysisJob) -> HarvestResult<AnalysisSummary> {
        let slot = self.config.clone_slot();

        job.advance(JobStatus::Acquiring);
        // Stale state from a crashed run goes before any work, not just after
        force_remove_dir_all(&slot)?;
        self.acquirer.acquire(&job.full_name, &slot).await?;

        job.advance(JobStatus::Analyzing);
        let source_root = match find_source_root(
            &slot,
            &self.config.source_language_ext,
            &self.config.conventional_source_dir,
        ) {
            Some(path) => path,
            None => {
                info!(repo = %job.full_name, "No source files found; recording a degraded summary");
                job.advance(JobStatus::Summarizing);
                return Ok(AnalysisSummary::degraded(&job.full_name));
            }
        };
        let outcome = self
            .tool
            .analyze(&job.full_name, &source_root, &self.config.tool_output_dir())
            .await?;

        job.advance(JobStatus::Summarizing);
        match outcome {
            ToolOutcome::Report(report) => summarize_class_report(&job.full_name, &report),
            ToolOutcome::NoOutput => Ok(AnalysisSummary::degraded(&job.full_name)),
        }
    }

    fn cleanup_job_state(&self, full_name: &str) {
        for path in [self.config.clone_slot(), self.config.tool_output_dir()] {
            if let Err(error) = force_remove_dir_all(&path) {
                warn!(
                    repo = %full_name,
                    path = %path.display(),
                    error = %error,
                    "Cleanup failed; directory left for manual removal"
                );
            }
        }
    }
}

/// Read repository identifiers from a list file: one `owner/name` per line,
/// or the first column of a CSV. Header lines and anything that does not
/// look like an identifier are skipped.
pub fn read_identifier_list(path: &std::path::Path) -> HarvestResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let mut identifiers = Vec::new();
    for line in content.lines() {
        let first = line
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');
        if first.is_empty() || !first.contains('/') {
            continue;
        }
        identifiers.push(first.to_string());
    }
    debug!(
        path = %path.display(),
        identifiers = identifiers.len(),
        "Identifier list loaded"
    );
    Ok(identifiers)
}
