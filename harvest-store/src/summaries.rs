//! Per-job summary table
//!
//! One row per completed analysis job, appended as soon as the job finishes
//! so progress survives crashes between jobs. The table never holds two rows
//! for the same repository; reruns skip identifiers already present.

use harvest_core::{
    AnalysisSummary, ErrorContext, HarvestError, HarvestResult, StorageConfig, SummarySink,
};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Append-only store for analysis summaries
pub struct SummaryStore {
    path: PathBuf,
}

impl SummaryStore {
    /// Open the store, creating the data directory if needed
    pub fn new(config: &StorageConfig) -> HarvestResult<Self> {
        fs::create_dir_all(&config.data_dir).map_err(|e| HarvestError::Storage {
            message: format!(
                "Failed to create data directory {}: {}",
                config.data_dir.display(),
                e
            ),
            source: Some(Box::new(e)),
            context: ErrorContext::new("summary_store").with_operation("new"),
        })?;
        Ok(Self {
            path: config.summaries_csv_path(),
        })
    }

    /// All summary rows written so far; empty when no run has happened yet
    pub fn load(&self) -> HarvestResult<Vec<AnalysisSummary>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut summaries = Vec::new();
        for row in reader.deserialize() {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

impl SummarySink for SummaryStore {
    fn existing_identifiers(&self) -> HarvestResult<HashSet<String>> {
        Ok(self.load()?.into_iter().map(|s| s.full_name).collect())
    }

    fn append(&self, summary: &AnalysisSummary) -> HarvestResult<()> {
        if self.existing_identifiers()?.contains(&summary.full_name) {
            debug!(
                repo = %summary.full_name,
                "Summary row already present; not writing a duplicate"
            );
            return Ok(());
        }

        // The header goes out exactly once, when the file is first created
        let write_header = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len() == 0,
            Err(_) => true,
        };
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(summary)?;
        writer.flush()?;

        info!(repo = %summary.full_name, "Summary row appended");
        Ok(())
    }
}
