//! Metadata snapshot persistence
//!
//! The collection state is written in two forms after every page: a tabular
//! snapshot that downstream tooling reads directly, and a structured snapshot
//! that also carries the resume cursor. Loading prefers the tabular form and
//! recovers the cursor from the structured one when it exists.

use harvest_core::{
    CollectionState, ErrorContext, HarvestError, HarvestResult, RepositoryRecord, SnapshotStore,
    StorageConfig,
};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// File-backed store for the collection loop's snapshot
pub struct MetadataStore {
    csv_path: PathBuf,
    json_path: PathBuf,
}

impl MetadataStore {
    /// Open the store, creating the data directory if needed
    pub fn new(config: &StorageConfig) -> HarvestResult<Self> {
        fs::create_dir_all(&config.data_dir).map_err(|e| HarvestError::Storage {
            message: format!(
                "Failed to create data directory {}: {}",
                config.data_dir.display(),
                e
            ),
            source: Some(Box::new(e)),
            context: ErrorContext::new("metadata_store")
                .with_operation("new")
                .with_suggestion("Check permissions on the data directory"),
        })?;
        Ok(Self {
            csv_path: config.metadata_csv_path(),
            json_path: config.metadata_json_path(),
        })
    }

    fn load_csv_records(&self) -> HarvestResult<Vec<RepositoryRecord>> {
        let mut reader = csv::Reader::from_path(&self.csv_path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    fn load_json_snapshot(&self) -> HarvestResult<CollectionState> {
        let content = fs::read_to_string(&self.json_path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SnapshotStore for MetadataStore {
    fn load(&self) -> HarvestResult<CollectionState> {
        let mut state = if self.csv_path.exists() {
            let records = self.load_csv_records()?;
            // The cursor only lives in the structured snapshot
            let cursor = if self.json_path.exists() {
                match self.load_json_snapshot() {
                    Ok(snapshot) => snapshot.cursor,
                    Err(e) => {
                        warn!(
                            error = %e,
                            "Structured snapshot unreadable; resuming without a cursor"
                        );
                        None
                    }
                }
            } else {
                None
            };
            CollectionState { cursor, records }
        } else if self.json_path.exists() {
            self.load_json_snapshot()?
        } else {
            debug!("No snapshot on disk; starting an empty collection");
            return Ok(CollectionState::default());
        };

        let before = state.len();
        state.dedup_by_identifier();
        if state.len() < before {
            warn!(
                dropped = before - state.len(),
                "Dropped duplicate identifiers while loading the snapshot"
            );
        }
        info!(
            records = state.len(),
            cursor = ?state.cursor,
            "Loaded collection snapshot"
        );
        Ok(state)
    }

    fn snapshot(&self, state: &CollectionState) -> HarvestResult<()> {
        // Temp file plus rename, so a crash mid-write never tears a snapshot
        let tmp = self.csv_path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            for record in &state.records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.csv_path)?;

        let tmp = self.json_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &self.json_path)?;

        debug!(records = state.len(), "Snapshot written");
        Ok(())
    }
}
