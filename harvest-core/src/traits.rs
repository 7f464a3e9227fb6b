//! Core trait definitions

use crate::error::HarvestResult;
use crate::types::{AnalysisSummary, CollectionState, RepositoryRecord};
use async_trait::async_trait;
use std::collections::HashSet;

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<RepositoryRecord>,
    /// Continuation token for the page after this one
    pub next_cursor: Option<String>,
    /// Whether the server reports more pages beyond this one
    pub has_more: bool,
}

impl SearchPage {
    /// An exhausted result: no items, no continuation
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Paged repository search
///
/// Implementations own the rate-limit policy: a rate-limited attempt is slept
/// on and the same page re-requested internally, so callers only ever see a
/// page, an exhausted transient error, or a fatal error.
#[async_trait]
pub trait RepositorySearch: Send + Sync {
    /// Fetch one page of results starting at `cursor` (None = first page)
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> HarvestResult<SearchPage>;
}

/// Durable snapshot storage for the metadata collection loop
///
/// `load` returns an empty state when no snapshot exists and deduplicates by
/// identifier; `snapshot` persists the full state and is called after every
/// consumed page.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> HarvestResult<CollectionState>;
    fn snapshot(&self, state: &CollectionState) -> HarvestResult<()>;
}

/// Durable per-job output for the analysis loop
///
/// `append` is called right after each job completes so progress survives a
/// crash between jobs. Implementations must never hold two rows for the same
/// identifier; re-appending an identifier is a no-op.
pub trait SummarySink: Send + Sync {
    /// Identifiers a previous run already summarized
    fn existing_identifiers(&self) -> HarvestResult<HashSet<String>>;
    /// Durably append one summary row
    fn append(&self, summary: &AnalysisSummary) -> HarvestResult<()>;
}
