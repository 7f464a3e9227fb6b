//! Metadata collection loop
//!
//! Pages the search client into a durable snapshot until the target count is
//! reached or the server runs out of results. The snapshot is persisted after
//! every consumed page, so a crash costs at most one page of work and a rerun
//! picks up from the stored cursor.

use harvest_core::{
    CollectionState, HarvestConfig, HarvestResult, RepositorySearch, SearchPage, SnapshotStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Collect repository metadata until the configured target count is reached.
///
/// Resumes from whatever the store already holds. Pages that overrun the
/// target are truncated so the final set never overshoots, and duplicate
/// identifiers from overlapping pages are dropped on append. The interrupt
/// flag is observed between pages only; every fully consumed page is already
/// persisted by then.
pub async fn collect_metadata(
    client: &dyn RepositorySearch,
    store: &dyn SnapshotStore,
    config: &HarvestConfig,
    interrupt: &AtomicBool,
) -> HarvestResult<CollectionState> {
    let target = config.github.target_count;
    let mut state = store.load()?;

    if !state.is_empty() {
        info!(
            collected = state.len(),
            cursor = ?state.cursor,
            "Resuming collection from snapshot"
        );
    }

    while state.len() < target {
        if interrupt.load(Ordering::Relaxed) {
            warn!("Interrupt requested; the snapshot holds every fully consumed page");
            break;
        }

        let SearchPage {
            mut items,
            next_cursor,
            has_more,
        } = client
            .fetch_page(state.cursor.as_deref(), config.github.page_size)
            .await?;

        if items.is_empty() {
            info!(collected = state.len(), "Search returned no more results");
            break;
        }

        let remaining = target - state.len();
        if items.len() > remaining {
            items.truncate(remaining);
        }
        let added = state.append(items);
        state.cursor = next_cursor;
        store.snapshot(&state)?;

        // Target reached means done, whatever the server still has
        let more = has_more && state.len() < target;
        debug!(
            added,
            collected = state.len(),
            target,
            more,
            "Page folded into the snapshot"
        );

        if !more {
            break;
        }
        if config.github.page_delay_ms > 0 {
            sleep(Duration::from_millis(config.github.page_delay_ms)).await;
        }
    }

    info!(collected = state.len(), target, "Collection finished");
    Ok(state)
}
