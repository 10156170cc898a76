//! One attempt at harvesting an organization
//!
//! An attempt streams repositories from the checkpoint's cursor, appends the
//! rows not yet recorded, and checkpoints each row right after the sink
//! accepts it. Page cursors are checkpointed once every row of the page is
//! durable, so a retry or a later run re-fetches at most one page.

use crate::source::{collection_items, DataSource};
use crate::output::RecordSink;
use crate::state::{CheckpointStore, CheckpointUpdate, CollectionCheckpoint};
use crate::HarvestError;
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything an attempt needs, owned so each attempt is a fresh future
#[derive(Clone)]
pub(crate) struct HarvestJob {
    pub source: Arc<dyn DataSource>,
    pub sink: Arc<dyn RecordSink>,
    pub store: CheckpointStore,
    /// Shared with the retry callback, which saves it between attempts
    pub progress: Arc<Mutex<CollectionCheckpoint>>,
    pub collection: String,
    pub page_size: u32,
    pub output: PathBuf,
}

/// Counts for one successful attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HarvestStats {
    pub written: u64,
    /// Already in the checkpoint, not written again
    pub skipped: u64,
}

pub(crate) fn lock(progress: &Mutex<CollectionCheckpoint>) -> MutexGuard<'_, CollectionCheckpoint> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streams, writes and checkpoints every remaining repository
pub(crate) async fn harvest_collection(job: HarvestJob) -> Result<HarvestStats, HarvestError> {
    let start_cursor = lock(&job.progress).current_cursor.clone();
    tracing::debug!(
        cursor = start_cursor.as_deref().unwrap_or("<start>"),
        "Starting attempt"
    );

    let mut items = collection_items(job.source.as_ref(), &job.collection, job.page_size, start_cursor);
    let mut stats = HarvestStats::default();

    while let Some(item) = items.try_next().await? {
        let id = item.record.item_id();
        let already_recorded = lock(&job.progress).processed_items.contains(&id);

        if already_recorded {
            tracing::trace!(item = %id, "Already recorded, skipping");
            stats.skipped += 1;
        } else {
            job.sink.append_record(&job.output, &item.record.csv_row())?;
            let mut state = lock(&job.progress);
            job.store.update(&mut state, CheckpointUpdate::item(id))?;
            stats.written += 1;
        }

        if item.last_in_page {
            if let Some(cursor) = item.page_info.end_cursor {
                let mut state = lock(&job.progress);
                job.store.update(&mut state, CheckpointUpdate::page_completed(cursor))?;
                tracing::debug!(items = state.processed_items.len(), "Page recorded");
            }
        }
    }

    Ok(stats)
}
