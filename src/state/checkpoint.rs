//! Per-collection checkpoints
//!
//! A checkpoint records which repositories of one organization have been
//! durably written, the cursor of the next page to fetch, and whether the
//! organization finished. It is the only thing that decides, after a crash,
//! what is safe to skip.

use crate::state::layout::{normalize_collection_id, StateLayout};
use crate::state::store::{read_json, remove_if_exists, write_json_atomic};
use crate::state::{StateError, StateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Current checkpoint file schema version
///
/// Version 0 files predate the field; they are migrated on load.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Insertion-ordered set of processed item ids
///
/// Serialized as a plain JSON array. Duplicates in a loaded file are dropped,
/// keeping the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct ProcessedItems {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl ProcessedItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id; returns false if it was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates ids in the order they were first recorded
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl PartialEq for ProcessedItems {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl FromIterator<String> for ProcessedItems {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut items = Self::new();
        for id in iter {
            items.insert(id);
        }
        items
    }
}

impl Serialize for ProcessedItems {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.order)
    }
}

impl<'de> Deserialize<'de> for ProcessedItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<String>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

/// Persisted progress for one organization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionCheckpoint {
    pub schema_version: u32,
    pub collection_id: String,
    pub completed_successfully: bool,
    pub output_artifact_ref: Option<String>,
    /// Cursor of the next page to fetch
    pub current_cursor: Option<String>,
    /// End cursor of the last page whose items were all written
    pub last_successful_cursor: Option<String>,
    pub last_processed_item: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub processed_items: ProcessedItems,
}

impl CollectionCheckpoint {
    /// Creates an empty checkpoint for an organization
    pub fn new(collection_id: &str) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            collection_id: normalize_collection_id(collection_id),
            ..Self::default()
        }
    }

    /// True if a prior run finished without recording anything
    fn is_empty_completed_run(&self) -> bool {
        self.completed_successfully && self.processed_items.is_empty()
    }
}

/// Fields to change in a checkpoint; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointUpdate {
    pub item_id: Option<String>,
    pub new_cursor: Option<String>,
    pub last_successful_cursor: Option<String>,
}

impl CheckpointUpdate {
    /// Records one durably written item
    pub fn item(id: impl Into<String>) -> Self {
        Self {
            item_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Records that every item of a page was written
    pub fn page_completed(end_cursor: impl Into<String>) -> Self {
        let cursor = end_cursor.into();
        Self {
            new_cursor: Some(cursor.clone()),
            last_successful_cursor: Some(cursor),
            ..Self::default()
        }
    }
}

/// Result of `CheckpointStore::initialize`
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInit {
    pub state: CollectionCheckpoint,
    pub did_resume: bool,
}

/// Reads and writes the checkpoint file of one organization
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    collection_id: String,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, collection_id: &str) -> Self {
        Self {
            path: path.into(),
            collection_id: normalize_collection_id(collection_id),
        }
    }

    /// Creates the store at the layout's path for this organization
    pub fn for_collection(layout: &StateLayout, collection_id: &str) -> Self {
        Self::new(layout.checkpoint_path(collection_id), collection_id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Decides whether to resume from the file on disk or start fresh
    ///
    /// Never fails: a missing, unreadable, corrupt or foreign file degrades to a
    /// fresh checkpoint with a warning. Only unfinished checkpoints are
    /// resumed, and only when `resume_requested` is set.
    pub fn initialize(&self, resume_requested: bool, force_fresh: bool) -> CheckpointInit {
        let fresh = CheckpointInit {
            state: CollectionCheckpoint::new(&self.collection_id),
            did_resume: false,
        };

        if force_fresh {
            tracing::info!(org = %self.collection_id, "Forced fresh start, ignoring any checkpoint");
            return fresh;
        }

        let loaded = match self.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No checkpoint found");
                return fresh;
            }
            Err(e) => {
                tracing::warn!("Ignoring unusable checkpoint, starting fresh: {}", e);
                return fresh;
            }
        };

        if loaded.is_empty_completed_run() {
            tracing::info!(
                org = %self.collection_id,
                "Previous run completed with no items, nothing to resume"
            );
            return fresh;
        }

        if loaded.completed_successfully {
            tracing::info!(
                org = %self.collection_id,
                items = loaded.processed_items.len(),
                "Previous run already completed, starting fresh"
            );
            return fresh;
        }

        if !resume_requested {
            tracing::info!(
                org = %self.collection_id,
                items = loaded.processed_items.len(),
                path = %self.path.display(),
                "Checkpoint exists but resume was not requested, starting fresh"
            );
            return fresh;
        }

        tracing::info!(
            org = %self.collection_id,
            items = loaded.processed_items.len(),
            cursor = loaded.current_cursor.as_deref().unwrap_or("<start>"),
            "Resuming from checkpoint"
        );
        CheckpointInit {
            state: loaded,
            did_resume: true,
        }
    }

    /// Loads and migrates the checkpoint file
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No file, or a foreign file that belongs to another organization
    /// * `Ok(Some(state))` - A usable checkpoint
    /// * `Err(StateError)` - Unreadable, malformed, or written by a newer version
    pub fn load(&self) -> StateResult<Option<CollectionCheckpoint>> {
        let Some(state) = read_json::<CollectionCheckpoint>(&self.path)? else {
            return Ok(None);
        };

        if state.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Err(StateError::UnsupportedVersion {
                path: self.path.clone(),
                found: state.schema_version,
                supported: CHECKPOINT_SCHEMA_VERSION,
            });
        }

        let owner = normalize_collection_id(&state.collection_id);
        if !owner.is_empty() && owner != self.collection_id {
            tracing::warn!(
                path = %self.path.display(),
                expected = %self.collection_id,
                found = %owner,
                "Checkpoint belongs to another organization, ignoring it"
            );
            return Ok(None);
        }

        Ok(Some(self.migrate(state)))
    }

    /// Brings a loaded checkpoint up to the current schema
    fn migrate(&self, mut state: CollectionCheckpoint) -> CollectionCheckpoint {
        if state.schema_version < CHECKPOINT_SCHEMA_VERSION {
            tracing::debug!(
                from = state.schema_version,
                to = CHECKPOINT_SCHEMA_VERSION,
                "Migrating legacy checkpoint"
            );
            state.schema_version = CHECKPOINT_SCHEMA_VERSION;
        }
        state.collection_id = self.collection_id.clone();

        let dangling = state
            .last_processed_item
            .as_deref()
            .is_some_and(|id| !state.processed_items.contains(id));
        if dangling {
            state.last_processed_item = None;
        }

        state
    }

    /// Applies an update and persists the full state
    ///
    /// Recording an item that is already present does not grow the set.
    pub fn update(&self, state: &mut CollectionCheckpoint, update: CheckpointUpdate) -> StateResult<()> {
        if let Some(cursor) = update.new_cursor {
            if state.current_cursor.as_deref() != Some(cursor.as_str()) {
                state.current_cursor = Some(cursor);
            }
        }

        if let Some(cursor) = update.last_successful_cursor {
            state.last_successful_cursor = Some(cursor);
        }

        if let Some(id) = update.item_id {
            state.processed_items.insert(id.clone());
            state.last_processed_item = Some(id);
        }

        state.last_updated = Some(Utc::now());
        self.save(state)
    }

    /// Records the output file that rows of this organization go to
    pub fn set_output_artifact(&self, state: &mut CollectionCheckpoint, path: &Path) -> StateResult<()> {
        state.output_artifact_ref = Some(path.display().to_string());
        state.last_updated = Some(Utc::now());
        self.save(state)
    }

    /// Marks the organization as fully written
    pub fn complete(&self, state: &mut CollectionCheckpoint) -> StateResult<()> {
        state.completed_successfully = true;
        state.last_updated = Some(Utc::now());
        self.save(state)
    }

    /// Writes the state as-is
    pub fn save(&self, state: &CollectionCheckpoint) -> StateResult<()> {
        write_json_atomic(&self.path, state)
    }

    /// Deletes the checkpoint file; a missing file is not an error
    pub fn cleanup(&self) -> StateResult<()> {
        if remove_if_exists(&self.path)? {
            tracing::debug!(path = %self.path.display(), "Removed checkpoint");
        }
        Ok(())
    }
}
