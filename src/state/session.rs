//! Multi-organization sessions
//!
//! A session tracks a run over an ordered list of organizations so that an
//! interrupted run can pick up at the first organization that has not reached
//! a terminal status. The resume pointer (`current_index`) is never set
//! directly: it advances as a side effect of a status transition into
//! `completed` or `failed`, which keeps pointer and statuses in step.

use crate::state::layout::{normalize_collection_id, StateLayout};
use crate::state::status::CollectionStatus;
use crate::state::store::{read_json, remove_if_exists, write_json_atomic};
use crate::state::{StateError, StateResult};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current session file schema version
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Run-level settings stored with the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// Pause between organizations (seconds)
    pub delay_between_collections: u64,
    pub continue_on_error: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            delay_between_collections: 5,
            continue_on_error: false,
        }
    }
}

/// Session bookkeeping for one organization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrgReference {
    pub checkpoint_file_ref: String,
    pub status: CollectionStatus,
    pub output_artifact_ref: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub items_processed_count: u64,
    pub last_error: Option<String>,
}

impl OrgReference {
    fn pending(checkpoint_path: &Path) -> Self {
        Self {
            checkpoint_file_ref: checkpoint_path.display().to_string(),
            ..Self::default()
        }
    }

    fn apply(&mut self, update: OrgReferenceUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(output) = update.output_artifact_ref {
            self.output_artifact_ref = Some(output);
        }
        if let Some(start) = update.start_time {
            self.start_time = Some(start);
        }
        if let Some(end) = update.end_time {
            self.end_time = Some(end);
        }
        if let Some(count) = update.items_processed_count {
            self.items_processed_count = count;
        }
        if let Some(error) = update.last_error {
            self.last_error = Some(error);
        }
    }
}

/// Partial update merged into an `OrgReference`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgReferenceUpdate {
    pub status: Option<CollectionStatus>,
    pub output_artifact_ref: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub items_processed_count: Option<u64>,
    pub last_error: Option<String>,
}

impl OrgReferenceUpdate {
    /// Only changes the status
    pub fn status(status: CollectionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Marks the organization in progress
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(CollectionStatus::InProgress),
            start_time: Some(at),
            ..Self::default()
        }
    }

    /// Marks the organization completed
    pub fn completed(at: DateTime<Utc>, items: u64) -> Self {
        Self {
            status: Some(CollectionStatus::Completed),
            end_time: Some(at),
            items_processed_count: Some(items),
            ..Self::default()
        }
    }

    /// Marks the organization failed with the given error
    pub fn failed(at: DateTime<Utc>, items: u64, error: impl Into<String>) -> Self {
        Self {
            status: Some(CollectionStatus::Failed),
            end_time: Some(at),
            items_processed_count: Some(items),
            last_error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, path: &Path) -> Self {
        self.output_artifact_ref = Some(path.display().to_string());
        self
    }
}

/// Persisted state of a multi-organization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub schema_version: u32,
    pub session_id: String,
    pub collection_list: Vec<String>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub settings: SessionSettings,
    #[serde(default)]
    pub collection_references: BTreeMap<String, OrgReference>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionState {
    fn new(collection_list: Vec<String>, settings: SessionSettings, layout: &StateLayout) -> Self {
        let collection_references = collection_list
            .iter()
            .map(|id| (id.clone(), OrgReference::pending(&layout.checkpoint_path(id))))
            .collect();

        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            session_id: new_session_id(&collection_list),
            collection_list,
            current_index: 0,
            settings,
            collection_references,
            last_updated: Some(Utc::now()),
        }
    }

    /// True once every organization reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.collection_list.len()
    }

    fn migrate(mut self) -> Self {
        if self.schema_version < SESSION_SCHEMA_VERSION {
            tracing::debug!(
                from = self.schema_version,
                to = SESSION_SCHEMA_VERSION,
                "Migrating legacy session"
            );
            self.schema_version = SESSION_SCHEMA_VERSION;
        }
        self.collection_list = normalize_collection_list(&self.collection_list);
        self.current_index = self.current_index.min(self.collection_list.len());

        // Keys written before ids were normalized may collide; keep the furthest along
        let references = std::mem::take(&mut self.collection_references);
        for (id, reference) in references {
            let key = normalize_collection_id(&id);
            if key.is_empty() {
                continue;
            }
            match self.collection_references.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(reference);
                }
                Entry::Occupied(mut slot) => {
                    if progress_rank(reference.status) > progress_rank(slot.get().status) {
                        slot.insert(reference);
                    }
                }
            }
        }
        self
    }
}

/// Counts of organizations by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Result of `SessionSequencer::initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInit {
    pub can_resume: bool,
    pub current_index: usize,
}

/// Owns the session file of a multi-organization run
#[derive(Debug)]
pub struct SessionSequencer {
    path: PathBuf,
    layout: StateLayout,
    state: SessionState,
}

impl SessionSequencer {
    /// Starts a new session or resumes the one on disk
    ///
    /// A session is only resumed when one exists, parses, is unfinished,
    /// `resume_requested` is set, and it tracks exactly the same organizations
    /// in the same order (case-insensitive). The settings passed in replace the
    /// stored ones on resume.
    ///
    /// # Errors
    ///
    /// * `HarvestError::NoCollections` - The list is empty
    /// * `HarvestError::SessionMismatch` - Resuming with a different list
    /// * `HarvestError::State` - The session file could not be written
    pub fn initialize(
        layout: &StateLayout,
        collection_list: &[String],
        settings: SessionSettings,
        resume_requested: bool,
    ) -> Result<(Self, SessionInit), HarvestError> {
        let requested = normalize_collection_list(collection_list);
        if requested.is_empty() {
            return Err(HarvestError::NoCollections);
        }

        let path = layout.session_path();
        let prior = match load_session(&path) {
            Ok(prior) => prior,
            Err(e) => {
                tracing::warn!("Ignoring unusable session file, starting a new session: {}", e);
                None
            }
        };

        if let Some(prior) = prior {
            if prior.is_finished() {
                tracing::info!(
                    session = %prior.session_id,
                    "Previous session finished all organizations, starting a new session"
                );
            } else if !resume_requested {
                tracing::info!(
                    session = %prior.session_id,
                    index = prior.current_index,
                    total = prior.collection_list.len(),
                    "Found an unfinished session; starting a new one (use --resume to continue it)"
                );
            } else if prior.collection_list != requested {
                return Err(HarvestError::SessionMismatch {
                    path,
                    expected: prior.collection_list,
                    requested,
                });
            } else {
                let current_index = prior.current_index;
                let mut sequencer = Self {
                    path,
                    layout: layout.clone(),
                    state: prior,
                };
                sequencer.state.settings = settings;
                sequencer.persist()?;

                tracing::info!(
                    session = %sequencer.state.session_id,
                    index = current_index,
                    total = sequencer.state.collection_list.len(),
                    "Resuming session"
                );
                return Ok((
                    sequencer,
                    SessionInit {
                        can_resume: true,
                        current_index,
                    },
                ));
            }
        }

        let sequencer = Self {
            path,
            layout: layout.clone(),
            state: SessionState::new(requested, settings, layout),
        };
        sequencer.persist()?;

        tracing::info!(
            session = %sequencer.state.session_id,
            total = sequencer.state.collection_list.len(),
            "Started new session"
        );
        Ok((
            sequencer,
            SessionInit {
                can_resume: false,
                current_index: 0,
            },
        ))
    }

    /// Reads the session file without taking ownership of it
    pub fn inspect(layout: &StateLayout) -> StateResult<Option<SessionState>> {
        load_session(&layout.session_path())
    }

    /// Returns the reference for an organization, creating a pending one if needed
    pub fn get_or_create_org_reference(&mut self, id: &str) -> StateResult<OrgReference> {
        let key = normalize_collection_id(id);
        if !self.state.collection_references.contains_key(&key) {
            let reference = OrgReference::pending(&self.layout.checkpoint_path(&key));
            self.state.collection_references.insert(key.clone(), reference);
            self.touch_and_persist()?;
        }
        Ok(self.state.collection_references[&key].clone())
    }

    /// Merges an update into an organization's reference and persists it
    ///
    /// A transition from a non-terminal into a terminal status advances the
    /// resume pointer by exactly one, bounded at the list length. Ids outside
    /// the session's list never move the pointer.
    ///
    /// # Errors
    ///
    /// * `HarvestError::InvalidTransition` - The status change is not allowed
    /// * `HarvestError::State` - The session file could not be written
    pub fn update_org_reference(
        &mut self,
        id: &str,
        update: OrgReferenceUpdate,
    ) -> Result<OrgReference, HarvestError> {
        let key = normalize_collection_id(id);
        let checkpoint_path = self.layout.checkpoint_path(&key);

        let reference = self
            .state
            .collection_references
            .entry(key.clone())
            .or_insert_with(|| OrgReference::pending(&checkpoint_path));

        let previous = reference.status;
        if let Some(next) = update.status {
            if !previous.can_transition_to(next) {
                return Err(HarvestError::InvalidTransition {
                    collection: key,
                    from: previous,
                    to: next,
                });
            }
        }

        reference.apply(update);
        let reached_terminal = !previous.is_terminal() && reference.status.is_terminal();
        let updated = reference.clone();

        if reached_terminal && self.state.collection_list.contains(&key) {
            let len = self.state.collection_list.len();
            self.state.current_index = (self.state.current_index + 1).min(len);
        }

        self.touch_and_persist()?;
        Ok(updated)
    }

    /// Deletes every referenced checkpoint and then the session file
    pub fn cleanup(self) -> StateResult<()> {
        let mut checkpoint_paths: Vec<PathBuf> = self
            .state
            .collection_references
            .values()
            .map(|r| PathBuf::from(&r.checkpoint_file_ref))
            .collect();
        checkpoint_paths.extend(
            self.state
                .collection_list
                .iter()
                .map(|id| self.layout.checkpoint_path(id)),
        );
        checkpoint_paths.sort();
        checkpoint_paths.dedup();

        for path in &checkpoint_paths {
            remove_if_exists(path)?;
        }
        remove_if_exists(&self.path)?;

        tracing::info!(
            session = %self.state.session_id,
            checkpoints = checkpoint_paths.len(),
            "Removed session state"
        );
        Ok(())
    }

    /// Counts organizations by status
    pub fn summary(&self) -> SessionSummary {
        summarize(&self.state)
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn collection_list(&self) -> &[String] {
        &self.state.collection_list
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    fn touch_and_persist(&mut self) -> StateResult<()> {
        self.state.last_updated = Some(Utc::now());
        self.persist()
    }

    fn persist(&self) -> StateResult<()> {
        write_json_atomic(&self.path, &self.state)
    }
}

/// Counts the organizations of a session by status
///
/// Organizations without a reference count as pending.
pub fn summarize(state: &SessionState) -> SessionSummary {
    let mut summary = SessionSummary {
        total: state.collection_list.len(),
        ..SessionSummary::default()
    };

    for id in &state.collection_list {
        let status = state
            .collection_references
            .get(id)
            .map(|r| r.status)
            .unwrap_or_default();
        match status {
            CollectionStatus::Pending => summary.pending += 1,
            CollectionStatus::InProgress => summary.in_progress += 1,
            CollectionStatus::Completed => summary.completed += 1,
            CollectionStatus::Failed => summary.failed += 1,
        }
    }

    summary
}

fn load_session(path: &Path) -> StateResult<Option<SessionState>> {
    let Some(state) = read_json::<SessionState>(path)? else {
        return Ok(None);
    };

    if state.schema_version > SESSION_SCHEMA_VERSION {
        return Err(StateError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: state.schema_version,
            supported: SESSION_SCHEMA_VERSION,
        });
    }

    Ok(Some(state.migrate()))
}

fn progress_rank(status: CollectionStatus) -> u8 {
    match status {
        CollectionStatus::Pending => 0,
        CollectionStatus::InProgress => 1,
        CollectionStatus::Completed | CollectionStatus::Failed => 2,
    }
}

fn normalize_collection_list(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|id| normalize_collection_id(id))
        .filter(|id| !id.is_empty())
        .collect()
}

/// `<UTC timestamp>-<first 8 hex chars of SHA-256 over the list>`
fn new_session_id(collection_list: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection_list.join("\n").as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &digest[..8])
}
