//! State module for resumable crawl progress
//!
//! Two families of JSON files make a crawl resumable:
//!
//! - Per-collection checkpoints (`CheckpointStore`): which repositories of one
//!   organization have been durably written, and the page cursor to resume from
//! - Per-run sessions (`SessionSequencer`): which organizations of a
//!   multi-organization run are pending, in progress, completed or failed
//!
//! Both are rewritten atomically after every mutation.

mod checkpoint;
mod layout;
mod session;
mod status;
mod store;

pub use checkpoint::{
    CheckpointInit, CheckpointStore, CheckpointUpdate, CollectionCheckpoint, ProcessedItems,
    CHECKPOINT_SCHEMA_VERSION,
};
pub use layout::{normalize_collection_id, sanitize_collection_id, StateLayout};
pub use session::{
    OrgReference, OrgReferenceUpdate, SessionInit, SessionSequencer, SessionSettings,
    SessionState, SessionSummary, summarize, SESSION_SCHEMA_VERSION,
};
pub use status::CollectionStatus;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing state files
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed state file {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported schema version {found} in {} (newest supported is {supported})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
