use std::path::{Path, PathBuf};

const SESSION_FILE_NAME: &str = "session.json";

/// Where state files live on disk
///
/// Every path is a pure function of the state directory and the collection id,
/// so two organizations never share a checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the checkpoint file for one organization
    pub fn checkpoint_path(&self, collection_id: &str) -> PathBuf {
        self.root.join(format!(
            "checkpoint-{}.json",
            sanitize_collection_id(collection_id)
        ))
    }

    /// Path of the multi-organization session file
    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE_NAME)
    }
}

/// Canonical form of an organization name: trimmed and lower-cased
pub fn normalize_collection_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Turns an organization name into a safe file name component
///
/// Anything other than ASCII letters, digits, `-`, `_` and `.` becomes `_`.
/// Names made only of dots (or nothing) collapse to `_`.
pub fn sanitize_collection_id(id: &str) -> String {
    let sanitized: String = normalize_collection_id(id)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        sanitized
    }
}
