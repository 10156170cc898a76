//! Atomic JSON persistence shared by checkpoints and sessions

use crate::state::{StateError, StateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Reads and parses a JSON file
///
/// Returns `Ok(None)` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StateResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StateError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes a value as pretty-printed JSON, replacing the file atomically
///
/// The value goes to a sibling temp file that is synced and then renamed over
/// the target, so a crash leaves either the old or the new content.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StateResult<()> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(value).map_err(|source| StateError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err)?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("state.json");
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let write_tmp = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    };

    if let Err(e) = write_tmp().and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    Ok(())
}

/// Removes a file, treating a missing file as success
///
/// Returns true if a file was actually removed.
pub(crate) fn remove_if_exists(path: &Path) -> StateResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
