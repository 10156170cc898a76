//! CSV record sink
//!
//! Rows are appended one at a time and synced before `append_record`
//! returns, so a checkpointed row is always on disk.

use crate::output::traits::{RecordSink, SinkError, SinkResult};
use crate::state::sanitize_collection_id;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends rows to CSV files
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl CsvSink {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for CsvSink {
    fn ensure_output_initialized(&self, path: &Path, header: &[&str]) -> SinkResult<()> {
        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            tracing::debug!(path = %path.display(), "Output file already initialized");
            return Ok(());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        write_line(path, &format_csv_line(header))?;
        tracing::info!(path = %path.display(), columns = header.len(), "Created output file");
        Ok(())
    }

    fn append_record(&self, path: &Path, values: &[String]) -> SinkResult<()> {
        write_line(path, &format_csv_line(values))
    }
}

fn write_line(path: &Path, line: &str) -> SinkResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;

    file.write_all(line.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.sync_data())
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Quotes a field if it contains a comma, quote, CR or LF
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Joins escaped fields with commas, without a line terminator
pub fn format_csv_line<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| escape_field(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Output file for an organization: `<dir>/<org>-<YYYYmmdd-HHMMSS>.csv`
pub fn timestamped_output_path(dir: &Path, collection: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}-{}.csv",
        sanitize_collection_id(collection),
        at.format("%Y%m%d-%H%M%S")
    ))
}
