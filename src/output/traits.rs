//! Record sink trait and run summary types
//!
//! This module defines the trait interface for record sinks and the data
//! structures describing the outcome of a run.

use crate::state::{CollectionStatus, OrgReference};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for record sinks
///
/// A sink appends rows to an output artifact. A successful return means the
/// row is durable; callers only checkpoint a row after that. Implementations
/// must be thread-safe.
pub trait RecordSink: Send + Sync {
    /// Creates the artifact with its header row unless it already has content
    ///
    /// # Arguments
    ///
    /// * `path` - The artifact to prepare
    /// * `header` - Column names
    fn ensure_output_initialized(&self, path: &Path, header: &[&str]) -> SinkResult<()>;

    /// Appends one row
    ///
    /// # Arguments
    ///
    /// * `path` - The artifact to append to
    /// * `values` - Field values in header order
    fn append_record(&self, path: &Path, values: &[String]) -> SinkResult<()>;
}

/// Outcome of one organization within a run
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionReport {
    pub collection: String,
    pub status: CollectionStatus,
    pub duration: Duration,
    pub items_processed: u64,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    /// Attempts that were retried in this run
    pub retries: u32,
    /// Settled by an earlier run of the same session
    pub skipped: bool,
}

impl CollectionReport {
    /// Report for an organization settled before this run started
    pub fn from_reference(collection: &str, reference: &OrgReference) -> Self {
        let duration = match (reference.start_time, reference.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };

        Self {
            collection: collection.to_string(),
            status: reference.status,
            duration,
            items_processed: reference.items_processed_count,
            output_path: reference.output_artifact_ref.as_ref().map(PathBuf::from),
            error: reference.last_error.clone(),
            retries: 0,
            skipped: true,
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Session id, for multi-organization runs
    pub session_id: Option<String>,
    pub total_collections: usize,
    pub reports: Vec<CollectionReport>,
    /// The run stopped early after a failure
    pub aborted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Creates a new empty run summary
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successful(&self) -> usize {
        self.count(CollectionStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(CollectionStatus::Failed)
    }

    /// Organizations that were never reached
    pub fn not_attempted(&self) -> usize {
        self.total_collections.saturating_sub(self.successful() + self.failed())
    }

    /// Retried attempts across organizations
    pub fn retries(&self) -> u32 {
        self.reports.iter().map(|r| r.retries).sum()
    }

    /// Total rows recorded across organizations
    pub fn items_processed(&self) -> u64 {
        self.reports.iter().map(|r| r.items_processed).sum()
    }

    /// Returns the success rate as a percentage of settled organizations
    pub fn success_rate(&self) -> f64 {
        let settled = self.successful() + self.failed();
        if settled == 0 {
            return 0.0;
        }
        (self.successful() as f64 / settled as f64) * 100.0
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Output files in run order
    pub fn output_files(&self) -> Vec<&Path> {
        self.reports
            .iter()
            .filter_map(|r| r.output_path.as_deref())
            .collect()
    }

    fn count(&self, status: CollectionStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }
}
