//! Org-Harvest: a resumable organization crawler
//!
//! This crate walks the repositories of one or many GitHub organizations through
//! the GraphQL API, writes one row of statistics per repository to CSV, and
//! checkpoints its progress so that long runs survive restarts without
//! duplicating or dropping rows.

pub mod config;
pub mod crawler;
pub mod output;
pub mod retry;
pub mod source;
pub mod state;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Org-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Output error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("No organizations specified")]
    NoCollections,

    #[error(
        "Session file {} tracks organizations [{}] but this run requested [{}]; \
         delete {} to start a new session",
        path.display(),
        expected.join(", "),
        requested.join(", "),
        path.display()
    )]
    SessionMismatch {
        path: PathBuf,
        expected: Vec<String>,
        requested: Vec<String>,
    },

    #[error("Invalid status transition for {collection}: {from} -> {to}")]
    InvalidTransition {
        collection: String,
        from: state::CollectionStatus,
        to: state::CollectionStatus,
    },

    #[error(transparent)]
    Retry(#[from] Box<retry::RetryError<HarvestError>>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl retry::Retryable for HarvestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_retryable(),
            Self::Sink(_) | Self::State(_) | Self::Io(_) => true,
            Self::Config(_)
            | Self::NoCollections
            | Self::SessionMismatch { .. }
            | Self::InvalidTransition { .. }
            | Self::Retry(_) => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("API token not found in environment variable {0}")]
    MissingToken(String),
}

/// Result type alias for Org-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, RunOptions};
pub use crawler::RunOrchestrator;
pub use output::{CsvSink, RecordSink, RunSummary};
pub use retry::{RetryConfig, RetryError, RetryExecutor};
pub use source::{DataSource, GithubClient, RepositoryRecord};
pub use state::{CheckpointStore, CollectionStatus, SessionSequencer, StateLayout};
