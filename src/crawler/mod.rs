//! Crawler module for organization harvesting
//!
//! This module contains the core run logic, including:
//! - The sequential organization loop with continue-or-abort policy
//! - One retried harvest attempt per organization, checkpointed per row
//! - Single repository harvesting

mod orchestrator;
mod workload;

pub use orchestrator::RunOrchestrator;

use crate::config::RunOptions;
use crate::output::{CsvSink, RunSummary};
use crate::source::DataSource;
use crate::HarvestError;
use std::sync::Arc;

/// Runs a complete harvest writing CSV files
///
/// This is the main entry point for a run. It will:
/// 1. Resolve or resume the session for multi-organization runs
/// 2. Harvest each organization under bounded retry
/// 3. Checkpoint every written row
/// 4. Produce the run summary
///
/// # Arguments
///
/// * `options` - The resolved run options
/// * `source` - Where repositories are fetched from
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished or stopped after a failure
/// * `Err(HarvestError)` - The run could not start or lost its session state
pub async fn harvest(options: RunOptions, source: Arc<dyn DataSource>) -> Result<RunSummary, HarvestError> {
    RunOrchestrator::new(options, source, Arc::new(CsvSink::new()))
        .run()
        .await
}
