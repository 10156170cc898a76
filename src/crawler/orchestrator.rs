//! Run orchestration - the sequential organization loop
//!
//! This module composes the retry executor, checkpoints and the session
//! sequencer into a run:
//! - Resolving and resuming the session for multi-organization runs
//! - Preparing each organization's checkpoint and output file
//! - Running the harvest under bounded retry, saving the checkpoint between
//!   attempts
//! - Settling each organization as completed or failed, and deciding whether
//!   the run continues
//! - Producing the run summary

use crate::config::RunOptions;
use crate::crawler::workload::{harvest_collection, lock, HarvestJob};
use crate::output::{
    log_summary, timestamped_output_path, write_markdown_summary, CollectionReport, RecordSink,
    RunSummary,
};
use crate::retry::{RetryCounters, RetryExecutor, Sleeper, TokioSleeper};
use crate::source::{DataSource, RepositoryRecord};
use crate::state::{
    normalize_collection_id, CheckpointInit, CheckpointStore, CollectionCheckpoint,
    CollectionStatus, OrgReferenceUpdate, SessionSequencer, SessionSettings, StateLayout,
};
use crate::HarvestError;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::Instrument;

/// Main run orchestrator structure
pub struct RunOrchestrator {
    options: RunOptions,
    source: Arc<dyn DataSource>,
    sink: Arc<dyn RecordSink>,
    sleeper: Arc<dyn Sleeper>,
    executor: RetryExecutor,
    layout: StateLayout,
    counters: RetryCounters,
}

impl RunOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `options` - Resolved run options
    /// * `source` - Where repositories are fetched from
    /// * `sink` - Where rows are written to
    pub fn new(options: RunOptions, source: Arc<dyn DataSource>, sink: Arc<dyn RecordSink>) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Self {
            layout: StateLayout::new(&options.state_dir),
            executor: RetryExecutor::new(sleeper.clone()),
            sleeper,
            options,
            source,
            sink,
            counters: RetryCounters::new(),
        }
    }

    /// Replaces the sleeper used for backoff and inter-organization delays
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.executor = RetryExecutor::new(sleeper.clone());
        self.sleeper = sleeper;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Retry pressure accumulated so far in this run
    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    /// Runs every configured organization in order
    ///
    /// Organization failures are reported in the summary, not returned as
    /// errors. With `continue_on_error` unset the run stops after the first
    /// failure. When session bookkeeping fails mid-run, the partial summary is
    /// still logged and written before the error is returned.
    ///
    /// # Errors
    ///
    /// * `HarvestError::NoCollections` - No organizations were given
    /// * `HarvestError::SessionMismatch` - Resuming with a different organization list
    /// * `HarvestError::State` - The session file could not be written
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let run_started = Instant::now();
        let collections: Vec<String> = self
            .options
            .collections
            .iter()
            .map(|c| normalize_collection_id(c))
            .filter(|c| !c.is_empty())
            .collect();
        if collections.is_empty() {
            return Err(HarvestError::NoCollections);
        }

        std::fs::create_dir_all(&self.options.output_dir)?;

        let mut session = if collections.len() > 1 {
            let settings = SessionSettings {
                delay_between_collections: self.options.delay_between_collections.as_secs(),
                continue_on_error: self.options.continue_on_error,
            };
            let (session, _) =
                SessionSequencer::initialize(&self.layout, &collections, settings, self.options.resume)?;
            Some(session)
        } else {
            None
        };
        let start_index = session.as_ref().map_or(0, |s| s.current_index());

        tracing::info!(
            organizations = collections.len(),
            start_index,
            resume = self.options.resume,
            fresh = self.options.force_fresh,
            continue_on_error = self.options.continue_on_error,
            "Starting run"
        );

        let mut summary = RunSummary {
            session_id: session.as_ref().map(|s| s.session_id().to_string()),
            total_collections: collections.len(),
            ..RunSummary::new()
        };

        let outcome = self
            .run_collections(&collections, session.as_mut(), start_index, &mut summary)
            .await;
        summary.elapsed = run_started.elapsed();

        if let Err(e) = outcome {
            // Whatever settled before the session was lost is still reported
            summary.aborted = true;
            tracing::error!("Run stopped: {}", e);
            self.emit_summary(&summary);
            return Err(e);
        }

        if let Some(session) = session {
            let counts = session.summary();
            if self.options.clean_state && counts.completed == counts.total {
                session.cleanup()?;
            }
        }

        self.emit_summary(&summary);
        Ok(summary)
    }

    /// The organization loop; pushes one report per organization reached
    async fn run_collections(
        &mut self,
        collections: &[String],
        mut session: Option<&mut SessionSequencer>,
        start_index: usize,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let mut processed_any = false;

        for (index, collection) in collections.iter().enumerate() {
            if let Some(session) = session.as_deref_mut() {
                let reference = session.get_or_create_org_reference(collection)?;
                if index < start_index || reference.status.is_terminal() {
                    tracing::info!(
                        org = %collection,
                        status = %reference.status,
                        "Already settled in this session, skipping"
                    );
                    summary.reports.push(CollectionReport::from_reference(collection, &reference));
                    continue;
                }
            }

            if processed_any && !self.options.delay_between_collections.is_zero() {
                tracing::info!(
                    delay_secs = self.options.delay_between_collections.as_secs(),
                    next = %collection,
                    "Waiting before next organization"
                );
                self.sleeper.sleep(self.options.delay_between_collections).await;
            }

            tracing::info!(
                org = %collection,
                position = index + 1,
                total = collections.len(),
                "Processing organization"
            );
            let span = tracing::info_span!("collection", org = %collection);
            let report = self
                .process_collection(collection, session.as_deref_mut())
                .instrument(span)
                .await?;
            processed_any = true;

            let failed = report.status == CollectionStatus::Failed;
            summary.reports.push(report);
            if failed && !self.options.continue_on_error {
                tracing::error!(org = %collection, "Aborting run after failure");
                summary.aborted = true;
                break;
            }
        }

        Ok(())
    }

    /// Logs the summary and writes the markdown copy when configured
    fn emit_summary(&self, summary: &RunSummary) {
        log_summary(summary);
        if let Some(path) = &self.options.summary_path {
            match write_markdown_summary(summary, path) {
                Ok(()) => tracing::info!(path = %path.display(), "Wrote run summary"),
                Err(e) => tracing::warn!("Failed to write run summary: {}", e),
            }
        }
    }

    /// Harvests one organization and settles its session status
    ///
    /// Only session bookkeeping errors are returned; everything else becomes
    /// a failed report.
    async fn process_collection(
        &mut self,
        collection: &str,
        mut session: Option<&mut SessionSequencer>,
    ) -> Result<CollectionReport, HarvestError> {
        let started = Instant::now();
        if let Some(session) = session.as_deref_mut() {
            session.update_org_reference(collection, OrgReferenceUpdate::started(Utc::now()))?;
        }

        let store = CheckpointStore::for_collection(&self.layout, collection);
        let CheckpointInit { mut state, did_resume } =
            store.initialize(self.options.resume, self.options.force_fresh);

        let output = match self.prepare_output(&store, &mut state, did_resume) {
            Ok(output) => output,
            Err(e) => {
                let items = state.processed_items.len() as u64;
                return settle(collection, session, started, items, 0, None, Err(e.to_string()));
            }
        };
        if let Some(session) = session.as_deref_mut() {
            let update = OrgReferenceUpdate::default().with_output(&output);
            session.update_org_reference(collection, update)?;
        }

        let job = HarvestJob {
            source: self.source.clone(),
            sink: self.sink.clone(),
            store: store.clone(),
            progress: Arc::new(Mutex::new(state)),
            collection: collection.to_string(),
            page_size: self.options.page_size,
            output: output.clone(),
        };
        let progress = job.progress.clone();
        let retries_before = self.counters.retry_count;

        let result = self
            .executor
            .execute(
                &self.options.retry,
                &mut self.counters,
                || harvest_collection(job.clone()),
                |retry| {
                    let snapshot = lock(&progress).clone();
                    if let Err(e) = store.save(&snapshot) {
                        tracing::warn!("Failed to save checkpoint before retry: {}", e);
                    }
                    tracing::warn!(
                        attempt = retry.attempt,
                        retry_count = retry.retry_count,
                        items = snapshot.processed_items.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %retry.last_error,
                        "Attempt failed, checkpoint saved"
                    );
                },
            )
            .await;

        let mut state = lock(&progress).clone();
        let items = state.processed_items.len() as u64;
        let retries = self.counters.retry_count.saturating_sub(retries_before);

        let outcome = match result {
            Ok(stats) => {
                if self.counters.record_success(retries > 0, self.options.retry.success_threshold) {
                    tracing::debug!("Retry pressure reset after sustained success");
                }
                tracing::info!(
                    written = stats.written,
                    skipped = stats.skipped,
                    "Harvest finished"
                );
                self.finish_checkpoint(&store, &mut state)
            }
            Err(e) => Err(e.to_string()),
        };

        settle(collection, session, started, items, retries, Some(output), outcome)
    }

    /// Picks the output file and makes sure it has a header
    ///
    /// A resumed organization keeps appending to the file its checkpoint
    /// names; otherwise a new timestamped file is used.
    fn prepare_output(
        &self,
        store: &CheckpointStore,
        state: &mut CollectionCheckpoint,
        did_resume: bool,
    ) -> Result<PathBuf, HarvestError> {
        let output = match state.output_artifact_ref.as_deref() {
            Some(existing) if did_resume => {
                tracing::info!(path = existing, "Appending to existing output");
                PathBuf::from(existing)
            }
            _ => unused_output_path(timestamped_output_path(
                &self.options.output_dir,
                store.collection_id(),
                Utc::now(),
            )),
        };

        self.sink
            .ensure_output_initialized(&output, RepositoryRecord::HEADER)?;
        store.set_output_artifact(state, &output)?;
        Ok(output)
    }

    /// Marks the checkpoint complete, or removes it when state is cleaned
    fn finish_checkpoint(&self, store: &CheckpointStore, state: &mut CollectionCheckpoint) -> Result<(), String> {
        store.complete(state).map_err(|e| e.to_string())?;
        if self.options.clean_state {
            if let Err(e) = store.cleanup() {
                tracing::warn!("Failed to remove checkpoint: {}", e);
            }
        }
        Ok(())
    }

    /// Fetches a single repository and writes it to its own file
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - The file the row was written to
    /// * `Err(HarvestError)` - The fetch failed after retries, or the write failed
    pub async fn harvest_repository(&mut self, owner: &str, name: &str) -> Result<PathBuf, HarvestError> {
        let source = self.source.clone();
        let record = self
            .executor
            .execute(
                &self.options.retry,
                &mut self.counters,
                || {
                    let source = source.clone();
                    let (owner, name) = (owner.to_string(), name.to_string());
                    async move {
                        source
                            .fetch_single_entity(&owner, &name)
                            .await
                            .map_err(HarvestError::from)
                    }
                },
                |retry| tracing::warn!(attempt = retry.attempt, "Repository fetch failed, retrying"),
            )
            .await
            .map_err(Box::new)?;

        std::fs::create_dir_all(&self.options.output_dir)?;
        let output = unused_output_path(timestamped_output_path(
            &self.options.output_dir,
            &format!("{}-{}", owner, name),
            Utc::now(),
        ));
        self.sink
            .ensure_output_initialized(&output, RepositoryRecord::HEADER)?;
        self.sink.append_record(&output, &record.csv_row())?;

        tracing::info!(
            repository = %record.name_with_owner,
            path = %output.display(),
            "Wrote repository"
        );
        Ok(output)
    }
}

/// Adds a numeric suffix when a fresh output file name is already taken
fn unused_output_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = path.with_file_name(format!("{}-{}.csv", stem, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Records the final status of an organization and builds its report
fn settle(
    collection: &str,
    session: Option<&mut SessionSequencer>,
    started: Instant,
    items: u64,
    retries: u32,
    output: Option<PathBuf>,
    outcome: Result<(), String>,
) -> Result<CollectionReport, HarvestError> {
    let duration = started.elapsed();
    let now = Utc::now();

    let (status, error, update) = match outcome {
        Ok(()) => (
            CollectionStatus::Completed,
            None,
            OrgReferenceUpdate::completed(now, items),
        ),
        Err(message) => (
            CollectionStatus::Failed,
            Some(message.clone()),
            OrgReferenceUpdate::failed(now, items, message),
        ),
    };
    let update = match output.as_deref() {
        Some(path) => update.with_output(path),
        None => update,
    };

    if let Some(session) = session {
        session.update_org_reference(collection, update)?;
    }

    match &error {
        None => tracing::info!(
            items,
            duration_ms = duration.as_millis() as u64,
            "Organization completed"
        ),
        Some(message) => tracing::error!(
            items,
            duration_ms = duration.as_millis() as u64,
            error = %message,
            "Organization failed"
        ),
    }

    Ok(CollectionReport {
        collection: collection.to_string(),
        status,
        duration,
        items_processed: items,
        output_path: output,
        error,
        retries,
        skipped: false,
    })
}
