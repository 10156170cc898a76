//! Org-Harvest main entry point
//!
//! This is the command-line interface for the Org-Harvest organization
//! crawler.

use anyhow::{bail, Context};
use clap::Parser;
use org_harvest::config::{
    load_collection_list, load_config_with_hash, validate_run_options, Config, RunOptions,
};
use org_harvest::output::{print_summary, CsvSink};
use org_harvest::state::{summarize, CheckpointStore, SessionSequencer, StateLayout};
use org_harvest::{ConfigError, GithubClient, RunOrchestrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Org-Harvest: a resumable organization crawler
///
/// Org-Harvest walks the repositories of GitHub organizations, writes one CSV
/// row of statistics per repository, and checkpoints every row so that an
/// interrupted run can be resumed without duplicates.
#[derive(Parser, Debug)]
#[command(name = "org-harvest")]
#[command(version)]
#[command(about = "A resumable GitHub organization crawler", long_about = None)]
struct Cli {
    /// Organizations to crawl (overrides the configuration file)
    #[arg(value_name = "ORG", conflicts_with = "orgs_file")]
    organizations: Vec<String>,

    /// File listing organizations, one per line
    #[arg(long, value_name = "FILE")]
    orgs_file: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fetch a single repository (OWNER/NAME) and exit
    #[arg(long, value_name = "OWNER/NAME", conflicts_with_all = ["organizations", "orgs_file", "status"])]
    repo: Option<String>,

    /// Resume the unfinished session and checkpoints
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Ignore every checkpoint and start over
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Delete state files once they are no longer needed
    #[arg(long)]
    clean_state: bool,

    /// Seconds to wait between organizations
    #[arg(long, value_name = "SECONDS")]
    delay: Option<u64>,

    /// Keep going after an organization fails
    #[arg(long)]
    continue_on_error: bool,

    /// Directory for CSV files
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for checkpoint and session files
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Repositories per page (1-100)
    #[arg(long)]
    page_size: Option<u32>,

    /// Attempts per organization before it is marked failed
    #[arg(long)]
    max_attempts: Option<u32>,

    /// First retry delay in milliseconds
    #[arg(long)]
    initial_delay_ms: Option<u64>,

    /// Largest retry delay in milliseconds
    #[arg(long)]
    max_delay_ms: Option<u64>,

    /// Multiplier applied to the delay after each failed attempt
    #[arg(long)]
    backoff_factor: Option<f64>,

    /// Successful organizations after which retry pressure resets
    #[arg(long)]
    success_threshold: Option<u32>,

    /// Write a markdown run summary to this path
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Show the progress of the current session and exit
    #[arg(long, conflicts_with_all = ["resume", "fresh"])]
    status: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_configuration(cli.config.as_deref())?;
    let options = build_run_options(&cli, &config)?;

    if cli.status {
        return handle_status(&options);
    }

    let token = std::env::var(&config.api.token_env)
        .map_err(|_| ConfigError::MissingToken(config.api.token_env.clone()))?;
    let source = Arc::new(GithubClient::new(&config.api, token)?);
    let mut orchestrator = RunOrchestrator::new(options, source, Arc::new(CsvSink::new()));

    match &cli.repo {
        Some(repo) => handle_single_repository(&mut orchestrator, repo).await,
        None => handle_run(&mut orchestrator, cli.quiet).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("org_harvest=info,warn"),
            1 => EnvFilter::new("org_harvest=debug,info"),
            2 => EnvFilter::new("org_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, or the defaults when none is given
fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Applies command line overrides on top of the configuration file
fn build_run_options(cli: &Cli, config: &Config) -> anyhow::Result<RunOptions> {
    let mut options = RunOptions::from_config(config);

    if !cli.organizations.is_empty() {
        options.collections = cli.organizations.clone();
    } else if let Some(path) = &cli.orgs_file {
        options.collections = load_collection_list(path)
            .with_context(|| format!("Failed to read organization list {}", path.display()))?;
    }

    options.resume = cli.resume;
    options.force_fresh = cli.fresh;
    options.clean_state |= cli.clean_state;
    options.continue_on_error |= cli.continue_on_error;

    if let Some(delay) = cli.delay {
        options.delay_between_collections = Duration::from_secs(delay);
    }
    if let Some(dir) = &cli.output_dir {
        options.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.state_dir {
        options.state_dir = dir.clone();
    }
    if let Some(page_size) = cli.page_size {
        options.page_size = page_size;
    }
    if let Some(max_attempts) = cli.max_attempts {
        options.retry.max_attempts = max_attempts;
    }
    if let Some(delay) = cli.initial_delay_ms {
        options.retry.initial_delay_ms = delay;
    }
    if let Some(delay) = cli.max_delay_ms {
        options.retry.max_delay_ms = delay;
    }
    if let Some(factor) = cli.backoff_factor {
        options.retry.backoff_factor = factor;
    }
    if let Some(threshold) = cli.success_threshold {
        options.retry.success_threshold = Some(threshold);
    }
    if let Some(path) = &cli.summary {
        options.summary_path = Some(path.clone());
    }

    validate_run_options(&options)?;
    Ok(options)
}

/// Handles the main run over every organization
async fn handle_run(orchestrator: &mut RunOrchestrator, quiet: bool) -> anyhow::Result<ExitCode> {
    let summary = orchestrator.run().await?;

    if !quiet {
        print_summary(&summary);
    }

    if summary.has_failures() {
        tracing::error!(
            failed = summary.failed(),
            "Run finished with failed organizations"
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Handles the --repo mode: fetches one repository
async fn handle_single_repository(
    orchestrator: &mut RunOrchestrator,
    repo: &str,
) -> anyhow::Result<ExitCode> {
    let Some((owner, name)) = repo
        .split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
    else {
        bail!("Expected OWNER/NAME, got '{}'", repo);
    };

    let path = orchestrator.harvest_repository(owner, name).await?;
    println!("✓ Wrote {} to {}", repo, path.display());
    Ok(ExitCode::SUCCESS)
}

/// Handles the --status mode: shows session and checkpoint progress
fn handle_status(options: &RunOptions) -> anyhow::Result<ExitCode> {
    let layout = StateLayout::new(&options.state_dir);

    println!("=== Org-Harvest Status ===\n");
    println!("State directory: {}\n", layout.root().display());

    match SessionSequencer::inspect(&layout)? {
        Some(session) => {
            let counts = summarize(&session);
            println!("Session: {}", session.session_id);
            println!(
                "  Position: {} / {} organizations",
                session.current_index,
                session.collection_list.len()
            );
            println!(
                "  Completed: {}, Failed: {}, In progress: {}, Pending: {}",
                counts.completed, counts.failed, counts.in_progress, counts.pending
            );
            println!();

            println!("Organizations:");
            for id in &session.collection_list {
                match session.collection_references.get(id) {
                    Some(reference) => {
                        println!(
                            "  {}: {} ({} repositories)",
                            id, reference.status, reference.items_processed_count
                        );
                        if let Some(error) = &reference.last_error {
                            println!("      error: {}", error);
                        }
                    }
                    None => println!("  {}: pending", id),
                }
            }
            println!();
        }
        None => println!("No session file found.\n"),
    }

    if !options.collections.is_empty() {
        println!("Checkpoints:");
        for collection in &options.collections {
            let store = CheckpointStore::for_collection(&layout, collection);
            match store.load() {
                Ok(Some(checkpoint)) => println!(
                    "  {}: {} repositories, {}",
                    store.collection_id(),
                    checkpoint.processed_items.len(),
                    if checkpoint.completed_successfully {
                        "completed"
                    } else {
                        "resumable"
                    }
                ),
                Ok(None) => println!("  {}: none", store.collection_id()),
                Err(e) => println!("  {}: unusable ({})", store.collection_id(), e),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
