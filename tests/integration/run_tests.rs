//! End-to-end runs against the scripted data source

use crate::common::{
    csv_repositories, options, FlakySink, RecordingSleeper, ScriptedSource, StateBreakingSink,
};
use org_harvest::crawler::{harvest, RunOrchestrator};
use org_harvest::output::{CsvSink, RecordSink};
use org_harvest::state::{CheckpointStore, CollectionStatus, SessionSequencer};
use org_harvest::HarvestError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn orchestrator(
    options: org_harvest::RunOptions,
    source: Arc<ScriptedSource>,
    sink: Arc<dyn RecordSink>,
    sleeper: Arc<RecordingSleeper>,
) -> RunOrchestrator {
    RunOrchestrator::new(options, source, sink).with_sleeper(sleeper)
}

fn acme_and_beta() -> ScriptedSource {
    ScriptedSource::new()
        .org("acme", &[&["rocket", "anvil"]])
        .org("beta", &[&["one"]])
}

#[tokio::test]
async fn test_failure_aborts_run_by_default() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(acme_and_beta().always_fail("beta"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut run = orchestrator(
        options(&dir, &["acme", "beta"]),
        source.clone(),
        Arc::new(CsvSink::new()),
        sleeper.clone(),
    );

    let summary = run.run().await.unwrap();

    assert!(summary.aborted);
    assert_eq!(summary.successful(), 1);
    assert_eq!(summary.failed(), 1);
    let beta = &summary.reports[1];
    assert_eq!(beta.status, CollectionStatus::Failed);
    assert!(beta.error.as_deref().unwrap().contains("after 2 attempts"));

    let session = SessionSequencer::inspect(run.layout()).unwrap().unwrap();
    assert_eq!(session.current_index, 2);
    assert_eq!(session.collection_references["acme"].status, CollectionStatus::Completed);
    assert_eq!(session.collection_references["acme"].items_processed_count, 2);
    assert_eq!(session.collection_references["beta"].status, CollectionStatus::Failed);
    assert!(session.collection_references["beta"].last_error.is_some());

    // Delay before beta, then one backoff between its two attempts
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(7), Duration::from_millis(100)]);
    assert_eq!(source.requests_for("beta"), 2);
}

#[tokio::test]
async fn test_continue_on_error_attempts_every_organization() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(acme_and_beta().always_fail("acme"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut opts = options(&dir, &["acme", "beta"]);
    opts.continue_on_error = true;
    let mut run = orchestrator(opts, source.clone(), Arc::new(CsvSink::new()), sleeper.clone());

    let summary = run.run().await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.successful(), 1);
    assert!(summary.has_failures());

    let session = SessionSequencer::inspect(run.layout()).unwrap().unwrap();
    assert_eq!(session.current_index, 2);
    assert_eq!(session.collection_references["beta"].status, CollectionStatus::Completed);
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_secs(7)]);
}

#[tokio::test]
async fn test_resumed_session_skips_settled_organizations() {
    let dir = TempDir::new().unwrap();
    let orgs = ["acme", "beta", "gamma"];
    let first = Arc::new(
        acme_and_beta()
            .org("gamma", &[&["x", "y"]])
            .always_fail("beta"),
    );
    let mut run = orchestrator(
        options(&dir, &orgs),
        first,
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = run.run().await.unwrap();
    assert!(summary.aborted);
    assert_eq!(summary.not_attempted(), 1);
    let session_id = summary.session_id.clone().unwrap();

    let healthy = Arc::new(acme_and_beta().org("gamma", &[&["x", "y"]]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut resume_opts = options(&dir, &["ACME", "beta", " gamma "]);
    resume_opts.resume = true;
    let mut resumed = orchestrator(resume_opts, healthy.clone(), Arc::new(CsvSink::new()), sleeper.clone());
    let summary = resumed.run().await.unwrap();

    assert_eq!(summary.session_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(summary.reports.len(), 3);
    assert!(summary.reports[0].skipped && summary.reports[1].skipped);
    assert_eq!(summary.reports[1].status, CollectionStatus::Failed);
    assert!(!summary.reports[2].skipped);
    assert_eq!(summary.reports[2].status, CollectionStatus::Completed);
    assert_eq!(healthy.requests_for("acme"), 0);
    assert_eq!(healthy.requests_for("beta"), 0);
    assert!(sleeper.calls().is_empty());

    let session = SessionSequencer::inspect(resumed.layout()).unwrap().unwrap();
    assert_eq!(session.current_index, 3);
}

#[tokio::test]
async fn test_unfinished_session_not_resumed_without_flag() {
    let dir = TempDir::new().unwrap();
    let orgs = ["acme", "beta", "gamma"];
    let source = || Arc::new(acme_and_beta().org("gamma", &[&["x"]]).always_fail("beta"));

    let mut run = orchestrator(
        options(&dir, &orgs),
        source(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    run.run().await.unwrap();

    let again = source();
    let mut rerun = orchestrator(
        options(&dir, &orgs),
        again.clone(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = rerun.run().await.unwrap();

    assert!(summary.reports.iter().all(|r| !r.skipped));
    assert_eq!(again.requests_for("acme"), 1);
    assert_eq!(again.requests_for("beta"), 2);
}

#[tokio::test]
async fn test_resume_with_different_organizations_is_fatal() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(
        acme_and_beta()
            .org("gamma", &[&["x"]])
            .always_fail("beta"),
    );
    let mut run = orchestrator(
        options(&dir, &["acme", "beta", "gamma"]),
        source.clone(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    run.run().await.unwrap();

    let mut reordered = options(&dir, &["gamma", "beta", "acme"]);
    reordered.resume = true;
    let mut run = orchestrator(
        reordered,
        source,
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );

    match run.run().await {
        Err(HarvestError::SessionMismatch { expected, requested, .. }) => {
            assert_eq!(expected, vec!["acme", "beta", "gamma"]);
            assert_eq!(requested, vec!["gamma", "beta", "acme"]);
        }
        other => panic!("expected a session mismatch, got {:?}", other.map(|s| s.reports.len())),
    }
}

#[tokio::test]
async fn test_resume_picks_up_in_progress_organization_mid_collection() {
    let dir = TempDir::new().unwrap();
    let orgs = ["acme", "beta", "gamma"];
    let beta_pages: &[&[&str]] = &[&["a", "b"], &["c"]];
    let failing = Arc::new(
        ScriptedSource::new()
            .org("acme", &[&["rocket"]])
            .org("beta", beta_pages)
            .org("gamma", &[&["x"]])
            .fail_page("beta", 1, usize::MAX),
    );
    let mut run = orchestrator(
        options(&dir, &orgs),
        failing,
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    assert!(run.run().await.unwrap().aborted);

    // Leave beta as if the process died while harvesting it
    let session_path = run.layout().session_path();
    let mut session: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&session_path).unwrap()).unwrap();
    session["currentIndex"] = serde_json::json!(1);
    session["collectionReferences"]["beta"]["status"] = serde_json::json!("in-progress");
    std::fs::write(&session_path, serde_json::to_string_pretty(&session).unwrap()).unwrap();

    let beta_output = std::path::PathBuf::from(
        session["collectionReferences"]["beta"]["outputArtifactRef"]
            .as_str()
            .unwrap(),
    );
    assert_eq!(csv_repositories(&beta_output), vec!["beta/a", "beta/b"]);

    let healthy = Arc::new(
        ScriptedSource::new()
            .org("acme", &[&["rocket"]])
            .org("beta", beta_pages)
            .org("gamma", &[&["x"]]),
    );
    let mut resume_opts = options(&dir, &orgs);
    resume_opts.resume = true;
    let mut resumed = orchestrator(
        resume_opts,
        healthy.clone(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = resumed.run().await.unwrap();

    assert!(summary.reports[0].skipped);
    assert_eq!(healthy.requests_for("acme"), 0);
    let beta_requests: Vec<_> = healthy
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter(|(org, _)| org == "beta")
        .cloned()
        .collect();
    assert_eq!(beta_requests, vec![("beta".to_string(), Some("beta-1".to_string()))]);

    let beta = &summary.reports[1];
    assert!(!beta.skipped);
    assert_eq!(beta.status, CollectionStatus::Completed);
    assert_eq!(beta.output_path.as_ref(), Some(&beta_output));
    assert_eq!(csv_repositories(&beta_output), vec!["beta/a", "beta/b", "beta/c"]);
    assert_eq!(summary.reports[2].status, CollectionStatus::Completed);

    let session = SessionSequencer::inspect(resumed.layout()).unwrap().unwrap();
    assert_eq!(session.current_index, 3);
    assert_eq!(session.collection_references["beta"].status, CollectionStatus::Completed);
    assert_eq!(session.collection_references["beta"].items_processed_count, 3);
}

#[tokio::test]
async fn test_summary_survives_lost_session_state() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, &["acme", "beta", "gamma"]);
    opts.summary_path = Some(dir.path().join("summary.md"));
    let sink = Arc::new(StateBreakingSink::new("beta", &opts.state_dir));
    let source = Arc::new(acme_and_beta().org("gamma", &[&["x"]]));
    let mut run = orchestrator(opts, source.clone(), sink, Arc::new(RecordingSleeper::default()));

    let err = run.run().await.unwrap_err();

    assert!(matches!(err, HarvestError::State(_)), "{}", err);
    assert_eq!(source.requests_for("gamma"), 0);
    let markdown = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(markdown.contains("**Status**: aborted"));
    assert!(markdown.contains("**Successful**: 1"));
    assert!(markdown.contains("| acme | completed | 2 |"));
}

#[tokio::test]
async fn test_resume_after_mid_collection_failure_writes_no_duplicates() {
    let dir = TempDir::new().unwrap();
    let pages: &[&[&str]] = &[&["a", "b"], &["c", "d"], &["e"]];
    let failing = Arc::new(ScriptedSource::new().org("acme", pages).fail_page("acme", 2, usize::MAX));

    let mut run = orchestrator(
        options(&dir, &["acme"]),
        failing,
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = run.run().await.unwrap();
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.reports[0].items_processed, 4);
    let output = summary.reports[0].output_path.clone().unwrap();
    assert_eq!(csv_repositories(&output), vec!["acme/a", "acme/b", "acme/c", "acme/d"]);

    let checkpoint = CheckpointStore::for_collection(run.layout(), "acme")
        .load()
        .unwrap()
        .unwrap();
    assert!(!checkpoint.completed_successfully);
    assert_eq!(checkpoint.current_cursor.as_deref(), Some("acme-2"));

    let healthy = Arc::new(ScriptedSource::new().org("acme", pages));
    let mut resume_opts = options(&dir, &["acme"]);
    resume_opts.resume = true;
    let mut resumed = orchestrator(
        resume_opts,
        healthy.clone(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = resumed.run().await.unwrap();

    assert_eq!(summary.successful(), 1);
    assert_eq!(summary.reports[0].output_path.as_ref(), Some(&output));
    assert_eq!(
        csv_repositories(&output),
        vec!["acme/a", "acme/b", "acme/c", "acme/d", "acme/e"]
    );
    assert_eq!(
        *healthy.requests.lock().unwrap(),
        vec![("acme".to_string(), Some("acme-2".to_string()))]
    );
}

#[tokio::test]
async fn test_retry_within_page_skips_recorded_rows() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::new().org("acme", &[&["a", "b"], &["c", "d"], &["e"]]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut run = orchestrator(
        options(&dir, &["acme"]),
        source,
        Arc::new(FlakySink::failing_on(4)),
        sleeper.clone(),
    );

    let summary = run.run().await.unwrap();

    assert_eq!(summary.successful(), 1);
    assert_eq!(summary.reports[0].items_processed, 5);
    let output = summary.reports[0].output_path.as_ref().unwrap();
    assert_eq!(
        csv_repositories(output),
        vec!["acme/a", "acme/b", "acme/c", "acme/d", "acme/e"]
    );
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(100)]);
    assert_eq!(run.counters().retry_count, 1);
    assert_eq!(summary.reports[0].retries, 1);
    assert_eq!(summary.retries(), 1);
}

#[tokio::test]
async fn test_fresh_start_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let pages: &[&[&str]] = &[&["a", "b"], &["c"]];
    let failing = Arc::new(ScriptedSource::new().org("acme", pages).fail_page("acme", 1, usize::MAX));
    let mut run = orchestrator(
        options(&dir, &["acme"]),
        failing,
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let first_output = run.run().await.unwrap().reports[0].output_path.clone().unwrap();

    let healthy = Arc::new(ScriptedSource::new().org("acme", pages));
    let mut fresh_opts = options(&dir, &["acme"]);
    fresh_opts.force_fresh = true;
    let mut fresh = orchestrator(
        fresh_opts,
        healthy.clone(),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = fresh.run().await.unwrap();

    let second_output = summary.reports[0].output_path.clone().unwrap();
    assert_ne!(first_output, second_output);
    assert_eq!(csv_repositories(&first_output), vec!["acme/a", "acme/b"]);
    assert_eq!(csv_repositories(&second_output), vec!["acme/a", "acme/b", "acme/c"]);
    assert_eq!(healthy.requests.lock().unwrap()[0].1, None);
}

#[tokio::test]
async fn test_missing_organization_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::new().org("acme", &[&["a"]]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut opts = options(&dir, &["ghost", "acme"]);
    opts.continue_on_error = true;
    let mut run = orchestrator(opts, source.clone(), Arc::new(CsvSink::new()), sleeper.clone());

    let summary = run.run().await.unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.successful(), 1);
    assert!(summary.reports[0].error.as_deref().unwrap().contains("not retryable"));
    assert_eq!(source.requests_for("ghost"), 1);
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn test_clean_state_removes_state_after_full_success() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, &["acme", "beta"]);
    opts.clean_state = true;
    opts.summary_path = Some(dir.path().join("summary.md"));
    let mut run = orchestrator(
        opts,
        Arc::new(acme_and_beta()),
        Arc::new(CsvSink::new()),
        Arc::new(RecordingSleeper::default()),
    );

    let summary = run.run().await.unwrap();

    assert_eq!(summary.successful(), 2);
    assert!(!run.layout().session_path().exists());
    assert!(!run.layout().checkpoint_path("acme").exists());
    assert!(!run.layout().checkpoint_path("beta").exists());
    for path in summary.output_files() {
        assert!(path.exists());
    }
    let markdown = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(markdown.contains("**Successful**: 2"));
}

#[tokio::test]
async fn test_harvest_entry_point_writes_csv() {
    let dir = TempDir::new().unwrap();
    let summary = harvest(
        options(&dir, &["acme"]),
        Arc::new(ScriptedSource::new().org("acme", &[&["rocket"], &["anvil"]])),
    )
    .await
    .unwrap();

    let output = summary.reports[0].output_path.as_ref().unwrap();
    assert_eq!(csv_repositories(output), vec!["acme/rocket", "acme/anvil"]);
    let header = std::fs::read_to_string(output).unwrap();
    assert!(header.starts_with("organization,repository,name_with_owner,"));
}
