//! Run summary display
//!
//! This module prints a run summary to stdout and emits it as structured
//! log events.

use crate::output::traits::RunSummary;

/// Prints the run summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Overview:");
    if let Some(session_id) = &summary.session_id {
        println!("  Session: {}", session_id);
    }
    println!("  Organizations: {}", summary.total_collections);
    println!("  Successful: {}", summary.successful());
    println!("  Failed: {}", summary.failed());
    if summary.not_attempted() > 0 {
        println!("  Not attempted: {}", summary.not_attempted());
    }
    println!("  Repositories recorded: {}", summary.items_processed());
    if summary.retries() > 0 {
        println!("  Retried attempts: {}", summary.retries());
    }
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    println!("Organizations:");
    for report in &summary.reports {
        let note = if report.skipped { " (earlier run)" } else { "" };
        println!(
            "  {}: {}{} - {} repositories in {:.1}s",
            report.collection,
            report.status,
            note,
            report.items_processed,
            report.duration.as_secs_f64()
        );
        if let Some(error) = &report.error {
            println!("      error: {}", error);
        }
    }
    println!();

    let outputs = summary.output_files();
    if !outputs.is_empty() {
        println!("Output Files ({}):", outputs.len());
        for path in outputs {
            println!("  - {}", path.display());
        }
        println!();
    }

    if summary.aborted {
        println!("Run aborted after a failure (use --continue-on-error to keep going).");
    }

    println!(
        "Success Rate: {:.1}% ({} / {} organizations)",
        summary.success_rate(),
        summary.successful(),
        summary.successful() + summary.failed()
    );
}

/// Emits the run summary as log events
pub fn log_summary(summary: &RunSummary) {
    for report in &summary.reports {
        tracing::info!(
            org = %report.collection,
            status = %report.status,
            items = report.items_processed,
            duration_ms = report.duration.as_millis() as u64,
            retries = report.retries,
            skipped = report.skipped,
            error = report.error.as_deref().unwrap_or(""),
            "Organization result"
        );
    }

    tracing::info!(
        total = summary.total_collections,
        successful = summary.successful(),
        failed = summary.failed(),
        items = summary.items_processed(),
        retries = summary.retries(),
        success_rate = format!("{:.1}", summary.success_rate()),
        elapsed_secs = summary.elapsed.as_secs(),
        aborted = summary.aborted,
        "Run finished"
    );
}
