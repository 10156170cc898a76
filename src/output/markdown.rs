//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of a run,
//! including totals, a per-organization table and the errors that stopped
//! organizations from finishing.

use crate::output::traits::{RunSummary, SinkError, SinkResult};
use std::fs;
use std::path::Path;

/// Writes a markdown summary of a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(SinkError)` - Failed to write summary
pub fn write_markdown_summary(summary: &RunSummary, output_path: &Path) -> SinkResult<()> {
    let markdown = format_markdown_summary(summary);

    let write = || -> std::io::Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, markdown.as_bytes())
    };

    write().map_err(|source| SinkError::Io {
        path: output_path.to_path_buf(),
        source,
    })
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Org-Harvest Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    if let Some(session_id) = &summary.session_id {
        md.push_str(&format!("- **Session ID**: {}\n", session_id));
    }
    md.push_str(&format!(
        "- **Duration**: {} seconds ({:.2} minutes)\n",
        summary.elapsed.as_secs(),
        summary.elapsed.as_secs_f64() / 60.0
    ));
    md.push_str(&format!(
        "- **Status**: {}\n\n",
        if summary.aborted { "aborted" } else { "finished" }
    ));

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Total Organizations**: {}\n",
        summary.total_collections
    ));
    md.push_str(&format!("- **Successful**: {}\n", summary.successful()));
    md.push_str(&format!("- **Failed**: {}\n", summary.failed()));
    md.push_str(&format!("- **Not Attempted**: {}\n", summary.not_attempted()));
    md.push_str(&format!(
        "- **Repositories Recorded**: {}\n",
        summary.items_processed()
    ));
    md.push_str(&format!("- **Retries**: {}\n", summary.retries()));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.reports.is_empty() {
        md.push_str("## Organizations\n\n");
        md.push_str("| Organization | Status | Repositories | Duration (s) | Output |\n");
        md.push_str("|--------------|--------|--------------|--------------|--------|\n");

        for report in &summary.reports {
            let status = if report.skipped {
                format!("{} (earlier run)", report.status)
            } else {
                report.status.to_string()
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                report.collection,
                status,
                report.items_processed,
                report.duration.as_secs(),
                report
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ));
        }
        md.push('\n');
    }

    let errors: Vec<_> = summary
        .reports
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| (&r.collection, e)))
        .collect();
    if !errors.is_empty() {
        md.push_str("## Errors\n\n");
        for (collection, error) in errors {
            md.push_str(&format!("- **{}**: {}\n", collection, error.replace('\n', " ")));
        }
        md.push('\n');
    }

    md
}
