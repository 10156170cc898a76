//! Output module for harvested rows and run reports
//!
//! This module handles:
//! - Appending repository rows to CSV files durably
//! - Summarizing the outcome of a run
//! - Printing, logging and writing run summaries as markdown

mod csv_sink;
mod markdown;
pub mod stats;
mod traits;

pub use csv_sink::{escape_field, format_csv_line, timestamped_output_path, CsvSink};
pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use stats::{log_summary, print_summary};
pub use traits::{CollectionReport, RecordSink, RunSummary, SinkError, SinkResult};
