//! Configuration module for Org-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and turning them into the options of one run.
//!
//! # Example
//!
//! ```no_run
//! use org_harvest::config::{load_config, RunOptions};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! let options = RunOptions::from_config(&config);
//! println!("Crawling {} organizations", options.collections.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, OutputConfig, RunConfig, RunOptions};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_collection_list, load_config, load_config_with_hash,
    parse_collection_list,
};

pub use validation::{validate, validate_run_options};
