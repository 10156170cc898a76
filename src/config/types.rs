use crate::retry::RetryConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Org-Harvest
///
/// Every section is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
    pub retry: RetryConfig,
    /// Organizations to crawl when none are given on the command line
    pub organizations: Vec<String>,
}

/// Remote API configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,

    /// Environment variable holding the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Repositories requested per page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Extra attempts for a request that hit a 429/5xx or a timeout
    #[serde(rename = "network-retries")]
    pub network_retries: u32,

    /// Wait between network retries when no Retry-After is given (milliseconds)
    #[serde(rename = "network-retry-delay-ms")]
    pub network_retry_delay_ms: u64,

    /// Pause for the rate-limit reset when fewer requests than this remain
    #[serde(rename = "rate-limit-floor")]
    pub rate_limit_floor: u32,

    /// Longest single rate-limit pause (seconds)
    #[serde(rename = "max-rate-limit-wait-secs")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.github.com/graphql".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            page_size: 50,
            user_agent: concat!("org-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            network_retries: 2,
            network_retry_delay_ms: 2000,
            rate_limit_floor: 50,
            max_rate_limit_wait_secs: 900,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory CSV files are written to
    pub directory: String,

    /// Directory holding checkpoint and session files
    #[serde(rename = "state-directory")]
    pub state_directory: String,

    /// Path of the markdown run summary, if one should be written
    #[serde(rename = "summary-path")]
    pub summary_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./output".to_string(),
            state_directory: "./state".to_string(),
            summary_path: None,
        }
    }
}

/// Multi-organization run behavior
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pause between organizations (seconds)
    #[serde(rename = "delay-between-collections")]
    pub delay_between_collections: u64,

    /// Keep going after an organization fails
    #[serde(rename = "continue-on-error")]
    pub continue_on_error: bool,

    /// Delete state files once they are no longer needed
    #[serde(rename = "clean-state")]
    pub clean_state: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            delay_between_collections: 5,
            continue_on_error: false,
            clean_state: false,
        }
    }
}

/// Fully resolved options for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub collections: Vec<String>,
    /// Resume from checkpoints and the session file
    pub resume: bool,
    /// Ignore every checkpoint
    pub force_fresh: bool,
    pub clean_state: bool,
    pub delay_between_collections: Duration,
    pub continue_on_error: bool,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    pub page_size: u32,
    pub retry: RetryConfig,
    pub summary_path: Option<PathBuf>,
}

impl RunOptions {
    /// Builds options from a configuration file, before CLI overrides
    pub fn from_config(config: &Config) -> Self {
        Self {
            collections: config.organizations.clone(),
            resume: false,
            force_fresh: false,
            clean_state: config.run.clean_state,
            delay_between_collections: Duration::from_secs(config.run.delay_between_collections),
            continue_on_error: config.run.continue_on_error,
            output_dir: PathBuf::from(&config.output.directory),
            state_dir: PathBuf::from(&config.output.state_directory),
            page_size: config.api.page_size,
            retry: config.retry.clone(),
            summary_path: config.output.summary_path.as_ref().map(PathBuf::from),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
