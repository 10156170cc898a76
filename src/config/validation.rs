use crate::config::types::{ApiConfig, Config, OutputConfig, RunOptions};
use crate::retry::RetryConfig;
use crate::ConfigError;
use url::Url;

/// Largest page size the GraphQL API accepts
const MAX_PAGE_SIZE: u32 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_output_config(&config.output)?;
    validate_retry_config(&config.retry)?;
    Ok(())
}

/// Validates options after command line overrides were applied
pub fn validate_run_options(options: &RunOptions) -> Result<(), ConfigError> {
    validate_page_size(options.page_size)?;
    validate_retry_config(&options.retry)?;

    if options.resume && options.force_fresh {
        return Err(ConfigError::Validation(
            "resume and fresh cannot both be requested".to_string(),
        ));
    }

    if options.output_dir.as_os_str().is_empty() || options.state_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output and state directories cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    // Plain http only for local endpoints
    let local = matches!(endpoint.host_str(), Some("localhost") | Some("127.0.0.1"));
    if endpoint.scheme() != "https" && !(endpoint.scheme() == "http" && local) {
        return Err(ConfigError::InvalidUrl(format!(
            "endpoint must use https, got '{}'",
            config.endpoint
        )));
    }

    if config.token_env.trim().is_empty() {
        return Err(ConfigError::Validation("token-env cannot be empty".to_string()));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation("user-agent cannot be empty".to_string()));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation("timeout-secs must be >= 1".to_string()));
    }

    validate_page_size(config.page_size)
}

fn validate_page_size(page_size: u32) -> Result<(), ConfigError> {
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation("directory cannot be empty".to_string()));
    }

    if config.state_directory.is_empty() {
        return Err(ConfigError::Validation(
            "state-directory cannot be empty".to_string(),
        ));
    }

    if config.summary_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-factor must be >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "initial-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    if config.success_threshold == Some(0) {
        return Err(ConfigError::Validation(
            "success-threshold must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}
