use serde::Deserialize;
use std::time::Duration;

/// Retry tuning for one logical operation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied per failed attempt; 1.0 keeps the delay constant
    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    /// Consecutive retry-free successes after which retry pressure is reset
    #[serde(rename = "success-threshold")]
    pub success_threshold: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            success_threshold: Some(5),
        }
    }
}

/// Computes the delay to wait after the given failed attempt (1-based)
///
/// The ladder is `initial_delay * backoff_factor^(attempt - 1)`, capped at
/// `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw_ms = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let capped_ms = raw_ms.min(config.max_delay_ms as f64);
    Duration::from_millis(capped_ms as u64)
}
