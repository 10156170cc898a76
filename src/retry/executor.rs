use crate::retry::policy::{backoff_delay, RetryConfig};
use crate::retry::sleep::{Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Classifies an operation error as transient or fatal
pub trait Retryable {
    /// Returns true if another attempt may succeed
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Snapshot handed to the retry callback before each backoff sleep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// The attempt that just failed (1-based)
    pub attempt: u32,

    /// Display text of the error from that attempt
    pub last_error: String,

    /// Caller-managed streak of retry-free successes
    pub success_count: u32,

    /// Retries performed so far, across calls sharing the same counters
    pub retry_count: u32,
}

/// Retry pressure tracked by the caller across several `execute` calls
///
/// The counters never change how an operation is retried. They are reported
/// to `on_retry` callbacks, and a reset only clears that pressure. Callers
/// that want per-call retry totals take the `retry_count` difference around
/// one `execute` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub success_count: u32,
    pub retry_count: u32,
}

impl RetryCounters {
    /// Creates zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful `execute` call
    ///
    /// A success that needed retries breaks the streak. Once `threshold`
    /// consecutive retry-free successes are seen, both counters reset and
    /// `true` is returned.
    pub fn record_success(&mut self, retried: bool, threshold: Option<u32>) -> bool {
        if retried {
            self.success_count = 0;
            return false;
        }

        self.success_count += 1;
        match threshold {
            Some(threshold) if threshold > 0 && self.success_count >= threshold => {
                self.success_count = 0;
                self.retry_count = 0;
                true
            }
            _ => false,
        }
    }
}

/// Failure of a retried operation
///
/// Never the bare operation error: callers can always tell an exhausted or
/// aborted retry loop apart from the operation's own failure.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Operation failed after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    #[error("Operation aborted on attempt {attempt} (not retryable): {source}")]
    Aborted { attempt: u32, source: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The error returned by the final attempt
    pub fn inner(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted { source, .. } => source,
        }
    }

    /// Consumes the wrapper and returns the final attempt's error
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted { source, .. } => source,
        }
    }
}

/// Runs fallible operations with bounded exponential backoff
#[derive(Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    /// Creates an executor that waits with the given sleeper
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Executes `operation` until it succeeds or the attempt budget is spent
    ///
    /// # Arguments
    ///
    /// * `config` - Attempt budget and backoff ladder
    /// * `counters` - Caller-owned retry pressure; `retry_count` grows by one per retry
    /// * `operation` - Produces a fresh future for every attempt
    /// * `on_retry` - Called after each failed attempt except the last, before sleeping
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful result
    /// * `Err(RetryError::Exhausted)` - Every attempt failed
    /// * `Err(RetryError::Aborted)` - An attempt failed with a non-retryable error
    pub async fn execute<T, E, F, Fut, R>(
        &self,
        config: &RetryConfig,
        counters: &mut RetryCounters,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
        R: FnMut(&RetryState),
    {
        let max_attempts = config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::error!(attempt, error = %error, "Non-retryable error, giving up");
                return Err(RetryError::Aborted {
                    attempt,
                    source: error,
                });
            }

            if attempt >= max_attempts {
                tracing::error!(attempts = attempt, error = %error, "Max retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            counters.retry_count += 1;
            let delay = backoff_delay(config, attempt);
            on_retry(&RetryState {
                attempt,
                last_error: error.to_string(),
                success_count: counters.success_count,
                retry_count: counters.retry_count,
            });

            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, will retry"
            );
            self.sleeper.sleep(delay).await;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}
