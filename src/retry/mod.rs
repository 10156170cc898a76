//! Bounded retry with exponential backoff
//!
//! This module wraps a single fallible asynchronous operation with a capped
//! backoff ladder. It provides:
//! - `RetryConfig`: attempt budget and delay ladder parameters
//! - `RetryExecutor`: runs an operation until it succeeds or the budget is spent
//! - `RetryCounters`: caller-owned success streak / retry pressure across calls
//! - `Sleeper`: the injectable sleep primitive used between attempts

mod executor;
mod policy;
mod sleep;

pub use executor::{RetryCounters, RetryError, RetryExecutor, RetryState, Retryable};
pub use policy::{backoff_delay, RetryConfig};
pub use sleep::{Sleeper, TokioSleeper};
