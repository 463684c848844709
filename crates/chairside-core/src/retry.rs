//! Bounded exponential-backoff retry for fallible async operations.
//!
//! Model calls are the one flaky edge in the pipeline, so retry policy is
//! deliberately small: a fixed attempt budget, deterministic exponential
//! delays with a ceiling, and no jitter. The caller hands
//! [`RetryExecutor::execute`] a factory for the operation future; the
//! executor reinvokes it until success or exhaustion.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default attempt budget (attempts, not retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
/// Default delay ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default per-retry delay multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry policy parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts before giving up (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in ms (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling on any single delay in ms (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied per successive retry (default: 2.0).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_backoff_multiplier() -> f64 {
    DEFAULT_BACKOFF_MULTIPLIER
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Delay before the retry that follows a failed attempt.
///
/// Formula: `min(initial * multiplier^(attempt - 1), max_delay)` where
/// `attempt` is the 1-based index of the attempt that just failed.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig) -> u64 {
    let exponent = i32::try_from(attempt.saturating_sub(1).min(31)).unwrap_or(31);
    let scaled = (config.initial_delay_ms as f64) * config.backoff_multiplier.powi(exponent);
    let capped = scaled.min(config.max_delay_ms as f64);
    capped.max(0.0).round() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal failure after the attempt budget was spent.
///
/// Wraps the failure from the final attempt; intermediate failures are
/// logged and discarded.
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempts: {source}")]
pub struct RetryError<E: std::error::Error + 'static> {
    /// How many attempts ran.
    pub attempts: u32,
    /// The failure from the final attempt.
    #[source]
    pub source: E,
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a fallible async operation under a [`RetryConfig`].
///
/// The operation must be safe to reinvoke from scratch; the executor does
/// no compensation between attempts.
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor with the given policy.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The active policy.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Invoke `operation` until it succeeds or the attempt budget runs out.
    ///
    /// Returns the first success, or a [`RetryError`] carrying the failure
    /// from the final attempt. A budget of zero is treated as one attempt.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    let delay_ms = backoff_delay_ms(attempt, &self.config);
                    counter!("agent_retries_total").increment(1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts = max_attempts, error = %err, "attempt budget exhausted");
                    return Err(RetryError {
                        attempts: max_attempts,
                        source: err,
                    });
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
