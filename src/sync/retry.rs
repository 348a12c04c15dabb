//! Retry executor for handling transient failures with exponential backoff
//!
//! This module provides the generic retry loop used by both the sync path and
//! the alert path. Every call returns the operation's result together with a
//! [`RetryStats`] record describing what happened.

use crate::config::RetryConfig;
use crate::error::Classify;
use crate::sync::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, warn};

/// Number of error messages kept in [`RetryStats::errors`]
pub const MAX_RECORDED_ERRORS: usize = 5;

/// What happened during one `execute` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryStats {
    /// Number of times the operation was invoked
    pub attempts: u32,
    /// Sum of all backoff sleeps in seconds
    pub total_delay_seconds: f64,
    /// First error messages, in order of occurrence
    pub errors: Vec<String>,
    /// Most recent error message, kept even once `errors` is full
    pub last_error: Option<String>,
    /// Whether the operation eventually succeeded
    pub success: bool,
}

impl RetryStats {
    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(message.clone());
        }
        self.last_error = Some(message);
    }
}

/// Retry executor with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    backoff: BackoffPolicy,
}

impl RetryExecutor {
    /// Create a new RetryExecutor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        let backoff = BackoffPolicy::from(&config);
        Self { config, backoff }
    }

    /// Create a RetryExecutor with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation is invoked up to `max_attempts` times (at least once).
    /// A fatal error or the last allowed attempt ends the loop; a retryable
    /// error sleeps for the backoff delay of the current attempt and tries
    /// again. Attempts are strictly sequential.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> (Result<T, E>, RetryStats)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut stats = RetryStats::default();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            stats.attempts = attempt;

            let err = match operation().await {
                Ok(value) => {
                    stats.success = true;
                    if attempt > 1 {
                        debug!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return (Ok(value), stats);
                }
                Err(err) => err,
            };

            stats.record_error(err.to_string());

            if !err.is_retryable() {
                error!(
                    attempt = attempt,
                    error = %err,
                    "Non-retryable error, giving up"
                );
                return (Err(err), stats);
            }

            if attempt >= max_attempts {
                error!(
                    attempts = attempt,
                    max_attempts = max_attempts,
                    error = %err,
                    "Max attempts exhausted"
                );
                return (Err(err), stats);
            }

            let backoff = self.backoff.delay(attempt);
            stats.total_delay_seconds += backoff.as_secs_f64();
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_secs = backoff.as_secs_f64(),
                error = %err,
                "Retrying after transient error"
            );

            tokio::time::sleep(backoff).await;
        }
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
