//! Exponential backoff with additive jitter

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Upper bound (exclusive) of the jitter fraction added to a delay
pub const JITTER_FRACTION: f64 = 0.25;

/// Longest delay a policy may produce, in seconds (one day)
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Compute the delay in seconds before retry number `attempt`
///
/// The delay is `base_delay * exponential_base^(attempt - 1)`, capped at
/// `max_delay`. With jitter enabled a uniformly random fraction in
/// `[0, JITTER_FRACTION)` of that value is added on top, so the result lies
/// in `[d, 1.25 * d)`. Attempt numbers are 1-indexed; 0 is treated as 1.
///
/// A growth factor below 1 is treated as 1 and `max_delay` never exceeds
/// [`MAX_DELAY_SECS`], so the result is finite and non-decreasing in
/// `attempt` for any input.
pub fn delay(
    attempt: u32,
    base_delay: f64,
    max_delay: f64,
    exponential_base: f64,
    jitter: bool,
) -> f64 {
    let exponent = attempt.max(1) - 1;
    let growth = exponential_base.max(1.0);
    let ceiling = max_delay.min(MAX_DELAY_SECS).max(0.0);
    let raw = base_delay * growth.powi(exponent.min(i32::MAX as u32) as i32);
    let capped = if raw.is_nan() {
        0.0
    } else {
        raw.min(ceiling).max(0.0)
    };

    if jitter && capped > 0.0 {
        let fraction = rand::thread_rng().gen_range(0.0..JITTER_FRACTION);
        capped + capped * fraction
    } else {
        capped
    }
}

/// Backoff parameters bound to a retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base_delay: f64,
    max_delay: f64,
    exponential_base: f64,
    jitter: bool,
}

impl BackoffPolicy {
    /// Build a policy from explicit parameters (in seconds)
    pub fn new(base_delay: f64, max_delay: f64, exponential_base: f64, jitter: bool) -> Self {
        Self {
            base_delay,
            max_delay,
            exponential_base,
            jitter,
        }
    }

    /// Delay in seconds before retry number `attempt`
    pub fn delay_secs(&self, attempt: u32) -> f64 {
        delay(
            attempt,
            self.base_delay,
            self.max_delay,
            self.exponential_base,
            self.jitter,
        )
    }

    /// Delay before retry number `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.delay_secs(attempt).min(MAX_DELAY_SECS * (1.0 + JITTER_FRACTION));
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.base_delay_secs,
            config.max_delay_secs,
            config.exponential_base,
            config.jitter,
        )
    }
}
