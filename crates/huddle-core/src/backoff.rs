//! Bounded exponential retry delays.
//!
//! After `n` consecutive failures the delay is `min(floor * 2^(n-1), cap)`.
//! A success resets the sequence to the floor.

use std::time::Duration;

/// Retry delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub floor: Duration,
    /// Upper bound of any delay.
    pub cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { floor: Duration::from_millis(1000), cap: Duration::from_millis(30_000) }
    }
}

impl BackoffConfig {
    /// Delay after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.floor.saturating_mul(factor).min(self.cap)
    }
}

/// Consecutive-failure counter producing retry delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
}

impl Backoff {
    /// Fresh counter.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, failures: 0 }
    }

    /// Register a failure and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.config.delay_for(self.failures)
    }

    /// Register a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Bounds in use.
    pub fn config(&self) -> BackoffConfig {
        self.config
    }
}
