//! # Reconnection Backoff
//!
//! After `k` consecutive failures the delay is
//! `min(initial * multiplier^k, max)`. Any successful receive cycle resets
//! `k` to zero.

use std::time::Duration;

/// Exponential backoff state for one listen loop.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    failures: u32,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `initial`.
    ///
    /// A multiplier below 1.0 is treated as 1.0; `max` is raised to
    /// `initial` if smaller.
    #[must_use]
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            initial,
            multiplier,
            max: max.max(initial),
            failures: 0,
        }
    }

    /// Delay to apply before the next reconnect attempt.
    #[must_use]
    pub fn current(&self) -> Duration {
        if self.failures == 0 {
            return self.initial;
        }
        let exponent = i32::try_from(self.failures).unwrap_or(i32::MAX);
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Count one more consecutive failure; returns the new delay.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current()
    }

    /// Back to `initial`.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
