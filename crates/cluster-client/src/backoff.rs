//! # Exponential Backoff
//!
//! Doubling delays with a ceiling, used both for reconnecting the change feed
//! and for per-item requeue delays in the work queue.
//!
//! Sequence for a 5ms base: 5ms, 10ms, 20ms, 40ms, ... up to `max`.

use std::time::Duration;

/// Exponential backoff calculator
///
/// Holds an attempt counter for callers that retry one operation in a loop
/// (`next_backoff` / `reset`); `for_attempt` is the stateless form used when
/// the attempt count is tracked elsewhere.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay for the first attempt
    base: Duration,
    /// Ceiling for any single delay
    max: Duration,
    /// Attempts made since the last reset
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `base` and capped at `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset to the initial state after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay for the given zero-based attempt: `base * 2^attempt`, capped at `max`
    #[must_use]
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
