//! Polling schedule for provider status checks.
//!
//! The delay between attempts grows linearly with the attempt number and is
//! capped at [`MAX_BACKOFF_MULTIPLIER`] times the base interval. Everything
//! here is a pure function of the attempt count so the schedule can be
//! verified without timers.

use std::time::Duration;

/// Default wait before the first status check (provider registration lag).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 5_000;

/// Default base interval between status checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Default number of status checks before giving up for now.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Upper bound on the backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 5;

/// Tunable parameters for one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before the first check.
    pub initial_delay: Duration,
    /// Base interval, multiplied by the attempt number (capped).
    pub poll_interval: Duration,
    /// Number of checks before returning a non-terminal result.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Build a config from raw millisecond values.
    pub fn from_millis(initial_delay_ms: u64, poll_interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_delay_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_attempts,
        }
    }

    /// Wait after the given (1-based) attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        poll_delay(self.poll_interval, attempt)
    }
}

/// Delay after the given 1-based `attempt`: `interval * min(attempt, 5)`.
///
/// Attempt `0` is treated as `1`. Saturates at [`Duration::MAX`].
pub fn poll_delay(interval: Duration, attempt: u32) -> Duration {
    interval
        .checked_mul(attempt.clamp(1, MAX_BACKOFF_MULTIPLIER))
        .unwrap_or(Duration::MAX)
}
