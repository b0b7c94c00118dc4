//! Exponential reconnect backoff.
//!
//! After the *N*th consecutive failure the delay is
//! `min(min_delay * multiplier^(N-1), max_delay)`; a successful open resets
//! it to `min_delay`.
//!
//! ```rust
//! use std::time::Duration;
//! use edge_voice_client::transport::RetryPolicy;
//!
//! let mut policy = RetryPolicy::default();
//! assert_eq!(policy.on_failure(), Duration::from_secs(3));
//! assert_eq!(policy.on_failure(), Duration::from_secs(6));
//! policy.reset();
//! assert_eq!(policy.on_failure(), Duration::from_secs(3));
//! ```

use std::time::Duration;

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(3_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    current: Duration,
    min: Duration,
    max: Duration,
    multiplier: u32,
    failures: u32,
}

impl RetryPolicy {
    /// `max` is raised to `min` and `multiplier` to 1 if given smaller.
    pub fn new(min: Duration, max: Duration, multiplier: u32) -> Self {
        let max = max.max(min);
        Self {
            current: min,
            min,
            max,
            multiplier: multiplier.max(1),
            failures: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next.
    pub fn on_failure(&mut self) -> Duration {
        if self.failures > 0 {
            self.current = self
                .current
                .saturating_mul(self.multiplier)
                .clamp(self.min, self.max);
        }
        self.failures = self.failures.saturating_add(1);
        self.current
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.current = self.min;
        self.failures = 0;
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
