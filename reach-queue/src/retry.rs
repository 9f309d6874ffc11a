//! Retry policy for failed tasks
//!
//! Transport failures consume attempts and back off exponentially;
//! rescheduling (the rate-limit path) bypasses this policy entirely and
//! never advances the attempt counter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration for queued tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts before a task parks as failed.
    ///
    /// Default: 3 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the first retry (in seconds).
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::base_delay_secs")]
    pub base_delay_secs: u64,

    /// Multiplier applied per additional attempt.
    ///
    /// With the defaults the retry ladder is 5 s, 25 s, 125 s.
    ///
    /// Default: 5
    #[serde(default = "defaults::multiplier")]
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_secs: defaults::base_delay_secs(),
            multiplier: defaults::multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Check if another attempt should be made after `attempts` completed
    /// attempts.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff before the retry following attempt number `attempt`
    /// (1-indexed): `base * multiplier^(attempt - 1)`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier).saturating_pow(exponent);
        Duration::from_secs(self.base_delay_secs.saturating_mul(factor))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_secs() -> u64 {
        5
    }

    pub const fn multiplier() -> u32 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_ladder() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(25));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(125));
    }

    #[test]
    fn attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            base_delay_secs: u64::MAX,
            multiplier: u32::MAX,
        };
        // Must not panic
        let _ = policy.backoff_for(u32::MAX);
    }
}
