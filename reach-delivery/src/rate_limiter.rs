//! Hourly admission control over hour-bucketed counters
//!
//! Throughput ceilings are enforced against UTC hour buckets in the counter
//! store: one `global` bucket, plus one per sender when a sender id is
//! supplied. Admission atomically increments first and compensates with a
//! decrement on reject, so a denied call never charges the budget. This
//! limiter is the single place a send may be refused for throughput; the
//! queue itself never rate-limits.
//!
//! # Key layout (compatibility-critical)
//!
//! ```text
//! reachSessionLimit:global:2024-03-07-15
//! reachSessionLimit:<senderId>:2024-03-07-15
//! ```
//!
//! Buckets are UTC to keep the window arithmetic immune to DST.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::counter::CounterStore;

/// TTL applied on the first write of each hour bucket
pub const COUNTER_TTL: Duration = Duration::from_secs(3600);

const KEY_PREFIX: &str = "reachSessionLimit";

/// Configuration for hourly throughput ceilings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Global sends admitted per UTC hour
    ///
    /// Default: 200
    #[serde(default = "default_max_emails_per_hour")]
    pub max_emails_per_hour: u32,

    /// Sends admitted per sender per UTC hour
    ///
    /// Default: 50
    #[serde(default = "default_max_emails_per_hour_per_sender")]
    pub max_emails_per_hour_per_sender: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_emails_per_hour: default_max_emails_per_hour(),
            max_emails_per_hour_per_sender: default_max_emails_per_hour_per_sender(),
        }
    }
}

const fn default_max_emails_per_hour() -> u32 {
    200
}

const fn default_max_emails_per_hour_per_sender() -> u32 {
    50
}

/// Result of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the send may proceed
    pub allowed: bool,
    /// Budget left in the current hour window (never negative)
    pub remaining: u32,
    /// Start of the next UTC hour; when `allowed` is false, the instant the
    /// caller should reschedule for
    pub reset_at: DateTime<Utc>,
}

/// Read-only counter snapshot for observability
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CounterSnapshot {
    pub global_count: u64,
    pub global_ceiling: u32,
    pub sender_count: Option<u64>,
    pub sender_ceiling: Option<u32>,
}

/// Format the counter key for a scope within the hour containing `at`
#[must_use]
pub fn hour_bucket(scope: &str, at: DateTime<Utc>) -> String {
    format!("{KEY_PREFIX}:{scope}:{}", at.format("%Y-%m-%d-%H"))
}

/// Start of the UTC hour following `at`
#[must_use]
pub fn next_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1))
        .map_or(at, |truncated| truncated + TimeDelta::hours(1))
}

/// Admission control against global and per-sender hour buckets
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Create a new rate limiter over the given counter store
    #[must_use]
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// The configured ceilings
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to admit one send in the current hour window.
    ///
    /// # Errors
    /// If the counter store is unreachable.
    pub async fn try_admit(&self, sender_id: Option<&str>) -> crate::Result<Admission> {
        self.admit_at(Utc::now(), sender_id).await
    }

    /// Admission evaluated against an explicit `now`.
    ///
    /// # Errors
    /// If the counter store is unreachable.
    pub async fn admit_at(
        &self,
        now: DateTime<Utc>,
        sender_id: Option<&str>,
    ) -> crate::Result<Admission> {
        let reset_at = next_hour(now);

        let global_key = hour_bucket("global", now);
        let global_count = self.store.incr(&global_key, COUNTER_TTL).await?;

        if global_count > u64::from(self.config.max_emails_per_hour) {
            self.store.decr(&global_key).await?;
            tracing::debug!(
                count = global_count - 1,
                ceiling = self.config.max_emails_per_hour,
                "Global hourly ceiling reached"
            );
            return Ok(Admission {
                allowed: false,
                remaining: 0,
                reset_at,
            });
        }

        let mut remaining = remaining_of(self.config.max_emails_per_hour, global_count);

        if let Some(sender) = sender_id {
            let sender_key = hour_bucket(sender, now);
            let sender_count = self.store.incr(&sender_key, COUNTER_TTL).await?;

            if sender_count > u64::from(self.config.max_emails_per_hour_per_sender) {
                // Roll back the reservation: sender first, then global
                self.store.decr(&sender_key).await?;
                self.store.decr(&global_key).await?;
                tracing::debug!(
                    sender,
                    count = sender_count - 1,
                    ceiling = self.config.max_emails_per_hour_per_sender,
                    "Per-sender hourly ceiling reached"
                );
                return Ok(Admission {
                    allowed: false,
                    remaining: 0,
                    reset_at,
                });
            }

            remaining = remaining.min(remaining_of(
                self.config.max_emails_per_hour_per_sender,
                sender_count,
            ));
        }

        Ok(Admission {
            allowed: true,
            remaining,
            reset_at,
        })
    }

    /// Read-only snapshot of the current hour's counters.
    ///
    /// # Errors
    /// If the counter store is unreachable.
    pub async fn inspect(&self, sender_id: Option<&str>) -> crate::Result<CounterSnapshot> {
        self.inspect_at(Utc::now(), sender_id).await
    }

    /// Snapshot evaluated against an explicit `now`.
    ///
    /// # Errors
    /// If the counter store is unreachable.
    pub async fn inspect_at(
        &self,
        now: DateTime<Utc>,
        sender_id: Option<&str>,
    ) -> crate::Result<CounterSnapshot> {
        let global_count = self.store.get(&hour_bucket("global", now)).await?;

        let sender_count = match sender_id {
            Some(sender) => Some(self.store.get(&hour_bucket(sender, now)).await?),
            None => None,
        };

        Ok(CounterSnapshot {
            global_count,
            global_ceiling: self.config.max_emails_per_hour,
            sender_count,
            sender_ceiling: sender_id.map(|_| self.config.max_emails_per_hour_per_sender),
        })
    }
}

fn remaining_of(ceiling: u32, count: u64) -> u32 {
    u64::from(ceiling)
        .saturating_sub(count)
        .try_into()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::counter::MemoryCounterStore;

    fn limiter(global: u32, per_sender: u32) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                max_emails_per_hour: global,
                max_emails_per_hour_per_sender: per_sender,
            },
            Arc::new(MemoryCounterStore::new()),
        )
    }

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 15, 42, 11).unwrap()
    }

    #[test]
    fn bucket_key_format() {
        assert_eq!(
            hour_bucket("global", instant()),
            "reachSessionLimit:global:2024-03-07-15"
        );
        assert_eq!(
            hour_bucket("sender-7", instant()),
            "reachSessionLimit:sender-7:2024-03-07-15"
        );
    }

    #[test]
    fn next_hour_is_top_of_following_hour() {
        let reset = next_hour(instant());
        assert_eq!(reset, Utc.with_ymd_and_hms(2024, 3, 7, 16, 0, 0).unwrap());

        // Hour boundary rolls the date too
        let late = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(
            next_hour(late),
            Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn global_ceiling_saturates() {
        let limiter = limiter(3, 50);
        let now = instant();

        for expected_remaining in [2, 1, 0] {
            let admission = limiter.admit_at(now, None).await.unwrap();
            assert!(admission.allowed);
            assert_eq!(admission.remaining, expected_remaining);
        }

        let denied = limiter.admit_at(now, None).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, next_hour(now));

        // The reject was compensated: the bucket still holds exactly the
        // granted sends
        let snapshot = limiter.inspect_at(now, None).await.unwrap();
        assert_eq!(snapshot.global_count, 3);
    }

    #[tokio::test]
    async fn a_new_hour_window_resets_the_budget() {
        let limiter = limiter(1, 50);
        let now = instant();

        assert!(limiter.admit_at(now, None).await.unwrap().allowed);
        assert!(!limiter.admit_at(now, None).await.unwrap().allowed);

        let next_window = now + TimeDelta::hours(1);
        let admission = limiter.admit_at(next_window, None).await.unwrap();
        assert!(admission.allowed, "fresh bucket key, fresh budget");
    }

    #[tokio::test]
    async fn sender_reject_rolls_back_both_counters() {
        let limiter = limiter(100, 1);
        let now = instant();

        assert!(limiter.admit_at(now, Some("s1")).await.unwrap().allowed);

        let denied = limiter.admit_at(now, Some("s1")).await.unwrap();
        assert!(!denied.allowed);

        let snapshot = limiter.inspect_at(now, Some("s1")).await.unwrap();
        assert_eq!(snapshot.global_count, 1, "global charge was refunded");
        assert_eq!(snapshot.sender_count, Some(1));

        // Another sender is unaffected
        assert!(limiter.admit_at(now, Some("s2")).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn remaining_is_bounded_by_the_tighter_ceiling() {
        let limiter = limiter(100, 2);
        let now = instant();

        let admission = limiter.admit_at(now, Some("s1")).await.unwrap();
        assert!(admission.allowed);
        assert_eq!(admission.remaining, 1, "sender ceiling dominates");

        let admission = limiter.admit_at(now, None).await.unwrap();
        assert_eq!(admission.remaining, 98, "global only without a sender");
    }

    #[tokio::test]
    async fn inspect_reports_ceilings() {
        let limiter = limiter(200, 50);
        let snapshot = limiter.inspect_at(instant(), Some("s1")).await.unwrap();
        assert_eq!(snapshot.global_ceiling, 200);
        assert_eq!(snapshot.sender_ceiling, Some(50));
        assert_eq!(snapshot.global_count, 0);

        let snapshot = limiter.inspect_at(instant(), None).await.unwrap();
        assert!(snapshot.sender_count.is_none());
        assert!(snapshot.sender_ceiling.is_none());
    }
}
