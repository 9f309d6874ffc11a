//! Hour-bucket counter storage
//!
//! The rate limiter needs three primitives from its KV: atomic increment
//! with a TTL on first write, compensating decrement, and a read. This trait
//! is that seam; the in-process implementation below holds counters in a
//! `DashMap` and lazily expires them.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Atomic counter storage keyed by hour-bucket strings.
#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    /// Atomically increment `key` and return the new value.
    ///
    /// The TTL applies from the first write of the key; later increments
    /// within the window do not extend it.
    ///
    /// # Errors
    /// If the backend is unreachable.
    async fn incr(&self, key: &str, ttl: Duration) -> crate::Result<u64>;

    /// Atomically decrement `key`, flooring at zero, and return the new
    /// value. Decrementing an absent or expired key is a no-op.
    ///
    /// # Errors
    /// If the backend is unreachable.
    async fn decr(&self, key: &str) -> crate::Result<u64>;

    /// Read the current value of `key` (zero when absent or expired).
    ///
    /// # Errors
    /// If the backend is unreachable.
    async fn get(&self, key: &str) -> crate::Result<u64>;
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    expires_at: Instant,
}

/// In-process counter store over a `DashMap`
///
/// Expiry is evaluated lazily on access; an expired entry behaves exactly
/// like an absent one. Sufficient for a single-process deployment, where the
/// process itself is the single admission authority.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryCounterStore {
    /// Create a new empty counter store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> crate::Result<u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                value: 0,
                expires_at: now + ttl,
            });

        if entry.expires_at <= now {
            // Expired bucket: this write is the first of a fresh window
            entry.value = 0;
            entry.expires_at = now + ttl;
        }

        entry.value += 1;
        Ok(entry.value)
    }

    async fn decr(&self, key: &str) -> crate::Result<u64> {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };

        if entry.expires_at <= now {
            return Ok(0);
        }

        entry.value = entry.value.saturating_sub(1);
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> crate::Result<u64> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map_or(0, |entry| entry.value))
    }
}
