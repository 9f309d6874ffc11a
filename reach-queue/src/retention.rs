//! Retention policy for finished tasks
//!
//! Finished tasks are kept around for inspection rather than removed at
//! acknowledgement time; a periodic cleanup pass enforces the bounds below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long finished task records are retained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// How long completed tasks are kept (in seconds).
    ///
    /// Default: 24 hours
    #[serde(default = "defaults::completed_secs")]
    pub completed_secs: u64,

    /// Maximum number of completed tasks to keep, newest first.
    ///
    /// Default: 1000
    #[serde(default = "defaults::completed_max")]
    pub completed_max: usize,

    /// How long failed tasks are kept (in seconds).
    ///
    /// Default: 7 days
    #[serde(default = "defaults::failed_secs")]
    pub failed_secs: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_secs: defaults::completed_secs(),
            completed_max: defaults::completed_max(),
            failed_secs: defaults::failed_secs(),
        }
    }
}

impl RetentionPolicy {
    /// Retention window for completed tasks
    #[must_use]
    pub const fn completed_for(&self) -> Duration {
        Duration::from_secs(self.completed_secs)
    }

    /// Retention window for failed tasks
    #[must_use]
    pub const fn failed_for(&self) -> Duration {
        Duration::from_secs(self.failed_secs)
    }
}

mod defaults {
    pub const fn completed_secs() -> u64 {
        24 * 60 * 60
    }

    pub const fn completed_max() -> usize {
        1000
    }

    pub const fn failed_secs() -> u64 {
        7 * 24 * 60 * 60
    }
}
