//! Queue depth counters exposed to the status endpoint

use serde::Serialize;

/// Snapshot of queue depth by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl QueueMetrics {
    /// Number of tasks still owed a delivery attempt
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.waiting + self.active + self.delayed
    }
}
