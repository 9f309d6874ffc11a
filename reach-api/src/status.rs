//! System status reporting

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reach_queue::{QueueMetrics, TaskQueue};
use reach_store::Store;
use serde::Serialize;

/// Health of the relational store, as seen by a trivial liveness probe
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DatabaseStatus {
    pub status: &'static str,
}

/// Combined status snapshot exposed at `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: DatabaseStatus,
    pub queue: QueueMetrics,
    pub timestamp: DateTime<Utc>,
}

/// Thin reporter over the store probe and queue metrics
#[derive(Debug)]
pub struct StatusReporter {
    store: Arc<dyn Store>,
    queue: Arc<TaskQueue>,
}

impl StatusReporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(store: Arc<dyn Store>, queue: Arc<TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Assemble the current status snapshot
    pub async fn report(&self) -> StatusReport {
        let database = match self.store.ping().await {
            Ok(()) => DatabaseStatus { status: "up" },
            Err(e) => {
                tracing::warn!(error = %e, "Store liveness probe failed");
                DatabaseStatus { status: "down" }
            }
        };

        StatusReport {
            database,
            queue: self.queue.metrics().await,
            timestamp: Utc::now(),
        }
    }
}
