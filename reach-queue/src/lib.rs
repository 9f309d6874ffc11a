#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod retention;
pub mod retry;
pub mod task;

pub use backends::{FileQueueStore, MemoryQueueStore, QueueStore};
pub use config::QueueConfig;
pub use error::{QueueError, Result, SerializationError};
pub use metrics::QueueMetrics;
pub use queue::{Enqueued, TaskQueue};
pub use retention::RetentionPolicy;
pub use retry::RetryPolicy;
pub use task::{Task, TaskId, TaskPayload, TaskState};

/// Namespace directory for durable task records.
///
/// Kept identical to the original deployment's queue namespace so existing
/// data directories remain readable.
pub const QUEUE_NAMESPACE: &str = "reachinboxScheduler";

/// The single task kind this queue carries.
pub const TASK_KIND: &str = "deliverEmailTask";
