//! Durable record storage for queued tasks
//!
//! - `memory`: In-memory storage for testing and transient deployments
//! - `file`: File-based storage for production use

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::{Result, task::{Task, TaskId}};

pub use file::FileQueueStore;
pub use memory::MemoryQueueStore;

/// Durable record storage behind the task queue.
///
/// The queue keeps its working set in memory; this trait is the persistence
/// seam that makes tasks survive process restarts.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite a task record.
    ///
    /// # Errors
    /// If the record cannot be written.
    async fn put(&self, task: &Task) -> Result<()>;

    /// Load every stored task record.
    ///
    /// # Errors
    /// If records cannot be read or decoded.
    async fn list(&self) -> Result<Vec<Task>>;

    /// Remove a task record. Removing an absent record is not an error.
    ///
    /// # Errors
    /// If the removal fails for any reason other than absence.
    async fn remove(&self, id: &TaskId) -> Result<()>;
}
