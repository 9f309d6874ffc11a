use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{
    backends::QueueStore,
    task::{Task, TaskId},
};

/// In-memory queue store
///
/// Task records live in a `HashMap` behind an `RwLock`. Nothing survives a
/// restart; intended for tests and transient deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    records: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl MemoryQueueStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn put(&self, task: &Task) -> crate::Result<()> {
        self.records.write()?.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<Task>> {
        Ok(self.records.read()?.values().cloned().collect())
    }

    async fn remove(&self, id: &TaskId) -> crate::Result<()> {
        self.records.write()?.remove(id);
        Ok(())
    }
}
