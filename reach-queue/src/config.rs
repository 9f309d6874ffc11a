use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::backends::{FileQueueStore, MemoryQueueStore, QueueStore};

/// Configuration for the queue store backend
///
/// File-backed queue in RON config:
/// ```ron
/// Reach (
///     queue: File(
///         path: "/var/lib/reach/queue",
///     ),
/// )
/// ```
///
/// Memory-backed queue for testing:
/// ```ron
/// Reach (
///     queue: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum QueueConfig {
    /// File-based queue records (production)
    File(FileConfig),
    /// Memory-based queue records (testing/development)
    Memory,
}

/// Configuration for the file-backed queue store
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Data directory root; the namespace directory is created beneath it
    pub path: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::File(FileConfig {
            path: PathBuf::from("./data/queue"),
        })
    }
}

impl QueueConfig {
    /// Get the filesystem path for file-backed queues, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(config) => Some(&config.path),
            Self::Memory => None,
        }
    }

    /// Convert the configuration into a concrete queue store
    ///
    /// # Errors
    /// Returns an error if the file store's directory cannot be created.
    pub fn into_store(self) -> crate::Result<Arc<dyn QueueStore>> {
        match self {
            Self::File(config) => Ok(Arc::new(FileQueueStore::open(config.path)?)),
            Self::Memory => Ok(Arc::new(MemoryQueueStore::new())),
        }
    }
}
