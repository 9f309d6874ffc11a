use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{backends::MemoryStore, store::Store, FileStore};

/// Configuration for the campaign store backend
///
/// Allows runtime selection of the backing implementation through the
/// configuration file.
///
/// File-backed store in RON config:
/// ```ron
/// Reach (
///     store: File(
///         path: "/var/lib/reach/store",
///     ),
/// )
/// ```
///
/// Memory-backed store for testing:
/// ```ron
/// Reach (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// File-based store (production)
    File(FileConfig),
    /// Memory-based store (testing/development)
    Memory,
}

/// Configuration for the file-backed store
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Data directory root
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileConfig {
            path: PathBuf::from("./data/store"),
        })
    }
}

impl StoreConfig {
    /// Get the filesystem path for file-backed stores, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(config) => Some(&config.path),
            Self::Memory => None,
        }
    }

    /// Convert the configuration into a concrete store
    ///
    /// # Errors
    /// Returns an error if the file store cannot be opened or loaded.
    pub async fn into_store(self) -> crate::Result<Arc<dyn Store>> {
        match self {
            Self::File(config) => Ok(Arc::new(FileStore::open(config.path).await?)),
            Self::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}
