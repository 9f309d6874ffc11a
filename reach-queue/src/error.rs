//! Error types for the reach-queue crate.

use std::io;

use thiserror::Error;

use crate::task::TaskId;

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// I/O operation failed (record read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Task not found in the queue.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// Queue directory validation failed.
    #[error("Queue validation error: {0}")]
    Validation(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Record data is corrupted or incomplete.
    #[error("Corrupted task record: {0}")]
    Corrupted(String),
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

// Convenience conversion for lock poisoning
impl<T> From<std::sync::PoisonError<T>> for QueueError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
