//! Error types for delivery operations.
//!
//! Transport failures never surface here: the worker folds them into the
//! dispatch row and the queue's retry policy. What escapes a task handler is
//! persistence trouble (store, queue, counter), which is treated as
//! transient and handed back to the retry policy.

use thiserror::Error;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Relational store failure.
    #[error("Store error: {0}")]
    Store(#[from] reach_store::StoreError),

    /// Task queue failure.
    #[error("Queue error: {0}")]
    Queue(#[from] reach_queue::QueueError),

    /// Rate-counter backend failure.
    #[error("Counter error: {0}")]
    Counter(String),
}

/// Specialized `Result` type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
