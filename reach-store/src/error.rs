//! Error types for the reach-store crate.

use std::io;

use thiserror::Error;

use crate::types::{CampaignId, DispatchId};

/// Top-level store error type.
///
/// All store operations return this error type, which categorizes failures
/// into I/O, serialization, validation, and logical errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Campaign not found.
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// Dispatch not found.
    #[error("Dispatch not found: {0}")]
    DispatchNotFound(DispatchId),

    /// A dispatch already exists for this `(campaign, recipient)` pair.
    ///
    /// The unique index is the authoritative dedup mechanism; callers record
    /// the recipient as skipped and continue.
    #[error("Dispatch already exists for {recipient_email} in campaign {campaign_id}")]
    DuplicateDispatch {
        campaign_id: CampaignId,
        recipient_email: String,
    },

    /// Data directory validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the failure is the expected duplicate-row outcome rather than
    /// a real fault.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateDispatch { .. })
    }
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
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// Data directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Data path does not exist and could not be created.
    #[error("Store path unavailable: {0}")]
    PathUnavailable(String),

    /// Data path is not a directory.
    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),

    /// Invalid store configuration.
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// Convenience conversion for lock poisoning
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
