#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use backends::{FileStore, MemoryStore};
pub use config::StoreConfig;
pub use error::{Result, SerializationError, StoreError, ValidationError};
pub use store::Store;
pub use types::{
    Campaign, CampaignId, CampaignStatus, Dispatch, DispatchId, DispatchStatus, SenderAccount, User,
};
