#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod status;

pub use config::ApiConfig;
pub use error::ApiError;
pub use scheduler::{CampaignReceipt, CampaignScheduler, CreateCampaignRequest, SchedulerConfig,
    SchedulerError};
pub use server::{ApiServer, AppState};
pub use status::{StatusReport, StatusReporter};
