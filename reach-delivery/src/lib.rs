#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod counter;
pub mod error;
pub mod processor;
pub mod rate_limiter;
pub mod sender;
mod worker;

pub use config::DeliveryConfig;
pub use counter::{CounterStore, MemoryCounterStore};
pub use error::{DeliveryError, Result};
pub use processor::DeliveryProcessor;
pub use rate_limiter::{Admission, CounterSnapshot, RateLimitConfig, RateLimiter};
pub use sender::{DevMailSender, MailSender, MockMailSender, OutgoingEmail, SendReceipt,
    TransportError};
pub use worker::TaskOutcome;
