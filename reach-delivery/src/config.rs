//! Delivery pool configuration

use serde::Deserialize;

use crate::rate_limiter::RateLimitConfig;

/// Configuration for the delivery worker pool
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Number of concurrent consumers sharing the queue
    ///
    /// Default: 5
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Minimum spacing between outbound SMTP conversations, applied after
    /// admission (in milliseconds)
    ///
    /// Default: 2000
    #[serde(default = "default_min_delay_between_emails_ms")]
    pub min_delay_between_emails_ms: u64,

    /// How often an idle worker polls the queue for ready tasks
    /// (in milliseconds)
    ///
    /// Default: 250
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often the retention pass runs over finished tasks (in seconds)
    ///
    /// Default: 60
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// How long shutdown waits for in-flight deliveries before aborting
    /// (in seconds)
    ///
    /// Default: 30
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Hourly throughput ceilings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            min_delay_between_emails_ms: default_min_delay_between_emails_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

const fn default_worker_concurrency() -> usize {
    5
}

const fn default_min_delay_between_emails_ms() -> u64 {
    2000
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_cleanup_interval_secs() -> u64 {
    60
}

const fn default_drain_timeout_secs() -> u64 {
    30
}
