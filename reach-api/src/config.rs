//! API server configuration

use serde::Deserialize;

/// Configuration for the HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server
    ///
    /// Common values:
    /// - `0.0.0.0:3000` (any IPv4 address, port 3000)
    /// - `127.0.0.1:3000` (localhost only)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Per-request timeout (in seconds)
    ///
    /// Default: 30
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
