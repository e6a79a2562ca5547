use serde::{Deserialize, Serialize};
use std::time::Duration;

// Default configuration values
const DEFAULT_API_BASE_URL: &str = "https://api.example-bank.test";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Configuration for the client engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the banking API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long a cached Success stays fresh, in seconds.
    /// `None` means a Success is always fresh unless a refresh is forced.
    #[serde(default)]
    pub staleness_secs: Option<u64>,
}

impl ClientConfig {
    /// Staleness window as a duration, if one is configured
    pub fn staleness(&self) -> Option<Duration> {
        self.staleness_secs.map(Duration::from_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            staleness_secs: None,
        }
    }
}

// Default functions
fn default_api_base_url() -> String {
    std::env::var("TELLER_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

fn default_request_timeout() -> u64 {
    std::env::var("TELLER_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
}
