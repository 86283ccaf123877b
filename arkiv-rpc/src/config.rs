//! Connection settings for the HTTP node.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`HttpNode`](crate::HttpNode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint of the node.
    pub url: String,
    /// Per-request deadline (in milliseconds).
    pub request_timeout_ms: u64,
}

impl RpcConfig {
    /// Default settings pointed at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}
