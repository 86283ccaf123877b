//! Client and watcher settings.

use arkiv_rpc::{RetryPolicy, RpcConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for an [`ArkivClient`](crate::ArkivClient) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Node connection.
    pub rpc: RpcConfig,
    /// Retry policy for query pages.
    pub retry: RetryPolicy,
    /// Page size used when a query does not set one.
    pub default_page_size: u32,
    /// Defaults for watchers created by the client.
    pub watcher: WatcherConfig,
}

impl ClientConfig {
    /// Default settings pointed at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: RpcConfig::new(url),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            retry: RetryPolicy::default(),
            default_page_size: 100,
            watcher: WatcherConfig::default(),
        }
    }
}

/// Settings for an [`EventWatcher`](crate::EventWatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// How often the background task polls (in milliseconds). Values
    /// below 1 are treated as 1.
    pub poll_interval_ms: u64,
    /// Widest block range requested by one log scan.
    pub max_block_range: u64,
    /// Retry policy for individual node calls during a poll.
    pub retry: RetryPolicy,
}

impl WatcherConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_block_range: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}
