//! Bounded exponential backoff for transient node failures.

use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt (in milliseconds).
    pub initial_backoff_ms: u64,
    /// Cap on any single delay (in milliseconds).
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay after the `attempt`-th failure (1-based), doubling up to the cap.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// runs out of attempts.
    ///
    /// Non-transient errors are returned unchanged. When every attempt fails
    /// transiently the last error is wrapped in
    /// [`RpcError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> RpcResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    if attempts == 1 {
                        return Err(e);
                    }
                    return Err(RpcError::RetriesExhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!("{what} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
