//! Session-scoped registry of live watchers.

use crate::error::ClientError;
use crate::watcher::{EventWatcher, WatcherId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Outcome of [`FilterRegistry::cleanup_filters`].
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Watchers that were stopped.
    pub stopped: usize,
    /// Watchers whose server resources were released.
    pub uninstalled: usize,
    /// Watchers whose release failed, with the error.
    pub failures: Vec<(WatcherId, ClientError)>,
}

impl CleanupReport {
    /// Whether every watcher was released without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tracks every watcher created through a client so they can be released
/// together.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    watchers: RwLock<HashMap<WatcherId, EventWatcher>>,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, watcher: EventWatcher) {
        self.watchers.write().await.insert(watcher.id(), watcher);
    }

    /// Forgets a watcher without stopping it.
    pub async fn remove(&self, id: &WatcherId) -> Option<EventWatcher> {
        self.watchers.write().await.remove(id)
    }

    pub async fn get(&self, id: &WatcherId) -> Option<EventWatcher> {
        self.watchers.read().await.get(id).cloned()
    }

    /// Ids of the registered watchers, oldest first.
    pub async fn active_filters(&self) -> Vec<WatcherId> {
        let mut ids: Vec<WatcherId> = self.watchers.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.watchers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.watchers.read().await.is_empty()
    }

    /// Non-blocking count, for contexts that cannot await.
    pub(crate) fn try_len(&self) -> Option<usize> {
        self.watchers.try_read().ok().map(|w| w.len())
    }

    /// Stops and uninstalls every registered watcher, then clears the
    /// registry.
    ///
    /// Individual failures are collected rather than raised. Watchers that
    /// could not be released stay registered so a later call retries them.
    /// Calling it again on an empty registry is a no-op.
    pub async fn cleanup_filters(&self) -> CleanupReport {
        let drained: Vec<EventWatcher> = {
            let mut watchers = self.watchers.write().await;
            let mut drained: Vec<EventWatcher> = watchers.drain().map(|(_, w)| w).collect();
            drained.sort_unstable_by_key(EventWatcher::id);
            drained
        };

        let mut report = CleanupReport::default();
        for watcher in drained {
            watcher.stop().await;
            report.stopped += 1;
            match watcher.uninstall().await {
                Ok(()) => report.uninstalled += 1,
                Err(e) => {
                    warn!("Failed to uninstall watcher {}: {e}", watcher.id());
                    report.failures.push((watcher.id(), e));
                    self.register(watcher).await;
                }
            }
        }

        if report.stopped > 0 {
            info!(
                "Cleaned up {} watchers ({} failures)",
                report.stopped,
                report.failures.len()
            );
        }
        report
    }
}
