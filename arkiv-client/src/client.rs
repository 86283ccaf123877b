//! The client session: queries, watchers and their registry.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::iterator::QueryIterator;
use crate::query::{Query, QueryBuilder};
use crate::registry::{CleanupReport, FilterRegistry};
use crate::watcher::{EventHandler, EventWatcher, WatcherId};
use arkiv_rpc::{HttpNode, NodeRpc, QueryPage, QueryRequest};
use arkiv_types::{BlockTag, Cursor, EventKind, Fields};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ClientInner {
    node: Arc<dyn NodeRpc>,
    config: ClientConfig,
    registry: FilterRegistry,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        match self.registry.try_len() {
            Some(0) | None => {}
            Some(n) => warn!("Client dropped with {n} active watchers; call cleanup_filters() first"),
        }
    }
}

/// An Arkiv client session.
///
/// Cheap to clone; clones share the node connection and the watcher
/// registry.
#[derive(Clone)]
pub struct ArkivClient {
    inner: Arc<ClientInner>,
}

impl ArkivClient {
    /// Creates a session over an existing node implementation.
    pub fn new(node: Arc<dyn NodeRpc>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                node,
                config,
                registry: FilterRegistry::new(),
            }),
        }
    }

    /// Creates a session talking JSON-RPC to `config.rpc.url`.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let node = HttpNode::new(config.rpc.clone())?;
        info!("Connected client to {}", node.url());
        Ok(Self::new(Arc::new(node), config))
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn node(&self) -> &Arc<dyn NodeRpc> {
        &self.inner.node
    }

    /// Starts a query builder bound to this client.
    #[must_use]
    pub fn select(&self, fields: Fields) -> QueryBuilder {
        QueryBuilder::new(Some(self.clone()), fields)
    }

    /// Returns a lazy iterator over every entity matching `query`.
    #[must_use]
    pub fn query(&self, query: Query) -> QueryIterator {
        QueryIterator::new(
            Arc::clone(&self.inner.node),
            self.inner.config.retry,
            query,
            self.inner.config.default_page_size,
        )
    }

    /// Fetches a single page, for callers that manage cursors themselves.
    pub async fn query_page(&self, query: &Query, cursor: Option<Cursor>) -> ClientResult<QueryPage> {
        let request = QueryRequest {
            predicate: query.predicate().render(),
            fields: query.fields(),
            order_by: query.order_by().to_vec(),
            results_per_page: Some(
                query
                    .page_size()
                    .unwrap_or(self.inner.config.default_page_size),
            ),
            cursor,
            at_block: query.at_block().number(),
        };
        let node = self.inner.node.as_ref();
        let request = &request;
        Ok(self
            .inner
            .config
            .retry
            .run("query page", move || node.query(request))
            .await?)
    }

    /// Counts the entities matching `query`, transferring only keys.
    ///
    /// Equals the number of entities a full iteration of the same query
    /// yields at the same block.
    pub async fn count(&self, query: &Query) -> ClientResult<u64> {
        let total = self.query(query.keys_only()).count().await?;
        debug!("Counted {total} entities for {}", query.predicate().render());
        Ok(total)
    }

    /// Creates, registers and starts a watcher for `kinds`.
    ///
    /// The watcher is started in manual mode; call
    /// [`EventWatcher::poll`] or switch to background polling with
    /// [`EventWatcher::run`].
    pub async fn watch(
        &self,
        kinds: impl Into<Vec<EventKind>>,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        let watcher = EventWatcher::new(
            Arc::clone(&self.inner.node),
            kinds.into(),
            from,
            Arc::new(handler),
            self.inner.config.watcher,
        )?;
        self.inner.registry.register(watcher.clone()).await;
        if let Err(e) = watcher.start().await {
            self.inner.registry.remove(&watcher.id()).await;
            return Err(e);
        }
        Ok(watcher)
    }

    pub async fn watch_entity_created(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::Created], from, handler).await
    }

    pub async fn watch_entity_updated(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::Updated], from, handler).await
    }

    pub async fn watch_entity_deleted(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::Deleted], from, handler).await
    }

    pub async fn watch_entity_extended(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::Extended], from, handler).await
    }

    pub async fn watch_owner_changed(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::OwnerChanged], from, handler).await
    }

    pub async fn watch_entity_expired(
        &self,
        from: BlockTag,
        handler: impl EventHandler + 'static,
    ) -> ClientResult<EventWatcher> {
        self.watch([EventKind::Expired], from, handler).await
    }

    /// Ids of the watchers created through this session and not yet
    /// cleaned up.
    pub async fn active_filters(&self) -> Vec<WatcherId> {
        self.inner.registry.active_filters().await
    }

    /// The session's watcher registry.
    #[must_use]
    pub fn registry(&self) -> &FilterRegistry {
        &self.inner.registry
    }

    /// Stops and uninstalls every watcher of the session.
    pub async fn cleanup_filters(&self) -> CleanupReport {
        self.inner.registry.cleanup_filters().await
    }

    /// Releases all session resources.
    pub async fn close(&self) -> CleanupReport {
        let report = self.cleanup_filters().await;
        info!("Client closed");
        report
    }
}

impl fmt::Debug for ArkivClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArkivClient")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish()
    }
}
