//! Cursor-following result iteration.

use crate::error::{ClientError, ClientResult};
use crate::query::Query;
use arkiv_rpc::{NodeRpc, QueryRequest, RetryPolicy};
use arkiv_types::{BlockNumber, Entity};
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Lazily yields the entities matching a query, one page at a time.
///
/// The first page's block number pins every later page, so a full pass sees
/// one consistent chain state. The iterator is forward-only: once it returns
/// `None` it keeps doing so. It holds only the current page and the pending
/// cursor, and owns no server resources.
pub struct QueryIterator {
    node: Arc<dyn NodeRpc>,
    retry: RetryPolicy,
    request: QueryRequest,
    page_size: u32,
    limit: Option<u64>,
    yielded: u64,
    buffer: VecDeque<Entity>,
    pinned_block: Option<BlockNumber>,
    pages_fetched: u64,
    exhausted: bool,
}

impl QueryIterator {
    pub(crate) fn new(
        node: Arc<dyn NodeRpc>,
        retry: RetryPolicy,
        query: Query,
        default_page_size: u32,
    ) -> Self {
        let request = QueryRequest {
            predicate: query.predicate().render(),
            fields: query.fields(),
            order_by: query.order_by().to_vec(),
            results_per_page: None,
            cursor: None,
            at_block: query.at_block().number(),
        };
        Self {
            node,
            retry,
            request,
            page_size: query.page_size().unwrap_or(default_page_size).max(1),
            limit: query.limit(),
            yielded: 0,
            buffer: VecDeque::new(),
            pinned_block: None,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Returns the next entity, fetching a page when the buffer is empty.
    pub async fn try_next(&mut self) -> ClientResult<Option<Entity>> {
        loop {
            if self.limit_reached() {
                self.finish();
                return Ok(None);
            }
            if let Some(entity) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(entity));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Block every page is evaluated at; `None` before the first page.
    #[must_use]
    pub const fn block_number(&self) -> Option<BlockNumber> {
        self.pinned_block
    }

    /// Number of page requests issued so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Drains the iterator into a vector.
    pub async fn collect_all(mut self) -> ClientResult<Vec<Entity>> {
        let mut out = Vec::new();
        while let Some(entity) = self.try_next().await? {
            out.push(entity);
        }
        Ok(out)
    }

    /// Adapts the iterator into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<Entity>> + Send {
        futures::stream::try_unfold(self, |mut iter| async move {
            Ok::<_, ClientError>(iter.try_next().await?.map(|entity| (entity, iter)))
        })
    }

    /// Counts the remaining entities by summing page sizes, without
    /// buffering them.
    pub(crate) async fn count(mut self) -> ClientResult<u64> {
        let mut total = 0u64;
        loop {
            if self.limit_reached() || self.exhausted {
                return Ok(total);
            }
            self.fetch_page().await?;
            let mut n = self.buffer.len() as u64;
            if let Some(limit) = self.limit {
                n = n.min(limit - self.yielded);
            }
            self.yielded += n;
            total += n;
            self.buffer.clear();
        }
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.yielded >= limit)
    }

    fn finish(&mut self) {
        self.buffer.clear();
        self.exhausted = true;
    }

    async fn fetch_page(&mut self) -> ClientResult<()> {
        let want = match self.limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.yielded);
                u32::try_from(remaining).map_or(self.page_size, |r| r.min(self.page_size))
            }
            None => self.page_size,
        };
        self.request.results_per_page = Some(want);

        let node = self.node.as_ref();
        let request = &self.request;
        let page = self
            .retry
            .run("query page", move || node.query(request))
            .await?;

        self.pages_fetched += 1;
        if self.pinned_block.is_none() {
            self.pinned_block = Some(page.block_number);
            self.request.at_block = Some(page.block_number);
        }
        debug!(
            "Fetched page {} ({} entities) at block {}",
            self.pages_fetched,
            page.entities.len(),
            page.block_number
        );

        let empty = page.entities.is_empty();
        self.buffer.extend(page.entities);
        match page.cursor {
            Some(cursor) if !empty => self.request.cursor = Some(cursor),
            _ => self.exhausted = true,
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueryIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryIterator")
            .field("predicate", &self.request.predicate)
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .field("yielded", &self.yielded)
            .field("pinned_block", &self.pinned_block)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
