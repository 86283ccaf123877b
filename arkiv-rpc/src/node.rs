//! Node abstraction.
//!
//! Defines the six remote operations the query and watch engine needs,
//! allowing it to run against any node implementation (HTTP, in-memory).

use crate::abi::{STORAGE_ADDRESS, event_topic};
use crate::error::RpcResult;
use arkiv_types::{Address, BlockNumber, BlockTag, Cursor, Entity, EventKind, Fields, OrderBy, TxHash};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte log topic.
pub type Topic = [u8; 32];

/// One page request against the query endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Rendered predicate text.
    pub predicate: String,
    pub fields: Fields,
    pub order_by: Vec<OrderBy>,
    /// Upper bound on entities in the returned page. `None` leaves it to the node.
    pub results_per_page: Option<u32>,
    /// Continuation token from the previous page.
    pub cursor: Option<Cursor>,
    /// Evaluate against this block instead of the head.
    pub at_block: Option<BlockNumber>,
}

impl QueryRequest {
    /// A first-page request returning every field.
    #[must_use]
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            fields: Fields::ALL,
            order_by: Vec::new(),
            results_per_page: None,
            cursor: None,
            at_block: None,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub entities: Vec<Entity>,
    /// Block the page was evaluated at.
    pub block_number: BlockNumber,
    /// Token for the next page; `None` when the result set is exhausted.
    pub cursor: Option<Cursor>,
}

/// Server-side filter handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Log selection criteria: one emitting address, topic 0 any of `topics`,
/// blocks in `[from_block, to_block]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<Topic>,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
}

impl LogFilter {
    /// Selects the storage processor's logs of the given kinds.
    #[must_use]
    pub fn for_kinds(kinds: &[EventKind], from_block: BlockTag, to_block: BlockTag) -> Self {
        Self {
            address: STORAGE_ADDRESS,
            topics: kinds.iter().map(|k| event_topic(*k)).collect(),
            from_block,
            to_block,
        }
    }

    /// Same criteria over a different block range.
    #[must_use]
    pub fn with_range(&self, from_block: BlockTag, to_block: BlockTag) -> Self {
        Self {
            address: self.address,
            topics: self.topics.clone(),
            from_block,
            to_block,
        }
    }
}

/// A raw log entry as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<Topic>,
    pub data: Vec<u8>,
    /// `None` for pending logs.
    pub block_number: Option<BlockNumber>,
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
    /// Set when a reorg dropped the log.
    pub removed: bool,
}

/// The remote operations of an Arkiv node.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Runs one page of an entity query.
    async fn query(&self, request: &QueryRequest) -> RpcResult<QueryPage>;

    /// Returns the current head block number.
    async fn block_number(&self) -> RpcResult<BlockNumber>;

    /// Returns every log matching `filter`.
    async fn get_logs(&self, filter: &LogFilter) -> RpcResult<Vec<LogRecord>>;

    /// Installs a server-side log filter.
    ///
    /// Nodes without filter support fail with a capability error.
    async fn new_filter(&self, filter: &LogFilter) -> RpcResult<FilterId>;

    /// Returns the logs matched by the filter since the previous call.
    async fn filter_changes(&self, id: &FilterId) -> RpcResult<Vec<LogRecord>>;

    /// Releases a server-side filter. Returns `false` if the node did not know it.
    async fn uninstall_filter(&self, id: &FilterId) -> RpcResult<bool>;
}
