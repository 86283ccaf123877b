//! Query and event observation engine for the Arkiv entity store.
//!
//! This crate provides:
//! - Typed filter expressions that lower to the node's predicate language
//! - A fluent query builder and a cursor-following [`QueryIterator`]
//! - [`EventWatcher`]: lifecycle events via server filters, falling back
//!   to log scans when filters are unavailable
//! - A per-session [`FilterRegistry`] that releases every watcher at once
//!
//! All node access goes through [`arkiv_rpc::NodeRpc`], so the engine runs
//! unchanged against an HTTP node or an in-memory one.

mod client;
mod config;
mod error;
pub mod expr;
mod iterator;
mod parse;
pub mod query;
mod registry;
pub mod watcher;

pub use client::ArkivClient;
pub use config::{ClientConfig, WatcherConfig};
pub use error::{ClientError, ClientResult};
pub use expr::{CompareOp, Comparison, Expr, IntAttr, StrAttr};
pub use iterator::QueryIterator;
pub use query::{IntSort, MATCH_ALL, Predicate, Query, QueryBuilder, StrSort};
pub use registry::{CleanupReport, FilterRegistry};
pub use watcher::{EventHandler, EventWatcher, Strategy, WatcherId, WatcherStatus};

pub use arkiv_rpc::{RetryPolicy, RpcConfig, RpcError};
pub use arkiv_types::{
    Address, AttributeKind, AttributeValue, Attributes, BlockNumber, BlockTag, Cursor, Entity,
    EntityKey, EventKind, EventPayload, Fields, LifecycleEvent, OrderBy, SortDirection, TxHash,
};
