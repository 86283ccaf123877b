//! Node access for the Arkiv client.
//!
//! This crate provides:
//! - The [`NodeRpc`] trait: the six remote operations the engine depends on
//! - [`HttpNode`]: a JSON-RPC over HTTP implementation
//! - Decoding of the storage processor's event logs
//! - [`RetryPolicy`]: bounded exponential backoff for transient failures

pub mod abi;
mod config;
mod error;
mod http;
mod node;
mod retry;

pub use abi::{STORAGE_ADDRESS, decode_log, encode_log, event_topic};
pub use config::RpcConfig;
pub use error::{DecodeError, LIMIT_EXCEEDED, METHOD_NOT_FOUND, RpcError, RpcResult};
pub use http::HttpNode;
pub use node::{FilterId, LogFilter, LogRecord, NodeRpc, QueryPage, QueryRequest, Topic};
pub use retry::RetryPolicy;
