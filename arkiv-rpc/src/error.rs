//! Error types for the RPC layer.

use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// JSON-RPC error code for "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code used by nodes to signal rate limiting.
pub const LIMIT_EXCEEDED: i64 = -32005;

/// Errors returned by a [`NodeRpc`](crate::NodeRpc) implementation.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection could not be established or was dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// HTTP client failure not covered by the variants above.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Request or response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("node error {code}: {message}")]
    Server { code: i64, message: String },

    /// The node does not implement the method (server filters, typically).
    #[error("{method} not supported by node: {message}")]
    Unsupported { method: String, message: String },

    /// The node refused a query predicate.
    #[error("query rejected ({predicate}): {message}")]
    QueryRejected { predicate: String, message: String },

    /// A server-side filter handle is unknown to the node.
    #[error("filter not found: {0}")]
    FilterNotFound(String),

    /// A response field had an unexpected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// A transient failure persisted through every retry.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<RpcError> },
}

impl RpcError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Server { code, .. } => *code == LIMIT_EXCEEDED,
            _ => false,
        }
    }

    /// Whether the node lacks a capability (as opposed to failing).
    #[must_use]
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::FilterNotFound(_))
    }

    /// Whether this is a connectivity failure, including exhausted retries.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } => true,
            other => other.is_transient(),
        }
    }
}

/// A log record could not be decoded into a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic0,

    #[error("unknown event topic {0}")]
    UnknownTopic(String),

    #[error("{kind} log is missing topic {index}")]
    MissingTopic { kind: &'static str, index: usize },

    #[error("{kind} log data has {actual} bytes, expected at least {expected}")]
    ShortData {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} does not fit in {width}")]
    Overflow {
        field: &'static str,
        width: &'static str,
    },

    #[error("log is missing {0}")]
    MissingField(&'static str),
}
