//! Error types for the query and watch engine.

use arkiv_rpc::{DecodeError, RpcError};
use arkiv_types::AttributeKind;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the client.
///
/// Validation variants are raised before any network call and are never
/// retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A literal's kind differs from the attribute's declared kind.
    #[error("type mismatch on attribute {attribute:?}: expected {expected}, got {received}")]
    TypeMismatch {
        attribute: String,
        expected: AttributeKind,
        received: AttributeKind,
    },

    #[error("invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    /// The operator does not apply to the attribute's kind.
    #[error("operator {operator} not applicable to {kind} attribute {attribute:?}")]
    InvalidOperator {
        attribute: String,
        operator: String,
        kind: AttributeKind,
    },

    #[error("malformed predicate {predicate:?}: {reason}")]
    MalformedPredicate { predicate: String, reason: String },

    /// A query descriptor failed validation.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("event decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The watcher released its server resources and cannot be restarted.
    #[error("watcher has been uninstalled")]
    WatcherUninstalled,
}

impl ClientError {
    /// Whether the error was raised by local validation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. }
                | Self::InvalidAttributeName(_)
                | Self::InvalidOperator { .. }
                | Self::MalformedPredicate { .. }
                | Self::InvalidQuery(_)
        )
    }

    /// Whether the node could not be reached (including exhausted retries).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Rpc(e) if e.is_transport())
    }

    /// Whether the node refused the query predicate.
    #[must_use]
    pub const fn is_query_rejected(&self) -> bool {
        matches!(self, Self::Rpc(RpcError::QueryRejected { .. }))
    }
}
