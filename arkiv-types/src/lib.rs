//! Core type definitions for the Arkiv entity store client.
//!
//! This crate defines the value types shared by the RPC layer and the
//! query/watch engine:
//! - Fixed-width identifiers (entity keys, addresses, transaction hashes)
//! - Entities, typed attributes and the field-selection mask
//! - Block tags and sort keys
//! - Lifecycle events decoded from the storage processor's logs
//!
//! Nothing here performs I/O.

mod block;
mod entity;
mod event;
mod ids;

pub use block::{BlockNumber, BlockTag};
pub use entity::{
    AttributeKind, AttributeValue, Attributes, Entity, Fields, OrderBy, SortDirection,
};
pub use event::{EventKind, EventPayload, LifecycleEvent};
pub use ids::{Address, Cursor, EntityKey, TxHash};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid {kind}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {kind} hex: {reason}")]
    InvalidHex { kind: &'static str, reason: String },

    #[error("unknown field bits: {0:#x}")]
    UnknownFields(u16),

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("invalid block tag: {0}")]
    InvalidBlockTag(String),
}
