//! Lifecycle events emitted by the storage processor.
//!
//! Each event is decoded from one log record and is immutable. The kind is
//! implied by the payload variant.

use crate::{Address, BlockNumber, EntityKey, Error, Result, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of entity lifecycle change a watcher can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Extended,
    OwnerChanged,
    Expired,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Deleted,
        EventKind::Extended,
        EventKind::OwnerChanged,
        EventKind::Expired,
    ];

    /// Short lowercase name (`created`, `owner_changed`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Extended => "extended",
            Self::OwnerChanged => "owner_changed",
            Self::Expired => "expired",
        }
    }

    /// Canonical Solidity event signature; its keccak hash is the log's topic0.
    #[must_use]
    pub const fn signature(self) -> &'static str {
        match self {
            Self::Created => "ArkivEntityCreated(uint256,address,uint256,uint256)",
            Self::Updated => "ArkivEntityUpdated(uint256,address,uint256,uint256,uint256)",
            Self::Deleted => "ArkivEntityDeleted(uint256,address)",
            Self::Extended => "ArkivEntityBTLExtended(uint256,address,uint256,uint256,uint256)",
            Self::OwnerChanged => "ArkivEntityOwnerChanged(uint256,address,address)",
            Self::Expired => "ArkivEntityExpired(uint256,address)",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| Error::UnknownEventKind(s.to_string()))
    }
}

/// Kind-specific data carried by a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    Created {
        owner: Address,
        expiration_block: BlockNumber,
        cost: u128,
    },
    Updated {
        owner: Address,
        old_expiration_block: BlockNumber,
        new_expiration_block: BlockNumber,
        cost: u128,
    },
    Deleted {
        owner: Address,
    },
    Extended {
        owner: Address,
        old_expiration_block: BlockNumber,
        new_expiration_block: BlockNumber,
        cost: u128,
    },
    OwnerChanged {
        old_owner: Address,
        new_owner: Address,
    },
    Expired {
        owner: Address,
    },
}

impl EventPayload {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::Updated { .. } => EventKind::Updated,
            Self::Deleted { .. } => EventKind::Deleted,
            Self::Extended { .. } => EventKind::Extended,
            Self::OwnerChanged { .. } => EventKind::OwnerChanged,
            Self::Expired { .. } => EventKind::Expired,
        }
    }
}

/// A decoded change to one entity, positioned on the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// The entity that changed.
    pub key: EntityKey,
    /// Block that contains the emitting transaction.
    pub block_number: BlockNumber,
    /// Transaction that emitted the log.
    pub tx_hash: TxHash,
    /// Position of the log within its block.
    pub log_index: u64,
    pub payload: EventPayload,
}

impl LifecycleEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Chain position used to order and deduplicate events.
    #[must_use]
    pub const fn position(&self) -> (BlockNumber, u64) {
        (self.block_number, self.log_index)
    }
}
