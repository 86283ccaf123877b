//! Event log layout of the storage processor contract.
//!
//! Every lifecycle log carries the event signature hash in topic 0, the
//! entity key in topic 1 and an owner address in topic 2. The remaining
//! values are packed as 32-byte big-endian words in the data section.

use crate::error::DecodeError;
use crate::node::{LogRecord, Topic};
use arkiv_types::{Address, EntityKey, EventKind, EventPayload, LifecycleEvent};
use sha3::{Digest, Keccak256};
use std::sync::LazyLock;

/// Address of the storage processor that emits lifecycle logs.
pub const STORAGE_ADDRESS: Address = Address::from_bytes([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x61, 0x72, 0x6b, 0x69, 0x76,
]);

const WORD: usize = 32;

/// Keccak-256 of the event's signature, i.e. the topic 0 of its logs.
#[must_use]
pub fn event_topic(kind: EventKind) -> Topic {
    let mut out = [0u8; WORD];
    out.copy_from_slice(&Keccak256::digest(kind.signature().as_bytes()));
    out
}

static KNOWN_TOPICS: LazyLock<[(Topic, EventKind); EventKind::ALL.len()]> =
    LazyLock::new(|| EventKind::ALL.map(|kind| (event_topic(kind), kind)));

/// Maps a topic 0 back to the event kind it identifies.
#[must_use]
pub fn kind_for_topic(topic: &Topic) -> Option<EventKind> {
    KNOWN_TOPICS
        .iter()
        .find(|(known, _)| known == topic)
        .map(|(_, kind)| *kind)
}

/// Number of data words a log of `kind` carries.
const fn data_words(kind: EventKind) -> usize {
    match kind {
        EventKind::Created => 2,
        EventKind::Updated | EventKind::Extended => 3,
        EventKind::Deleted | EventKind::Expired | EventKind::OwnerChanged => 0,
    }
}

/// Decodes one log record into a lifecycle event.
///
/// Pending logs (no block number, hash or index) are rejected.
pub fn decode_log(log: &LogRecord) -> Result<LifecycleEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::MissingTopic0)?;
    let kind = kind_for_topic(topic0)
        .ok_or_else(|| DecodeError::UnknownTopic(format!("0x{}", hex::encode(topic0))))?;
    let label = kind.name();

    let topic = |index: usize| {
        log.topics
            .get(index)
            .ok_or(DecodeError::MissingTopic { kind: label, index })
    };
    let key = EntityKey::from_bytes(*topic(1)?);
    let owner = Address::from_word(topic(2)?);

    let needed = data_words(kind) * WORD;
    if log.data.len() < needed {
        return Err(DecodeError::ShortData {
            kind: label,
            expected: needed,
            actual: log.data.len(),
        });
    }
    let words: Vec<&[u8]> = log.data.chunks_exact(WORD).collect();
    let word = |i: usize| words[i];

    let payload = match kind {
        EventKind::Created => EventPayload::Created {
            owner,
            expiration_block: word_to_u64(word(0), "expiration block")?,
            cost: word_to_u128(word(1), "cost")?,
        },
        EventKind::Updated => EventPayload::Updated {
            owner,
            old_expiration_block: word_to_u64(word(0), "old expiration block")?,
            new_expiration_block: word_to_u64(word(1), "new expiration block")?,
            cost: word_to_u128(word(2), "cost")?,
        },
        EventKind::Extended => EventPayload::Extended {
            owner,
            old_expiration_block: word_to_u64(word(0), "old expiration block")?,
            new_expiration_block: word_to_u64(word(1), "new expiration block")?,
            cost: word_to_u128(word(2), "cost")?,
        },
        EventKind::Deleted => EventPayload::Deleted { owner },
        EventKind::Expired => EventPayload::Expired { owner },
        EventKind::OwnerChanged => EventPayload::OwnerChanged {
            old_owner: owner,
            new_owner: Address::from_word(topic(3)?),
        },
    };

    Ok(LifecycleEvent {
        key,
        block_number: log.block_number.ok_or(DecodeError::MissingField("block number"))?,
        tx_hash: log
            .transaction_hash
            .ok_or(DecodeError::MissingField("transaction hash"))?,
        log_index: log.log_index.ok_or(DecodeError::MissingField("log index"))?,
        payload,
    })
}

/// Builds the log record the storage processor emits for `event`.
///
/// Inverse of [`decode_log`]; in-memory nodes use it to fabricate logs.
#[must_use]
pub fn encode_log(event: &LifecycleEvent) -> LogRecord {
    let kind = event.kind();
    let mut topics = vec![event_topic(kind), *event.key.as_bytes()];
    let mut data = Vec::with_capacity(data_words(kind) * WORD);

    match &event.payload {
        EventPayload::Created {
            owner,
            expiration_block,
            cost,
        } => {
            topics.push(address_word(owner));
            data.extend_from_slice(&u128_word(u128::from(*expiration_block)));
            data.extend_from_slice(&u128_word(*cost));
        }
        EventPayload::Updated {
            owner,
            old_expiration_block,
            new_expiration_block,
            cost,
        }
        | EventPayload::Extended {
            owner,
            old_expiration_block,
            new_expiration_block,
            cost,
        } => {
            topics.push(address_word(owner));
            data.extend_from_slice(&u128_word(u128::from(*old_expiration_block)));
            data.extend_from_slice(&u128_word(u128::from(*new_expiration_block)));
            data.extend_from_slice(&u128_word(*cost));
        }
        EventPayload::Deleted { owner } | EventPayload::Expired { owner } => {
            topics.push(address_word(owner));
        }
        EventPayload::OwnerChanged {
            old_owner,
            new_owner,
        } => {
            topics.push(address_word(old_owner));
            topics.push(address_word(new_owner));
        }
    }

    LogRecord {
        address: STORAGE_ADDRESS,
        topics,
        data,
        block_number: Some(event.block_number),
        transaction_hash: Some(event.tx_hash),
        log_index: Some(event.log_index),
        removed: false,
    }
}

fn address_word(address: &Address) -> Topic {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn u128_word(value: u128) -> Topic {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_to_u128(word: &[u8], field: &'static str) -> Result<u128, DecodeError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow {
            field,
            width: "u128",
        });
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(buf))
}

fn word_to_u64(word: &[u8], field: &'static str) -> Result<u64, DecodeError> {
    let wide = word_to_u128(word, field)?;
    u64::try_from(wide).map_err(|_| DecodeError::Overflow { field, width: "u64" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_types::TxHash;

    fn sample(payload: EventPayload) -> LifecycleEvent {
        LifecycleEvent {
            key: EntityKey::from_bytes([0xaa; 32]),
            block_number: 42,
            tx_hash: TxHash::from_bytes([0xbb; 32]),
            log_index: 3,
            payload,
        }
    }

    #[test]
    fn storage_address_renders() {
        assert_eq!(
            STORAGE_ADDRESS.to_string(),
            "0x00000000000000000000000000000061726b6976"
        );
    }

    #[test]
    fn topics_are_distinct_and_reversible() {
        for kind in EventKind::ALL {
            assert_eq!(kind_for_topic(&event_topic(kind)), Some(kind));
        }
        assert_eq!(kind_for_topic(&[0u8; 32]), None);
    }

    #[test]
    fn decode_created() {
        let owner = Address::from_bytes([0x11; 20]);
        let event = sample(EventPayload::Created {
            owner,
            expiration_block: 1_000,
            cost: 7,
        });
        assert_eq!(decode_log(&encode_log(&event)).unwrap(), event);
    }

    #[test]
    fn decode_owner_changed_reads_topic3() {
        let event = sample(EventPayload::OwnerChanged {
            old_owner: Address::from_bytes([0x01; 20]),
            new_owner: Address::from_bytes([0x02; 20]),
        });
        let log = encode_log(&event);
        assert_eq!(log.topics.len(), 4);
        assert_eq!(decode_log(&log).unwrap(), event);
    }

    #[test]
    fn decode_rejects_short_data() {
        let mut log = encode_log(&sample(EventPayload::Updated {
            owner: Address::from_bytes([0x11; 20]),
            old_expiration_block: 1,
            new_expiration_block: 2,
            cost: 3,
        }));
        log.data.truncate(64);
        assert_eq!(
            decode_log(&log).unwrap_err(),
            DecodeError::ShortData {
                kind: "updated",
                expected: 96,
                actual: 64
            }
        );
    }

    #[test]
    fn decode_rejects_overflowing_block() {
        let mut log = encode_log(&sample(EventPayload::Created {
            owner: Address::from_bytes([0x11; 20]),
            expiration_block: 1,
            cost: 0,
        }));
        log.data[20] = 1;
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::Overflow { width: "u64", .. })
        ));
    }

    #[test]
    fn decode_rejects_pending_log() {
        let mut log = encode_log(&sample(EventPayload::Deleted {
            owner: Address::from_bytes([0x11; 20]),
        }));
        log.block_number = None;
        assert_eq!(
            decode_log(&log).unwrap_err(),
            DecodeError::MissingField("block number")
        );
    }

    #[test]
    fn decode_rejects_unknown_topic() {
        let log = LogRecord {
            topics: vec![[0x99; 32]],
            ..encode_log(&sample(EventPayload::Deleted {
                owner: Address::from_bytes([0x11; 20]),
            }))
        };
        assert!(matches!(decode_log(&log), Err(DecodeError::UnknownTopic(_))));
    }

    #[test]
    fn decode_rejects_missing_key_topic() {
        let mut log = encode_log(&sample(EventPayload::Expired {
            owner: Address::from_bytes([0x11; 20]),
        }));
        log.topics.truncate(1);
        assert_eq!(
            decode_log(&log).unwrap_err(),
            DecodeError::MissingTopic {
                kind: "expired",
                index: 1
            }
        );
    }
}
