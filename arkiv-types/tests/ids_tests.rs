use arkiv_types::{Address, Cursor, EntityKey, Error, TxHash};
use std::collections::HashSet;
use std::str::FromStr;

const KEY_HEX: &str = "0x00000000000000000000000000000000000000000000000000000000000000ab";

// ── EntityKey ─────────────────────────────────────────────────────

#[test]
fn entity_key_display_and_parse() {
    let key = EntityKey::parse(KEY_HEX).unwrap();
    assert_eq!(key.to_string(), KEY_HEX);
    assert_eq!(key.as_bytes()[31], 0xab);
}

#[test]
fn entity_key_parse_without_prefix() {
    let key = EntityKey::parse(&KEY_HEX[2..]).unwrap();
    assert_eq!(key.to_string(), KEY_HEX);
}

#[test]
fn entity_key_from_str() {
    let key: EntityKey = EntityKey::from_str(KEY_HEX).unwrap();
    assert_eq!(key, EntityKey::parse(KEY_HEX).unwrap());
}

#[test]
fn entity_key_rejects_wrong_length() {
    let err = EntityKey::parse("0xabcd").unwrap_err();
    assert_eq!(
        err,
        Error::InvalidLength {
            kind: "entity key",
            expected: 32,
            actual: 2
        }
    );
}

#[test]
fn entity_key_rejects_non_hex() {
    let err = EntityKey::parse("0xzz").unwrap_err();
    assert!(matches!(err, Error::InvalidHex { kind: "entity key", .. }));
}

#[test]
fn entity_key_hash_and_eq() {
    let key = EntityKey::from_bytes([7u8; 32]);
    let mut set = HashSet::new();
    set.insert(key);
    set.insert(key);
    assert_eq!(set.len(), 1);
}

#[test]
fn entity_key_debug_names_type() {
    let key = EntityKey::from_bytes([0u8; 32]);
    assert!(format!("{key:?}").starts_with("EntityKey(0x"));
}

#[test]
fn entity_key_serde_is_hex_string() {
    let key = EntityKey::parse(KEY_HEX).unwrap();
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, format!("\"{KEY_HEX}\""));
    let back: EntityKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
}

#[test]
fn entity_key_serde_rejects_garbage() {
    assert!(serde_json::from_str::<EntityKey>("\"0x1234\"").is_err());
}

// ── Address ───────────────────────────────────────────────────────

#[test]
fn address_from_word_takes_low_bytes() {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&[0x11; 20]);
    word[0] = 0xff;
    let addr = Address::from_word(&word);
    assert_eq!(addr.as_bytes(), &[0x11; 20]);
}

#[test]
fn address_parse_mixed_case() {
    let addr = Address::parse("0x00000000000000000000000000000061726B6976").unwrap();
    assert_eq!(addr.to_string(), "0x00000000000000000000000000000061726b6976");
}

#[test]
fn address_rejects_32_bytes() {
    assert!(Address::parse(KEY_HEX).is_err());
}

// ── TxHash / Cursor ───────────────────────────────────────────────

#[test]
fn tx_hash_from_slice() {
    let hash = TxHash::from_slice(&[1u8; 32]).unwrap();
    assert_eq!(hash.as_bytes(), &[1u8; 32]);
    assert!(TxHash::from_slice(&[1u8; 31]).is_err());
}

#[test]
fn cursor_is_opaque_and_verbatim() {
    let cursor = Cursor::new("opaque:token==");
    assert_eq!(cursor.as_str(), "opaque:token==");
    assert_eq!(cursor.to_string(), "opaque:token==");
    assert_eq!(serde_json::to_string(&cursor).unwrap(), "\"opaque:token==\"");
}
