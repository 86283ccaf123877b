//! Argument parsing and output formatting for the `arkiv` command.

use anyhow::{Context, Result, bail};
use arkiv_client::{
    AttributeKind, AttributeValue, BlockTag, Entity, EventKind, Fields, OrderBy, SortDirection,
};
use serde::Serialize;
use std::collections::BTreeMap;

const FIELD_NAMES: [(&str, Fields); 9] = [
    ("key", Fields::KEY),
    ("attributes", Fields::ATTRIBUTES),
    ("payload", Fields::PAYLOAD),
    ("content_type", Fields::CONTENT_TYPE),
    ("expiration", Fields::EXPIRATION),
    ("owner", Fields::OWNER),
    ("created_at", Fields::CREATED_AT),
    ("last_modified_at", Fields::LAST_MODIFIED_AT),
    ("all", Fields::ALL),
];

/// Parses a comma-separated field list such as `key,attributes`.
pub fn parse_fields(list: &str) -> Result<Fields> {
    let mut fields = Fields::NONE;
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let wanted = name.to_ascii_lowercase();
        let Some((_, flag)) = FIELD_NAMES.iter().find(|(n, _)| *n == wanted) else {
            bail!("unknown field {name:?}");
        };
        fields |= *flag;
    }
    if fields.is_empty() {
        bail!("no fields selected");
    }
    Ok(fields)
}

/// Parses a comma-separated list of event kinds; `all` selects every kind.
pub fn parse_kinds(list: &str) -> Result<Vec<EventKind>> {
    if list.trim().eq_ignore_ascii_case("all") {
        return Ok(EventKind::ALL.to_vec());
    }
    let mut kinds = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind: EventKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        bail!("no event kinds selected");
    }
    Ok(kinds)
}

pub fn parse_block(text: &str) -> Result<BlockTag> {
    text.parse::<BlockTag>()
        .with_context(|| format!("Failed to parse block {text:?}"))
}

/// Parses `name[:int|str][:asc|desc]`. The kind defaults to `int` and the
/// direction to `asc`.
pub fn parse_order(spec: &str) -> Result<OrderBy> {
    let mut parts = spec.split(':').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty());
    let Some(name) = name else {
        bail!("empty sort key");
    };
    let mut kind = AttributeKind::Int;
    let mut direction = SortDirection::Asc;
    for part in parts {
        match part.to_ascii_lowercase().as_str() {
            "int" => kind = AttributeKind::Int,
            "str" => kind = AttributeKind::Str,
            "asc" => direction = SortDirection::Asc,
            "desc" => direction = SortDirection::Desc,
            other => bail!("unknown sort option {other:?} in {spec:?}"),
        }
    }
    Ok(OrderBy::new(name, kind, direction))
}

/// JSON shape of an entity on stdout.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EntityView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// UTF-8 text when the payload is valid UTF-8, `0x` hex otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_block: Option<u64>,
}

impl From<&Entity> for EntityView {
    fn from(entity: &Entity) -> Self {
        Self {
            key: entity.key.map(|k| k.to_string()),
            owner: entity.owner.map(|o| o.to_string()),
            payload: entity.payload.as_ref().map(|bytes| {
                String::from_utf8(bytes.clone())
                    .unwrap_or_else(|_| format!("0x{}", hex::encode(bytes)))
            }),
            content_type: entity.content_type.clone(),
            attributes: entity.attributes.as_ref().map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| {
                        let json = match value {
                            AttributeValue::Int(n) => serde_json::Value::from(*n),
                            AttributeValue::Str(s) => serde_json::Value::from(s.as_str()),
                        };
                        (name.to_string(), json)
                    })
                    .collect()
            }),
            created_at_block: entity.created_at_block,
            last_modified_at_block: entity.last_modified_at_block,
            expires_at_block: entity.expires_at_block,
        }
    }
}
