//! Entities, typed attributes, and the field-selection mask.

use crate::{Address, EntityKey, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// UTF-8 string attribute.
    Str,
    /// Non-negative integer attribute.
    Int,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("string"),
            Self::Int => f.write_str("integer"),
        }
    }
}

/// An attribute value. Integers are unsigned, so negative values are
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(u64),
}

impl AttributeValue {
    /// Returns the runtime kind of this value.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        match self {
            Self::Str(_) => AttributeKind::Str,
            Self::Int(_) => AttributeKind::Int,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(u64::from(value))
    }
}

/// Attribute map of an entity. Names are unique; iteration is in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces an attribute, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.0.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttributeValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A stored entity as returned by a query.
///
/// Every component is optional: the query's [`Fields`] mask decides which
/// ones the node populates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Option<EntityKey>,
    pub owner: Option<Address>,
    pub payload: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub attributes: Option<Attributes>,
    pub created_at_block: Option<u64>,
    pub last_modified_at_block: Option<u64>,
    pub expires_at_block: Option<u64>,
}

impl Entity {
    /// Looks up an attribute, if attributes were selected.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.as_ref().and_then(|a| a.get(name))
    }

    /// Whether the entity is no longer queryable at `block`.
    ///
    /// Returns `false` when the expiration was not selected.
    #[must_use]
    pub fn is_expired_at(&self, block: u64) -> bool {
        self.expires_at_block.is_some_and(|exp| block > exp)
    }
}

bitflags::bitflags! {
    /// Bit mask selecting which entity components a query returns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Fields: u16 {
        const NONE = 0;
        const KEY = 1 << 0;
        const ATTRIBUTES = 1 << 1;
        const PAYLOAD = 1 << 2;
        const CONTENT_TYPE = 1 << 3;
        const EXPIRATION = 1 << 4;
        const OWNER = 1 << 5;
        const CREATED_AT = 1 << 6;
        const LAST_MODIFIED_AT = 1 << 7;
        const ALL = 0xFF;
    }
}

impl Fields {
    /// Builds a mask from raw bits, rejecting unknown flags.
    pub fn checked(bits: u16) -> Result<Self> {
        Self::from_bits(bits).ok_or(Error::UnknownFields(bits & !Self::all().bits()))
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::ALL
    }
}

impl TryFrom<u16> for Fields {
    type Error = Error;

    fn try_from(bits: u16) -> Result<Self> {
        Self::checked(bits)
    }
}

impl From<Fields> for u16 {
    fn from(fields: Fields) -> Self {
        fields.bits()
    }
}

impl Serialize for Fields {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let bits = u16::deserialize(deserializer)?;
        Self::checked(bits).map_err(serde::de::Error::custom)
    }
}

/// Sort direction for an ORDER BY entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One entry of a query's ORDER BY list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    /// Attribute to sort by.
    pub attribute: String,
    /// Whether the attribute sorts numerically or lexically.
    pub kind: AttributeKind,
    pub direction: SortDirection,
}

impl OrderBy {
    #[must_use]
    pub fn new(attribute: impl Into<String>, kind: AttributeKind, direction: SortDirection) -> Self {
        Self {
            attribute: attribute.into(),
            kind,
            direction,
        }
    }
}
