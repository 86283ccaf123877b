//! Block numbers and tags.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Height of a block on the chain.
pub type BlockNumber = u64;

/// A block reference: a concrete height or the current head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    #[default]
    Latest,
    Number(BlockNumber),
}

impl BlockTag {
    /// Returns the concrete height, if any.
    #[must_use]
    pub const fn number(self) -> Option<BlockNumber> {
        match self {
            Self::Latest => None,
            Self::Number(n) => Some(n),
        }
    }
}

impl From<BlockNumber> for BlockTag {
    fn from(n: BlockNumber) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for BlockTag {
    type Err = Error;

    /// Accepts `latest`, a decimal height, or a `0x` hex height.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        let parsed = match trimmed.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed
            .map(Self::Number)
            .map_err(|_| Error::InvalidBlockTag(s.to_string()))
    }
}
