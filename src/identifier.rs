//! Tag identifier type shared by every ingestion source.
//!
//! An identifier is an uppercase hexadecimal string. It is the key used by the
//! rate limiter and the `id` carried by every normalized event, so all sources
//! must produce the same spelling for the same tag.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An uppercase hexadecimal tag identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Build an identifier from characters already known to be uppercase hex.
    pub(crate) fn from_normalized(value: String) -> Self {
        debug_assert!(!value.is_empty());
        debug_assert!(value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F')));
        Self(value)
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of hex characters in the identifier.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; identifiers hold at least one character.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Errors returned when parsing an identifier string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseIdentifierError {
    #[error("invalid identifier: empty")]
    Empty,
    #[error("invalid identifier: '{0}' is not a hex digit")]
    InvalidHex(char),
}

impl FromStr for Identifier {
    type Err = ParseIdentifierError;

    /// Parse an identifier, trimming surrounding whitespace and uppercasing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseIdentifierError::Empty);
        }

        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ParseIdentifierError::InvalidHex(bad));
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}
