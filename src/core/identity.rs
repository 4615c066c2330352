//! Identity atoms.
//!
//! AttrKey: attribute key, case-normalized
//! CollectionName: tag collection name (same rules as AttrKey)
//! TxnId: in-flight sync transaction identifier

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidKey};

/// Maximum length of an attribute key or collection name.
pub const MAX_KEY_LEN: usize = 30;

fn validate_key(raw: &str, kind: &'static str) -> Result<String, CoreError> {
    if raw.is_empty() {
        return Err(InvalidKey {
            kind,
            raw: raw.to_string(),
            reason: "empty".into(),
        }
        .into());
    }
    if raw.len() > MAX_KEY_LEN {
        return Err(InvalidKey {
            kind,
            raw: raw.to_string(),
            reason: format!("longer than {} chars", MAX_KEY_LEN),
        }
        .into());
    }
    for c in raw.bytes() {
        if !c.is_ascii_alphanumeric() && c != b'_' {
            return Err(InvalidKey {
                kind,
                raw: raw.to_string(),
                reason: "contains character outside [a-zA-Z0-9_]".into(),
            }
            .into());
        }
    }
    Ok(raw.to_ascii_lowercase())
}

/// Attribute key - `[a-zA-Z0-9_]{1,30}`, stored lowercase.
///
/// Keys are unique within a snapshot; insertion order is irrelevant.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttrKey(String);

impl AttrKey {
    /// Parse and canonicalize an attribute key.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Ok(Self(validate_key(s, "attribute key")?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttrKey({:?})", self.0)
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AttrKey {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        AttrKey::parse(&s)
    }
}

impl From<AttrKey> for String {
    fn from(k: AttrKey) -> String {
        k.0
    }
}

/// Tag collection name.
///
/// Collections live in the attribute namespace (an ARRAY-typed attribute),
/// so the rules are identical to AttrKey. Kept as its own newtype for
/// signature clarity at the tag-facing surface.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Ok(Self(validate_key(s, "collection name")?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_key(self) -> AttrKey {
        AttrKey(self.0)
    }

    pub fn as_key(&self) -> AttrKey {
        AttrKey(self.0.clone())
    }
}

impl fmt::Debug for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionName({:?})", self.0)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CollectionName {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        CollectionName::parse(&s)
    }
}

impl From<CollectionName> for String {
    fn from(c: CollectionName) -> String {
        c.0
    }
}

impl From<CollectionName> for AttrKey {
    fn from(c: CollectionName) -> AttrKey {
        AttrKey(c.0)
    }
}

/// Sync transaction identifier.
///
/// Stamped when a changed snapshot is persisted; cleared once the remote
/// acknowledges the exchange.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidKey {
                kind: "txn id",
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({:?})", self.0)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
