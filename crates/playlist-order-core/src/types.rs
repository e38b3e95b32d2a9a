use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::KeyError;
use crate::key_space::symbol_index;

/// Identifier of an ordered collection (a playlist).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub Uuid);

/// Identifier of an item (a song) inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(ContainerId);
uuid_id!(ItemId);

/// A lexicographically sortable position key.
///
/// Always non-empty and drawn from the key alphabet, so the derived byte-wise
/// ordering of the underlying string is the item order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderKey(String);

impl OrderKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if let Some(symbol) = raw.chars().find(|c| !c.is_ascii() || symbol_index(*c as u8).is_none()) {
            return Err(KeyError::InvalidSymbol { key: raw, symbol });
        }
        Ok(Self(raw))
    }

    /// Interpret a persisted column value: `NULL` and `''` both mean "unassigned".
    pub fn from_stored(raw: Option<String>) -> Result<Option<Self>, KeyError> {
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => Self::parse(s).map(Some),
        }
    }

    /// Callers guarantee `bytes` is a non-empty run of alphabet symbols.
    pub(crate) fn from_symbols(bytes: Vec<u8>) -> Self {
        debug_assert!(!bytes.is_empty());
        debug_assert!(bytes.iter().all(|b| symbol_index(*b).is_some()));
        // Alphabet symbols are ASCII.
        Self(bytes.into_iter().map(char::from).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<OrderKey> for String {
    fn from(key: OrderKey) -> Self {
        key.0
    }
}

/// One (container, item, key, creation time) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub container: ContainerId,
    pub item: ItemId,
    /// `None` for legacy rows that predate keyed ordering.
    pub key: Option<OrderKey>,
    pub created_at: DateTime<Utc>,
}

impl ItemRef {
    pub fn new(
        container: ContainerId,
        item: ItemId,
        key: Option<OrderKey>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            container,
            item,
            key,
            created_at,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.key.is_none()
    }

    /// Display order: key ascending (unassigned first), then creation time.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.item.cmp(&other.item))
    }

    /// Backfill order: creation time ascending.
    pub fn creation_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.item.cmp(&other.item))
    }
}
