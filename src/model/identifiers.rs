//! Core identifier newtypes with smart constructors.
//!
//! Numeric identifiers are assigned by the store (or by the sender for staged
//! items) and are never interpreted. String identifiers validate non-empty
//! input at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identity of an item. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    /// Wrap a raw store identifier.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Conversation (thread) identity a controller is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Wrap a raw thread identifier.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Locally assigned temporary key for a staged (not yet durable) item.
///
/// Supplied by the sender so it can later release the staged entry if the send
/// is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageKey(u64);

impl StageKey {
    /// Wrap a raw temporary key.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw key.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

/// Author of an item (a contact or group member identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthorId(String);

impl AuthorId {
    /// Smart constructor: validates non-empty author ID
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidAuthorId> {
        let raw = raw.into();
        if raw.is_empty() {
            Err(InvalidAuthorId::Empty)
        } else {
            Ok(Self(raw))
        }
    }

    /// Borrow the raw author string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AuthorId {
    type Error = InvalidAuthorId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AuthorId> for String {
    fn from(value: AuthorId) -> Self {
        value.0
    }
}

// ===== Error Types =====

/// Rejection reasons for [`AuthorId::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAuthorId {
    /// The author string was empty.
    #[error("Author ID cannot be empty")]
    Empty,
}

// ===== Tests =====
