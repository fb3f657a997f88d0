//! Timeline item records.
//!
//! Items are opaque payloads to the timeline core apart from their identity,
//! their timestamps, and their reactions (which feed the read watermark).

use super::identifiers::{AuthorId, ItemId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time the store received an item, in milliseconds since the Unix epoch.
///
/// Orders the log and backs "read up to" comparisons.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReceivedAt(i64);

impl ReceivedAt {
    /// Wrap a raw millisecond timestamp.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Convert from a chrono timestamp.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    /// Raw milliseconds since the epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Convert to a chrono timestamp, if representable.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl fmt::Display for ReceivedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_datetime() {
            Some(at) => write!(f, "{}", at.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Time the author sent an item, in milliseconds since the Unix epoch.
///
/// Together with the author this identifies a quoted or mentioned message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SentAt(i64);

impl SentAt {
    /// Wrap a raw millisecond timestamp.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Convert from a chrono timestamp.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    /// Raw milliseconds since the epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

/// A reaction attached to an item. Reactions arriving later than the item
/// advance the read watermark on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Who reacted.
    pub author: AuthorId,
    /// When the reaction was received.
    pub received_at: ReceivedAt,
}

/// Closed set of item bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    /// Plain text message.
    Text {
        /// Message body.
        body: String,
    },
    /// Message carrying attachments.
    Media {
        /// Optional caption.
        caption: Option<String>,
        /// Number of attachments.
        attachments: u32,
    },
    /// In-conversation notice (membership change, safety number change, ...).
    Notice {
        /// Notice text.
        text: String,
    },
}

impl ItemKind {
    /// Short human-readable summary of the body.
    pub fn summary(&self) -> &str {
        match self {
            ItemKind::Text { body } => body,
            ItemKind::Media { caption, .. } => caption.as_deref().unwrap_or("[media]"),
            ItemKind::Notice { text } => text,
        }
    }
}

/// A single record of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    author: AuthorId,
    received_at: ReceivedAt,
    sent_at: SentAt,
    kind: ItemKind,
    reactions: Vec<Reaction>,
    #[serde(default)]
    mentions_self: bool,
}

impl Item {
    /// Create an item. `sent_at` defaults to the receive time.
    pub fn new(id: ItemId, author: AuthorId, received_at: ReceivedAt, kind: ItemKind) -> Self {
        Self {
            id,
            author,
            received_at,
            sent_at: SentAt::from_millis(received_at.as_millis()),
            kind,
            reactions: Vec::new(),
            mentions_self: false,
        }
    }

    /// Builder: set the author's send time.
    pub fn with_sent_at(mut self, sent_at: SentAt) -> Self {
        self.sent_at = sent_at;
        self
    }

    /// Builder: replace the body, keeping identity and timestamps.
    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: attach reactions.
    pub fn with_reactions(mut self, reactions: Vec<Reaction>) -> Self {
        self.reactions = reactions;
        self
    }

    /// Builder: mark the item as mentioning the local user.
    pub fn mentioning_self(mut self) -> Self {
        self.mentions_self = true;
        self
    }

    /// Store-assigned identity.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Author of the item.
    pub fn author(&self) -> &AuthorId {
        &self.author
    }

    /// Receive timestamp.
    pub fn received_at(&self) -> ReceivedAt {
        self.received_at
    }

    /// Send timestamp.
    pub fn sent_at(&self) -> SentAt {
        self.sent_at
    }

    /// Item body.
    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Reactions on the item.
    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// True when the item mentions the local user.
    pub fn mentions_self(&self) -> bool {
        self.mentions_self
    }

    /// Latest timestamp this item contributes to the read watermark: the item's
    /// own receive time or its newest reaction, whichever is later.
    pub fn read_watermark(&self) -> ReceivedAt {
        self.reactions
            .iter()
            .map(|r| r.received_at)
            .fold(self.received_at, ReceivedAt::max)
    }
}
