//! Item store boundary.
//!
//! The timeline core never talks to a database directly. It consumes the narrow
//! traits defined here:
//! - [`ItemStore`] for range reads, counts, and position lookups
//! - [`ReadStateSink`] for persisting read watermarks
//! - [`ChangeEvent`] values from the store's change feed
//!
//! Every read and every change-feed event carries the per-thread
//! [`ChangeSeq`] it reflects. A store whose log can change while it is bound
//! must bump the sequence on each mutation and deliver every event, in order,
//! through its change feed: the window only merges reads taken at the version
//! it already reflects and waits for the feed to catch up with newer ones.
//! Stores that never mutate can leave every sequence at its default.
//!
//! [`MemoryStore`] is a complete in-process implementation used by the replay
//! tool and the test suites. [`fixture`] loads JSONL conversation logs into it.

use crate::model::{AuthorId, Item, ItemId, ReceivedAt, SentAt, StoreError, ThreadId};
use crate::timeline::types::{Position, PositionRange};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod fixture;
pub mod memory;

pub use fixture::{load_fixture, parse_item_line, process_lines, FixtureLoad};
pub use memory::MemoryStore;

/// Per-thread change sequence number. Bumped once for every mutation the
/// change feed reports; `0` is the version before any mutation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangeSeq(u64);

impl ChangeSeq {
    /// Wrap a raw sequence number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw sequence number.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The sequence number after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ChangeSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction a range read extends from its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Toward older items: `[anchor, anchor + count)`.
    Older,
    /// Toward newer items: `[anchor - count, anchor)`, clamped at the newest.
    Newer,
}

/// A range read issued by the load window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Position the read starts from.
    pub anchor: Position,
    /// Which way the read extends.
    pub direction: Direction,
    /// Maximum number of items.
    pub count: usize,
}

impl LoadRequest {
    /// Read `count` items starting at `anchor` toward older items.
    pub fn older_from(anchor: Position, count: usize) -> Self {
        Self {
            anchor,
            direction: Direction::Older,
            count,
        }
    }

    /// Read up to `count` items strictly newer than `anchor`.
    pub fn newer_than(anchor: Position, count: usize) -> Self {
        Self {
            anchor,
            direction: Direction::Newer,
            count,
        }
    }

    /// Positions this request covers.
    pub fn range(&self) -> PositionRange {
        match self.direction {
            Direction::Older => PositionRange::with_len(self.anchor, self.count),
            Direction::Newer => {
                PositionRange::new(self.anchor.saturating_sub(self.count), self.anchor)
            }
        }
    }

    /// True when the request covers `position`.
    pub fn covers(&self, position: Position) -> bool {
        self.range().contains(position)
    }
}

/// Result of a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBatch {
    /// Items in position order (newest first). May be shorter than requested
    /// when the log ends.
    pub items: Vec<Item>,
    /// True when more items exist beyond the far end of the read.
    pub has_more: bool,
    /// Logical size of the conversation at read time.
    pub total_count: usize,
    /// Version of the log the read observed.
    pub as_of: ChangeSeq,
}

/// Identity used to locate an item's current position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LookupKey {
    /// Store-assigned identity.
    Item {
        /// The item to locate.
        id: ItemId,
    },
    /// Author plus send time, as carried by quotes and mentions.
    AuthorSentAt {
        /// Author of the item.
        author: AuthorId,
        /// The author's send time.
        sent_at: SentAt,
    },
    /// Oldest item that mentions the local user and is newer than the stored
    /// read watermark.
    OldestUnreadMention,
}

/// Answer to a position lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Current position, or `None` if nothing matches.
    pub position: Option<Position>,
    /// Version of the log the lookup observed.
    pub as_of: ChangeSeq,
}

/// Conversation metadata read once when a controller binds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// Logical size.
    pub total_count: usize,
    /// Position of the newest item already read, if older unread items exist above it.
    pub last_seen_position: Option<Position>,
    /// Position the user had scrolled to when the conversation was last closed.
    pub last_scrolled_position: Option<Position>,
    /// Stored read watermark.
    pub read_watermark: Option<ReceivedAt>,
    /// Version of the log the snapshot observed.
    pub as_of: ChangeSeq,
}

/// Kind of change reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// New items now occupy the range; older items shifted by its length.
    Insert,
    /// Items in the range were deleted; older items shifted back.
    Remove,
    /// Items in the range changed content in place.
    Update,
}

/// One change-feed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Conversation the change belongs to.
    pub thread: ThreadId,
    /// What happened.
    pub kind: ChangeKind,
    /// Affected positions (for removals: positions before the removal).
    pub range: PositionRange,
    /// Version of the log right after this change.
    pub seq: ChangeSeq,
}

/// Read access to the persistent, append-and-insert-anywhere message log.
///
/// Implementations are called from the runtime's worker thread, never from the
/// controller's sequential context.
pub trait ItemStore: Send + Sync {
    /// Read a range of items.
    fn load_range(&self, thread: ThreadId, request: &LoadRequest) -> Result<LoadBatch, StoreError>;

    /// Logical size of the conversation.
    fn total_count(&self, thread: ThreadId) -> Result<usize, StoreError>;

    /// Current position of an item. The position is `None` if it no longer
    /// exists.
    fn position_of(&self, thread: ThreadId, key: &LookupKey) -> Result<Located, StoreError>;

    /// Metadata read once per binding. Stores without read-state metadata get
    /// a snapshot carrying only the count.
    fn thread_snapshot(&self, thread: ThreadId) -> Result<ThreadSnapshot, StoreError> {
        Ok(ThreadSnapshot {
            total_count: self.total_count(thread)?,
            ..ThreadSnapshot::default()
        })
    }
}

/// Persists read watermarks.
///
/// Must be idempotent: writes are at-least-once, and a timestamp at or below the
/// stored one is a no-op.
pub trait ReadStateSink: Send + Sync {
    /// Record that everything up to `at` has been seen.
    fn advance_watermark(&self, thread: ThreadId, at: ReceivedAt) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_request_covers_anchor_and_beyond() {
        let request = LoadRequest::older_from(Position::new(20), 40);
        assert_eq!(
            request.range(),
            PositionRange::new(Position::new(20), Position::new(60))
        );
        assert!(request.covers(Position::new(37)));
    }

    #[test]
    fn newer_request_excludes_anchor() {
        let request = LoadRequest::newer_than(Position::new(20), 5);
        assert_eq!(
            request.range(),
            PositionRange::new(Position::new(15), Position::new(20))
        );
        assert!(!request.covers(Position::new(20)));
    }

    #[test]
    fn newer_request_clamps_at_newest() {
        let request = LoadRequest::newer_than(Position::new(3), 10);
        assert_eq!(
            request.range(),
            PositionRange::new(Position::NEWEST, Position::new(3))
        );
    }

    #[test]
    fn lookup_key_serializes_with_tag() {
        let key = LookupKey::Item { id: ItemId::new(9) };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"by":"item","id":9}"#);
    }

    #[test]
    fn unread_mention_key_has_no_payload() {
        let json = serde_json::to_string(&LookupKey::OldestUnreadMention).unwrap();
        assert_eq!(json, r#"{"by":"oldest_unread_mention"}"#);
    }

    #[test]
    fn change_seq_orders_and_advances() {
        let first = ChangeSeq::default();
        assert_eq!(first.next(), ChangeSeq::new(1));
        assert!(first < first.next());
        assert_eq!(ChangeSeq::new(7).to_string(), "#7");
    }
}
