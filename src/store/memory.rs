//! In-memory reference store.
//!
//! Keeps each conversation as a vector ordered oldest first, so Position `p`
//! lives at index `len - 1 - p`. Every mutation bumps the conversation's
//! [`ChangeSeq`] and is published on the change feed to all live subscribers
//! before the write lock is released, so no read observes a version whose event
//! has not been queued yet.

use super::{
    ChangeEvent, ChangeKind, ChangeSeq, Direction, ItemStore, LoadBatch, LoadRequest, Located,
    LookupKey, ReadStateSink, ThreadSnapshot,
};
use crate::model::{Item, ItemId, ReceivedAt, StoreError, ThreadId};
use crate::timeline::types::{Position, PositionRange};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
struct ThreadLog {
    items: Vec<Item>,
    read_watermark: Option<ReceivedAt>,
    last_scrolled: Option<Position>,
    seq: ChangeSeq,
}

impl ThreadLog {
    fn index_of(&self, position: Position) -> Option<usize> {
        self.items.len().checked_sub(position.get() + 1)
    }

    fn position_at(&self, index: usize) -> Position {
        Position::new(self.items.len() - 1 - index)
    }

    fn item_at(&self, position: Position) -> Option<&Item> {
        self.index_of(position).and_then(|i| self.items.get(i))
    }

    /// Position of the newest read item when unread items sit above it.
    fn last_seen_position(&self) -> Option<Position> {
        let watermark = self.read_watermark?;
        let unread = self
            .items
            .iter()
            .rev()
            .take_while(|item| item.received_at() > watermark)
            .count();
        (unread > 0 && unread < self.items.len()).then(|| Position::new(unread))
    }

    /// Index of the oldest item mentioning the local user above the watermark.
    fn oldest_unread_mention(&self) -> Option<usize> {
        self.items.iter().position(|item| {
            item.mentions_self()
                && self.read_watermark.is_none_or(|seen| item.received_at() > seen)
        })
    }
}

/// Thread-safe in-memory [`ItemStore`] and [`ReadStateSink`] with a change feed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    threads: RwLock<HashMap<ThreadId, ThreadLog>>,
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
    failing_loads: AtomicU32,
    watermark_writes: AtomicUsize,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a conversation with items given oldest first.
    pub fn with_thread(self, thread: ThreadId, items: Vec<Item>) -> Self {
        // Fresh store: nothing else can hold the lock yet.
        if let Ok(mut threads) = self.threads.write() {
            self.bump_next_id(&items);
            threads.insert(
                thread,
                ThreadLog {
                    items,
                    ..ThreadLog::default()
                },
            );
        }
        self
    }

    /// Subscribe to the change feed. Receivers that are dropped are pruned on
    /// the next publish.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Allocate an identity for a new item, above every id seen so far.
    pub fn allocate_id(&self) -> ItemId {
        ItemId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Make the next `count` range reads fail with `StoreError::Unavailable`.
    pub fn fail_next_loads(&self, count: u32) {
        self.failing_loads.store(count, Ordering::SeqCst);
    }

    /// Number of watermark writes that actually advanced stored state.
    pub fn watermark_writes(&self) -> usize {
        self.watermark_writes.load(Ordering::SeqCst)
    }

    /// Stored read watermark of a conversation.
    pub fn read_watermark(&self, thread: ThreadId) -> Result<Option<ReceivedAt>, StoreError> {
        self.with_log(thread, |log| log.read_watermark)
    }

    /// Look up an item by identity.
    pub fn item(&self, thread: ThreadId, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.with_log(thread, |log| log.items.iter().find(|item| item.id() == id).cloned())
    }

    /// Receive time of the newest item across all conversations.
    pub fn latest_received_at(&self) -> Option<ReceivedAt> {
        let threads = self.threads.read().ok()?;
        threads
            .values()
            .filter_map(|log| log.items.last().map(Item::received_at))
            .max()
    }

    /// Record the position the user last scrolled to.
    pub fn set_last_scrolled(
        &self,
        thread: ThreadId,
        position: Option<Position>,
    ) -> Result<(), StoreError> {
        self.with_log_mut(thread, |log| log.last_scrolled = position)
    }

    /// Persist a new item, ordered by receive time (after equal timestamps).
    pub fn receive(&self, thread: ThreadId, item: Item) -> Result<ChangeEvent, StoreError> {
        self.bump_next_id(std::slice::from_ref(&item));
        self.with_log_mut(thread, |log| {
            let at = item.received_at();
            let index = log.items.partition_point(|existing| existing.received_at() <= at);
            log.items.insert(index, item);
            let range = PositionRange::with_len(log.position_at(index), 1);
            self.commit(thread, log, ChangeKind::Insert, range)
        })
    }

    /// Delete an item. Returns `None` if it does not exist.
    pub fn remove(&self, thread: ThreadId, id: ItemId) -> Result<Option<ChangeEvent>, StoreError> {
        self.with_log_mut(thread, |log| {
            let index = log.items.iter().position(|item| item.id() == id)?;
            let range = PositionRange::with_len(log.position_at(index), 1);
            log.items.remove(index);
            Some(self.commit(thread, log, ChangeKind::Remove, range))
        })
    }

    /// Replace the content of an existing item in place. Returns `None` if no
    /// item with the same id exists.
    pub fn edit(&self, thread: ThreadId, item: Item) -> Result<Option<ChangeEvent>, StoreError> {
        self.with_log_mut(thread, |log| {
            let index = log.items.iter().position(|existing| existing.id() == item.id())?;
            let range = PositionRange::with_len(log.position_at(index), 1);
            log.items[index] = item;
            Some(self.commit(thread, log, ChangeKind::Update, range))
        })
    }

    /// Current change sequence of a conversation.
    pub fn change_seq(&self, thread: ThreadId) -> Result<ChangeSeq, StoreError> {
        self.with_log(thread, |log| log.seq)
    }

    /// Stamp a mutation already applied to `log` and publish it. Runs under
    /// the write lock.
    fn commit(
        &self,
        thread: ThreadId,
        log: &mut ThreadLog,
        kind: ChangeKind,
        range: PositionRange,
    ) -> ChangeEvent {
        log.seq = log.seq.next();
        let event = ChangeEvent {
            thread,
            kind,
            range,
            seq: log.seq,
        };
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event).is_ok());
        }
        debug!(
            thread = %event.thread,
            kind = ?event.kind,
            range = %event.range,
            seq = %event.seq,
            "Published change"
        );
        event
    }

    fn bump_next_id(&self, items: &[Item]) {
        if let Some(max) = items.iter().map(|item| item.id().get()).max() {
            self.next_id.fetch_max(max, Ordering::SeqCst);
        }
    }

    fn with_log<T>(
        &self,
        thread: ThreadId,
        f: impl FnOnce(&ThreadLog) -> T,
    ) -> Result<T, StoreError> {
        let threads = self.threads.read().map_err(|_| StoreError::Poisoned)?;
        threads
            .get(&thread)
            .map(f)
            .ok_or(StoreError::UnknownThread(thread))
    }

    fn with_log_mut<T>(
        &self,
        thread: ThreadId,
        f: impl FnOnce(&mut ThreadLog) -> T,
    ) -> Result<T, StoreError> {
        let mut threads = self.threads.write().map_err(|_| StoreError::Poisoned)?;
        threads
            .get_mut(&thread)
            .map(f)
            .ok_or(StoreError::UnknownThread(thread))
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ItemStore for MemoryStore {
    fn load_range(&self, thread: ThreadId, request: &LoadRequest) -> Result<LoadBatch, StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable {
                reason: "injected failure".to_string(),
            });
        }

        self.with_log(thread, |log| {
            let total_count = log.items.len();
            let range = request.range().clamp_end(total_count);
            let items = range
                .positions()
                .filter_map(|p| log.item_at(p).cloned())
                .collect();
            let has_more = match request.direction {
                Direction::Older => range.end.get() < total_count,
                Direction::Newer => range.start > Position::NEWEST,
            };
            LoadBatch {
                items,
                has_more,
                total_count,
                as_of: log.seq,
            }
        })
    }

    fn total_count(&self, thread: ThreadId) -> Result<usize, StoreError> {
        self.with_log(thread, |log| log.items.len())
    }

    fn position_of(&self, thread: ThreadId, key: &LookupKey) -> Result<Located, StoreError> {
        self.with_log(thread, |log| {
            let index = match key {
                LookupKey::Item { id } => log.items.iter().position(|item| item.id() == *id),
                LookupKey::AuthorSentAt { author, sent_at } => log
                    .items
                    .iter()
                    .position(|item| item.author() == author && item.sent_at() == *sent_at),
                LookupKey::OldestUnreadMention => log.oldest_unread_mention(),
            };
            Located {
                position: index.map(|i| log.position_at(i)),
                as_of: log.seq,
            }
        })
    }

    fn thread_snapshot(&self, thread: ThreadId) -> Result<ThreadSnapshot, StoreError> {
        self.with_log(thread, |log| ThreadSnapshot {
            total_count: log.items.len(),
            last_seen_position: log.last_seen_position(),
            last_scrolled_position: log.last_scrolled,
            read_watermark: log.read_watermark,
            as_of: log.seq,
        })
    }
}

impl ReadStateSink for MemoryStore {
    fn advance_watermark(&self, thread: ThreadId, at: ReceivedAt) -> Result<(), StoreError> {
        let advanced = self.with_log_mut(thread, |log| {
            if log.read_watermark.is_some_and(|stored| at <= stored) {
                false
            } else {
                log.read_watermark = Some(at);
                true
            }
        })?;
        if advanced {
            self.watermark_writes.fetch_add(1, Ordering::SeqCst);
            debug!(%thread, watermark = %at, "Advanced read watermark");
        }
        Ok(())
    }
}
