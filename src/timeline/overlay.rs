//! Optimistic overlay of locally staged items.
//!
//! Staged items render in front of Position 0, newest first, until the window
//! materializes the durable copy with the same [`ItemId`] or the sender
//! releases them.

use crate::model::{InvariantViolation, Item, ItemId, StageKey};
use std::collections::VecDeque;
use tracing::debug;

/// An item shown before the store has confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedItem {
    /// Key supplied by the sender.
    pub key: StageKey,
    /// The locally produced item.
    pub item: Item,
}

/// Receipt for a staged item, used to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(StageKey);

impl StageHandle {
    /// Handle for an entry staged under `key`.
    pub fn new(key: StageKey) -> Self {
        Self(key)
    }

    /// The key the entry was staged under.
    pub fn key(&self) -> StageKey {
        self.0
    }
}

/// Ordered set of staged items, newest at the front.
#[derive(Debug, Default)]
pub struct OptimisticOverlay {
    entries: VecDeque<StagedItem>,
}

impl OptimisticOverlay {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `item` in front of everything else.
    ///
    /// # Errors
    ///
    /// Returns an `InvariantViolation` when `key` is still staged or the same
    /// item is already staged under another key.
    pub fn stage(&mut self, key: StageKey, item: Item) -> Result<StageHandle, InvariantViolation> {
        if self.entries.iter().any(|entry| entry.key == key) {
            return Err(InvariantViolation::DuplicateStageKey(key));
        }
        if self.contains_item(item.id()) {
            return Err(InvariantViolation::DuplicateStagedItem(item.id()));
        }
        debug!(%key, item = %item.id(), "Staged item");
        self.entries.push_front(StagedItem { key, item });
        Ok(StageHandle(key))
    }

    /// Remove exactly the entry behind `handle`.
    pub fn release(&mut self, handle: StageHandle) -> Option<StagedItem> {
        let index = self.entries.iter().position(|entry| entry.key == handle.0)?;
        self.entries.remove(index)
    }

    /// Remove the entry whose durable copy has just been materialized.
    pub fn reconcile(&mut self, id: ItemId) -> Option<StagedItem> {
        let index = self.entries.iter().position(|entry| entry.item.id() == id)?;
        let staged = self.entries.remove(index);
        if let Some(staged) = &staged {
            debug!(key = %staged.key, item = %id, "Reconciled staged item");
        }
        staged
    }

    /// Number of staged entries.
    pub fn staged_count(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when an entry carries `id`.
    pub fn contains_item(&self, id: ItemId) -> bool {
        self.entries.iter().any(|entry| entry.item.id() == id)
    }

    /// Entry at `index`, 0 being the newest.
    pub fn get(&self, index: usize) -> Option<&StagedItem> {
        self.entries.get(index)
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &StagedItem> {
        self.entries.iter()
    }
}
