//! Windowed load cache.
//!
//! Holds the contiguous slice `[lo, hi)` of the conversation that is currently
//! materialized and decides which range reads to issue as the viewport moves.
//!
//! # Invariants
//! - The materialized slice never contains a hole: every position in
//!   `[lo, hi)` maps to exactly one item.
//! - A load result is only merged if its ticket is still in flight and the
//!   delivered range abuts or overlaps the slice.
//! - Change-feed mutations shift or trim the slice in place and retire every
//!   in-flight ticket, since their positions no longer mean the same thing.
//! - The slice and the known size always describe one store version, the
//!   [`ChangeSeq`] of the last read or event applied. A read taken at a newer
//!   version is never spliced: it is parked until the change feed catches up.
//!   A read taken at an older version is re-requested.

use crate::config::TimelineConfig;
use crate::model::{InvariantViolation, Item, ItemId};
use crate::store::{ChangeSeq, Direction, LoadBatch, LoadRequest};
use crate::timeline::types::{Position, PositionRange};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Identity of one issued range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    /// Wrap a raw ticket number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ticket number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

/// A read the window wants the store to perform.
pub type IssuedLoad = (LoadTicket, LoadRequest);

/// What happened to a delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The batch was merged; `range` is the set of positions it refreshed.
    Merged {
        /// Positions written by the batch.
        range: PositionRange,
    },
    /// The ticket was no longer in flight; nothing changed.
    Stale,
    /// The batch did not abut the window and was dropped. A read that does
    /// abut has been issued in its place, if there is still a gap to fill.
    Rejected {
        /// Replacement read.
        rerequest: Option<IssuedLoad>,
    },
    /// The store returned no items (the requested range lies past the end).
    Empty,
    /// The batch was read at a version the change feed has not delivered yet.
    /// It was dropped; [`LoadWindow::take_caught_up`] reports when to ask again.
    Deferred,
}

/// How a store read relates to the version the window reflects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Same version; the read can be applied.
    Current,
    /// Newer version; its change events are still on their way.
    Ahead,
    /// Older version; changes applied since then make it stale.
    Behind,
}

/// Contiguous materialized slice of the conversation.
#[derive(Debug)]
pub struct LoadWindow {
    batch_size: usize,
    prefetch_margin: usize,
    max_gap: usize,
    max_window: usize,
    lo: Position,
    items: VecDeque<Item>,
    total_count: Option<usize>,
    focus: Position,
    in_flight: HashMap<LoadTicket, LoadRequest>,
    next_ticket: u64,
    seq: Option<ChangeSeq>,
    parked_until: Option<ChangeSeq>,
}

impl LoadWindow {
    /// Create an empty window.
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            prefetch_margin: config.prefetch_margin,
            max_gap: config.max_gap,
            max_window: config.max_window.max(config.batch_size).max(1),
            lo: Position::NEWEST,
            items: VecDeque::new(),
            total_count: None,
            focus: Position::NEWEST,
            in_flight: HashMap::new(),
            next_ticket: 0,
            seq: None,
            parked_until: None,
        }
    }

    // ===== Queries =====

    /// Materialized positions.
    pub fn loaded_range(&self) -> PositionRange {
        PositionRange::with_len(self.lo, self.items.len())
    }

    /// True when nothing is materialized.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `position`, or `None` when it is not loaded.
    pub fn item_at(&self, position: Position) -> Option<&Item> {
        let offset = position.get().checked_sub(self.lo.get())?;
        self.items.get(offset)
    }

    /// True when `position` is materialized.
    pub fn is_loaded(&self, position: Position) -> bool {
        self.item_at(position).is_some()
    }

    /// Position of a loaded item.
    pub fn position_of(&self, id: ItemId) -> Option<Position> {
        self.items
            .iter()
            .position(|item| item.id() == id)
            .map(|offset| self.lo.saturating_add(offset))
    }

    /// Loaded items with their positions, newest first.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Item)> {
        let lo = self.lo;
        self.items
            .iter()
            .enumerate()
            .map(move |(offset, item)| (lo.saturating_add(offset), item))
    }

    /// Logical size of the conversation, once known.
    pub fn total_count(&self) -> Option<usize> {
        self.total_count
    }

    /// Last anchor passed to [`ensure_loaded`](Self::ensure_loaded).
    pub fn focus(&self) -> Position {
        self.focus
    }

    /// Number of reads awaiting a result.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Store version the slice and the known size reflect.
    pub fn seq(&self) -> Option<ChangeSeq> {
        self.seq
    }

    /// Compare a read taken at `as_of` with the reflected version.
    ///
    /// A window with nothing materialized and no known size accepts any read
    /// that is not older than the last event it saw.
    pub fn consistency(&self, as_of: ChangeSeq) -> Consistency {
        let blank = self.items.is_empty() && self.total_count.is_none();
        match self.seq {
            None => Consistency::Current,
            Some(seq) if as_of < seq => Consistency::Behind,
            Some(_) if blank => Consistency::Current,
            Some(seq) if as_of > seq => Consistency::Ahead,
            Some(_) => Consistency::Current,
        }
    }

    // ===== Commands =====

    /// Check a read taken at `as_of` and adopt its version when it is
    /// [`Consistency::Current`]. A read from the future parks until the feed
    /// catches up (see [`take_caught_up`](Self::take_caught_up)).
    pub fn admit(&mut self, as_of: ChangeSeq) -> Consistency {
        let consistency = self.consistency(as_of);
        match consistency {
            Consistency::Current => self.seq = Some(as_of),
            Consistency::Ahead => self.park(as_of),
            Consistency::Behind => {}
        }
        consistency
    }

    /// Record the logical size reported by a thread snapshot taken at `as_of`.
    /// The size is only applied when the snapshot is admitted.
    pub fn apply_snapshot(&mut self, total: usize, as_of: ChangeSeq) -> Consistency {
        let consistency = self.admit(as_of);
        if consistency == Consistency::Current {
            self.total_count = Some(total);
            self.truncate_to_total();
        }
        consistency
    }

    /// True once, after the window has caught up with everything parked.
    pub fn take_caught_up(&mut self) -> bool {
        match (self.parked_until, self.seq) {
            (Some(until), Some(seq)) if seq >= until => {
                self.parked_until = None;
                true
            }
            _ => false,
        }
    }

    /// Request materialization around `anchor`.
    ///
    /// Returns the read to issue, or `None` when the anchor is already covered
    /// (loaded and away from an unfinished edge, or covered by a read in flight).
    pub fn ensure_loaded(&mut self, anchor: Position) -> Option<IssuedLoad> {
        let anchor = match self.total_count {
            Some(0) => return None,
            Some(total) => anchor.min(Position::new(total - 1)),
            None => anchor,
        };
        self.focus = anchor;

        let request = self.plan_request(anchor)?;
        let request = self.clamp_to_total(request)?;

        let needed = request.range();
        if self
            .in_flight
            .values()
            .any(|pending| pending.range().intersect(&needed).is_some())
        {
            return None;
        }

        Some(self.issue(request))
    }

    /// Merge a delivered batch.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation::BatchOverflow` when the store delivered more
    /// items than the read asked for. The ticket is retired either way.
    pub fn on_load_result(
        &mut self,
        ticket: LoadTicket,
        batch: LoadBatch,
    ) -> Result<MergeOutcome, InvariantViolation> {
        let Some(request) = self.in_flight.remove(&ticket) else {
            debug!(%ticket, "Discarding stale load result");
            return Ok(MergeOutcome::Stale);
        };

        let requested = request.range();
        if batch.items.len() > requested.len() {
            return Err(InvariantViolation::BatchOverflow {
                requested: requested.len(),
                received: batch.items.len(),
            });
        }

        match self.admit(batch.as_of) {
            Consistency::Current => {}
            Consistency::Ahead => {
                debug!(%ticket, as_of = %batch.as_of, seq = ?self.seq, "Parking newer batch");
                return Ok(MergeOutcome::Deferred);
            }
            Consistency::Behind => {
                debug!(%ticket, as_of = %batch.as_of, seq = ?self.seq, "Re-requesting older batch");
                let rerequest = self.clamp_to_total(request).map(|r| self.issue(r));
                return Ok(MergeOutcome::Rejected { rerequest });
            }
        }

        self.total_count = Some(batch.total_count);
        if batch.items.is_empty() {
            self.truncate_to_total();
            return Ok(MergeOutcome::Empty);
        }

        let delivered = PositionRange::with_len(requested.start, batch.items.len());
        if !self.items.is_empty() && !delivered.touches(&self.loaded_range()) {
            debug!(
                %ticket,
                %delivered,
                window = %self.loaded_range(),
                "Rejecting non-abutting batch"
            );
            let rerequest = self.abutting_request_toward(delivered).map(|r| self.issue(r));
            return Ok(MergeOutcome::Rejected { rerequest });
        }

        self.splice(delivered, batch.items);
        self.truncate_to_total();
        self.enforce_max_window();
        debug!(%ticket, %delivered, window = %self.loaded_range(), "Merged load result");

        Ok(MergeOutcome::Merged { range: delivered })
    }

    /// Forget a failed read so the next visibility event re-requests it.
    /// Returns `false` when the ticket was already stale.
    pub fn on_load_failed(&mut self, ticket: LoadTicket) -> bool {
        self.in_flight.remove(&ticket).is_some()
    }

    /// Drop the entire window, the known size, and all in-flight bookkeeping.
    pub fn invalidate(&mut self) {
        self.items.clear();
        self.in_flight.clear();
        self.lo = Position::NEWEST;
        self.total_count = None;
        self.focus = Position::NEWEST;
        self.seq = None;
        self.parked_until = None;
    }

    // ===== Change feed =====

    /// Advance the reflected version to that of a change event.
    ///
    /// Returns `false` when the event is already reflected (a read taken after
    /// it was merged first); the caller must then skip it.
    pub fn record_change(&mut self, seq: ChangeSeq) -> bool {
        if self.seq.is_some_and(|current| seq <= current) {
            debug!(%seq, current = ?self.seq, "Change already reflected");
            return false;
        }
        self.seq = Some(seq);
        true
    }

    /// Account for items inserted at `range`.
    ///
    /// Returns `true` when the materialized slice changed (shifted or split).
    pub fn apply_insert(&mut self, range: PositionRange) -> bool {
        let len = range.len();
        if len == 0 {
            return false;
        }
        self.in_flight.clear();
        self.total_count = self.total_count.map(|t| t + len);
        if self.focus >= range.start {
            self.focus = self.focus.saturating_add(len);
        }

        let loaded = self.loaded_range();
        if self.items.is_empty() || range.start >= loaded.end {
            return false;
        }
        if range.start <= loaded.start {
            self.lo = self.lo.saturating_add(len);
            return true;
        }

        // Insert lands inside the slice: keep the part nearer the focus.
        let split = range.start.get() - self.lo.get();
        if self.focus < range.start {
            self.items.truncate(split);
        } else {
            self.items.drain(..split);
            self.lo = range.start.saturating_add(len);
        }
        true
    }

    /// Account for items removed from `range` (positions before removal).
    ///
    /// Returns `true` when the materialized slice changed.
    pub fn apply_remove(&mut self, range: PositionRange) -> bool {
        let len = range.len();
        if len == 0 {
            return false;
        }
        self.in_flight.clear();
        self.total_count = self.total_count.map(|t| t.saturating_sub(len));
        self.focus = shift_after_remove(self.focus, range);

        let loaded = self.loaded_range();
        if self.items.is_empty() || range.start >= loaded.end {
            return false;
        }

        if let Some(overlap) = range.intersect(&loaded) {
            let from = overlap.start.get() - self.lo.get();
            self.items.drain(from..from + overlap.len());
        }
        let removed_above = range.end.min(loaded.start).get().saturating_sub(range.start.get());
        self.lo = self.lo.saturating_sub(removed_above);
        true
    }

    /// Account for items updated in place at `range`.
    ///
    /// Returns a refresh read when any of them is materialized.
    pub fn apply_update(&mut self, range: PositionRange) -> Option<IssuedLoad> {
        let stale = range.intersect(&self.loaded_range())?;
        Some(self.issue(LoadRequest::older_from(stale.start, stale.len())))
    }

    // ===== Internals =====

    fn park(&mut self, as_of: ChangeSeq) {
        self.parked_until = self.parked_until.max(Some(as_of));
    }

    fn plan_request(&mut self, anchor: Position) -> Option<LoadRequest> {
        if self.items.is_empty() {
            return Some(self.centered_request(anchor));
        }

        let loaded = self.loaded_range();
        if loaded.contains(anchor) {
            let near_newer_edge = anchor.get() - loaded.start.get() < self.prefetch_margin;
            if near_newer_edge && loaded.start > Position::NEWEST {
                return Some(LoadRequest::newer_than(loaded.start, self.batch_size));
            }
            let near_older_edge = loaded.end.get() - anchor.get() <= self.prefetch_margin;
            if near_older_edge && !self.reaches_end() {
                return Some(LoadRequest::older_from(loaded.end, self.batch_size));
            }
            return None;
        }

        if anchor < loaded.start {
            let gap = loaded.start.get() - anchor.get();
            if gap <= self.max_gap {
                return Some(LoadRequest::newer_than(
                    loaded.start,
                    gap + self.prefetch_margin,
                ));
            }
        } else {
            let gap = anchor.get() - loaded.end.get() + 1;
            if gap <= self.max_gap {
                return Some(LoadRequest::older_from(
                    loaded.end,
                    gap + self.prefetch_margin,
                ));
            }
        }

        debug!(%anchor, window = %loaded, "Recentering window");
        self.items.clear();
        self.in_flight.clear();
        self.lo = Position::NEWEST;
        Some(self.centered_request(anchor))
    }

    fn centered_request(&self, anchor: Position) -> LoadRequest {
        let start = anchor.saturating_sub(self.batch_size / 2);
        LoadRequest::older_from(start, self.batch_size)
    }

    fn clamp_to_total(&self, request: LoadRequest) -> Option<LoadRequest> {
        let range = match self.total_count {
            Some(total) => request.range().clamp_end(total),
            None => request.range(),
        };
        if range.is_empty() {
            return None;
        }
        Some(match request.direction {
            Direction::Older => LoadRequest::older_from(range.start, range.len()),
            Direction::Newer => LoadRequest::newer_than(range.end, range.len()),
        })
    }

    fn reaches_end(&self) -> bool {
        self.total_count
            .is_some_and(|total| self.loaded_range().end.get() >= total)
    }

    fn issue(&mut self, request: LoadRequest) -> IssuedLoad {
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.in_flight.insert(ticket, request);
        debug!(%ticket, range = %request.range(), "Issuing load");
        (ticket, request)
    }

    fn abutting_request_toward(&self, target: PositionRange) -> Option<LoadRequest> {
        let loaded = self.loaded_range();
        if target.start >= loaded.end {
            let count = target.end.get() - loaded.end.get();
            self.clamp_to_total(LoadRequest::older_from(loaded.end, count))
        } else if target.end <= loaded.start {
            let count = loaded.start.get() - target.start.get();
            Some(LoadRequest::newer_than(loaded.start, count))
        } else {
            None
        }
    }

    /// Write `fresh` over `delivered`, extending the slice as needed.
    fn splice(&mut self, delivered: PositionRange, fresh: Vec<Item>) {
        if self.items.is_empty() {
            self.lo = delivered.start;
            self.items = fresh.into();
            return;
        }

        let loaded = self.loaded_range();
        let start = loaded.start.min(delivered.start);
        let end = loaded.end.max(delivered.end);
        let mut fresh = fresh.into_iter();
        let mut old = std::mem::take(&mut self.items).into_iter();
        let mut merged = VecDeque::with_capacity(end.get() - start.get());

        for position in PositionRange::new(start, end).positions() {
            let previous = loaded.contains(position).then(|| old.next()).flatten();
            let replacement = delivered.contains(position).then(|| fresh.next()).flatten();
            if let Some(item) = replacement.or(previous) {
                merged.push_back(item);
            }
        }

        self.lo = start;
        self.items = merged;
    }

    fn truncate_to_total(&mut self) {
        let Some(total) = self.total_count else {
            return;
        };
        let keep = total.saturating_sub(self.lo.get());
        if self.items.len() > keep {
            self.items.truncate(keep);
        }
        if self.items.is_empty() {
            self.lo = Position::NEWEST;
        }
    }

    fn enforce_max_window(&mut self) {
        let excess = self.items.len().saturating_sub(self.max_window);
        if excess == 0 {
            return;
        }
        let loaded = self.loaded_range();
        let from_newer = self.focus.get().saturating_sub(loaded.start.get());
        let from_older = loaded.end.get().saturating_sub(self.focus.get());
        if from_newer < from_older {
            self.items.truncate(self.max_window);
        } else {
            self.items.drain(..excess);
            self.lo = self.lo.saturating_add(excess);
        }
        debug!(trimmed = excess, window = %self.loaded_range(), "Trimmed window");
    }
}

/// Where `position` ends up after `range` is removed. Positions inside the
/// removed range collapse onto its start.
pub(crate) fn shift_after_remove(position: Position, range: PositionRange) -> Position {
    if position >= range.end {
        position.saturating_sub(range.len())
    } else if position >= range.start {
        range.start
    } else {
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorId, ItemKind, ReceivedAt};

    fn config() -> TimelineConfig {
        TimelineConfig {
            batch_size: 40,
            prefetch_margin: 10,
            max_gap: 80,
            max_window: 400,
            ..TimelineConfig::default()
        }
    }

    fn item(id: u64) -> Item {
        Item::new(
            ItemId::new(id),
            AuthorId::new("alice").unwrap(),
            ReceivedAt::from_millis(id as i64),
            ItemKind::Text {
                body: format!("m{id}"),
            },
        )
    }

    /// Batch for `request` from a log of `total` items where the item at
    /// position p has id `1000 + p`.
    fn batch_for(request: &LoadRequest, total: usize) -> LoadBatch {
        let range = request.range().clamp_end(total);
        LoadBatch {
            items: range.positions().map(|p| item(1000 + p.get() as u64)).collect(),
            has_more: range.end.get() < total,
            total_count: total,
            as_of: ChangeSeq::default(),
        }
    }

    fn batch_at(request: &LoadRequest, total: usize, as_of: u64) -> LoadBatch {
        LoadBatch {
            as_of: ChangeSeq::new(as_of),
            ..batch_for(request, total)
        }
    }

    fn window_with_total(total: usize) -> LoadWindow {
        let mut window = LoadWindow::new(&config());
        window.apply_snapshot(total, ChangeSeq::default());
        window
    }

    fn load(window: &mut LoadWindow, anchor: usize, total: usize) -> MergeOutcome {
        let (ticket, request) = window
            .ensure_loaded(Position::new(anchor))
            .expect("a load should be issued");
        window.on_load_result(ticket, batch_for(&request, total)).unwrap()
    }

    fn assert_consistent(window: &LoadWindow) {
        for (position, item) in window.iter() {
            assert_eq!(
                item.id().get(),
                1000 + position.get() as u64,
                "item at {position} is misplaced"
            );
        }
    }

    mod ensure_loaded {
        use super::*;

        #[test]
        fn empty_window_requests_centered_batch() {
            let mut window = window_with_total(500);
            let (_, request) = window.ensure_loaded(Position::new(37)).unwrap();
            assert_eq!(request.range(), PositionRange::with_len(Position::new(17), 40));
            assert!(request.covers(Position::new(37)));
        }

        #[test]
        fn centered_batch_is_clamped_at_newest() {
            let mut window = window_with_total(500);
            let (_, request) = window.ensure_loaded(Position::new(5)).unwrap();
            assert_eq!(request.range().start, Position::NEWEST);
        }

        #[test]
        fn request_is_clamped_to_total() {
            let mut window = window_with_total(10);
            let (_, request) = window.ensure_loaded(Position::NEWEST).unwrap();
            assert_eq!(request.count, 10);
        }

        #[test]
        fn empty_conversation_needs_nothing() {
            let mut window = window_with_total(0);
            assert!(window.ensure_loaded(Position::NEWEST).is_none());
        }

        #[test]
        fn in_flight_read_suppresses_duplicate() {
            let mut window = window_with_total(500);
            assert!(window.ensure_loaded(Position::new(37)).is_some());
            assert!(
                window.ensure_loaded(Position::new(40)).is_none(),
                "the pending read already covers 40"
            );
        }

        #[test]
        fn interior_anchor_needs_nothing() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            assert!(window.ensure_loaded(Position::new(100)).is_none());
        }

        #[test]
        fn anchor_near_older_edge_prefetches() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let loaded = window.loaded_range();
            let (_, request) = window
                .ensure_loaded(loaded.end.saturating_sub(3))
                .unwrap();
            assert_eq!(request.range().start, loaded.end);
        }

        #[test]
        fn anchor_near_newer_edge_prefetches() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let loaded = window.loaded_range();
            let (_, request) = window
                .ensure_loaded(loaded.start.saturating_add(2))
                .unwrap();
            assert_eq!(request.range().end, loaded.start);
        }

        #[test]
        fn no_prefetch_past_the_end() {
            let mut window = window_with_total(30);
            load(&mut window, 0, 30);
            assert_eq!(window.loaded_range().len(), 30);
            assert!(window.ensure_loaded(Position::new(29)).is_none());
        }

        #[test]
        fn nearby_anchor_extends_window() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let loaded = window.loaded_range();
            let (_, request) = window
                .ensure_loaded(loaded.end.saturating_add(20))
                .unwrap();
            assert_eq!(request.range().start, loaded.end, "extension must abut");
            assert!(request.covers(loaded.end.saturating_add(20)));
        }

        #[test]
        fn distant_anchor_recenters() {
            let mut window = window_with_total(5000);
            load(&mut window, 100, 5000);
            let (_, request) = window.ensure_loaded(Position::new(3000)).unwrap();
            assert!(window.is_empty(), "recentering drops the old slice");
            assert!(request.covers(Position::new(3000)));
        }
    }

    mod merge {
        use super::*;

        #[test]
        fn first_batch_defines_window() {
            let mut window = window_with_total(500);
            let outcome = load(&mut window, 37, 500);
            assert_eq!(
                outcome,
                MergeOutcome::Merged {
                    range: PositionRange::with_len(Position::new(17), 40)
                }
            );
            assert!(window.is_loaded(Position::new(37)));
            assert_consistent(&window);
        }

        #[test]
        fn adjacent_batches_extend_contiguously() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let end = window.loaded_range().end;
            load(&mut window, end.get() - 1, 500);
            assert!(window.loaded_range().len() > 40);
            assert_consistent(&window);
        }

        #[test]
        fn unknown_ticket_is_stale() {
            let mut window = window_with_total(500);
            let unknown = batch_for(&LoadRequest::older_from(Position::NEWEST, 5), 500);
            let outcome = window.on_load_result(LoadTicket::new(99), unknown).unwrap();
            assert_eq!(outcome, MergeOutcome::Stale);
            assert!(window.is_empty());
        }

        #[test]
        fn result_after_invalidate_is_stale() {
            let mut window = window_with_total(500);
            let (ticket, request) = window.ensure_loaded(Position::NEWEST).unwrap();
            window.invalidate();
            let outcome = window.on_load_result(ticket, batch_for(&request, 500)).unwrap();
            assert_eq!(outcome, MergeOutcome::Stale);
        }

        #[test]
        fn oversized_batch_is_an_invariant_violation() {
            let mut window = window_with_total(500);
            let (ticket, _) = window.ensure_loaded(Position::NEWEST).unwrap();
            let oversized = batch_for(&LoadRequest::older_from(Position::NEWEST, 60), 500);
            assert_eq!(
                window.on_load_result(ticket, oversized),
                Err(InvariantViolation::BatchOverflow {
                    requested: 40,
                    received: 60
                })
            );
        }

        #[test]
        fn overlapping_batch_replaces_items() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let (ticket, request) = window
                .apply_update(PositionRange::with_len(Position::new(100), 1))
                .unwrap();
            let mut batch = batch_for(&request, 500);
            batch.items[0] = item(1100).with_sent_at(crate::model::SentAt::from_millis(7));
            window.on_load_result(ticket, batch).unwrap();
            assert_eq!(
                window.item_at(Position::new(100)).unwrap().sent_at().as_millis(),
                7,
                "fresh copy wins"
            );
            assert_consistent(&window);
        }

        #[test]
        fn empty_batch_updates_total() {
            let mut window = LoadWindow::new(&config());
            let (ticket, _) = window.ensure_loaded(Position::new(10)).unwrap();
            let outcome = window
                .on_load_result(
                    ticket,
                    LoadBatch {
                        items: Vec::new(),
                        has_more: false,
                        total_count: 0,
                        as_of: ChangeSeq::default(),
                    },
                )
                .unwrap();
            assert_eq!(outcome, MergeOutcome::Empty);
            assert_eq!(window.total_count(), Some(0));
        }

        #[test]
        fn failed_load_can_be_reissued() {
            let mut window = window_with_total(500);
            let (ticket, _) = window.ensure_loaded(Position::new(37)).unwrap();
            assert!(window.on_load_failed(ticket));
            assert!(window.ensure_loaded(Position::new(37)).is_some());
        }

        #[test]
        fn max_window_trims_side_away_from_focus() {
            let mut window = LoadWindow::new(&TimelineConfig {
                max_window: 50,
                ..config()
            });
            window.apply_snapshot(500, ChangeSeq::default());
            load(&mut window, 100, 500);
            let end = window.loaded_range().end;
            load(&mut window, end.get() - 1, 500);
            assert_eq!(window.loaded_range().len(), 50);
            assert!(
                window.is_loaded(window.focus()),
                "the focus must stay materialized"
            );
            assert_consistent(&window);
        }
    }

    mod change_feed {
        use super::*;

        fn loaded_window() -> LoadWindow {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            window
        }

        #[test]
        fn insert_above_window_shifts_it() {
            let mut window = loaded_window();
            let before = window.loaded_range();
            assert!(window.apply_insert(PositionRange::with_len(Position::NEWEST, 2)));
            assert_eq!(window.loaded_range().start, before.start.saturating_add(2));
            assert_eq!(window.total_count(), Some(502));
        }

        #[test]
        fn insert_below_window_changes_nothing() {
            let mut window = loaded_window();
            let before = window.loaded_range();
            assert!(!window.apply_insert(PositionRange::with_len(before.end, 1)));
            assert_eq!(window.loaded_range(), before);
        }

        #[test]
        fn insert_inside_window_keeps_focus_side() {
            let mut window = loaded_window();
            let before = window.loaded_range();
            let split = before.start.saturating_add(5);
            window.apply_insert(PositionRange::with_len(split, 1));
            let after = window.loaded_range();
            assert!(after.contains(window.focus()), "focus side survives");
            assert!(
                !after.contains(split),
                "the unloaded inserted position is never exposed"
            );
        }

        #[test]
        fn mutation_retires_in_flight_reads() {
            let mut window = loaded_window();
            let end = window.loaded_range().end;
            let (ticket, request) = window.ensure_loaded(end.saturating_sub(1)).unwrap();
            window.apply_insert(PositionRange::with_len(Position::NEWEST, 1));
            assert_eq!(
                window.on_load_result(ticket, batch_for(&request, 501)).unwrap(),
                MergeOutcome::Stale
            );
        }

        #[test]
        fn remove_inside_window_compacts() {
            let mut window = loaded_window();
            let before = window.loaded_range();
            let victim = before.start.saturating_add(3);
            let next_id = window.item_at(victim.older()).unwrap().id();
            assert!(window.apply_remove(PositionRange::with_len(victim, 1)));
            assert_eq!(window.loaded_range().len(), before.len() - 1);
            assert_eq!(window.item_at(victim).unwrap().id(), next_id);
        }

        #[test]
        fn remove_above_window_shifts_it_back() {
            let mut window = loaded_window();
            let before = window.loaded_range();
            window.apply_remove(PositionRange::with_len(Position::NEWEST, 1));
            assert_eq!(window.loaded_range().start, before.start.saturating_sub(1));
            assert_eq!(window.loaded_range().len(), before.len());
        }

        #[test]
        fn update_outside_window_needs_no_refresh() {
            let mut window = loaded_window();
            assert!(window
                .apply_update(PositionRange::with_len(Position::new(499), 1))
                .is_none());
        }
    }

    mod versions {
        use super::*;

        #[test]
        fn newer_batch_is_parked_until_feed_catches_up() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);
            let before = window.loaded_range();
            let (ticket, request) = window.ensure_loaded(before.end.saturating_sub(1)).unwrap();

            let outcome = window.on_load_result(ticket, batch_at(&request, 501, 1)).unwrap();

            assert_eq!(outcome, MergeOutcome::Deferred);
            assert_eq!(window.loaded_range(), before, "nothing spliced");
            assert_eq!(window.total_count(), Some(500), "size stays at the applied version");
            assert_eq!(window.in_flight_count(), 0);
            assert!(!window.take_caught_up());

            assert!(window.record_change(ChangeSeq::new(1)));
            window.apply_insert(PositionRange::with_len(Position::NEWEST, 1));
            assert!(window.take_caught_up());
            assert!(!window.take_caught_up(), "reported once");
        }

        #[test]
        fn older_batch_is_requested_again() {
            let mut window = window_with_total(500);
            let (ticket, request) = window.ensure_loaded(Position::new(37)).unwrap();
            assert!(window.record_change(ChangeSeq::new(1)));

            let outcome = window.on_load_result(ticket, batch_at(&request, 500, 0)).unwrap();

            match outcome {
                MergeOutcome::Rejected {
                    rerequest: Some((fresh, again)),
                } => {
                    assert_ne!(fresh, ticket);
                    assert_eq!(again, request);
                }
                other => panic!("expected a re-request, got {other:?}"),
            }
            assert!(window.is_empty());
        }

        #[test]
        fn already_reflected_change_is_skipped() {
            let mut window = LoadWindow::new(&config());
            let (ticket, request) = window.ensure_loaded(Position::NEWEST).unwrap();
            window.on_load_result(ticket, batch_at(&request, 500, 2)).unwrap();

            assert_eq!(window.seq(), Some(ChangeSeq::new(2)));
            assert!(!window.record_change(ChangeSeq::new(1)));
            assert!(!window.record_change(ChangeSeq::new(2)));
            assert!(window.record_change(ChangeSeq::new(3)));
        }

        #[test]
        fn snapshot_from_the_future_is_parked() {
            let mut window = window_with_total(500);
            load(&mut window, 100, 500);

            assert_eq!(window.apply_snapshot(501, ChangeSeq::new(1)), Consistency::Ahead);
            assert_eq!(window.total_count(), Some(500));

            window.record_change(ChangeSeq::new(2));
            assert_eq!(window.apply_snapshot(501, ChangeSeq::new(1)), Consistency::Behind);
            assert!(window.take_caught_up());
        }

        #[test]
        fn blank_window_adopts_any_version_after_the_last_event() {
            let mut window = LoadWindow::new(&config());
            assert!(window.record_change(ChangeSeq::new(3)));

            assert_eq!(window.consistency(ChangeSeq::new(2)), Consistency::Behind);
            assert_eq!(window.consistency(ChangeSeq::new(5)), Consistency::Current);
            assert_eq!(window.apply_snapshot(40, ChangeSeq::new(5)), Consistency::Current);
            assert!(!window.record_change(ChangeSeq::new(4)), "covered by the snapshot");
        }
    }

    mod shift {
        use super::*;

        #[test]
        fn positions_after_removal_move_up() {
            let removed = PositionRange::with_len(Position::new(2), 3);
            assert_eq!(shift_after_remove(Position::new(10), removed), Position::new(7));
            assert_eq!(shift_after_remove(Position::new(1), removed), Position::new(1));
            assert_eq!(shift_after_remove(Position::new(3), removed), Position::new(2));
        }
    }
}
