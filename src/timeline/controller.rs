//! Timeline controller.
//!
//! Owns the load window, the optimistic overlay, the scroll reconciler, and the
//! read-state tracker for one bound conversation. Every method runs to
//! completion without I/O: store work is queued as [`Effect`]s, presentation
//! work as [`Directive`]s, and results come back through the `on_*` methods.
//!
//! The render sequence composed here is
//! `[header?] ++ [staged items] ++ [positions 0..total] ++ [footer?]`.

use crate::config::TimelineConfig;
use crate::model::{InvariantViolation, Item, ItemId, ReceivedAt, StageKey, StoreError, ThreadId};
use crate::store::{
    ChangeEvent, ChangeKind, LoadBatch, LoadRequest, Located, LookupKey, ThreadSnapshot,
};
use crate::timeline::directive::{Directive, DirectiveQueue};
use crate::timeline::overlay::{OptimisticOverlay, StageHandle, StagedItem};
use crate::timeline::reconciler::{
    Adjustment, IssuedLookup, LookupTicket, ReconcilerState, Resolution, ScrollReconciler,
    Validation, WindowValidator,
};
use crate::timeline::read_state::ReadStateTracker;
use crate::timeline::scroll::{Alignment, LayoutHint, ScrollRequest, ScrollTarget};
use crate::timeline::types::{Position, RenderOffset};
use crate::timeline::visible_range::VisibleRange;
use crate::timeline::window::{
    shift_after_remove, Consistency, LoadTicket, LoadWindow, MergeOutcome,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// First completely visible slot beyond which the scroll-to-bottom button shows.
const SCROLL_BUTTON_THRESHOLD: usize = 4;

/// Content of the slot in front of everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderSlot {
    /// No header slot.
    #[default]
    Empty,
    /// Someone is typing.
    TypingIndicator,
    /// A conversation notice (request banner, safety tip).
    Notice,
}

impl HeaderSlot {
    /// Number of render slots the header occupies.
    pub fn slots(&self) -> usize {
        usize::from(*self != HeaderSlot::Empty)
    }
}

/// What occupies one render offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSlot<'a> {
    /// The header slot.
    Header(HeaderSlot),
    /// A staged item.
    Staged(&'a StagedItem),
    /// A materialized item.
    Item {
        /// Its logical position.
        position: Position,
        /// The item.
        item: &'a Item,
    },
    /// A position that exists but is not materialized.
    Placeholder(Position),
    /// The footer slot after the oldest position.
    Footer,
}

/// Store work requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Read the thread snapshot; answer with [`TimelineController::on_thread_snapshot`].
    Snapshot,
    /// Read a range; answer with [`TimelineController::on_load_result`].
    Load {
        /// Ticket to echo back.
        ticket: LoadTicket,
        /// The read.
        request: LoadRequest,
    },
    /// Locate an item; answer with [`TimelineController::on_lookup_result`].
    Lookup {
        /// Ticket to echo back.
        ticket: LookupTicket,
        /// What to locate.
        key: LookupKey,
    },
    /// Persist a read watermark; answer with
    /// [`TimelineController::on_watermark_stored`] or
    /// [`TimelineController::on_watermark_failed`].
    AdvanceWatermark(ReceivedAt),
}

/// Windowed timeline controller for one conversation.
#[derive(Debug)]
pub struct TimelineController {
    thread: ThreadId,
    config: TimelineConfig,
    window: LoadWindow,
    overlay: OptimisticOverlay,
    reconciler: ScrollReconciler,
    tracker: ReadStateTracker,
    header: HeaderSlot,
    has_footer: bool,
    last_seen: Option<Position>,
    initial_scroll_claimed: bool,
    viewport: Option<VisibleRange>,
    scroll_buttons_visible: bool,
    durable_watermark: Option<ReceivedAt>,
    retry_snapshot: bool,
    retry_lookup: bool,
    snapshot_parked: bool,
    lookup_parked: bool,
    directives: DirectiveQueue,
    effects: Vec<Effect>,
}

impl TimelineController {
    /// Bind a fresh controller to `thread`.
    ///
    /// Queues the snapshot read. With a `start` position the controller jumps
    /// there and highlights it; otherwise the snapshot decides where to open.
    pub fn bind(thread: ThreadId, config: TimelineConfig, start: Option<Position>) -> Self {
        let mut controller = Self {
            thread,
            window: LoadWindow::new(&config),
            tracker: ReadStateTracker::new(config.quiescence),
            config,
            overlay: OptimisticOverlay::new(),
            reconciler: ScrollReconciler::new(),
            header: HeaderSlot::Empty,
            has_footer: false,
            last_seen: None,
            initial_scroll_claimed: false,
            viewport: None,
            scroll_buttons_visible: false,
            durable_watermark: None,
            retry_snapshot: false,
            retry_lookup: false,
            snapshot_parked: false,
            lookup_parked: false,
            directives: DirectiveQueue::default(),
            effects: vec![Effect::Snapshot],
        };
        debug!(%thread, ?start, "Bound timeline controller");

        if let Some(position) = start {
            controller.submit(
                ScrollRequest::to(ScrollTarget::Position { position })
                    .with_hint(LayoutHint::Highlight),
            );
        }
        controller
    }

    /// Tear the binding down. Pending timers and the live scroll request are
    /// dropped without running callbacks.
    pub fn unbind(mut self) {
        self.tracker.cancel();
        self.reconciler.cancel();
        debug!(thread = %self.thread, "Unbound timeline controller");
    }

    // ===== Queries =====

    /// The bound conversation.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// The load window.
    pub fn window(&self) -> &LoadWindow {
        &self.window
    }

    /// The optimistic overlay.
    pub fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    /// The read-state tracker.
    pub fn read_state(&self) -> &ReadStateTracker {
        &self.tracker
    }

    /// State of the live scroll request.
    pub fn scroll_state(&self) -> ReconcilerState {
        self.reconciler.state()
    }

    /// Current header slot.
    pub fn header(&self) -> HeaderSlot {
        self.header
    }

    /// Whether the footer slot is shown.
    pub fn has_footer(&self) -> bool {
        self.has_footer
    }

    /// Position of the newest already-read item, as of the snapshot.
    pub fn last_seen(&self) -> Option<Position> {
        self.last_seen
    }

    /// Whether the scroll-to-bottom button is currently shown.
    pub fn scroll_buttons_visible(&self) -> bool {
        self.scroll_buttons_visible
    }

    /// When [`poll_timers`](Self::poll_timers) next has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.next_deadline()
    }

    /// Render offset of a logical position.
    pub fn render_offset(&self, position: Position) -> RenderOffset {
        RenderOffset::new(self.prefix_len() + position.get())
    }

    /// Number of render slots.
    pub fn render_len(&self) -> usize {
        let positions = self
            .window
            .total_count()
            .unwrap_or_else(|| self.window.loaded_range().end.get());
        self.prefix_len() + positions + usize::from(self.has_footer)
    }

    /// What occupies `offset`, or `None` past the end.
    pub fn slot_at(&self, offset: RenderOffset) -> Option<RenderSlot<'_>> {
        let mut index = offset.get();
        if self.header != HeaderSlot::Empty {
            if index == 0 {
                return Some(RenderSlot::Header(self.header));
            }
            index -= 1;
        }
        if let Some(staged) = self.overlay.get(index) {
            return Some(RenderSlot::Staged(staged));
        }
        index -= self.overlay.staged_count();

        let position = Position::new(index);
        if let Some(item) = self.window.item_at(position) {
            return Some(RenderSlot::Item { position, item });
        }
        match self.window.total_count() {
            Some(total) if index < total => Some(RenderSlot::Placeholder(position)),
            Some(total) if index == total && self.has_footer => Some(RenderSlot::Footer),
            Some(_) => None,
            None => Some(RenderSlot::Placeholder(position)),
        }
    }

    // ===== Outputs =====

    /// Take queued presentation directives.
    pub fn take_directives(&mut self) -> Vec<Directive> {
        self.directives.take()
    }

    /// Take queued store work.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ===== Scroll requests =====

    /// Make `request` the live scroll request, superseding any other.
    ///
    /// Any submission also claims the initial scroll, so a later snapshot does
    /// not move the viewport on its own.
    pub fn submit(&mut self, request: ScrollRequest) {
        self.initial_scroll_claimed = true;
        self.lookup_parked = false;
        if *request.target() == ScrollTarget::Bottom && self.window.total_count() == Some(0) {
            self.land(request, Position::NEWEST);
            return;
        }

        let resolution = self.resolve(request.target());
        match self.reconciler.submit(request, resolution) {
            Some(lookup) => self.queue_lookup(lookup),
            None => self.revalidate(),
        }
    }

    /// Jump to `target` and highlight it. `on_not_found` runs if it no longer
    /// exists.
    pub fn jump_to(&mut self, target: ScrollTarget, on_not_found: impl FnOnce() + Send + 'static) {
        self.submit(
            ScrollRequest::to(target)
                .with_hint(LayoutHint::Highlight)
                .on_invalid(on_not_found),
        );
    }

    // ===== Staged items =====

    /// Show a locally produced item before the store has it.
    ///
    /// Returns `None` when the durable copy is already materialized, in which
    /// case nothing is staged. Staging clears a notice header, forgets the
    /// last-seen marker, and snaps to the bottom.
    ///
    /// # Errors
    ///
    /// Returns an `InvariantViolation` for a duplicate key or item.
    pub fn stage_outgoing(
        &mut self,
        key: StageKey,
        item: Item,
    ) -> Result<Option<StageHandle>, InvariantViolation> {
        if self.window.position_of(item.id()).is_some() {
            debug!(item = %item.id(), "Durable copy already loaded; not staging");
            return Ok(None);
        }

        let handle = self.overlay.stage(key, item)?;
        if self.header == HeaderSlot::Notice {
            self.header = HeaderSlot::Empty;
        }
        self.last_seen = None;
        self.changed_from(RenderOffset::new(0));
        self.submit(ScrollRequest::to(ScrollTarget::Bottom));
        Ok(Some(handle))
    }

    /// Withdraw a staged item whose send was abandoned.
    pub fn release_staged(&mut self, handle: StageHandle) -> Option<StagedItem> {
        let released = self.overlay.release(handle)?;
        self.changed_from(RenderOffset::new(0));
        Some(released)
    }

    // ===== Slots =====

    /// Replace the header slot.
    pub fn set_header(&mut self, header: HeaderSlot) {
        if header == self.header {
            return;
        }
        let shifts = header.slots() != self.header.slots();
        self.header = header;
        if shifts {
            self.changed_from(RenderOffset::new(0));
        } else {
            self.push_changed(RenderOffset::new(0), RenderOffset::new(1));
        }
    }

    /// Show or hide the footer slot.
    pub fn set_footer(&mut self, visible: bool) {
        if visible == self.has_footer {
            return;
        }
        let footer = RenderOffset::new(self.render_len() - usize::from(self.has_footer));
        self.has_footer = visible;
        self.push_changed(footer, RenderOffset::new(footer.get() + 1));
        self.revalidate();
    }

    // ===== Viewport =====

    /// The presentation layer settled on `visible` at `now`.
    ///
    /// Prefetches around both edges, samples read state, updates the scroll
    /// button, and retries work that failed since the last settle.
    pub fn on_viewport_settled(&mut self, visible: VisibleRange, now: Instant) {
        self.viewport = Some(visible);

        if self.retry_snapshot {
            self.retry_snapshot = false;
            self.effects.push(Effect::Snapshot);
        }
        if self.retry_lookup {
            self.retry_lookup = false;
            if let Some(lookup) = self.reconciler.reissue_lookup() {
                self.queue_lookup(lookup);
            }
        }

        if !visible.is_empty() {
            self.request_load(self.position_near(visible.start));
            self.request_load(self.position_near(RenderOffset::new(visible.end.get() - 1)));
        }

        if let Some(watermark) = self.sample_read_state(visible) {
            self.tracker.on_viewport_revealed(watermark, now);
        }

        let show = visible.first_complete.get() > SCROLL_BUTTON_THRESHOLD;
        if show != self.scroll_buttons_visible {
            self.scroll_buttons_visible = show;
            self.directives.push(Directive::ScrollButtons { visible: show });
        }

        self.revalidate();
    }

    /// Fire due timers.
    pub fn poll_timers(&mut self, now: Instant) {
        if let Some(watermark) = self.tracker.poll(now) {
            self.effects.push(Effect::AdvanceWatermark(watermark));
        }
    }

    // ===== Store completions =====

    /// Apply the thread snapshot requested at bind time.
    ///
    /// A snapshot taken at a version the change feed has not delivered yet is
    /// read again once it has; one older than the applied version is read
    /// again right away.
    pub fn on_thread_snapshot(&mut self, snapshot: ThreadSnapshot) {
        match self.window.apply_snapshot(snapshot.total_count, snapshot.as_of) {
            Consistency::Current => {}
            Consistency::Ahead => {
                debug!(thread = %self.thread, as_of = %snapshot.as_of, "Parking newer snapshot");
                self.snapshot_parked = true;
                return;
            }
            Consistency::Behind => {
                debug!(thread = %self.thread, as_of = %snapshot.as_of, "Re-reading stale snapshot");
                self.effects.push(Effect::Snapshot);
                return;
            }
        }
        self.last_seen = snapshot.last_seen_position;
        if let Some(stored) = snapshot.read_watermark {
            self.tracker.seed(stored);
            self.durable_watermark = self.durable_watermark.max(Some(stored));
        }
        debug!(
            thread = %self.thread,
            total = snapshot.total_count,
            last_seen = ?snapshot.last_seen_position,
            "Applied thread snapshot"
        );

        if !self.initial_scroll_claimed {
            self.initial_scroll_claimed = true;
            if snapshot.last_seen_position.is_some() {
                self.submit(
                    ScrollRequest::to(ScrollTarget::LastSeen).with_hint(LayoutHint::AlignEnd),
                );
            } else if let Some(position) = snapshot.last_scrolled_position {
                self.submit(
                    ScrollRequest::to(ScrollTarget::Position { position })
                        .with_hint(LayoutHint::AlignEnd),
                );
            }
        }

        if self.window.is_empty() {
            self.request_load(self.window.focus());
        }
        self.changed_from(RenderOffset::new(0));
        self.revalidate();
    }

    /// The snapshot read failed. It is retried on the next settle.
    pub fn on_snapshot_failed(&mut self, error: &StoreError) {
        warn!(thread = %self.thread, %error, "Thread snapshot failed");
        self.retry_snapshot = true;
    }

    /// Merge a range read delivered at `now`.
    ///
    /// Items refreshed inside the settled viewport are sampled for read state
    /// again, so a reaction arriving on a visible item advances the watermark.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation::BatchOverflow` for an oversized batch.
    pub fn on_load_result(
        &mut self,
        ticket: LoadTicket,
        batch: LoadBatch,
        now: Instant,
    ) -> Result<(), InvariantViolation> {
        match self.window.on_load_result(ticket, batch)? {
            MergeOutcome::Merged { range } => {
                let durable: Vec<ItemId> = range
                    .positions()
                    .filter_map(|p| self.window.item_at(p).map(Item::id))
                    .filter(|id| self.overlay.contains_item(*id))
                    .collect();
                let reconciled = durable
                    .into_iter()
                    .filter(|id| self.overlay.reconcile(*id).is_some())
                    .count();
                let (lo, hi) = (self.render_offset(range.start), self.render_offset(range.end));
                if reconciled > 0 {
                    self.changed_from(RenderOffset::new(0));
                } else {
                    self.push_changed(lo, hi);
                }
                if let Some(visible) = self.viewport.filter(|v| v.start < hi && lo < v.end) {
                    if let Some(watermark) = self.sample_read_state(visible) {
                        self.tracker.on_viewport_revealed(watermark, now);
                    }
                }
                self.revalidate();
            }
            MergeOutcome::Rejected { rerequest } => {
                if let Some((ticket, request)) = rerequest {
                    self.effects.push(Effect::Load { ticket, request });
                }
            }
            MergeOutcome::Empty => {
                self.changed_from(RenderOffset::new(0));
                self.revalidate();
            }
            MergeOutcome::Deferred | MergeOutcome::Stale => {}
        }
        Ok(())
    }

    /// A range read failed. The window keeps showing placeholders and the next
    /// settle re-requests the range.
    pub fn on_load_failed(&mut self, ticket: LoadTicket, error: &StoreError) {
        if self.window.on_load_failed(ticket) {
            warn!(thread = %self.thread, %ticket, %error, "Load failed");
        }
    }

    /// Apply the store's answer to a position lookup.
    ///
    /// An answer from a version the change feed has not delivered yet waits
    /// for it and is then asked again; a stale one is asked again right away.
    pub fn on_lookup_result(&mut self, ticket: LookupTicket, located: Located) {
        if self.reconciler.is_awaiting(ticket) {
            match self.window.admit(located.as_of) {
                Consistency::Current => {}
                Consistency::Ahead => {
                    debug!(%ticket, as_of = %located.as_of, "Parking newer lookup");
                    self.lookup_parked = true;
                    return;
                }
                Consistency::Behind => {
                    debug!(%ticket, as_of = %located.as_of, "Re-issuing stale lookup");
                    if let Some(lookup) = self.reconciler.reissue_lookup() {
                        self.queue_lookup(lookup);
                    }
                    return;
                }
            }
        }
        let adjustment = self.reconciler.on_lookup_result(ticket, located.position);
        self.apply_adjustment(adjustment);
        self.revalidate();
    }

    /// A lookup failed. It is re-issued on the next settle.
    pub fn on_lookup_failed(&mut self, ticket: LookupTicket, error: &StoreError) {
        warn!(thread = %self.thread, %ticket, %error, "Lookup failed");
        if self.reconciler.state() == ReconcilerState::Resolving {
            self.retry_lookup = true;
        }
    }

    /// A watermark write succeeded.
    pub fn on_watermark_stored(&mut self, watermark: ReceivedAt) {
        self.durable_watermark = self.durable_watermark.max(Some(watermark));
    }

    /// A watermark write failed. The value is re-queued and written after the
    /// next visibility sample.
    pub fn on_watermark_failed(&mut self, watermark: ReceivedAt, error: &StoreError) {
        warn!(thread = %self.thread, %watermark, %error, "Watermark write failed");
        self.tracker.restore(watermark, self.durable_watermark);
    }

    // ===== Change feed =====

    /// Apply a change-feed notification from the store.
    ///
    /// Events already reflected by a read merged earlier are skipped. Reads
    /// parked for being ahead of the feed are issued again once it catches up.
    pub fn on_external_mutation(&mut self, event: ChangeEvent) {
        if event.thread != self.thread {
            debug!(thread = %event.thread, "Ignoring change for another thread");
            return;
        }
        if !self.window.record_change(event.seq) {
            return;
        }
        let was_at_bottom = self.is_at_bottom();

        let adjustment = match event.kind {
            ChangeKind::Insert => {
                self.window.apply_insert(event.range);
                if let Some(seen) = self.last_seen.as_mut() {
                    if *seen >= event.range.start {
                        *seen = seen.saturating_add(event.range.len());
                    }
                }
                self.changed_from(self.render_offset(event.range.start));
                self.reconciler.on_insert(event.range)
            }
            ChangeKind::Remove => {
                self.window.apply_remove(event.range);
                self.last_seen = self
                    .last_seen
                    .filter(|seen| !event.range.contains(*seen))
                    .map(|seen| shift_after_remove(seen, event.range));
                self.changed_from(self.render_offset(event.range.start));
                self.reconciler.on_remove(event.range)
            }
            ChangeKind::Update => {
                if let Some((ticket, request)) = self.window.apply_update(event.range) {
                    self.effects.push(Effect::Load { ticket, request });
                }
                Adjustment::None
            }
        };
        self.apply_adjustment(adjustment);

        let pin = event.kind == ChangeKind::Insert
            && event.range.start == Position::NEWEST
            && was_at_bottom
            && self.reconciler.is_idle();
        if pin {
            self.submit(ScrollRequest::to(ScrollTarget::Bottom));
        }

        if event.kind != ChangeKind::Update {
            self.reload_viewport();
        }
        if self.window.take_caught_up() {
            self.resume_parked();
        }
        self.revalidate();
    }

    // ===== Internals =====

    fn prefix_len(&self) -> usize {
        self.header.slots() + self.overlay.staged_count()
    }

    /// Position for an offset, with header and staged slots mapped onto the
    /// newest position.
    fn position_near(&self, offset: RenderOffset) -> Position {
        Position::new(offset.get().saturating_sub(self.prefix_len()))
    }

    fn is_at_bottom(&self) -> bool {
        self.viewport
            .is_some_and(|v| v.first_complete <= self.render_offset(Position::NEWEST))
    }

    fn resolve(&self, target: &ScrollTarget) -> Resolution {
        let known = |position: Position| Resolution::Known {
            position,
            track_identity: target.tracks_identity(),
        };
        match target {
            ScrollTarget::Position { position } => known(*position),
            ScrollTarget::Bottom => known(Position::NEWEST),
            ScrollTarget::LastSeen => match self.last_seen {
                Some(position) => known(position),
                None => self.resolve(&ScrollTarget::Bottom),
            },
            ScrollTarget::Item { id } => match self.window.position_of(*id) {
                Some(position) => known(position),
                None => Resolution::Lookup(LookupKey::Item { id: *id }),
            },
            ScrollTarget::AuthorSentAt { author, sent_at } => {
                let loaded = self
                    .window
                    .iter()
                    .find(|(_, item)| item.author() == author && item.sent_at() == *sent_at);
                match loaded {
                    Some((position, _)) => known(position),
                    None => Resolution::Lookup(LookupKey::AuthorSentAt {
                        author: author.clone(),
                        sent_at: *sent_at,
                    }),
                }
            }
            ScrollTarget::NextUnreadMention => Resolution::Lookup(LookupKey::OldestUnreadMention),
        }
    }

    fn revalidate(&mut self) {
        let validator = WindowValidator::new(&self.window, self.has_footer);
        match self.reconciler.validate(&validator) {
            Validation::Idle | Validation::Resolving => {}
            Validation::Waiting(position) => self.request_load(position),
            Validation::Scrolled { request, position } => self.land(request, position),
            Validation::Invalid(request) => self.not_found(request),
        }
    }

    fn apply_adjustment(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::None => {}
            Adjustment::Track(position) => self.request_load(position),
            Adjustment::Relookup(lookup) => {
                self.lookup_parked = false;
                self.queue_lookup(lookup);
            }
            Adjustment::Invalidated(request) => self.not_found(request),
        }
    }

    fn land(&mut self, request: ScrollRequest, position: Position) {
        let offset = if *request.target() == ScrollTarget::Bottom {
            RenderOffset::new(0)
        } else {
            self.render_offset(position)
        };
        let already_visible = self.viewport.is_some_and(|v| v.contains(offset));

        match request.hint() {
            LayoutHint::Snap => self.move_viewport(offset, Alignment::Start),
            LayoutHint::AlignEnd => self.move_viewport(offset, Alignment::End),
            LayoutHint::Highlight => {
                if !already_visible {
                    let anchor = Alignment::Fraction(self.config.scroll_anchor_fraction);
                    self.move_viewport(offset, anchor);
                }
                self.directives.push(Directive::Pulse { offset });
            }
        }
        debug!(scroll_target = %request.target(), %offset, "Scroll request landed");
        request.complete(offset);
    }

    fn not_found(&mut self, request: ScrollRequest) {
        debug!(scroll_target = %request.target(), "Scroll target not found");
        self.directives.push(Directive::NotFound);
        request.invalidate();
    }

    fn move_viewport(&mut self, offset: RenderOffset, alignment: Alignment) {
        let threshold = self.config.scroll_animation_threshold;
        let animate = self
            .viewport
            .is_some_and(|v| v.first_complete.distance(offset) < threshold);
        self.directives.push(Directive::MoveViewport {
            offset,
            alignment,
            animate,
        });
    }

    fn request_load(&mut self, anchor: Position) {
        if let Some((ticket, request)) = self.window.ensure_loaded(anchor) {
            self.effects.push(Effect::Load { ticket, request });
        }
    }

    fn reload_viewport(&mut self) {
        if let Some(visible) = self.viewport.filter(|v| !v.is_empty()) {
            self.request_load(self.position_near(visible.start));
            self.request_load(self.position_near(RenderOffset::new(visible.end.get() - 1)));
        }
    }

    /// The feed caught up with reads parked for being ahead of it.
    fn resume_parked(&mut self) {
        debug!(thread = %self.thread, seq = ?self.window.seq(), "Feed caught up; re-reading");
        if std::mem::take(&mut self.snapshot_parked) {
            self.effects.push(Effect::Snapshot);
        }
        if std::mem::take(&mut self.lookup_parked) {
            if let Some(lookup) = self.reconciler.reissue_lookup() {
                self.queue_lookup(lookup);
            }
        }
        self.request_load(self.window.focus());
        self.reload_viewport();
    }

    fn queue_lookup(&mut self, (ticket, key): IssuedLookup) {
        self.effects.push(Effect::Lookup { ticket, key });
    }

    fn sample_read_state(&self, visible: VisibleRange) -> Option<ReceivedAt> {
        if self.window.total_count() == Some(0) {
            return None;
        }
        let newest = visible.start.max(self.render_offset(Position::NEWEST));
        if !visible.contains(newest) {
            return None;
        }
        match self.slot_at(newest)? {
            RenderSlot::Item { item, .. } => Some(item.read_watermark()),
            RenderSlot::Header(_)
            | RenderSlot::Staged(_)
            | RenderSlot::Placeholder(_)
            | RenderSlot::Footer => None,
        }
    }

    fn push_changed(&mut self, lo: RenderOffset, hi: RenderOffset) {
        if lo < hi {
            self.directives.push(Directive::RangeChanged { lo, hi });
        }
    }

    fn changed_from(&mut self, lo: RenderOffset) {
        let hi = RenderOffset::new(self.render_len().max(lo.get()));
        self.push_changed(lo, hi);
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
