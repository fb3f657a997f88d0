//! Deterministic replay driver.
//!
//! Runs a [`TimelineController`] against a [`MemoryStore`] on a virtual clock.
//! Store effects are answered synchronously and change-feed events are drained
//! after every step, so the directive stream depends only on the fixture and
//! the script.

pub mod script;

pub use script::{load_script, parse_script, Step};

use crate::config::TimelineConfig;
use crate::model::{
    AuthorId, InvariantViolation, Item, ItemKind, ReceivedAt, StageKey, ThreadId, TimelineError,
};
use crate::store::{ChangeEvent, ItemStore, MemoryStore, ReadStateSink};
use crate::timeline::{
    Directive, Effect, HeaderSlot, LayoutHint, Position, RenderOffset, ScrollRequest,
    ScrollTarget, StageHandle, TimelineController, VisibleRange,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One directive stamped with the virtual time it was produced at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emitted {
    /// Milliseconds since the replay started.
    pub at_ms: u64,
    /// The directive.
    #[serde(flatten)]
    pub directive: Directive,
}

/// Replay driver over an in-memory store.
#[derive(Debug)]
pub struct Replay {
    store: MemoryStore,
    feed: Receiver<ChangeEvent>,
    config: TimelineConfig,
    controller: Option<TimelineController>,
    origin: Instant,
    elapsed: Duration,
    last_stamp: i64,
    staged: HashMap<StageKey, Item>,
    output: Vec<Emitted>,
}

impl Replay {
    /// Drive `store` with `config`. Nothing is bound until a
    /// [`Step::Bind`] or [`bind`](Self::bind).
    pub fn new(store: MemoryStore, config: TimelineConfig) -> Self {
        let feed = store.subscribe();
        let last_stamp = store
            .latest_received_at()
            .map_or(0, |at| at.as_millis());
        Self {
            store,
            feed,
            config,
            controller: None,
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            last_stamp,
            staged: HashMap::new(),
            output: Vec::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The bound controller.
    pub fn controller(&self) -> Option<&TimelineController> {
        self.controller.as_ref()
    }

    /// Virtual time elapsed since the replay started.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Take the directives produced so far.
    pub fn take_output(&mut self) -> Vec<Emitted> {
        std::mem::take(&mut self.output)
    }

    /// Bind a conversation, replacing any current binding.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Invariant` when the store breaks the load
    /// contract while the first reads are answered.
    pub fn bind(&mut self, thread: ThreadId, start: Option<Position>) -> Result<(), TimelineError> {
        if let Some(previous) = self.controller.take() {
            previous.unbind();
        }
        // Completions and feed events of the previous binding die with it.
        while self.feed.try_recv().is_ok() {}
        info!(%thread, ?start, "Replay binding conversation");
        self.controller = Some(TimelineController::bind(thread, self.config.clone(), start));
        self.pump()
    }

    /// Run a whole script.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step.
    pub fn run(&mut self, steps: impl IntoIterator<Item = Step>) -> Result<(), TimelineError> {
        for step in steps {
            self.apply(step)?;
        }
        Ok(())
    }

    /// Apply one step and everything it sets in motion.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::NotBound` for steps that need a conversation
    /// before one is bound, `TimelineError::Store` for failed store mutations,
    /// and `TimelineError::Invariant` for staging or load contract violations.
    pub fn apply(&mut self, step: Step) -> Result<(), TimelineError> {
        debug!(?step, at_ms = self.elapsed.as_millis() as u64, "Replay step");
        match step {
            Step::Bind { thread, start } => return self.bind(thread, start),
            Step::Wait { ms } => return self.advance(Duration::from_millis(ms)),
            Step::Settle {
                start,
                end,
                first_complete,
            } => {
                let now = self.now();
                let visible = VisibleRange::new(RenderOffset::new(start), RenderOffset::new(end))
                    .with_first_complete(RenderOffset::new(first_complete.unwrap_or(start)));
                self.bound()?.on_viewport_settled(visible, now);
            }
            Step::Jump { target } => {
                self.bound()?.submit(ScrollRequest::to(target).with_hint(LayoutHint::Highlight));
            }
            Step::Stage { key, author, body } => {
                self.bound()?;
                let item = self.fresh_item(author, body);
                if self.bound()?.stage_outgoing(key, item.clone())?.is_some() {
                    self.staged.insert(key, item);
                }
            }
            Step::Release { key } => {
                self.staged.remove(&key);
                self.bound()?.release_staged(StageHandle::new(key));
            }
            Step::Receive { key, author, body } => {
                let thread = self.bound()?.thread();
                let staged = key.and_then(|key| self.staged.remove(&key));
                let item = match (staged, author) {
                    (Some(staged), _) => staged,
                    (None, Some(author)) => self.fresh_item(author, body.unwrap_or_default()),
                    (None, None) => {
                        warn!(?key, "Nothing to receive: key not staged and no author given");
                        return Ok(());
                    }
                };
                self.store.receive(thread, item)?;
            }
            Step::Delete { id } => {
                let thread = self.bound()?.thread();
                self.store.remove(thread, id)?;
            }
            Step::Edit { id, body } => {
                let thread = self.bound()?.thread();
                if let Some(item) = self.store.item(thread, id)? {
                    self.store
                        .edit(thread, item.with_kind(ItemKind::Text { body }))?;
                }
            }
            Step::Typing { active } => {
                let header = if active {
                    HeaderSlot::TypingIndicator
                } else {
                    HeaderSlot::Empty
                };
                self.bound()?.set_header(header);
            }
            Step::Footer { visible } => self.bound()?.set_footer(visible),
        }
        self.pump()
    }

    /// Let virtual time pass, firing due timers.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Invariant` when answering the reads the timers
    /// set in motion breaks the load contract.
    pub fn advance(&mut self, by: Duration) -> Result<(), TimelineError> {
        self.elapsed += by;
        let now = self.now();
        if let Some(controller) = self.controller.as_mut() {
            controller.poll_timers(now);
        }
        self.pump()
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn bound(&mut self) -> Result<&mut TimelineController, TimelineError> {
        self.controller.as_mut().ok_or(TimelineError::NotBound)
    }

    /// Receive stamp for a new item: never behind the virtual clock and always
    /// after every item seen so far.
    fn next_stamp(&mut self) -> ReceivedAt {
        let clock = self.elapsed.as_millis() as i64;
        self.last_stamp = (self.last_stamp + 1).max(clock);
        ReceivedAt::from_millis(self.last_stamp)
    }

    fn fresh_item(&mut self, author: AuthorId, body: String) -> Item {
        Item::new(
            self.store.allocate_id(),
            author,
            self.next_stamp(),
            ItemKind::Text { body },
        )
    }

    /// Answer effects and deliver feed events until the controller is quiet.
    ///
    /// Directives produced before a contract violation are still recorded.
    fn pump(&mut self) -> Result<(), TimelineError> {
        let now = self.now();
        let at_ms = self.elapsed.as_millis() as u64;
        let Some(controller) = self.controller.as_mut() else {
            return Ok(());
        };
        let thread = controller.thread();
        let outcome = drain(controller, &self.store, &self.feed, thread, now);
        self.output.extend(
            controller
                .take_directives()
                .into_iter()
                .map(|directive| Emitted { at_ms, directive }),
        );
        outcome
    }
}

fn drain<S: ItemStore + ReadStateSink>(
    controller: &mut TimelineController,
    store: &S,
    feed: &Receiver<ChangeEvent>,
    thread: ThreadId,
    now: Instant,
) -> Result<(), TimelineError> {
    loop {
        let mut progressed = false;
        while let Ok(event) = feed.try_recv() {
            controller.on_external_mutation(event);
            progressed = true;
        }
        for effect in controller.take_effects() {
            progressed = true;
            answer(controller, store, thread, effect, now)?;
        }
        if !progressed {
            return Ok(());
        }
    }
}

fn answer<S: ItemStore + ReadStateSink>(
    controller: &mut TimelineController,
    store: &S,
    thread: ThreadId,
    effect: Effect,
    now: Instant,
) -> Result<(), InvariantViolation> {
    match effect {
        Effect::Snapshot => match store.thread_snapshot(thread) {
            Ok(snapshot) => controller.on_thread_snapshot(snapshot),
            Err(error) => controller.on_snapshot_failed(&error),
        },
        Effect::Load { ticket, request } => match store.load_range(thread, &request) {
            Ok(batch) => controller.on_load_result(ticket, batch, now)?,
            Err(error) => controller.on_load_failed(ticket, &error),
        },
        Effect::Lookup { ticket, key } => match store.position_of(thread, &key) {
            Ok(located) => controller.on_lookup_result(ticket, located),
            Err(error) => controller.on_lookup_failed(ticket, &error),
        },
        Effect::AdvanceWatermark(at) => match store.advance_watermark(thread, at) {
            Ok(()) => controller.on_watermark_stored(at),
            Err(error) => controller.on_watermark_failed(at, &error),
        },
    }
    Ok(())
}

/// Render emitted directives as JSON lines.
///
/// # Errors
///
/// Returns the serializer error for a directive that cannot be encoded.
pub fn to_json_lines(emitted: &[Emitted]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for entry in emitted {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    Ok(out)
}

impl Replay {
    /// Open `thread` and settle a viewport of `rows` at the bottom, the way a
    /// presentation layer does right after binding.
    pub fn open_at_bottom(&mut self, thread: ThreadId, rows: usize) -> Result<(), TimelineError> {
        self.bind(thread, None)?;
        self.apply(Step::Settle {
            start: 0,
            end: rows,
            first_complete: None,
        })
    }

    /// Jump with a caller-supplied request instead of the default highlight.
    pub fn submit(&mut self, request: ScrollRequest) -> Result<(), TimelineError> {
        self.bound()?.submit(request);
        self.pump()
    }

    /// Jump to the newest item.
    pub fn scroll_to_bottom(&mut self) -> Result<(), TimelineError> {
        self.submit(ScrollRequest::to(ScrollTarget::Bottom))
    }
}
