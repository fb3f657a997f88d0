//! Threaded runtime for the timeline controller.
//!
//! ```text
//!  TimelineHandle ──commands──▶ actor ──StoreOp──▶ store worker
//!        ▲                        │  ▲                  │
//!        │                        │  └──completions─────┘
//!  change feed ──forwarder──▶─────┘
//!                                 └──Directive──▶ presentation
//! ```
//!
//! The actor is the single sequential context; the worker is the only thread
//! that touches the store.

mod actor;
mod worker;

use crate::config::TimelineConfig;
use crate::model::{InvariantViolation, Item, StageKey, ThreadId, TimelineError};
use crate::store::{ChangeEvent, ItemStore, ReadStateSink};
use crate::timeline::{
    Directive, HeaderSlot, LayoutHint, Position, ScrollRequest, ScrollTarget, StageHandle,
    StagedItem, VisibleRange,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;
use worker::StoreResult;

/// Actor inbox message.
#[derive(Debug)]
pub(crate) enum Command {
    Bind {
        thread: ThreadId,
        start: Option<Position>,
    },
    Unbind,
    Mutation(ChangeEvent),
    Stage {
        key: StageKey,
        item: Item,
        reply: Sender<Result<Option<StageHandle>, TimelineError>>,
    },
    Release {
        handle: StageHandle,
        reply: Sender<Result<Option<StagedItem>, TimelineError>>,
    },
    Submit(ScrollRequest),
    Settle(VisibleRange),
    Header(HeaderSlot),
    Footer(bool),
    Completed {
        generation: u64,
        result: StoreResult,
    },
    Shutdown,
}

/// Handle to a running timeline actor.
///
/// Commands are fire-and-forget except staging, which waits for the actor's
/// answer. Dropping the handle shuts the runtime down without waiting.
#[derive(Debug)]
pub struct TimelineHandle {
    inbox: Sender<Command>,
    actor: Option<JoinHandle<Result<(), InvariantViolation>>>,
    worker: Option<JoinHandle<()>>,
}

impl TimelineHandle {
    /// Start the actor and the store worker.
    ///
    /// Returns the handle plus the receiving end of the directive stream.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Spawn` if a thread cannot be started.
    pub fn spawn<S>(
        store: Arc<S>,
        config: TimelineConfig,
    ) -> Result<(Self, Receiver<Directive>), TimelineError>
    where
        S: ItemStore + ReadStateSink + 'static,
    {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let (ops_tx, ops_rx) = mpsc::channel();
        let (directive_tx, directive_rx) = mpsc::channel();

        let completions = inbox_tx.clone();
        let worker = thread::Builder::new()
            .name("threadview-store".to_string())
            .spawn(move || worker::run_worker(store.as_ref(), ops_rx, completions))
            .map_err(TimelineError::Spawn)?;

        let actor = thread::Builder::new()
            .name("threadview-actor".to_string())
            .spawn(move || actor::run_actor(config, inbox_rx, ops_tx, directive_tx))
            .map_err(TimelineError::Spawn)?;

        Ok((
            Self {
                inbox: inbox_tx,
                actor: Some(actor),
                worker: Some(worker),
            },
            directive_rx,
        ))
    }

    fn send(&self, command: Command) -> Result<(), TimelineError> {
        self.inbox.send(command).map_err(|_| TimelineError::ActorGone)
    }

    /// Bind a conversation, replacing any current binding.
    pub fn bind(&self, thread: ThreadId, start: Option<Position>) -> Result<(), TimelineError> {
        self.send(Command::Bind { thread, start })
    }

    /// Drop the current binding. Its timers are canceled and its in-flight
    /// store results are ignored.
    pub fn unbind(&self) -> Result<(), TimelineError> {
        self.send(Command::Unbind)
    }

    /// Forward one change-feed notification.
    pub fn notify(&self, event: ChangeEvent) -> Result<(), TimelineError> {
        self.send(Command::Mutation(event))
    }

    /// Forward every notification from `feed` until either side goes away.
    pub fn attach_change_feed(
        &self,
        feed: Receiver<ChangeEvent>,
    ) -> Result<JoinHandle<()>, TimelineError> {
        let inbox = self.inbox.clone();
        thread::Builder::new()
            .name("threadview-feed".to_string())
            .spawn(move || {
                for event in feed {
                    if inbox.send(Command::Mutation(event)).is_err() {
                        break;
                    }
                }
                debug!("Change feed forwarder exiting");
            })
            .map_err(TimelineError::Spawn)
    }

    /// Stage a locally produced item and wait for the actor's answer.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::NotBound` without a binding, or
    /// `TimelineError::Invariant` for a duplicate key or item (which also stops
    /// the actor).
    pub fn stage_outgoing(
        &self,
        key: StageKey,
        item: Item,
    ) -> Result<Option<StageHandle>, TimelineError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::Stage { key, item, reply })?;
        answer.recv().map_err(|_| TimelineError::ActorGone)?
    }

    /// Withdraw a staged item.
    pub fn release_staged(&self, handle: StageHandle) -> Result<Option<StagedItem>, TimelineError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::Release { handle, reply })?;
        answer.recv().map_err(|_| TimelineError::ActorGone)?
    }

    /// Make `request` the live scroll request.
    pub fn submit(&self, request: ScrollRequest) -> Result<(), TimelineError> {
        self.send(Command::Submit(request))
    }

    /// Jump to `target` and highlight it.
    pub fn jump_to(
        &self,
        target: ScrollTarget,
        on_not_found: impl FnOnce() + Send + 'static,
    ) -> Result<(), TimelineError> {
        self.submit(
            ScrollRequest::to(target)
                .with_hint(LayoutHint::Highlight)
                .on_invalid(on_not_found),
        )
    }

    /// Report the settled viewport.
    pub fn viewport_settled(&self, visible: VisibleRange) -> Result<(), TimelineError> {
        self.send(Command::Settle(visible))
    }

    /// Replace the header slot.
    pub fn set_header(&self, header: HeaderSlot) -> Result<(), TimelineError> {
        self.send(Command::Header(header))
    }

    /// Show or hide the footer slot.
    pub fn set_footer(&self, visible: bool) -> Result<(), TimelineError> {
        self.send(Command::Footer(visible))
    }

    /// Stop the runtime and wait for its threads.
    ///
    /// # Errors
    ///
    /// Returns the invariant violation that stopped the actor early, or
    /// `TimelineError::ActorPanicked`.
    pub fn shutdown(mut self) -> Result<(), TimelineError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), TimelineError> {
        let _ = self.inbox.send(Command::Shutdown);
        let outcome = match self.actor.take() {
            Some(actor) => match actor.join() {
                Ok(result) => result.map_err(TimelineError::from),
                Err(_) => Err(TimelineError::ActorPanicked),
            },
            None => Ok(()),
        };
        // The actor owned the op sender; the worker drains and exits.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        outcome
    }
}

impl Drop for TimelineHandle {
    fn drop(&mut self) {
        if self.actor.is_some() {
            let _ = self.inbox.send(Command::Shutdown);
        }
    }
}
