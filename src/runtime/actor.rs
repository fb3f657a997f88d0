//! The sequential context.
//!
//! One thread owns the bound [`TimelineController`] and is the only place its
//! state changes. It waits on the inbox until the next read-state deadline,
//! applies one command, fires due timers, then ships queued effects to the
//! store worker and queued directives to the presentation channel.

use super::worker::{StoreOp, StoreResult};
use super::Command;
use crate::config::TimelineConfig;
use crate::model::{InvariantViolation, ThreadId, TimelineError};
use crate::timeline::{Directive, Position, TimelineController};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Instant;
use tracing::{debug, error, info};

struct Actor {
    config: TimelineConfig,
    controller: Option<TimelineController>,
    generation: u64,
    ops: Sender<StoreOp>,
    directives: Sender<Directive>,
}

/// What the loop should do after a command.
enum Flow {
    Continue,
    Stop,
}

/// Actor loop. Returns the invariant violation that stopped it, if any.
pub(crate) fn run_actor(
    config: TimelineConfig,
    inbox: Receiver<Command>,
    ops: Sender<StoreOp>,
    directives: Sender<Directive>,
) -> Result<(), InvariantViolation> {
    let mut actor = Actor {
        config,
        controller: None,
        generation: 0,
        ops,
        directives,
    };

    loop {
        let deadline = actor
            .controller
            .as_ref()
            .and_then(TimelineController::next_deadline);
        let command = match deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match inbox.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match inbox.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        let flow = match command {
            Some(command) => actor.handle(command).inspect_err(|violation| {
                error!(%violation, "Timeline invariant violated; stopping actor");
            })?,
            None => Flow::Continue,
        };
        if let Some(controller) = actor.controller.as_mut() {
            controller.poll_timers(Instant::now());
        }
        actor.flush();

        if let Flow::Stop = flow {
            break;
        }
    }

    if let Some(controller) = actor.controller.take() {
        controller.unbind();
    }
    info!("Timeline actor stopped");
    Ok(())
}

impl Actor {
    fn handle(&mut self, command: Command) -> Result<Flow, InvariantViolation> {
        match command {
            Command::Bind { thread, start } => self.bind(thread, start),
            Command::Unbind => {
                if let Some(controller) = self.controller.take() {
                    controller.unbind();
                }
                self.generation += 1;
            }
            Command::Mutation(event) => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_external_mutation(event);
                }
            }
            Command::Stage { key, item, reply } => {
                let Some(controller) = self.controller.as_mut() else {
                    let _ = reply.send(Err(TimelineError::NotBound));
                    return Ok(Flow::Continue);
                };
                match controller.stage_outgoing(key, item) {
                    Ok(handle) => {
                        let _ = reply.send(Ok(handle));
                    }
                    Err(violation) => {
                        let _ = reply.send(Err(TimelineError::Invariant(violation.clone())));
                        return Err(violation);
                    }
                }
            }
            Command::Release { handle, reply } => {
                let released = match self.controller.as_mut() {
                    Some(controller) => Ok(controller.release_staged(handle)),
                    None => Err(TimelineError::NotBound),
                };
                let _ = reply.send(released);
            }
            Command::Submit(request) => match self.controller.as_mut() {
                Some(controller) => controller.submit(request),
                None => debug!(
                    scroll_target = %request.target(),
                    "Dropping scroll request; nothing bound"
                ),
            },
            Command::Settle(visible) => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.on_viewport_settled(visible, Instant::now());
                }
            }
            Command::Header(header) => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.set_header(header);
                }
            }
            Command::Footer(visible) => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.set_footer(visible);
                }
            }
            Command::Completed { generation, result } => {
                self.complete(generation, result)?;
            }
            Command::Shutdown => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    fn bind(&mut self, thread: ThreadId, start: Option<Position>) {
        if let Some(previous) = self.controller.take() {
            previous.unbind();
        }
        self.generation += 1;
        info!(%thread, generation = self.generation, "Binding conversation");
        self.controller = Some(TimelineController::bind(
            thread,
            self.config.clone(),
            start,
        ));
    }

    fn complete(&mut self, generation: u64, result: StoreResult) -> Result<(), InvariantViolation> {
        let Some(controller) = self.controller.as_mut() else {
            return Ok(());
        };
        if generation != self.generation {
            debug!(generation, current = self.generation, "Dropping completion for old binding");
            return Ok(());
        }

        match result {
            StoreResult::Snapshot(Ok(snapshot)) => controller.on_thread_snapshot(snapshot),
            StoreResult::Snapshot(Err(error)) => controller.on_snapshot_failed(&error),
            StoreResult::Load { ticket, result } => match result {
                Ok(batch) => controller.on_load_result(ticket, batch, Instant::now())?,
                Err(error) => controller.on_load_failed(ticket, &error),
            },
            StoreResult::Lookup { ticket, result } => match result {
                Ok(found) => controller.on_lookup_result(ticket, found),
                Err(error) => controller.on_lookup_failed(ticket, &error),
            },
            StoreResult::Watermark { at, result } => match result {
                Ok(()) => controller.on_watermark_stored(at),
                Err(error) => controller.on_watermark_failed(at, &error),
            },
        }
        Ok(())
    }

    fn flush(&mut self) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        let thread = controller.thread();
        for effect in controller.take_effects() {
            let op = StoreOp {
                generation: self.generation,
                thread,
                effect,
            };
            if self.ops.send(op).is_err() {
                debug!("Store worker gone; dropping effect");
            }
        }
        for directive in controller.take_directives() {
            // A closed presentation channel only means nobody is watching.
            let _ = self.directives.send(directive);
        }
    }
}
