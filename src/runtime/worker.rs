//! Store worker thread.
//!
//! Executes controller [`Effect`]s against the store, one at a time, and posts
//! each completion back into the actor inbox tagged with the binding
//! generation that asked for it.

use super::Command;
use crate::model::{ReceivedAt, StoreError, ThreadId};
use crate::store::{ItemStore, LoadBatch, Located, ReadStateSink, ThreadSnapshot};
use crate::timeline::{Effect, LoadTicket, LookupTicket};
use std::sync::mpsc::{Receiver, Sender};
use tracing::{debug, trace};

/// One unit of store work.
#[derive(Debug)]
pub(crate) struct StoreOp {
    pub(crate) generation: u64,
    pub(crate) thread: ThreadId,
    pub(crate) effect: Effect,
}

/// Outcome of a [`StoreOp`].
#[derive(Debug)]
pub(crate) enum StoreResult {
    Snapshot(Result<ThreadSnapshot, StoreError>),
    Load {
        ticket: LoadTicket,
        result: Result<LoadBatch, StoreError>,
    },
    Lookup {
        ticket: LookupTicket,
        result: Result<Located, StoreError>,
    },
    Watermark {
        at: ReceivedAt,
        result: Result<(), StoreError>,
    },
}

/// Run a single effect against `store`.
pub(crate) fn execute<S>(store: &S, thread: ThreadId, effect: Effect) -> StoreResult
where
    S: ItemStore + ReadStateSink + ?Sized,
{
    match effect {
        Effect::Snapshot => StoreResult::Snapshot(store.thread_snapshot(thread)),
        Effect::Load { ticket, request } => StoreResult::Load {
            ticket,
            result: store.load_range(thread, &request),
        },
        Effect::Lookup { ticket, key } => StoreResult::Lookup {
            ticket,
            result: store.position_of(thread, &key),
        },
        Effect::AdvanceWatermark(at) => StoreResult::Watermark {
            at,
            result: store.advance_watermark(thread, at),
        },
    }
}

/// Worker loop. Ends when the op channel closes or the actor is gone.
pub(crate) fn run_worker<S>(store: &S, ops: Receiver<StoreOp>, completions: Sender<Command>)
where
    S: ItemStore + ReadStateSink + ?Sized,
{
    for op in ops {
        trace!(generation = op.generation, effect = ?op.effect, "Executing store op");
        let result = execute(store, op.thread, op.effect);
        let completion = Command::Completed {
            generation: op.generation,
            result,
        };
        if completions.send(completion).is_err() {
            debug!("Actor inbox closed; store worker exiting");
            return;
        }
    }
    debug!("Store op channel closed; store worker exiting");
}
