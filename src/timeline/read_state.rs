//! Read-state tracking with debounce.
//!
//! Visibility samples arrive at frame rate. The tracker folds them into one
//! pending watermark and schedules a single commit after a quiescence delay;
//! every new sample above the committed value pushes the deadline back. Time is
//! passed in by the caller so the tracker stays deterministic.

use crate::model::ReceivedAt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Debounced, monotonic read watermark.
///
/// # Invariants
/// - `committed` only decreases through [`restore`](Self::restore), which
///   rolls back a write that never reached the store.
/// - `pending`, when present, is strictly above `committed`.
/// - A deadline is armed only while `pending` is present.
#[derive(Debug, Clone)]
pub struct ReadStateTracker {
    quiescence: Duration,
    committed: Option<ReceivedAt>,
    pending: Option<ReceivedAt>,
    deadline: Option<Instant>,
}

impl ReadStateTracker {
    /// Create a tracker with nothing committed.
    pub fn new(quiescence: Duration) -> Self {
        Self {
            quiescence,
            committed: None,
            pending: None,
            deadline: None,
        }
    }

    /// Highest watermark handed out for writing.
    pub fn committed(&self) -> Option<ReceivedAt> {
        self.committed
    }

    /// Candidate waiting for quiescence.
    pub fn pending(&self) -> Option<ReceivedAt> {
        self.pending
    }

    /// When the pending commit is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Raise the floor to a watermark already stored elsewhere, without
    /// scheduling a write.
    pub fn seed(&mut self, stored: ReceivedAt) {
        if self.committed.is_some_and(|c| stored <= c) {
            return;
        }
        self.committed = Some(stored);
        if self.pending.is_some_and(|p| p <= stored) {
            self.pending = None;
            self.deadline = None;
        }
    }

    /// Fold in a visibility sample taken at `now`.
    ///
    /// Samples at or below the committed watermark are no-ops. Anything else
    /// (re)arms the single-shot commit at `now + quiescence`.
    pub fn on_viewport_revealed(&mut self, candidate: ReceivedAt, now: Instant) {
        if self.committed.is_some_and(|c| candidate <= c) {
            return;
        }
        self.pending = Some(self.pending.map_or(candidate, |p| p.max(candidate)));
        self.deadline = Some(now + self.quiescence);
    }

    /// Take the due commit, if the deadline has passed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<ReceivedAt> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        let value = self.pending.take()?;
        self.committed = Some(value);
        debug!(watermark = %value, "Committing read watermark");
        Some(value)
    }

    /// Drop the pending candidate and disarm the timer.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Roll back a commit whose write failed. The value becomes pending again
    /// but the timer stays disarmed; the next visibility sample re-arms it.
    pub fn restore(&mut self, failed: ReceivedAt, previous: Option<ReceivedAt>) {
        if self.committed != Some(failed) {
            return;
        }
        self.committed = previous;
        if self.pending.is_none_or(|p| p < failed) {
            self.pending = Some(failed);
        }
    }
}
