//! Scroll position reconciler.
//!
//! Tracks the single live [`ScrollRequest`] from submission until it lands or
//! turns out to be impossible:
//!
//! ```text
//! Idle ──submit──▶ Pending(Resolving) ──lookup──▶ Pending(Tracking p)
//!                        │                              │
//!                        └──────── not found ───┐       ├── loaded ──▶ Scrolled ──▶ Idle
//!                                               ▼       │
//!                                            Invalid ◀──┴── gone ──▶ Idle
//! ```
//!
//! The reconciler only knows logical positions. Whether a position exists and
//! is materialized is answered by an injected [`ScrollRequestValidator`].

use crate::store::LookupKey;
use crate::timeline::scroll::ScrollRequest;
use crate::timeline::types::{Position, PositionRange};
use crate::timeline::window::{shift_after_remove, LoadWindow};
use std::fmt;
use tracing::debug;

/// Identity of one issued position lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupTicket(u64);

impl LookupTicket {
    /// Wrap a raw ticket number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ticket number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LookupTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lookup-{}", self.0)
    }
}

/// A position lookup the reconciler wants the store to perform.
pub type IssuedLookup = (LookupTicket, LookupKey);

/// Validity checks for a tracked position.
pub trait ScrollRequestValidator {
    /// True while `position` still denotes something that exists.
    fn is_position_still_valid(&self, position: Position) -> bool;

    /// True when whatever sits at `position` can be scrolled to right now.
    fn is_item_at_position_loaded(&self, position: Position) -> bool;
}

/// Validator backed by the load window plus the optional footer slot, which
/// sits right after the oldest position.
#[derive(Debug, Clone, Copy)]
pub struct WindowValidator<'a> {
    window: &'a LoadWindow,
    has_footer: bool,
}

impl<'a> WindowValidator<'a> {
    /// Validate against `window`.
    pub fn new(window: &'a LoadWindow, has_footer: bool) -> Self {
        Self { window, has_footer }
    }
}

impl ScrollRequestValidator for WindowValidator<'_> {
    fn is_position_still_valid(&self, position: Position) -> bool {
        match self.window.total_count() {
            Some(total) => position.get() < total + usize::from(self.has_footer),
            None => true,
        }
    }

    fn is_item_at_position_loaded(&self, position: Position) -> bool {
        let is_footer =
            self.has_footer && self.window.total_count() == Some(position.get());
        is_footer || self.window.is_loaded(position)
    }
}

/// How a submitted target is to be located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The position is already known.
    Known {
        /// Resolved position.
        position: Position,
        /// Whether the position follows its item through mutations.
        track_identity: bool,
    },
    /// The store has to be asked.
    Lookup(LookupKey),
}

/// Observable reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No live request.
    Idle,
    /// Waiting for a position lookup.
    Resolving,
    /// Waiting for the position to be materialized.
    Tracking(Position),
}

/// Result of re-checking the live request.
#[derive(Debug)]
pub enum Validation {
    /// No live request.
    Idle,
    /// Still waiting for a lookup.
    Resolving,
    /// Valid but not yet materialized.
    Waiting(Position),
    /// The request landed. The caller emits directives and completes it.
    Scrolled {
        /// The landed request.
        request: ScrollRequest,
        /// Its resolved position.
        position: Position,
    },
    /// The target is gone. The caller emits `NotFound` and invalidates it.
    Invalid(ScrollRequest),
}

/// Effect of a mutation or lookup on the live request.
#[derive(Debug)]
pub enum Adjustment {
    /// Nothing for the caller to do beyond re-validation.
    None,
    /// The position is known now (or changed); it may need loading.
    Track(Position),
    /// The lookup must be re-issued because positions shifted under it.
    Relookup(IssuedLookup),
    /// The target no longer exists.
    Invalidated(ScrollRequest),
}

#[derive(Debug)]
enum Phase {
    Resolving { ticket: LookupTicket, key: LookupKey },
    Tracking { position: Position, track_identity: bool },
}

#[derive(Debug)]
struct Pending {
    request: ScrollRequest,
    phase: Phase,
}

/// State machine for the single live scroll request.
#[derive(Debug, Default)]
pub struct ScrollReconciler {
    pending: Option<Pending>,
    next_lookup: u64,
}

impl ScrollReconciler {
    /// Create an idle reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ReconcilerState {
        match &self.pending {
            None => ReconcilerState::Idle,
            Some(Pending {
                phase: Phase::Resolving { .. },
                ..
            }) => ReconcilerState::Resolving,
            Some(Pending {
                phase: Phase::Tracking { position, .. },
                ..
            }) => ReconcilerState::Tracking(*position),
        }
    }

    /// True when no request is live.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Make `request` the live request, dropping any previous one without
    /// running its callbacks.
    ///
    /// Returns the lookup to issue when the target must be located by the store.
    pub fn submit(
        &mut self,
        request: ScrollRequest,
        resolution: Resolution,
    ) -> Option<IssuedLookup> {
        if let Some(previous) = self.pending.take() {
            debug!(scroll_target = %previous.request.target(), "Superseding scroll request");
        }
        debug!(scroll_target = %request.target(), ?resolution, "Scroll request submitted");

        let (phase, lookup) = match resolution {
            Resolution::Known {
                position,
                track_identity,
            } => (
                Phase::Tracking {
                    position,
                    track_identity,
                },
                None,
            ),
            Resolution::Lookup(key) => {
                let ticket = self.next_ticket();
                (
                    Phase::Resolving {
                        ticket,
                        key: key.clone(),
                    },
                    Some((ticket, key)),
                )
            }
        };
        self.pending = Some(Pending { request, phase });
        lookup
    }

    /// True when `ticket` is the lookup the live request is waiting for.
    pub fn is_awaiting(&self, ticket: LookupTicket) -> bool {
        matches!(
            &self.pending,
            Some(Pending {
                phase: Phase::Resolving { ticket: t, .. },
                ..
            }) if *t == ticket
        )
    }

    /// Apply the store's answer to a lookup. Answers to superseded or
    /// re-issued lookups are ignored.
    pub fn on_lookup_result(
        &mut self,
        ticket: LookupTicket,
        found: Option<Position>,
    ) -> Adjustment {
        if !self.is_awaiting(ticket) {
            debug!(%ticket, "Ignoring stale lookup result");
            return Adjustment::None;
        }

        match found {
            Some(position) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.phase = Phase::Tracking {
                        position,
                        track_identity: true,
                    };
                }
                Adjustment::Track(position)
            }
            None => match self.pending.take() {
                Some(pending) => Adjustment::Invalidated(pending.request),
                None => Adjustment::None,
            },
        }
    }

    /// Account for items inserted at `range`.
    pub fn on_insert(&mut self, range: PositionRange) -> Adjustment {
        self.adjust(|position| {
            if position >= range.start {
                Some(position.saturating_add(range.len()))
            } else {
                Some(position)
            }
        })
    }

    /// Account for items removed from `range` (positions before removal).
    pub fn on_remove(&mut self, range: PositionRange) -> Adjustment {
        self.adjust(|position| {
            if range.contains(position) {
                None
            } else {
                Some(shift_after_remove(position, range))
            }
        })
    }

    /// Re-check the live request.
    pub fn validate(&mut self, validator: &dyn ScrollRequestValidator) -> Validation {
        let position = match &self.pending {
            None => return Validation::Idle,
            Some(Pending {
                phase: Phase::Resolving { .. },
                ..
            }) => return Validation::Resolving,
            Some(Pending {
                phase: Phase::Tracking { position, .. },
                ..
            }) => *position,
        };

        if !validator.is_position_still_valid(position) {
            return match self.pending.take() {
                Some(pending) => {
                    debug!(%position, "Scroll target no longer valid");
                    Validation::Invalid(pending.request)
                }
                None => Validation::Idle,
            };
        }

        if !validator.is_item_at_position_loaded(position) {
            return Validation::Waiting(position);
        }

        match self.pending.take() {
            Some(pending) => Validation::Scrolled {
                request: pending.request,
                position,
            },
            None => Validation::Idle,
        }
    }

    /// Issue a fresh lookup for a request that is still resolving, retiring
    /// the previous ticket. Used after mutations and after failed lookups.
    pub fn reissue_lookup(&mut self) -> Option<IssuedLookup> {
        let Some(Pending {
            phase: Phase::Resolving { key, .. },
            ..
        }) = &self.pending
        else {
            return None;
        };
        let key = key.clone();
        let ticket = self.next_ticket();
        if let Some(pending) = self.pending.as_mut() {
            pending.phase = Phase::Resolving {
                ticket,
                key: key.clone(),
            };
        }
        debug!(%ticket, "Re-issuing lookup");
        Some((ticket, key))
    }

    /// Drop the live request without running callbacks.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    fn adjust(&mut self, shift: impl Fn(Position) -> Option<Position>) -> Adjustment {
        if matches!(self.state(), ReconcilerState::Resolving) {
            return match self.reissue_lookup() {
                Some(lookup) => Adjustment::Relookup(lookup),
                None => Adjustment::None,
            };
        }

        let Some(pending) = self.pending.as_mut() else {
            return Adjustment::None;
        };
        let Phase::Tracking {
            position,
            track_identity,
        } = pending.phase
        else {
            return Adjustment::None;
        };

        if !track_identity {
            return Adjustment::None;
        }

        match shift(position) {
            Some(shifted) if shifted == position => Adjustment::None,
            Some(shifted) => {
                pending.phase = Phase::Tracking {
                    position: shifted,
                    track_identity,
                };
                Adjustment::Track(shifted)
            }
            None => match self.pending.take() {
                Some(pending) => {
                    debug!(%position, "Tracked scroll target was removed");
                    Adjustment::Invalidated(pending.request)
                }
                None => Adjustment::None,
            },
        }
    }

    fn next_ticket(&mut self) -> LookupTicket {
        self.next_lookup += 1;
        LookupTicket(self.next_lookup)
    }
}
