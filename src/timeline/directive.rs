//! Directives for the presentation layer.

use crate::timeline::scroll::Alignment;
use crate::timeline::types::RenderOffset;
use serde::Serialize;

/// One instruction to whatever renders the timeline. Offsets are render
/// offsets, already adjusted for the header slot and staged items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Re-render the slots in `[lo, hi)`.
    RangeChanged {
        /// First changed offset.
        lo: RenderOffset,
        /// One past the last changed offset.
        hi: RenderOffset,
    },
    /// Move the viewport so `offset` sits at `alignment`.
    MoveViewport {
        /// Target slot.
        offset: RenderOffset,
        /// Where in the viewport it lands.
        alignment: Alignment,
        /// Smooth scroll rather than jump.
        animate: bool,
    },
    /// Briefly highlight the slot at `offset`.
    Pulse {
        /// Highlighted slot.
        offset: RenderOffset,
    },
    /// A scroll target does not exist.
    NotFound,
    /// Show or hide the scroll-to-bottom affordance.
    ScrollButtons {
        /// New visibility.
        visible: bool,
    },
}

/// Append-only directive queue that merges adjacent re-render ranges.
#[derive(Debug, Default)]
pub struct DirectiveQueue {
    pending: Vec<Directive>,
}

impl DirectiveQueue {
    /// Append a directive. A `RangeChanged` directly following another one is
    /// folded into it when the two overlap or touch.
    pub fn push(&mut self, directive: Directive) {
        if let (
            Some(Directive::RangeChanged { lo, hi }),
            Directive::RangeChanged {
                lo: next_lo,
                hi: next_hi,
            },
        ) = (self.pending.last_mut(), &directive)
        {
            if *next_lo <= *hi && *lo <= *next_hi {
                *lo = (*lo).min(*next_lo);
                *hi = (*hi).max(*next_hi);
                return;
            }
        }
        self.pending.push(directive);
    }

    /// Take everything queued so far.
    pub fn take(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.pending)
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
