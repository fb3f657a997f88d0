//! Visible range reported by the presentation layer

use crate::timeline::types::RenderOffset;

/// Slots visible in the viewport after a scroll settles.
///
/// Offsets index the composed render sequence.
///
/// # Invariants
/// - `start <= first_complete <= end` when the range is not empty
/// - `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRange {
    /// First at least partially visible slot (inclusive).
    pub start: RenderOffset,
    /// One past the last visible slot (exclusive).
    pub end: RenderOffset,
    /// First slot that is entirely visible.
    pub first_complete: RenderOffset,
}

impl VisibleRange {
    /// Create a range where every slot is entirely visible.
    ///
    /// # Panics
    /// In debug builds, panics if `start > end`.
    pub fn new(start: RenderOffset, end: RenderOffset) -> Self {
        debug_assert!(start <= end, "visible start {start} after end {end}");
        Self {
            start,
            end,
            first_complete: start,
        }
    }

    /// Builder: record the first entirely visible slot.
    pub fn with_first_complete(mut self, offset: RenderOffset) -> Self {
        self.first_complete = offset.max(self.start).min(self.end);
        self
    }

    /// Number of visible slots, used as the viewport height in rows.
    pub fn len(&self) -> usize {
        self.end.get().saturating_sub(self.start.get())
    }

    /// Check if range is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if a specific slot is visible.
    pub fn contains(&self, offset: RenderOffset) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Iterate over visible offsets.
    pub fn offsets(&self) -> impl Iterator<Item = RenderOffset> {
        (self.start.get()..self.end.get()).map(RenderOffset::new)
    }
}
