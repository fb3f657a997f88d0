//! Core timeline newtypes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical index into the full ordered item sequence of a conversation.
/// 0 is the newest item; larger values are older.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(usize);

impl Position {
    /// The newest position.
    pub const NEWEST: Self = Self(0);

    /// Create a Position from a raw value.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw value.
    pub fn get(&self) -> usize {
        self.0
    }

    /// The next older position.
    pub fn older(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Add an amount, saturating at usize::MAX.
    pub fn saturating_add(&self, amount: usize) -> Self {
        Self(self.0.saturating_add(amount))
    }

    /// Subtract an amount, saturating at 0.
    pub fn saturating_sub(&self, amount: usize) -> Self {
        Self(self.0.saturating_sub(amount))
    }

    /// Distance between two positions regardless of order.
    pub fn distance(&self, other: Position) -> usize {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Position {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Half-open range `[start, end)` of logical positions.
///
/// # Invariants
/// - `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PositionRange {
    /// First position (inclusive).
    pub start: Position,
    /// Last position (exclusive).
    pub end: Position,
}

impl PositionRange {
    /// Create a new range.
    ///
    /// # Panics
    /// In debug builds, panics if `start > end`.
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start <= end, "range start {start} after end {end}");
        Self { start, end }
    }

    /// Range of `len` positions starting at `start`.
    pub fn with_len(start: Position, len: usize) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.end.get().saturating_sub(self.start.get())
    }

    /// True when no position is covered.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if a position lies in the range.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }

    /// True when the two ranges share at least one position or touch end to start.
    pub fn touches(&self, other: &PositionRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Overlapping part of the two ranges, if any.
    pub fn intersect(&self, other: &PositionRange) -> Option<PositionRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| PositionRange::new(start, end))
    }

    /// Clamp the end to `limit`.
    pub fn clamp_end(&self, limit: usize) -> PositionRange {
        let end = Position::new(self.end.get().min(limit));
        PositionRange::new(self.start.min(end), end)
    }

    /// Iterate over contained positions from newest to oldest.
    pub fn positions(&self) -> impl Iterator<Item = Position> {
        (self.start.get()..self.end.get()).map(Position::new)
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Index into the composed render sequence:
/// header slot, staged items, window positions, footer slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RenderOffset(usize);

impl RenderOffset {
    /// Create a RenderOffset from a raw value.
    pub fn new(offset: usize) -> Self {
        Self(offset)
    }

    /// Get the raw value.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Distance between two offsets regardless of order.
    pub fn distance(&self, other: RenderOffset) -> usize {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for RenderOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
