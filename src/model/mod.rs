//! Domain model types (pure).
//!
//! All types in this module are pure data with smart constructors.

pub mod error;
pub mod identifiers;
pub mod item;

// Re-export for convenience
pub use error::{
    AppError, FixtureError, InvariantViolation, ParseError, ScriptError, StoreError,
    TimelineError,
};
pub use identifiers::{AuthorId, InvalidAuthorId, ItemId, StageKey, ThreadId};
pub use item::{Item, ItemKind, Reaction, ReceivedAt, SentAt};
