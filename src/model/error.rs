//! Error types for threadview.
//!
//! This module defines the error taxonomy using `thiserror` for structured error
//! handling. Errors compose via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`AppError`] - Top-level binary error wrapping all boundary failures
//!   - [`FixtureError`] / [`ParseError`] - fixture file reading and JSONL parsing
//!   - [`ScriptError`] - replay script reading and parsing
//!   - [`TimelineError`] - runtime failures of the timeline actor
//! - [`StoreError`] - load failures reported by an item store
//! - [`InvariantViolation`] - caller misuse detected inside the timeline core
//!
//! # Recovery Strategy
//!
//! - **StoreError**: non-fatal. The window keeps showing placeholders and the
//!   load is re-requested on the next visibility event. Never shown to the user.
//! - **Target not found**: not an error type at all. It is reported through the
//!   scroll request's `on_invalid` callback and a `NotFound` directive.
//! - **InvariantViolation**: fatal. It indicates a contract violation by the
//!   caller, so the runtime stops instead of continuing with corrupted state.
//! - **ParseError**: non-fatal. Malformed fixture lines are skipped and reported.

use crate::model::identifiers::{ItemId, StageKey, ThreadId};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned from the `threadview` binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Tracing subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Fixture file could not be read.
    #[error("Failed to read fixture: {0}")]
    Fixture(#[from] FixtureError),

    /// Replay script could not be read or parsed.
    #[error("Failed to read script: {0}")]
    Script(#[from] ScriptError),

    /// The timeline core reported a fatal error.
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Writing the directive stream failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Failures reported by an [`ItemStore`](crate::store::ItemStore) or
/// [`ReadStateSink`](crate::store::ReadStateSink).
///
/// These are environmental (store slow, locked, or unreachable). They are
/// retried by the next visibility-driven `ensure_loaded`, never by a timer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not serve the request right now.
    #[error("Store unavailable: {reason}")]
    Unavailable {
        /// Human-readable cause.
        reason: String,
    },

    /// The store has no conversation with this identity.
    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadId),

    /// A lock guarding the store state was poisoned by a panicking writer.
    #[error("Store state poisoned")]
    Poisoned,
}

/// Contract violations detected inside the timeline core.
///
/// These never come from the environment; each one means a caller broke the
/// documented contract. They are returned as `Err` and treated as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A second item was staged under a key that is still staged.
    #[error("Stage key {0} is already staged")]
    DuplicateStageKey(StageKey),

    /// The same durable item was staged twice under different keys.
    #[error("Item {0} is already staged")]
    DuplicateStagedItem(ItemId),

    /// A store returned more items than the load request asked for.
    #[error("Load batch overflow: requested {requested} items, received {received}")]
    BatchOverflow {
        /// Number of positions requested.
        requested: usize,
        /// Number of items delivered.
        received: usize,
    },
}

/// Errors surfaced by the threaded timeline runtime.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// The controller detected a contract violation and the actor stopped.
    #[error("Invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    /// The actor thread is no longer running.
    #[error("Timeline actor is not running")]
    ActorGone,

    /// A store mutation driven by the caller failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The command needs a bound conversation and none is bound.
    #[error("No conversation is bound")]
    NotBound,

    /// The actor thread panicked.
    #[error("Timeline actor panicked")]
    ActorPanicked,

    /// A runtime thread could not be spawned.
    #[error("Failed to spawn runtime thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors encountered when reading a fixture file.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture path does not exist.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was attempted.
        path: PathBuf,
    },

    /// Generic I/O error while reading.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors encountered when parsing a single JSONL fixture line.
///
/// Non-fatal: the line is skipped and the error reported with its line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is not valid JSON or does not match the item schema.
    #[error("Line {line}: invalid JSON: {message}")]
    InvalidJson {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },

    /// A timestamp field is not RFC 3339.
    #[error("Line {line}: invalid timestamp in `{field}`: {raw}")]
    InvalidTimestamp {
        /// 1-based line number.
        line: usize,
        /// Field name.
        field: &'static str,
        /// The raw value.
        raw: String,
    },
}

/// Errors encountered when reading a replay script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A step line could not be parsed. Scripts are strict: the whole run aborts.
    #[error("Line {line}: invalid step: {message}")]
    InvalidStep {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },
}
