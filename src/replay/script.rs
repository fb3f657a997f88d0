//! Replay scripts.
//!
//! A script is JSONL, one tagged step per line:
//!
//! ```text
//! {"step":"bind","thread":1}
//! {"step":"settle","start":0,"end":20}
//! {"step":"jump","target":"position","position":37}
//! {"step":"wait","ms":600}
//! ```
//!
//! Unlike fixtures, scripts are strict: the first bad line aborts the run.

use crate::model::{AuthorId, ItemId, ScriptError, StageKey, ThreadId};
use crate::timeline::{Position, ScrollTarget};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One scripted interaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Bind a conversation, optionally opening at a position.
    Bind {
        /// Conversation to bind.
        thread: ThreadId,
        /// Position to open at and highlight.
        #[serde(default)]
        start: Option<Position>,
    },
    /// The viewport settled on `[start, end)` render offsets.
    Settle {
        /// First visible offset.
        start: usize,
        /// One past the last visible offset.
        end: usize,
        /// First entirely visible offset; defaults to `start`.
        #[serde(default)]
        first_complete: Option<usize>,
    },
    /// Jump to a target and highlight it.
    Jump {
        /// Where to go.
        #[serde(flatten)]
        target: ScrollTarget,
    },
    /// Stage an outgoing text message.
    Stage {
        /// Sender-chosen key.
        key: StageKey,
        /// Author of the message.
        author: AuthorId,
        /// Message text.
        body: String,
    },
    /// Abandon a staged message.
    Release {
        /// Key it was staged under.
        key: StageKey,
    },
    /// The store receives a message. With `key`, it is the durable copy of
    /// that staged message; otherwise a new one from `author`.
    Receive {
        /// Staged message being confirmed.
        #[serde(default)]
        key: Option<StageKey>,
        /// Author of a new message.
        #[serde(default)]
        author: Option<AuthorId>,
        /// Text of a new message.
        #[serde(default)]
        body: Option<String>,
    },
    /// The store deletes an item.
    Delete {
        /// Item to delete.
        id: ItemId,
    },
    /// The store replaces an item's text in place.
    Edit {
        /// Item to edit.
        id: ItemId,
        /// New text.
        body: String,
    },
    /// Show or hide the typing indicator.
    Typing {
        /// Whether someone is typing.
        active: bool,
    },
    /// Show or hide the footer slot.
    Footer {
        /// Whether the footer is shown.
        visible: bool,
    },
    /// Let virtual time pass.
    Wait {
        /// Milliseconds to advance.
        ms: u64,
    },
}

/// Parse script text. Blank lines are ignored.
///
/// # Errors
///
/// Returns `ScriptError::InvalidStep` with the 1-based line number of the
/// first line that is not a valid step.
pub fn parse_script(text: &str) -> Result<Vec<Step>, ScriptError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| ScriptError::InvalidStep {
                line: index + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse a script file.
///
/// # Errors
///
/// Returns `ScriptError::Io` if the file cannot be read, or the first parse
/// error.
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<Step>, ScriptError> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_script(&text)
}
