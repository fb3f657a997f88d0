//! JSONL fixture loader.
//!
//! A fixture is a conversation log, one item per line, oldest first. Parsing is
//! pure; only [`load_fixture`] touches the filesystem. Malformed lines are
//! skipped and reported with their line numbers.

use crate::model::{
    AuthorId, FixtureError, Item, ItemId, ItemKind, ParseError, Reaction, ReceivedAt, SentAt,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Raw JSON structure for deserializing fixture lines.
#[derive(Debug, Deserialize)]
struct RawItem {
    id: u64,
    author: AuthorId,
    received_at: String,
    #[serde(default)]
    sent_at: Option<String>,
    #[serde(flatten)]
    kind: ItemKind,
    #[serde(default)]
    reactions: Vec<RawReaction>,
    #[serde(default)]
    mentions_self: bool,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    author: AuthorId,
    received_at: String,
}

/// Outcome of loading a fixture file.
#[derive(Debug, Default)]
pub struct FixtureLoad {
    /// Successfully parsed items, oldest first.
    pub items: Vec<Item>,
    /// Lines that were skipped.
    pub errors: Vec<ParseError>,
}

/// Read and parse a fixture file.
///
/// # Errors
///
/// Returns `FixtureError::FileNotFound` if the path does not exist and
/// `FixtureError::Io` for other read failures. Parse failures are not errors;
/// they are collected in [`FixtureLoad::errors`].
pub fn load_fixture(path: impl AsRef<Path>) -> Result<FixtureLoad, FixtureError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FixtureError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)?;
    let lines: Vec<String> = content.lines().map(str::to_owned).collect();
    let (items, errors) = process_lines(lines, 1);

    if !errors.is_empty() {
        tracing::warn!(
            path = %path.display(),
            skipped = errors.len(),
            "Skipped malformed fixture lines"
        );
    }
    tracing::debug!(path = %path.display(), items = items.len(), "Loaded fixture");

    Ok(FixtureLoad { items, errors })
}

/// Parse JSONL lines into items.
///
/// Blank lines are ignored without error.
///
/// # Returns
///
/// Tuple of (successfully parsed items, parse errors)
pub fn process_lines(
    lines: Vec<String>,
    starting_line_number: usize,
) -> (Vec<Item>, Vec<ParseError>) {
    let mut items = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = starting_line_number + index;
        match parse_item_line(&line, line_number) {
            Ok(item) => items.push(item),
            Err(err) => errors.push(err),
        }
    }

    (items, errors)
}

/// Parse a single fixture line.
///
/// # Errors
///
/// Returns `ParseError::InvalidJson` when the line does not match the item
/// schema and `ParseError::InvalidTimestamp` when a timestamp is not RFC 3339.
pub fn parse_item_line(raw: &str, line_number: usize) -> Result<Item, ParseError> {
    let raw_item: RawItem = serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson {
        line: line_number,
        message: e.to_string(),
    })?;

    let received_at = parse_timestamp(&raw_item.received_at, line_number, "received_at")
        .map(ReceivedAt::from_datetime)?;

    let mut item = Item::new(
        ItemId::new(raw_item.id),
        raw_item.author,
        received_at,
        raw_item.kind,
    );

    if let Some(sent) = raw_item.sent_at.as_deref() {
        item = item.with_sent_at(SentAt::from_datetime(parse_timestamp(
            sent,
            line_number,
            "sent_at",
        )?));
    }

    let reactions = raw_item
        .reactions
        .into_iter()
        .map(|r| {
            parse_timestamp(&r.received_at, line_number, "reactions.received_at").map(|at| {
                Reaction {
                    author: r.author,
                    received_at: ReceivedAt::from_datetime(at),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let item = item.with_reactions(reactions);
    Ok(if raw_item.mentions_self {
        item.mentioning_self()
    } else {
        item
    })
}

fn parse_timestamp(
    raw: &str,
    line_number: usize,
    field: &'static str,
) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp {
            line: line_number,
            field,
            raw: raw.to_string(),
        })
}
