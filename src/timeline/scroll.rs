//! Scroll targets and requests

use crate::model::{AuthorId, ItemId, SentAt};
use crate::timeline::types::{Position, RenderOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a scroll request wants to bring into view.
///
/// A sum type that keeps the caller's intent until it can be resolved:
/// - `Position`: an explicit logical position, validated by bounds only
/// - `Item`: a specific item, tracked by identity across mutations
/// - `AuthorSentAt`: a quoted or mentioned item, located by the store
/// - `LastSeen`: the newest item already read when the conversation opened
/// - `Bottom`: the newest item (Position 0)
/// - `NextUnreadMention`: the oldest unread item that mentions the local user
///
/// Symbolic targets resolve once at submission: `LastSeen` and `Bottom`
/// against controller state, `NextUnreadMention` through a store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ScrollTarget {
    /// Explicit logical position.
    Position {
        /// The position.
        position: Position,
    },
    /// Item identity.
    Item {
        /// The item.
        id: ItemId,
    },
    /// Author plus send time.
    AuthorSentAt {
        /// Author of the item.
        author: AuthorId,
        /// The author's send time.
        sent_at: SentAt,
    },
    /// Newest item already read.
    LastSeen,
    /// Newest item.
    Bottom,
    /// Oldest item mentioning the local user that is not read yet.
    NextUnreadMention,
}

impl ScrollTarget {
    /// Target an explicit position.
    pub fn position(position: usize) -> Self {
        Self::Position {
            position: Position::new(position),
        }
    }

    /// Target an item by identity.
    pub fn item(id: ItemId) -> Self {
        Self::Item { id }
    }

    /// True when the resolved position follows the item through inserts and
    /// removals rather than staying numerically fixed.
    pub fn tracks_identity(&self) -> bool {
        matches!(
            self,
            Self::Item { .. } | Self::AuthorSentAt { .. } | Self::LastSeen | Self::NextUnreadMention
        )
    }
}

impl fmt::Display for ScrollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position { position } => write!(f, "position {position}"),
            Self::Item { id } => write!(f, "item {id}"),
            Self::AuthorSentAt { author, sent_at } => {
                write!(f, "{author} at {}", sent_at.as_millis())
            }
            Self::LastSeen => f.write_str("last seen"),
            Self::Bottom => f.write_str("bottom"),
            Self::NextUnreadMention => f.write_str("next unread mention"),
        }
    }
}

/// How the viewport should land on a resolved target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    /// Plain move, target at the start of the viewport.
    #[default]
    Snap,
    /// Move so the target sits at the anchor fraction, then pulse it. Only
    /// pulses when the target is already visible.
    Highlight,
    /// Move so the target sits at the end of the viewport.
    AlignEnd,
}

/// Where in the viewport a moved-to offset should sit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// At the start (newest edge).
    Start,
    /// At the end (oldest edge).
    End,
    /// At this fraction of the viewport from the start.
    Fraction(f64),
}

/// Callback run when a request lands.
pub type CompleteCallback = Box<dyn FnOnce(RenderOffset) + Send>;

/// Callback run when a request's target turned out not to exist.
pub type InvalidCallback = Box<dyn FnOnce() + Send>;

/// A live request to scroll somewhere.
///
/// At most one is live per controller; submitting another drops this one's
/// callbacks without running them.
pub struct ScrollRequest {
    target: ScrollTarget,
    hint: LayoutHint,
    on_complete: Option<CompleteCallback>,
    on_invalid: Option<InvalidCallback>,
}

impl ScrollRequest {
    /// Request to scroll to `target` with the default hint and no callbacks.
    pub fn to(target: ScrollTarget) -> Self {
        Self {
            target,
            hint: LayoutHint::default(),
            on_complete: None,
            on_invalid: None,
        }
    }

    /// Builder: set the layout hint.
    pub fn with_hint(mut self, hint: LayoutHint) -> Self {
        self.hint = hint;
        self
    }

    /// Builder: run `f` with the landed render offset once the scroll happens.
    pub fn on_complete(mut self, f: impl FnOnce(RenderOffset) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Builder: run `f` if the target no longer exists.
    pub fn on_invalid(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_invalid = Some(Box::new(f));
        self
    }

    /// The requested target.
    pub fn target(&self) -> &ScrollTarget {
        &self.target
    }

    /// The layout hint.
    pub fn hint(&self) -> LayoutHint {
        self.hint
    }

    /// Consume the request, running its completion callback.
    pub fn complete(self, offset: RenderOffset) {
        if let Some(f) = self.on_complete {
            f(offset);
        }
    }

    /// Consume the request, running its invalidation callback.
    pub fn invalidate(self) {
        if let Some(f) = self.on_invalid {
            f();
        }
    }
}

impl fmt::Debug for ScrollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollRequest")
            .field("target", &self.target)
            .field("hint", &self.hint)
            .field("on_complete", &self.on_complete.is_some())
            .field("on_invalid", &self.on_invalid.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_hint_is_snap() {
        let request = ScrollRequest::to(ScrollTarget::Bottom);
        assert_eq!(request.hint(), LayoutHint::Snap);
    }

    #[test]
    fn identity_tracking_targets() {
        assert!(ScrollTarget::item(ItemId::new(1)).tracks_identity());
        assert!(ScrollTarget::LastSeen.tracks_identity());
        assert!(ScrollTarget::NextUnreadMention.tracks_identity());
        assert!(!ScrollTarget::position(3).tracks_identity());
        assert!(!ScrollTarget::Bottom.tracks_identity());
    }

    #[test]
    fn complete_runs_only_completion_callback() {
        let completed = Arc::new(AtomicUsize::new(0));
        let invalid = Arc::new(AtomicUsize::new(0));
        let (c, i) = (completed.clone(), invalid.clone());

        ScrollRequest::to(ScrollTarget::position(3))
            .on_complete(move |offset| {
                c.store(offset.get() + 1, Ordering::SeqCst);
            })
            .on_invalid(move || {
                i.fetch_add(1, Ordering::SeqCst);
            })
            .complete(RenderOffset::new(41));

        assert_eq!(completed.load(Ordering::SeqCst), 42);
        assert_eq!(invalid.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_a_request_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let request = ScrollRequest::to(ScrollTarget::Bottom).on_invalid(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(request);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn target_deserializes_from_tagged_json() {
        let target: ScrollTarget = serde_json::from_str(r#"{"target":"item","id":7}"#).unwrap();
        assert_eq!(target, ScrollTarget::item(ItemId::new(7)));
    }

    #[test]
    fn unread_mention_target_is_a_bare_tag() {
        let target: ScrollTarget =
            serde_json::from_str(r#"{"target":"next_unread_mention"}"#).unwrap();
        assert_eq!(target, ScrollTarget::NextUnreadMention);
        assert_eq!(target.to_string(), "next unread mention");
    }

    #[test]
    fn debug_hides_callbacks() {
        let request = ScrollRequest::to(ScrollTarget::Bottom).on_complete(|_| {});
        let debug = format!("{request:?}");
        assert!(debug.contains("on_complete: true"), "got: {debug}");
    }
}
