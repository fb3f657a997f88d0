//! Timeline core.
//!
//! Everything in here is synchronous and free of I/O. The
//! [`TimelineController`] composes the pieces:
//!
//! - [`window`]: which positions are materialized and which reads to issue
//! - [`overlay`]: locally staged items rendered ahead of the store's copy
//! - [`reconciler`]: the single live scroll request and its target's position
//! - [`read_state`]: debounced, monotonic read watermark
//!
//! Store work leaves the controller as [`Effect`]s and presentation work as
//! [`Directive`]s; the [`runtime`](crate::runtime) and the
//! [`replay`](crate::replay) driver execute them.

pub mod controller;
pub mod directive;
pub mod overlay;
pub mod read_state;
pub mod reconciler;
pub mod scroll;
pub mod types;
pub mod visible_range;
pub mod window;

pub use controller::{Effect, HeaderSlot, RenderSlot, TimelineController};
pub use directive::{Directive, DirectiveQueue};
pub use overlay::{OptimisticOverlay, StageHandle, StagedItem};
pub use read_state::ReadStateTracker;
pub use reconciler::{
    Adjustment, LookupTicket, ReconcilerState, Resolution, ScrollReconciler,
    ScrollRequestValidator, Validation, WindowValidator,
};
pub use scroll::{Alignment, LayoutHint, ScrollRequest, ScrollTarget};
pub use types::{Position, PositionRange, RenderOffset};
pub use visible_range::VisibleRange;
pub use window::{Consistency, LoadTicket, LoadWindow, MergeOutcome};
