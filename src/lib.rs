//! threadview
//!
//! Windowed timeline controller for large, live conversation logs.
//!
//! A conversation may hold far more items than fit in memory. The controller
//! keeps a bounded, gapless window of them materialized around what the user
//! is looking at, overlays locally sent items that the store has not confirmed
//! yet, resolves scroll targets that may not be loaded, and debounces read
//! receipts. It never renders anything itself: it emits [`timeline::Directive`]s
//! for whatever presentation layer sits on top.
//!
//! Layout follows a pure core / impure shell split:
//! - [`timeline`] is the pure core. Every input is a method call, every output
//!   is a queued effect or directive, and time is passed in.
//! - [`runtime`] runs the core on an actor thread against any
//!   [`store::ItemStore`].
//! - [`replay`] runs the core deterministically on a virtual clock.

pub mod config;
pub mod logging;
pub mod model;
pub mod replay;
pub mod runtime;
pub mod store;
pub mod timeline;

pub use runtime::TimelineHandle;
pub use timeline::TimelineController;

#[cfg(test)]
mod tests;
