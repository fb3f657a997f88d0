//! Configuration module.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, load_config_with_precedence, merge_config,
    CliOverrides, ConfigError, ConfigFile, ResolvedConfig,
};

use std::time::Duration;

/// Tuning knobs of the timeline core.
///
/// Built from a [`ResolvedConfig`] by the binary, or constructed directly by
/// embedders and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineConfig {
    /// Items requested per range read.
    pub batch_size: usize,
    /// Distance from an unfinished window edge that triggers a prefetch.
    pub prefetch_margin: usize,
    /// Largest distance from the window at which it is extended rather than
    /// recentered.
    pub max_gap: usize,
    /// Upper bound on materialized items; the side furthest from the focus is
    /// trimmed beyond it.
    pub max_window: usize,
    /// Read-state debounce delay.
    pub quiescence: Duration,
    /// Fraction of the viewport above a highlighted target after a move.
    pub scroll_anchor_fraction: f64,
    /// Moves shorter than this many rows are animated; longer ones jump.
    pub scroll_animation_threshold: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            prefetch_margin: 10,
            max_gap: 80,
            max_window: 400,
            quiescence: Duration::from_millis(500),
            scroll_anchor_fraction: 0.25,
            scroll_animation_threshold: 50,
        }
    }
}

impl From<&ResolvedConfig> for TimelineConfig {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            prefetch_margin: config.prefetch_margin,
            max_gap: config.max_gap,
            max_window: config.max_window,
            quiescence: Duration::from_millis(config.quiescence_ms),
            scroll_anchor_fraction: config.scroll_anchor_fraction,
            scroll_animation_threshold: config.scroll_animation_threshold,
        }
    }
}
