//! Configuration file loading with precedence handling.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "THREADVIEW_CONFIG";

/// Environment variable overriding the read-state debounce delay.
pub const QUIESCENCE_ENV: &str = "THREADVIEW_QUIESCENCE_MS";

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },

    /// A resolved value is out of range.
    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Config key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/threadview/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Items per range read.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Prefetch distance from an unfinished window edge.
    #[serde(default)]
    pub prefetch_margin: Option<usize>,

    /// Largest gap bridged by extending the window.
    #[serde(default)]
    pub max_gap: Option<usize>,

    /// Upper bound on materialized items.
    #[serde(default)]
    pub max_window: Option<usize>,

    /// Read-state debounce delay in milliseconds.
    #[serde(default)]
    pub quiescence_ms: Option<u64>,

    /// Viewport fraction above a highlighted target.
    #[serde(default)]
    pub scroll_anchor_fraction: Option<f64>,

    /// Animated-move distance threshold in rows.
    #[serde(default)]
    pub scroll_animation_threshold: Option<usize>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Items per range read.
    pub batch_size: usize,
    /// Prefetch distance.
    pub prefetch_margin: usize,
    /// Largest bridged gap.
    pub max_gap: usize,
    /// Materialization bound.
    pub max_window: usize,
    /// Read-state debounce delay in milliseconds.
    pub quiescence_ms: u64,
    /// Viewport fraction above a highlighted target.
    pub scroll_anchor_fraction: f64,
    /// Animated-move threshold.
    pub scroll_animation_threshold: usize,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            prefetch_margin: 10,
            max_gap: 80,
            max_window: 400,
            quiescence_ms: 500,
            scroll_anchor_fraction: 0.25,
            scroll_animation_threshold: 50,
            log_file_path: default_log_path(),
        }
    }
}

impl ResolvedConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_window < self.batch_size {
            return Err(ConfigError::InvalidValue {
                key: "max_window",
                reason: format!("must be at least batch_size ({})", self.batch_size),
            });
        }
        if !(0.0..=1.0).contains(&self.scroll_anchor_fraction) {
            return Err(ConfigError::InvalidValue {
                key: "scroll_anchor_fraction",
                reason: format!("{} is outside [0, 1]", self.scroll_anchor_fraction),
            });
        }
        Ok(())
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/threadview/threadview.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("threadview").join("threadview.log")
    } else {
        PathBuf::from("threadview.log")
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    // Missing file is not an error - use defaults
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/threadview/config.toml` on Unix, appropriate path on other
/// platforms. Returns `None` if home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("threadview").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (like CLI `--config`)
/// 2. `THREADVIEW_CONFIG` environment variable
/// 3. Default path `~/.config/threadview/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return load_config_file(PathBuf::from(env_path));
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

/// Apply environment variable overrides to resolved config.
///
/// Checks for:
/// - `THREADVIEW_QUIESCENCE_MS`: Override the debounce delay. Unparseable
///   values are ignored with a warning.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> ResolvedConfig {
    if let Ok(raw) = std::env::var(QUIESCENCE_ENV) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.quiescence_ms = ms,
            Err(_) => tracing::warn!(value = %raw, "Ignoring invalid {QUIESCENCE_ENV}"),
        }
    }

    config
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    ResolvedConfig {
        batch_size: config.batch_size.unwrap_or(defaults.batch_size),
        prefetch_margin: config.prefetch_margin.unwrap_or(defaults.prefetch_margin),
        max_gap: config.max_gap.unwrap_or(defaults.max_gap),
        max_window: config.max_window.unwrap_or(defaults.max_window),
        quiescence_ms: config.quiescence_ms.unwrap_or(defaults.quiescence_ms),
        scroll_anchor_fraction: config
            .scroll_anchor_fraction
            .unwrap_or(defaults.scroll_anchor_fraction),
        scroll_animation_threshold: config
            .scroll_animation_threshold
            .unwrap_or(defaults.scroll_animation_threshold),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Flags given on the command line that override config values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// `--batch-size`
    pub batch_size: Option<usize>,
    /// `--quiescence-ms`
    pub quiescence_ms: Option<u64>,
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only applies overrides for flags that were explicitly set by the user.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(mut config: ResolvedConfig, overrides: CliOverrides) -> ResolvedConfig {
    if let Some(batch_size) = overrides.batch_size {
        config.batch_size = batch_size;
    }

    if let Some(ms) = overrides.quiescence_ms {
        config.quiescence_ms = ms;
    }

    config
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

#[cfg(test)]
mod log_path_tests {
    use super::*;

    #[test]
    fn default_log_path_ends_with_threadview_log() {
        let path = default_log_path();
        assert!(
            path.to_string_lossy().ends_with("threadview.log"),
            "Default log path should end with 'threadview.log', got: {:?}",
            path
        );
    }

    #[test]
    fn resolved_config_default_includes_log_path() {
        let config = ResolvedConfig::default();
        assert!(
            !config.log_file_path.as_os_str().is_empty(),
            "Default config should have non-empty log_file_path"
        );
    }

    #[test]
    fn config_file_log_path_overrides_default() {
        let custom_path = PathBuf::from("/custom/path/to/app.log");
        let config_file = ConfigFile {
            log_file_path: Some(custom_path.clone()),
            ..ConfigFile::default()
        };

        let resolved = merge_config(Some(config_file));
        assert_eq!(
            resolved.log_file_path, custom_path,
            "Config file log_file_path should override default"
        );
    }
}
