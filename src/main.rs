//! threadview - replay a scripted session against a conversation fixture

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use threadview::config::{
    apply_cli_overrides, apply_env_overrides, load_config_with_precedence, merge_config,
    CliOverrides, TimelineConfig,
};
use threadview::model::{AppError, ThreadId};
use threadview::replay::{load_script, to_json_lines, Replay, Step};
use threadview::store::{load_fixture, MemoryStore};
use threadview::timeline::Position;
use tracing::{info, warn};

/// threadview - drive the timeline controller from a fixture and a script
#[derive(Parser, Debug)]
#[command(name = "threadview")]
#[command(version)]
#[command(about = "Replay a scripted session and print the directive stream as JSON lines")]
pub struct Args {
    /// Path to JSONL conversation fixture (oldest item first)
    pub fixture: PathBuf,

    /// Path to JSONL replay script; without one the conversation is only opened
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Conversation id the fixture is loaded under
    #[arg(short, long, default_value = "1")]
    pub thread: u64,

    /// Open at this position and highlight it
    #[arg(long)]
    pub start: Option<usize>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Items requested per range read
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,

    /// Read-state debounce delay in milliseconds
    #[arg(long)]
    pub quiescence_ms: Option<u64>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            batch_size: self.batch_size.map(|n| n as usize),
            quiescence_ms: self.quiescence_ms,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    run(args)?;
    Ok(())
}

fn run(args: Args) -> Result<(), AppError> {
    // Defaults → Config File → Env Vars → CLI Args
    let config = {
        let config_file = load_config_with_precedence(args.config.clone())?;
        let merged = merge_config(config_file);
        let with_env = apply_env_overrides(merged);
        apply_cli_overrides(with_env, args.overrides())
    };
    config.validate()?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _guard = threadview::logging::init(&config.log_file_path)?;
    info!(config = ?config, "Configuration loaded and resolved");

    let fixture = load_fixture(&args.fixture)?;
    for error in &fixture.errors {
        warn!(%error, "Skipped fixture line");
    }

    let thread = ThreadId::new(args.thread);
    let store = MemoryStore::new().with_thread(thread, fixture.items);
    let mut replay = Replay::new(store, TimelineConfig::from(&config));

    let mut steps = vec![Step::Bind {
        thread,
        start: args.start.map(Position::new),
    }];
    if let Some(path) = &args.script {
        steps.extend(load_script(path)?);
    }
    replay.run(steps)?;

    let output = replay.take_output();
    info!(directives = output.len(), "Replay finished");
    let lines = to_json_lines(&output).map_err(std::io::Error::other)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(lines.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_help_does_not_error() {
        let result = Args::try_parse_from(["threadview", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_does_not_error() {
        let result = Args::try_parse_from(["threadview", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_fixture_is_required() {
        let result = Args::try_parse_from(["threadview"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["threadview", "chat.jsonl"]);
        assert_eq!(args.fixture, PathBuf::from("chat.jsonl"));
        assert_eq!(args.script, None);
        assert_eq!(args.thread, 1);
        assert_eq!(args.start, None);
        assert_eq!(args.config, None);
        assert_eq!(args.overrides(), CliOverrides::default());
    }

    #[test]
    fn test_script_short_flag() {
        let args = Args::parse_from(["threadview", "chat.jsonl", "-s", "steps.jsonl"]);
        assert_eq!(args.script, Some(PathBuf::from("steps.jsonl")));
    }

    #[test]
    fn test_thread_long_flag() {
        let args = Args::parse_from(["threadview", "chat.jsonl", "--thread", "9"]);
        assert_eq!(args.thread, 9);
    }

    #[test]
    fn test_start_position() {
        let args = Args::parse_from(["threadview", "chat.jsonl", "--start", "37"]);
        assert_eq!(args.start, Some(37));
    }

    #[test]
    fn test_batch_size_rejects_zero() {
        let result = Args::try_parse_from(["threadview", "chat.jsonl", "--batch-size", "0"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_tuning_flags_become_overrides() {
        let args = Args::parse_from([
            "threadview",
            "chat.jsonl",
            "--batch-size",
            "25",
            "--quiescence-ms",
            "200",
        ]);
        assert_eq!(
            args.overrides(),
            CliOverrides {
                batch_size: Some(25),
                quiescence_ms: Some(200),
            }
        );
    }

    #[test]
    fn test_cli_overrides_win_over_config_file() {
        use threadview::config::ConfigFile;

        let config_file = ConfigFile {
            batch_size: Some(60),
            quiescence_ms: Some(900),
            ..ConfigFile::default()
        };

        let merged = merge_config(Some(config_file));
        assert_eq!(merged.batch_size, 60, "Config file should override default");

        let resolved = apply_cli_overrides(
            merged,
            CliOverrides {
                batch_size: Some(10),
                quiescence_ms: None,
            },
        );
        assert_eq!(resolved.batch_size, 10, "CLI should override all other sources");
        assert_eq!(resolved.quiescence_ms, 900);
    }
}
