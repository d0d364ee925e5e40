use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Run start/finish and backend setup
    Info,
    /// Per-document plans and batches
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "gk")]
#[command(about = "gk - sync extracted document triples into a SPARQL knowledge graph")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace); defaults to warn
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/graphkiln/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish document snapshots to the remote store
    Sync {
        /// JSON Lines file of document snapshots (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Also retract recorded documents missing from the input
        #[arg(long)]
        prune: bool,
    },

    /// Show the recorded sync status of documents
    Status {
        /// Compare against these snapshots instead of the records alone
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// List registered metadata backends
    Backends,

    /// Read the graph back and compare it with the snapshots
    Verify {
        /// JSON Lines file of document snapshots (`-` for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_with_prune() {
        let cli = Cli::try_parse_from(["gk", "sync", "--input", "docs.jsonl", "--prune"]).unwrap();
        match cli.command {
            Commands::Sync { input, prune } => {
                assert_eq!(input, PathBuf::from("docs.jsonl"));
                assert!(prune);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sync_requires_input() {
        assert!(Cli::try_parse_from(["gk", "sync"]).is_err());
        assert!(Cli::try_parse_from(["gk", "verify"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gk", "status", "-C", "gk.toml", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { input: None }));
        assert_eq!(cli.config, Some(PathBuf::from("gk.toml")));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["gk"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["gk", "backends"]).unwrap().command,
            Commands::Backends
        ));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::OFF);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
