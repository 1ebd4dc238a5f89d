//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::SinkId;
use std::path::PathBuf;

/// TRPG Relay - stream bot logs to chat channels
#[derive(Parser, Debug)]
#[command(
    name = "trpg-relay",
    author,
    version,
    about = "Log relay for the TRPG chat bot",
    long_about = "Streams log lines to a global channel and to per-server channels.\n\n\
                  Each destination runs in live mode (one message edited in place, \n\
                  throttled) or batch mode (lines grouped into windowed messages)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRPG_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRPG_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay until Ctrl+C / SIGTERM (or end of stdin with --stdin)
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and configured sinks
    Info(InfoArgs),

    /// Change a sink's stream settings
    Stream(StreamArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply if missing
    #[arg(
        short,
        long,
        default_value = "relay.toml",
        env = "TRPG_RELAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Also relay every line read from stdin; the relay stops at EOF
    #[arg(long)]
    pub stdin: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRPG_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "relay.toml", env = "TRPG_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml", env = "TRPG_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `stream` command
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Path to configuration file (locates the settings store)
    #[arg(short, long, default_value = "relay.toml", env = "TRPG_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Sink to change: `global`, a tenant id, or `tenant:<id>`
    pub sink: SinkId,

    #[command(subcommand)]
    pub action: StreamAction,
}

/// Administrative mutations of one sink
#[derive(Subcommand, Debug, Clone)]
pub enum StreamAction {
    /// Point the sink at a channel
    Set {
        /// Destination channel id
        channel: u64,
    },

    /// Stop streaming to this sink
    Off,

    /// Switch delivery mode
    Mode {
        /// `live` or `batch`
        mode: String,
    },

    /// Minimum interval between live edits; negative values clamp to 0
    Throttle {
        #[arg(allow_negative_numbers = true)]
        ms: i64,
    },

    /// Live buffer limit in bytes; values below 200 clamp to 200
    Chunk {
        #[arg(allow_negative_numbers = true)]
        bytes: i64,
    },

    /// Lowest level relayed from this process (global sink only)
    Level {
        /// trace, debug, info, warn or error
        level: String,
    },
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_throttle() {
        let cli = Cli::parse_from(["trpg-relay", "stream", "42", "throttle", "-5"]);
        match cli.command {
            Commands::Stream(args) => {
                assert_eq!(args.sink, SinkId::Tenant(42));
                assert!(matches!(args.action, StreamAction::Throttle { ms: -5 }));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::parse_from(["trpg-relay", "run", "--stdin"]);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.stdin);
                assert_eq!(args.metrics_port, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_sink() {
        let cli = Cli::parse_from(["trpg-relay", "-q", "stream", "global", "off"]);
        assert!(cli.quiet);
        match cli.command {
            Commands::Stream(args) => assert_eq!(args.sink, SinkId::Global),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
