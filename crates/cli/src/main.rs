//! # TRPG Relay CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 日志转发的运行与优雅关闭
//! - sink 串流设定的管理

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_relay, run_stream, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let observability = observability_config(&cli);

    // `run` installs logging itself so its events can feed the relay queue
    let result = match &cli.command {
        Commands::Run(args) => run_relay(args, observability).await,
        Commands::Validate(args) => init_logging(observability).and_then(|()| run_validate(args)),
        Commands::Info(args) => init_logging(observability).and_then(|()| run_info(args)),
        Commands::Stream(args) => init_logging(observability).and_then(|()| run_stream(args)),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging for commands that do not relay
fn init_logging(config: ObservabilityConfig) -> Result<()> {
    observability::init_with_config(config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "TRPG Relay CLI starting");
    Ok(())
}

/// Map CLI logging options onto the observability config
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let log_format = match cli.log_format {
        cli::LogFormat::Json => observability::LogFormat::Json,
        cli::LogFormat::Pretty => observability::LogFormat::Pretty,
        cli::LogFormat::Compact => observability::LogFormat::Compact,
    };

    ObservabilityConfig {
        log_format,
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
        log_dir: None,
    }
}
