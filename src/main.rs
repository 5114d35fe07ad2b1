//! Trading engine CLI application.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tradebot_config::load_config;
use tradebot_notify::logging::{setup_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level {
        cli::LogLevel::Trace => "trace",
        cli::LogLevel::Debug => "debug",
        cli::LogLevel::Info => "info",
        cli::LogLevel::Warn => "warn",
        cli::LogLevel::Error => "error",
    };
    // Config errors surface in the subcommands; logging setup falls
    // back to defaults so those errors are still reported somewhere.
    let logging = load_config(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::parse(&logging.format)
    };
    setup_logging(log_level, format);

    match cli.command {
        Commands::Run(args) => cli::commands::run::run(args, cli.config.as_deref()).await,
        Commands::Strategies => cli::commands::strategies::run().await,
        Commands::ValidateConfig => cli::commands::validate::run(cli.config.as_deref()).await,
    }
}
