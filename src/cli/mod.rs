//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tradebot")]
#[command(author, version, about = "Event-driven trading engine with live and backtest modes")]
pub struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine over a live feed or a recorded history
    Run(RunArgs),
    /// List available strategies
    Strategies,
    /// Validate configuration
    ValidateConfig,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Wall clock, websocket feed
    Live,
    /// Simulated clock, CSV replay
    Backtest,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Execution mode
    #[arg(short, long)]
    pub mode: Mode,

    /// Strategy to run
    #[arg(short, long)]
    pub strategy: String,

    /// Symbol to trade
    #[arg(short = 'S', long)]
    pub symbol: String,

    /// CSV file (backtest) or websocket URL (live); live falls back to
    /// the configured feed URL
    #[arg(short, long)]
    pub data: Option<String>,

    /// Broker: "sim" or a REST base URL
    #[arg(short, long, default_value = "sim")]
    pub broker: String,

    /// Starting cash for the simulated broker
    #[arg(long)]
    pub cash: Option<Decimal>,

    /// Strategy configuration file (JSON); defaults apply when omitted
    #[arg(long)]
    pub strategy_config: Option<PathBuf>,
}
