//! Validate configuration command.

use anyhow::Result;
use std::path::Path;
use tradebot_config::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    match config_path {
        Some(path) => println!("Validating configuration: {:?}", path),
        None => println!("Validating defaults (no configuration file)"),
    }

    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Queue capacity: {}", config.engine.queue_capacity);
            println!("Drain timeout: {}s", config.engine.drain_timeout_secs);
            println!("Submit timeout: {}s", config.engine.submit_timeout_secs);
            println!("Backtest cash: {}", config.backtest.initial_cash);
            println!("Backtest pace: {}", config.backtest.pace);
            if !config.feed.url.is_empty() {
                println!("Feed URL: {}", config.feed.url);
            }
            if !config.broker.base_url.is_empty() {
                println!("Broker URL: {}", config.broker.base_url);
            }
            if let Some(url) = &config.notify.webhook_url {
                println!("Webhook: {}", url);
            }
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
