//! Run command: wires a data source, broker, strategy, and notifiers
//! into an engine and drives it to completion.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use tradebot_broker::{RestBroker, RestBrokerConfig, SimBroker};
use tradebot_config::{load_config, AppConfig};
use tradebot_core::clock::EngineClock;
use tradebot_core::traits::{Broker, DataSource, Notifier, Strategy};
use tradebot_data::{CsvDataSource, LiveFeedConfig, ReplayPace, WsDataSource};
use tradebot_engine::{Engine, EngineConfig, RunReport};
use tradebot_notify::{FanoutNotifier, LogNotifier, WebhookNotifier};
use tradebot_strategies::StrategyRegistry;

use crate::cli::{Mode, RunArgs};

pub async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).context("failed to load configuration")?;

    let clock = match args.mode {
        Mode::Live => EngineClock::wall(),
        Mode::Backtest => EngineClock::simulated(),
    };

    let data = build_data_source(&args, &config)?;
    let broker = build_broker(&args, &config, clock.clone())?;
    let strategy = build_strategy(&args)?;
    let notifier = build_notifier(&config);

    let cash = args.cash.unwrap_or(config.backtest.initial_cash);
    let mut engine_config = EngineConfig::new(args.symbol.clone(), cash);
    engine_config.drain_timeout = Duration::from_secs(config.engine.drain_timeout_secs);

    let engine = Engine::new(engine_config, data, broker, strategy, notifier, clock);

    // Ctrl-C requests a clean stop; the engine drains in-flight fills
    // and cancels open orders before exiting.
    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            handle.stop();
        }
    });

    info!(
        strategy = %args.strategy,
        symbol = %args.symbol,
        "starting engine"
    );

    let report = engine
        .run()
        .await
        .context("engine faulted")?;
    print_report(&report);
    Ok(())
}

fn build_data_source(args: &RunArgs, config: &AppConfig) -> Result<Arc<dyn DataSource>> {
    match args.mode {
        Mode::Backtest => {
            let data = args
                .data
                .as_deref()
                .context("backtest mode requires --data <csv-file>")?;
            let pace = match config.backtest.pace.as_str() {
                "real-time" => ReplayPace::RealTime,
                _ => ReplayPace::FullSpeed,
            };
            let source = CsvDataSource::from_path(Path::new(data), &args.symbol)
                .with_context(|| format!("failed to load history from '{data}'"))?
                .with_pace(pace)
                .with_channel_capacity(config.engine.queue_capacity);
            info!(events = source.events().len(), "history loaded");
            Ok(Arc::new(source))
        }
        Mode::Live => {
            let url = args
                .data
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| {
                    (!config.feed.url.is_empty()).then(|| config.feed.url.clone())
                })
                .context("live mode requires --data <ws-url> or a configured feed url")?;
            let feed_config = LiveFeedConfig {
                url,
                backoff_base: Duration::from_secs(config.feed.backoff_base_secs),
                backoff_cap: Duration::from_secs(config.feed.backoff_cap_secs),
                channel_capacity: config.engine.queue_capacity,
                ..LiveFeedConfig::default()
            };
            Ok(Arc::new(WsDataSource::new(feed_config)))
        }
    }
}

fn build_broker(
    args: &RunArgs,
    config: &AppConfig,
    clock: EngineClock,
) -> Result<Arc<dyn Broker>> {
    if args.broker == "sim" {
        let cash = args.cash.unwrap_or(config.backtest.initial_cash);
        return Ok(Arc::new(SimBroker::new(cash, clock)));
    }

    if args.mode == Mode::Backtest {
        anyhow::bail!("backtest mode only supports --broker sim");
    }

    let base_url = if args.broker == "rest" {
        config.broker.base_url.clone()
    } else {
        args.broker.clone()
    };
    if base_url.is_empty() {
        anyhow::bail!("live broker requires --broker <url> or a configured base url");
    }

    let api_key = std::env::var(&config.broker.api_key_env)
        .with_context(|| format!("{} not set", config.broker.api_key_env))?;
    let api_secret = std::env::var(&config.broker.api_secret_env)
        .with_context(|| format!("{} not set", config.broker.api_secret_env))?;

    let mut broker_config = RestBrokerConfig::new(base_url, api_key, api_secret);
    broker_config.submit_timeout = Duration::from_secs(config.engine.submit_timeout_secs);

    let broker = RestBroker::new(broker_config, clock).context("failed to create broker")?;
    Ok(broker)
}

fn build_strategy(args: &RunArgs) -> Result<Box<dyn Strategy>> {
    let registry = StrategyRegistry::new();
    match &args.strategy_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("strategy config is not valid JSON")?;
            registry
                .create(&args.strategy, value, &args.symbol)
                .context("failed to create strategy")
        }
        None => registry
            .create_default(&args.strategy, &args.symbol)
            .context("failed to create strategy"),
    }
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    let mut fanout = FanoutNotifier::new();
    fanout.push(Box::new(LogNotifier));
    if let Some(url) = &config.notify.webhook_url {
        fanout.push(Box::new(WebhookNotifier::new(url.clone())));
    }
    Arc::new(fanout)
}

fn print_report(report: &RunReport) {
    println!("Run complete ({:?})", report.state);
    println!("  events processed: {}", report.events_processed);
    println!("  orders submitted: {}", report.orders_submitted);
    println!("  fills applied:    {}", report.fills_applied);
    println!("  gaps observed:    {}", report.gaps_observed);
    println!("  dropped events:   {}", report.dropped_events);
    println!("  final cash:       {}", report.portfolio.cash);
    println!("  realized pnl:     {}", report.portfolio.realized_pnl);
    println!("  equity:           {}", report.portfolio.equity());
    for position in report.portfolio.positions.values() {
        println!(
            "  open position:    {} {} @ {}",
            position.symbol, position.quantity, position.avg_entry_price
        );
    }
}
