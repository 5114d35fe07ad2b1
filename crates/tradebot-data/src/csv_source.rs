//! Backtest data source: finite replay of stored history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tradebot_core::error::DataError;
use tradebot_core::traits::DataSource;
use tradebot_core::types::{FeedItem, MarketEvent};
use tracing::debug;

/// How fast a backtest replay emits events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayPace {
    /// As fast as the engine consumes (default).
    #[default]
    FullSpeed,
    /// Sleep the recorded inter-event gap, simulating real time.
    RealTime,
}

/// Replays a finite, trusted event history and terminates with
/// `EndOfStream`.
///
/// The sender blocks when the engine's queue is full: a backtest favors
/// completeness and determinism over freshness, so nothing is ever
/// dropped. Restartable — each `subscribe` replays from the beginning
/// (or from the `seek` position).
pub struct CsvDataSource {
    events: Vec<MarketEvent>,
    pace: ReplayPace,
    channel_capacity: usize,
    start_from: Mutex<Option<DateTime<Utc>>>,
}

impl CsvDataSource {
    /// Load history for a symbol from a CSV file.
    pub fn from_path(path: &Path, symbol: &str) -> Result<Self, DataError> {
        Ok(Self::from_events(crate::history::load_history(path, symbol)?))
    }

    /// Build a source from pre-loaded events (tests, recorded live
    /// sessions).
    pub fn from_events(events: Vec<MarketEvent>) -> Self {
        Self {
            events,
            pace: ReplayPace::FullSpeed,
            channel_capacity: 1024,
            start_from: Mutex::new(None),
        }
    }

    /// Set the replay pace.
    pub fn with_pace(mut self, pace: ReplayPace) -> Self {
        self.pace = pace;
        self
    }

    /// Set the feed channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Start the next replay from the first event at or after `ts`.
    /// Testing aid; the main loop always replays from the beginning.
    pub fn seek(&self, ts: DateTime<Utc>) {
        *self.start_from.lock().unwrap() = Some(ts);
    }

    /// The loaded history, in order.
    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn subscribe(&self, symbol: &str) -> Result<mpsc::Receiver<FeedItem>, DataError> {
        if !self.events.iter().any(|e| e.symbol == symbol) {
            return Err(DataError::NotFound(format!(
                "no history loaded for symbol {symbol}"
            )));
        }

        let start_from = self.start_from.lock().unwrap().take();
        let events: Vec<MarketEvent> = self
            .events
            .iter()
            .filter(|e| e.symbol == symbol)
            .filter(|e| start_from.map_or(true, |ts| e.timestamp >= ts))
            .cloned()
            .collect();
        let pace = self.pace;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        tokio::spawn(async move {
            let mut previous: Option<DateTime<Utc>> = None;
            for event in events {
                if pace == ReplayPace::RealTime {
                    if let Some(prev) = previous {
                        let gap = (event.timestamp - prev)
                            .to_std()
                            .unwrap_or_default();
                        tokio::time::sleep(gap).await;
                    }
                }
                previous = Some(event.timestamp);

                // Blocks when the queue is full; backtests never shed.
                if tx.send(FeedItem::Event(event)).await.is_err() {
                    debug!("replay subscriber went away, stopping");
                    return;
                }
            }
            let _ = tx.send(FeedItem::EndOfStream).await;
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "csv-replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn events(n: u64) -> Vec<MarketEvent> {
        (1..=n)
            .map(|i| MarketEvent {
                symbol: "AAPL".to_string(),
                timestamp: Utc.timestamp_millis_opt(i as i64 * 60_000).unwrap(),
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10),
                volume: dec!(100),
                sequence: i,
            })
            .collect()
    }

    async fn drain(mut rx: mpsc::Receiver<FeedItem>) -> Vec<FeedItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_replay_ends_with_end_of_stream() {
        let source = CsvDataSource::from_events(events(3));
        let rx = source.subscribe("AAPL").await.unwrap();

        let items = drain(rx).await;
        assert_eq!(items.len(), 4);
        assert!(matches!(items[0], FeedItem::Event(ref e) if e.sequence == 1));
        assert_eq!(items[3], FeedItem::EndOfStream);
    }

    #[tokio::test]
    async fn test_replay_is_restartable() {
        let source = CsvDataSource::from_events(events(2));

        let first = drain(source.subscribe("AAPL").await.unwrap()).await;
        let second = drain(source.subscribe("AAPL").await.unwrap()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_seek_skips_earlier_events() {
        let source = CsvDataSource::from_events(events(5));
        source.seek(Utc.timestamp_millis_opt(3 * 60_000).unwrap());

        let items = drain(source.subscribe("AAPL").await.unwrap()).await;
        // Events 3, 4, 5 plus the sentinel.
        assert_eq!(items.len(), 4);
        assert!(matches!(items[0], FeedItem::Event(ref e) if e.sequence == 3));
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected() {
        let source = CsvDataSource::from_events(events(1));
        assert!(source.subscribe("MSFT").await.is_err());
    }

    #[tokio::test]
    async fn test_bounded_channel_blocks_instead_of_dropping() {
        let source = CsvDataSource::from_events(events(10)).with_channel_capacity(1);
        let rx = source.subscribe("AAPL").await.unwrap();

        // Consume slowly; every event must still arrive, in order.
        let items = drain(rx).await;
        assert_eq!(items.len(), 11);
        assert_eq!(source.dropped_events(), 0);
    }
}
