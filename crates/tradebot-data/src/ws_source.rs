//! Live data source: persistent WebSocket feed with reconnection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tradebot_core::error::DataError;
use tradebot_core::traits::DataSource;
use tradebot_core::types::{FeedItem, MarketEvent};
use tracing::{debug, info, warn};

use crate::guard::{Admit, SequenceGuard};

/// Live feed connection settings.
#[derive(Debug, Clone)]
pub struct LiveFeedConfig {
    /// WebSocket endpoint
    pub url: String,
    /// First reconnect delay
    pub backoff_base: Duration,
    /// Reconnect delay ceiling
    pub backoff_cap: Duration,
    /// Ring buffer between the socket reader and subscribers; when the
    /// engine falls behind, the oldest unconsumed events are shed.
    pub buffer: usize,
    /// Capacity of the channel handed to the engine
    pub channel_capacity: usize,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            buffer: 4096,
            channel_capacity: 1024,
        }
    }
}

/// One OHLCV frame as sent by the feed, JSON per text message.
#[derive(Debug, Deserialize)]
struct WireFrame {
    symbol: String,
    /// Unix milliseconds
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    sequence: u64,
}

impl WireFrame {
    fn into_event(self) -> Option<MarketEvent> {
        Some(MarketEvent {
            symbol: self.symbol,
            timestamp: DateTime::from_timestamp_millis(self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            sequence: self.sequence,
        })
    }
}

/// Per-connection message handling, split out from the socket loop so
/// the ordering and gap semantics can be tested without a server.
struct FrameHandler {
    symbol: String,
    guard: SequenceGuard,
    gap_pending: bool,
    dropped: Arc<AtomicU64>,
}

impl FrameHandler {
    fn new(symbol: String, dropped: Arc<AtomicU64>) -> Self {
        Self {
            symbol,
            guard: SequenceGuard::new(),
            gap_pending: false,
            dropped,
        }
    }

    /// The connection dropped; the next admitted frame must be preceded
    /// by exactly one gap signal. Before anything has been delivered
    /// there is no gap to report, so failed initial connects stay
    /// silent.
    fn on_disconnect(&mut self) {
        if self.guard.last_sequence().is_some() {
            self.gap_pending = true;
        }
    }

    /// Handle one text frame, returning the items to forward in order.
    fn on_frame(&mut self, text: &str) -> Vec<FeedItem> {
        let event = match serde_json::from_str::<WireFrame>(text) {
            Ok(frame) if frame.symbol == self.symbol => match frame.into_event() {
                Some(event) => event,
                None => {
                    warn!(%text, "skipping frame with invalid timestamp");
                    return Vec::new();
                }
            },
            Ok(_) => return Vec::new(), // other symbol, not ours
            Err(e) => {
                // A single bad record never terminates a live stream.
                warn!(error = %e, "skipping malformed feed frame");
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        if self.gap_pending {
            let missed = self
                .guard
                .last_sequence()
                .map_or(0, |last| event.sequence.saturating_sub(last + 1));
            if self
                .guard
                .last_sequence()
                .is_some_and(|last| event.sequence <= last)
            {
                // The transport restarted its numbering; accept the new
                // epoch but keep the timestamp floor.
                self.guard.resync();
            }
            self.dropped.fetch_add(missed, Ordering::Relaxed);
            items.push(FeedItem::GapDetected { dropped: missed });
            self.gap_pending = false;
        }

        match self.guard.admit(&event) {
            Admit::Accept => items.push(FeedItem::Event(event)),
            verdict => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(?verdict, sequence = event.sequence, "dropping event");
            }
        }
        items
    }
}

fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

/// Streams market events from a live WebSocket endpoint.
///
/// Maintains a persistent connection, reconnecting with exponential
/// backoff (unlimited retries) and emitting one `GapDetected` per
/// reconnect. No backfill is attempted: the stream resumes from the
/// first new event. When the engine cannot keep up, the oldest
/// unconsumed events are dropped and counted — a live feed favors
/// freshness over completeness.
pub struct WsDataSource {
    config: LiveFeedConfig,
    dropped: Arc<AtomicU64>,
}

impl WsDataSource {
    pub fn new(config: LiveFeedConfig) -> Self {
        Self {
            config,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl DataSource for WsDataSource {
    async fn subscribe(&self, symbol: &str) -> Result<mpsc::Receiver<FeedItem>, DataError> {
        if self.config.url.is_empty() {
            return Err(DataError::Connection("live feed url not set".into()));
        }

        let (feed_tx, mut feed_rx) = broadcast::channel(self.config.buffer);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        tokio::spawn(run_feed(
            self.config.clone(),
            symbol.to_string(),
            feed_tx,
            self.dropped.clone(),
        ));

        let dropped = self.dropped.clone();
        tokio::spawn(async move {
            loop {
                match feed_rx.recv().await {
                    Ok(item) => {
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Oldest events were shed while we blocked.
                        dropped.fetch_add(n, Ordering::Relaxed);
                        warn!(lagged = n, "engine behind live feed, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        "ws-live"
    }
}

/// Socket loop: connect, subscribe, pump frames; on any failure back
/// off and reconnect forever (until all subscribers are gone).
async fn run_feed(
    config: LiveFeedConfig,
    symbol: String,
    feed_tx: broadcast::Sender<FeedItem>,
    dropped: Arc<AtomicU64>,
) {
    let mut handler = FrameHandler::new(symbol.clone(), dropped);
    let mut backoff = config.backoff_base;

    loop {
        match connect_async(&config.url).await {
            Ok((mut ws, _)) => {
                backoff = config.backoff_base;
                let subscribe =
                    serde_json::json!({ "op": "subscribe", "symbol": symbol }).to_string();
                if ws.send(Message::Text(subscribe)).await.is_ok() {
                    info!(%symbol, url = %config.url, "live feed connected");
                    while let Some(message) = ws.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                for item in handler.on_frame(&text) {
                                    if feed_tx.send(item).is_err() {
                                        return; // all subscribers gone
                                    }
                                }
                            }
                            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_)) => {}
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
                warn!(%symbol, "live feed disconnected");
            }
            Err(e) => warn!(error = %e, "live feed connect failed"),
        }

        if feed_tx.receiver_count() == 0 {
            return;
        }
        handler.on_disconnect();
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff, config.backoff_cap);
    }
}
