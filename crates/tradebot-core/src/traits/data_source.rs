//! Data source trait definition.

use crate::error::DataError;
use crate::types::FeedItem;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A producer of ordered market events.
///
/// Implementations guarantee monotonically non-decreasing timestamps
/// per symbol: out-of-order or duplicate input (detected via the event
/// `sequence`) is dropped and counted, never forwarded to the engine.
///
/// A backtest source is finite and terminates the stream with
/// [`FeedItem::EndOfStream`]; a live source is unbounded, unrestartable,
/// and emits [`FeedItem::GapDetected`] after losing events to a
/// disconnect or to backpressure shedding.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Subscribe to the event stream for a symbol.
    ///
    /// The returned channel is the data half of the engine's merged
    /// queue; its capacity bounds how far the source can run ahead of
    /// the engine.
    async fn subscribe(&self, symbol: &str) -> Result<mpsc::Receiver<FeedItem>, DataError>;

    /// Number of events this source has dropped (sequence violations
    /// plus backpressure shedding).
    fn dropped_events(&self) -> u64 {
        0
    }

    /// Get the data source name.
    fn name(&self) -> &str;
}
