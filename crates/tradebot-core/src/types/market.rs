//! Market data types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a symbol at a point in time.
///
/// Immutable once produced. `sequence` increases monotonically per data
/// source instance and is used to detect gaps, duplicates, and
/// reordering in the underlying transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Symbol identifier
    pub symbol: String,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Opening price
    pub open: Decimal,
    /// Highest price
    pub high: Decimal,
    /// Lowest price
    pub low: Decimal,
    /// Closing price
    pub close: Decimal,
    /// Traded volume
    pub volume: Decimal,
    /// Per-source monotone sequence number
    pub sequence: u64,
}

impl MarketEvent {
    /// Check whether a price falls inside this event's traded range.
    pub fn spans(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }

    /// The bar's range (high - low).
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

/// One item of a data source stream.
///
/// `EndOfStream` is the sentinel marking exhaustion of a finite
/// (backtest) source; live sources never emit it. `GapDetected` is
/// emitted after a live reconnect, carrying how many events were lost.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    /// A market observation.
    Event(MarketEvent),
    /// Events were lost (live disconnect or backpressure shedding).
    GapDetected { dropped: u64 },
    /// The finite stream is exhausted.
    EndOfStream,
}
