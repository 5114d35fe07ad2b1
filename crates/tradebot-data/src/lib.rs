//! Market data sources for the trading engine.
//!
//! Two implementations of the `DataSource` seam: [`CsvDataSource`]
//! replays trusted historical data for backtests, [`WsDataSource`]
//! streams from a live WebSocket feed with reconnection and gap
//! signalling. Both run every event through a [`SequenceGuard`] so the
//! engine only ever observes a monotone stream.

mod csv_source;
mod guard;
mod history;
mod ws_source;

pub use csv_source::{CsvDataSource, ReplayPace};
pub use guard::{Admit, SequenceGuard};
pub use history::load_history;
pub use ws_source::{LiveFeedConfig, WsDataSource};
