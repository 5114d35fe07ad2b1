//! Core types and traits for the trading engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (MarketEvent, FeedItem)
//! - Order lifecycle types (OrderIntent, OrderState, Fill)
//! - Portfolio and position accounting
//! - The engine clock (wall-clock in live mode, event-driven in backtests)
//! - Core traits for data sources, brokers, strategies, and notifiers

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::EngineClock;
pub use error::{EngineError, EngineResult};
pub use traits::*;
pub use types::*;
