//! Core data types for the trading engine.

mod event;
mod market;
mod order;
mod portfolio;

pub use event::EngineEvent;
pub use market::{FeedItem, MarketEvent};
pub use order::{Fill, OrderIntent, OrderKind, OrderState, OrderStatus, Side};
pub use portfolio::{Portfolio, Position};
