//! Core traits for the trading engine.

mod broker;
mod data_source;
mod notifier;
mod strategy;

pub use broker::Broker;
pub use data_source::DataSource;
pub use notifier::{Notifier, NullNotifier};
pub use strategy::Strategy;
