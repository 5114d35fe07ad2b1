//! Order execution backends.
//!
//! [`SimBroker`] simulates fills against the same market event stream
//! the strategy observes (backtests); [`RestBroker`] talks to an
//! exchange's REST API (live runs). Both implement the `Broker` seam
//! and deliver fills asynchronously on a channel the engine merges
//! into its queue.

mod rest;
mod sim;

pub use rest::{RestBroker, RestBrokerConfig};
pub use sim::SimBroker;
