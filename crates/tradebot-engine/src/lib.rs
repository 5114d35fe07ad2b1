//! The engine: a single-consumer event loop over market data and fills.

mod engine;
mod ledger;
mod queue;

pub use engine::{Engine, EngineConfig, EngineHandle, EngineState, RunReport};
pub use ledger::{FillOutcome, OrderLedger};
pub use queue::{EngineMessage, EngineQueue};
