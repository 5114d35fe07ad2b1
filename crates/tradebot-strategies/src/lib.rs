//! Trading strategies for the engine.

mod registry;
mod sma_crossover;
mod streak;

pub use registry::{StrategyInfo, StrategyRegistry};
pub use sma_crossover::{SmaCrossoverConfig, SmaCrossoverStrategy};
pub use streak::{StreakConfig, StreakStrategy};
