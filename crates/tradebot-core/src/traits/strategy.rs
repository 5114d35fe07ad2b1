//! Strategy trait definition.

use crate::clock::EngineClock;
use crate::types::{Fill, MarketEvent, OrderIntent, Portfolio};

/// A trading strategy: a pure decision function over market and
/// portfolio state.
///
/// `decide` is called exactly once per market event, synchronously
/// inside the engine's loop iteration; that single-threaded invocation
/// is what gives backtests bit-for-bit reproducibility. Strategies may
/// keep internal rolling state (moving averages, streaks) but must not
/// perform I/O or block, and must take all time readings from the
/// provided [`EngineClock`], never the wall clock.
pub trait Strategy: Send + Sync {
    /// Get the unique name of this strategy.
    fn name(&self) -> &str;

    /// The symbol this strategy trades.
    fn symbol(&self) -> &str;

    /// Decide on the current market event. Returns zero or more order
    /// intents; the engine owns them from here on.
    fn decide(
        &mut self,
        event: &MarketEvent,
        portfolio: &Portfolio,
        clock: &EngineClock,
    ) -> Vec<OrderIntent>;

    /// Called when one of this strategy's orders is filled, for
    /// internal bookkeeping (cost basis etc). Position accounting is
    /// the engine's job, not the strategy's.
    fn on_fill(&mut self, _fill: &Fill) {}

    /// Reset internal state. Called before a backtest run.
    fn reset(&mut self) {}

    /// Get a description of the strategy.
    fn description(&self) -> &str {
        ""
    }
}
