//! Simple moving-average crossover strategy.
//!
//! Enters when the fast SMA crosses above the slow SMA and exits when
//! it crosses back below.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tradebot_core::clock::EngineClock;
use tradebot_core::error::StrategyError;
use tradebot_core::traits::Strategy;
use tradebot_core::types::{MarketEvent, OrderIntent, Portfolio, Side};
use tracing::debug;

/// Configuration for the SMA crossover strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaCrossoverConfig {
    /// Fast moving average period
    pub fast_period: usize,
    /// Slow moving average period
    pub slow_period: usize,
    /// Quantity per entry
    pub quantity: Decimal,
}

impl Default for SmaCrossoverConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 20,
            quantity: Decimal::ONE,
        }
    }
}

impl SmaCrossoverConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.fast_period == 0 {
            return Err(StrategyError::InvalidConfig(
                "fast period must be greater than 0".into(),
            ));
        }
        if self.fast_period >= self.slow_period {
            return Err(StrategyError::InvalidConfig(
                "fast period must be less than slow period".into(),
            ));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "quantity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Rolling simple moving average over the last `period` values.
struct RollingSma {
    period: usize,
    window: VecDeque<Decimal>,
    sum: Decimal,
}

impl RollingSma {
    fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        }
    }

    fn push(&mut self, value: Decimal) -> Option<Decimal> {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        (self.window.len() == self.period).then(|| self.sum / Decimal::from(self.period))
    }

    fn clear(&mut self) {
        self.window.clear();
        self.sum = Decimal::ZERO;
    }
}

/// Fast/slow SMA crossover with market orders.
pub struct SmaCrossoverStrategy {
    symbol: String,
    config: SmaCrossoverConfig,
    fast: RollingSma,
    slow: RollingSma,
    prev_diff: Option<Decimal>,
}

impl SmaCrossoverStrategy {
    pub fn new(symbol: impl Into<String>, config: SmaCrossoverConfig) -> Self {
        let fast = RollingSma::new(config.fast_period);
        let slow = RollingSma::new(config.slow_period);
        Self {
            symbol: symbol.into(),
            config,
            fast,
            slow,
            prev_diff: None,
        }
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn description(&self) -> &str {
        "Trades fast/slow simple moving average crossovers"
    }

    fn decide(
        &mut self,
        event: &MarketEvent,
        portfolio: &Portfolio,
        clock: &EngineClock,
    ) -> Vec<OrderIntent> {
        if event.symbol != self.symbol {
            return Vec::new();
        }

        let fast = self.fast.push(event.close);
        let slow = self.slow.push(event.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Vec::new(); // still warming up
        };

        let diff = fast - slow;
        let prev_diff = self.prev_diff.replace(diff);
        let Some(prev_diff) = prev_diff else {
            return Vec::new();
        };

        let held = portfolio.quantity(&self.symbol);
        if prev_diff <= Decimal::ZERO && diff > Decimal::ZERO && held == Decimal::ZERO {
            debug!(%fast, %slow, "bullish crossover");
            return vec![OrderIntent::market(
                &self.symbol,
                Side::Buy,
                self.config.quantity,
                clock.now(),
            )];
        }
        if prev_diff >= Decimal::ZERO && diff < Decimal::ZERO && held > Decimal::ZERO {
            debug!(%fast, %slow, "bearish crossover");
            return vec![OrderIntent::market(
                &self.symbol,
                Side::Sell,
                held,
                clock.now(),
            )];
        }
        Vec::new()
    }

    fn reset(&mut self) {
        self.fast.clear();
        self.slow.clear();
        self.prev_diff = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn event(sequence: u64, close: Decimal) -> MarketEvent {
        MarketEvent {
            symbol: "AAPL".to_string(),
            timestamp: Utc.timestamp_millis_opt(sequence as i64 * 60_000).unwrap(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(100),
            sequence,
        }
    }

    fn config() -> SmaCrossoverConfig {
        SmaCrossoverConfig {
            fast_period: 2,
            slow_period: 4,
            quantity: dec!(1),
        }
    }

    #[test]
    fn test_rolling_sma() {
        let mut sma = RollingSma::new(3);
        assert!(sma.push(dec!(1)).is_none());
        assert!(sma.push(dec!(2)).is_none());
        assert_eq!(sma.push(dec!(3)), Some(dec!(2)));
        assert_eq!(sma.push(dec!(7)), Some(dec!(4)));
    }

    #[test]
    fn test_bullish_crossover_enters() {
        let mut strategy = SmaCrossoverStrategy::new("AAPL", config());
        let portfolio = Portfolio::new(dec!(1000));
        let clock = EngineClock::simulated();

        // Downtrend to push fast below slow, then a sharp reversal.
        let closes = [
            dec!(100),
            dec!(98),
            dec!(96),
            dec!(94),
            dec!(92),
            dec!(105),
            dec!(112),
        ];
        let mut intents = Vec::new();
        for (i, close) in closes.iter().enumerate() {
            intents.extend(strategy.decide(&event(i as u64 + 1, *close), &portfolio, &clock));
        }

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, Side::Buy);
    }

    #[test]
    fn test_no_signal_during_warmup() {
        let mut strategy = SmaCrossoverStrategy::new("AAPL", config());
        let portfolio = Portfolio::new(dec!(1000));
        let clock = EngineClock::simulated();

        for i in 1..=4 {
            let intents = strategy.decide(&event(i, dec!(100)), &portfolio, &clock);
            assert!(intents.is_empty());
        }
    }

    #[test]
    fn test_no_sell_when_flat() {
        let mut strategy = SmaCrossoverStrategy::new("AAPL", config());
        let portfolio = Portfolio::new(dec!(1000));
        let clock = EngineClock::simulated();

        // Uptrend then reversal; a bearish cross with no position held
        // produces nothing.
        let closes = [
            dec!(100),
            dec!(102),
            dec!(104),
            dec!(106),
            dec!(108),
            dec!(95),
            dec!(88),
        ];
        for (i, close) in closes.iter().enumerate() {
            let intents = strategy.decide(&event(i as u64 + 1, *close), &portfolio, &clock);
            assert!(intents.iter().all(|intent| intent.side != Side::Sell));
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());
        let bad = SmaCrossoverConfig {
            fast_period: 10,
            slow_period: 5,
            ..config()
        };
        assert!(bad.validate().is_err());
    }
}
