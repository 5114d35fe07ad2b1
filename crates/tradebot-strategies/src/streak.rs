//! Close-streak strategy.
//!
//! Buys a fixed quantity after a run of consecutive rising closes when
//! flat, and exits the position after a run of consecutive falling
//! closes. Deliberately simple: it exists to exercise the full order
//! lifecycle end to end.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradebot_core::clock::EngineClock;
use tradebot_core::error::StrategyError;
use tradebot_core::traits::Strategy;
use tradebot_core::types::{MarketEvent, OrderIntent, Portfolio, Side};
use tracing::debug;

/// Configuration for the streak strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Consecutive rising closes required to enter
    pub entry_streak: u32,
    /// Consecutive falling closes required to exit
    pub exit_streak: u32,
    /// Quantity per entry
    pub quantity: Decimal,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            entry_streak: 2,
            exit_streak: 2,
            quantity: Decimal::ONE,
        }
    }
}

impl StreakConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.entry_streak == 0 || self.exit_streak == 0 {
            return Err(StrategyError::InvalidConfig(
                "streak lengths must be greater than 0".into(),
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

/// Buys into rising streaks, exits on falling streaks.
pub struct StreakStrategy {
    symbol: String,
    config: StreakConfig,
    prev_close: Option<Decimal>,
    rises: u32,
    falls: u32,
}

impl StreakStrategy {
    pub fn new(symbol: impl Into<String>, config: StreakConfig) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            prev_close: None,
            rises: 0,
            falls: 0,
        }
    }
}

impl Strategy for StreakStrategy {
    fn name(&self) -> &str {
        "streak"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn description(&self) -> &str {
        "Buys after consecutive rising closes, exits after consecutive falling closes"
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

        if let Some(prev) = self.prev_close {
            if event.close > prev {
                self.rises += 1;
                self.falls = 0;
            } else if event.close < prev {
                self.falls += 1;
                self.rises = 0;
            } else {
                self.rises = 0;
                self.falls = 0;
            }
        }
        self.prev_close = Some(event.close);

        let held = portfolio.quantity(&self.symbol);
        if held == Decimal::ZERO && self.rises >= self.config.entry_streak {
            debug!(rises = self.rises, close = %event.close, "entering on rising streak");
            self.rises = 0;
            return vec![OrderIntent::market(
                &self.symbol,
                Side::Buy,
                self.config.quantity,
                clock.now(),
            )];
        }
        if held > Decimal::ZERO && self.falls >= self.config.exit_streak {
            debug!(falls = self.falls, close = %event.close, "exiting on falling streak");
            self.falls = 0;
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
        self.prev_close = None;
        self.rises = 0;
        self.falls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tradebot_core::types::{Fill, OrderKind};
    use uuid::Uuid;

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

    fn run(
        strategy: &mut StreakStrategy,
        portfolio: &mut Portfolio,
        closes: &[Decimal],
    ) -> Vec<OrderIntent> {
        let clock = EngineClock::simulated();
        let mut intents = Vec::new();
        for (i, close) in closes.iter().enumerate() {
            let event = event(i as u64 + 1, *close);
            clock.advance_to(event.timestamp);
            portfolio.mark_to_market(&event);
            for intent in strategy.decide(&event, portfolio, &clock) {
                // Fill immediately at the close, as the sim broker does
                // for market orders.
                let fill = Fill {
                    id: Uuid::new_v4(),
                    order_id: intent.id,
                    quantity: intent.quantity,
                    price: *close,
                    timestamp: event.timestamp,
                };
                portfolio.apply_fill(&intent.symbol, intent.side, &fill);
                intents.push(intent);
            }
        }
        intents
    }

    #[test]
    fn test_acceptance_sequence_buys_then_exits_flat() {
        let mut strategy = StreakStrategy::new("AAPL", StreakConfig::default());
        let mut portfolio = Portfolio::new(dec!(1000));

        let closes = [dec!(10), dec!(11), dec!(12), dec!(11), dec!(9)];
        let intents = run(&mut strategy, &mut portfolio, &closes);

        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].side, Side::Buy);
        assert_eq!(intents[0].kind, OrderKind::Market);
        assert_eq!(intents[0].quantity, dec!(1));
        assert_eq!(intents[1].side, Side::Sell);
        assert_eq!(portfolio.quantity("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn test_no_entry_without_streak() {
        let mut strategy = StreakStrategy::new("AAPL", StreakConfig::default());
        let mut portfolio = Portfolio::new(dec!(1000));

        // Alternating closes never build a streak.
        let closes = [dec!(10), dec!(11), dec!(10), dec!(11), dec!(10)];
        let intents = run(&mut strategy, &mut portfolio, &closes);
        assert!(intents.is_empty());
    }

    #[test]
    fn test_no_reentry_while_holding() {
        let mut strategy = StreakStrategy::new("AAPL", StreakConfig::default());
        let mut portfolio = Portfolio::new(dec!(1000));

        // Keeps rising after entry; only one buy.
        let closes = [dec!(10), dec!(11), dec!(12), dec!(13), dec!(14)];
        let intents = run(&mut strategy, &mut portfolio, &closes);
        assert_eq!(intents.len(), 1);
        assert_eq!(portfolio.quantity("AAPL"), dec!(1));
    }

    #[test]
    fn test_other_symbol_ignored() {
        let mut strategy = StreakStrategy::new("AAPL", StreakConfig::default());
        let portfolio = Portfolio::new(dec!(1000));
        let clock = EngineClock::simulated();

        let mut msft = event(1, dec!(10));
        msft.symbol = "MSFT".to_string();
        assert!(strategy.decide(&msft, &portfolio, &clock).is_empty());
        assert!(strategy.prev_close.is_none());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut strategy = StreakStrategy::new("AAPL", StreakConfig::default());
        let mut portfolio = Portfolio::new(dec!(1000));

        run(&mut strategy, &mut portfolio, &[dec!(10), dec!(11)]);
        assert!(strategy.prev_close.is_some());

        strategy.reset();
        assert!(strategy.prev_close.is_none());
        assert_eq!(strategy.rises, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(StreakConfig::default().validate().is_ok());
        let bad = StreakConfig {
            entry_streak: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = StreakConfig {
            quantity: dec!(0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
