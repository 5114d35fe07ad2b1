//! Strategy registry: name to constructor mapping.

use crate::{SmaCrossoverConfig, SmaCrossoverStrategy, StreakConfig, StreakStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tradebot_core::error::StrategyError;
use tradebot_core::traits::Strategy;

/// Information about a registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    /// Strategy name
    pub name: String,
    /// Strategy description
    pub description: String,
    /// Default configuration as JSON
    pub default_config: serde_json::Value,
}

/// Registry of the available strategies.
pub struct StrategyRegistry {
    strategies: BTreeMap<String, StrategyInfo>,
}

impl StrategyRegistry {
    /// Create a registry with all built-in strategies.
    pub fn new() -> Self {
        let mut strategies = BTreeMap::new();

        strategies.insert(
            "streak".to_string(),
            StrategyInfo {
                name: "streak".to_string(),
                description: "Buys after consecutive rising closes, exits after consecutive falling closes"
                    .to_string(),
                default_config: serde_json::to_value(StreakConfig::default())
                    .unwrap_or_default(),
            },
        );

        strategies.insert(
            "sma_crossover".to_string(),
            StrategyInfo {
                name: "sma_crossover".to_string(),
                description: "Trades fast/slow simple moving average crossovers".to_string(),
                default_config: serde_json::to_value(SmaCrossoverConfig::default())
                    .unwrap_or_default(),
            },
        );

        Self { strategies }
    }

    /// List all available strategies, sorted by name.
    pub fn list(&self) -> Vec<&StrategyInfo> {
        self.strategies.values().collect()
    }

    /// Get strategy info by name.
    pub fn get(&self, name: &str) -> Option<&StrategyInfo> {
        self.strategies.get(name)
    }

    /// Check if a strategy exists.
    pub fn exists(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Create a strategy instance from a JSON configuration.
    pub fn create(
        &self,
        name: &str,
        config: serde_json::Value,
        symbol: &str,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        match name {
            "streak" => {
                let config: StreakConfig = serde_json::from_value(config)
                    .map_err(|e| StrategyError::InvalidConfig(e.to_string()))?;
                config.validate()?;
                Ok(Box::new(StreakStrategy::new(symbol, config)))
            }
            "sma_crossover" => {
                let config: SmaCrossoverConfig = serde_json::from_value(config)
                    .map_err(|e| StrategyError::InvalidConfig(e.to_string()))?;
                config.validate()?;
                Ok(Box::new(SmaCrossoverStrategy::new(symbol, config)))
            }
            _ => Err(StrategyError::NotFound(name.to_string())),
        }
    }

    /// Create a strategy with its default configuration.
    pub fn create_default(
        &self,
        name: &str,
        symbol: &str,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let info = self
            .get(name)
            .ok_or_else(|| StrategyError::NotFound(name.to_string()))?;
        self.create(name, info.default_config.clone(), symbol)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_builtins() {
        let registry = StrategyRegistry::new();
        assert_eq!(registry.list().len(), 2);
        assert!(registry.exists("streak"));
        assert!(registry.exists("sma_crossover"));
        assert!(!registry.exists("unknown"));
    }

    #[test]
    fn test_create_default() {
        let registry = StrategyRegistry::new();
        let strategy = registry.create_default("streak", "AAPL").unwrap();
        assert_eq!(strategy.name(), "streak");
        assert_eq!(strategy.symbol(), "AAPL");
    }

    #[test]
    fn test_create_with_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({
            "fast_period": 3,
            "slow_period": 8,
            "quantity": "2"
        });
        assert!(registry.create("sma_crossover", config, "AAPL").is_ok());
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({
            "fast_period": 8,
            "slow_period": 3,
            "quantity": "1"
        });
        let err = registry
            .create("sma_crossover", config, "AAPL")
            .err()
            .unwrap();
        assert!(matches!(err, StrategyError::InvalidConfig(_)));
    }

    #[test]
    fn test_create_unknown_strategy() {
        let registry = StrategyRegistry::new();
        let err = registry.create_default("unknown", "AAPL").err().unwrap();
        assert!(matches!(err, StrategyError::NotFound(_)));
    }
}
