//! Configuration structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub notify: NotifySettings,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "tradebot".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Engine loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Capacity of the feed channel between producers and the loop
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight fills
    pub drain_timeout_secs: u64,
    /// Live submission timeout
    pub submit_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            drain_timeout_secs: 5,
            submit_timeout_secs: 10,
        }
    }
}

/// Live feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub url: String,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            backoff_base_secs: 1,
            backoff_cap_secs: 30,
        }
    }
}

/// Live broker settings. Credentials come from the named environment
/// variables, never from the file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: "TRADEBOT_API_KEY".to_string(),
            api_secret_env: "TRADEBOT_API_SECRET".to_string(),
        }
    }
}

/// Backtest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSettings {
    pub initial_cash: Decimal,
    /// "full-speed" or "real-time"
    pub pace: String,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            initial_cash: dec!(100000),
            pace: "full-speed".to_string(),
        }
    }
}

/// Notifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifySettings {
    /// Optional webhook endpoint for engine events
    pub webhook_url: Option<String>,
}
