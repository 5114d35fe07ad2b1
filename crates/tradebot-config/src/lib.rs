//! Configuration management.

mod settings;

pub use settings::{
    AppConfig, AppSettings, BacktestSettings, BrokerSettings, EngineSettings, FeedSettings,
    LoggingConfig, NotifySettings,
};

use config::{Config, ConfigError, Environment, File};
use std::path::Path;

/// Load configuration from an optional file plus environment overrides
/// (`TRADEBOT__SECTION__KEY`). With no file, defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let config = builder
        .add_source(
            Environment::with_prefix("TRADEBOT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // An empty source set deserializes into the serde defaults.
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.engine.queue_capacity, 10_000);
        assert_eq!(config.engine.drain_timeout_secs, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[engine]\nqueue_capacity = 64\ndrain_timeout_secs = 1\nsubmit_timeout_secs = 2\n\n[backtest]\ninitial_cash = \"5000\"\npace = \"real-time\"\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.engine.queue_capacity, 64);
        assert_eq!(config.backtest.pace, "real-time");
        // Untouched sections keep their defaults.
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/tradebot.toml");
        assert!(load_config(Some(missing)).is_err());
    }
}
