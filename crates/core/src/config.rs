//! Configuration structures for the botwatch system.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration for the detection system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Price feed configuration.
    pub feed: FeedConfig,
    /// Trade history configuration.
    pub recorder: RecorderConfig,
    /// Classification configuration.
    pub classifier: ClassifierConfig,
    /// Status reporting configuration (used by the reporting tool, not the core).
    pub monitor: MonitorConfig,
}

impl Config {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.feed.start_timeout_secs == 0 {
            return Err(Error::config("feed.start_timeout_secs must be > 0"));
        }
        if self.feed.reconnect_backoff_initial_secs == 0
            || self.feed.reconnect_backoff_initial_secs > self.feed.reconnect_backoff_max_secs
        {
            return Err(Error::config(
                "feed reconnect backoff must satisfy 0 < initial <= max",
            ));
        }
        for sub in &self.feed.subscriptions {
            if sub.asset.trim().is_empty() || sub.price_id.trim().is_empty() {
                return Err(Error::config("feed subscription needs asset and price_id"));
            }
        }
        if self.recorder.history_capacity < 2 {
            return Err(Error::config("recorder.history_capacity must be >= 2"));
        }
        let c = &self.classifier;
        if c.timing_window < 2 {
            return Err(Error::config("classifier.timing_window must be >= 2"));
        }
        if !c.cv_ceiling.is_finite() || c.cv_ceiling <= 0.0 {
            return Err(Error::config("classifier.cv_ceiling must be > 0"));
        }
        if !c.deviation_saturation_bands.is_finite() || c.deviation_saturation_bands <= 1.0 {
            return Err(Error::config(
                "classifier.deviation_saturation_bands must be > 1",
            ));
        }
        if c.max_quote_staleness_ms < 0 {
            return Err(Error::config("classifier.max_quote_staleness_ms must be >= 0"));
        }
        if !(0.0..=1.0).contains(&c.suspicious_threshold)
            || !(0.0..=1.0).contains(&c.bot_threshold)
            || c.suspicious_threshold > c.bot_threshold
        {
            return Err(Error::config(
                "verdict thresholds must satisfy 0 <= suspicious <= bot <= 1",
            ));
        }
        Ok(())
    }
}

/// One asset subscribed on the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSubscription {
    /// Asset name used in quotes (e.g., "ETH/USD").
    pub asset: String,
    /// Pyth price feed id (hex, with or without 0x prefix).
    pub price_id: String,
}

/// Price feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Hermes base URL.
    pub hermes_url: String,
    /// Assets to subscribe.
    pub subscriptions: Vec<FeedSubscription>,
    /// How long `start()` waits for the first update.
    pub start_timeout_secs: u64,
    /// First reconnect delay after a stream failure.
    pub reconnect_backoff_initial_secs: u64,
    /// Reconnect delay cap.
    pub reconnect_backoff_max_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            hermes_url: "https://hermes.pyth.network".to_string(),
            subscriptions: vec![
                FeedSubscription {
                    asset: "ETH/USD".to_string(),
                    price_id: "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace"
                        .to_string(),
                },
                FeedSubscription {
                    asset: "BTC/USD".to_string(),
                    price_id: "0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43"
                        .to_string(),
                },
            ],
            start_timeout_secs: 10,
            reconnect_backoff_initial_secs: 1,
            reconnect_backoff_max_secs: 60,
        }
    }
}

/// Trade history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Trades kept per trader; also bounds the recent-classification log.
    pub history_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
        }
    }
}

/// Classification configuration. Signal weights are fixed constants, not config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Maximum number of inter-trade intervals examined.
    pub timing_window: usize,
    /// Coefficient of variation at (and above) which timing scores 0.
    pub cv_ceiling: f64,
    /// Deviation, in confidence bands, at which the price signal saturates at 1.
    pub deviation_saturation_bands: f64,
    /// Quotes older than this relative to the trade are ignored (ms).
    pub max_quote_staleness_ms: i64,
    /// Scores at or above this are `Suspicious`.
    pub suspicious_threshold: f64,
    /// Scores at or above this are `Bot`.
    pub bot_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timing_window: 10,
            cv_ceiling: 1.0,
            deviation_saturation_bands: 4.0,
            max_quote_staleness_ms: 60_000,
            suspicious_threshold: 0.35,
            bot_threshold: 0.7,
        }
    }
}

/// Status reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between status reports.
    pub report_interval_secs: u64,
    /// Recent classifications listed per report.
    pub recent_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
            recent_limit: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.recorder.history_capacity, 20);
        assert_eq!(config.classifier.timing_window, 10);
        assert_eq!(config.feed.start_timeout_secs, 10);
        assert_eq!(config.feed.subscriptions.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [recorder]
            history_capacity = 5

            [classifier]
            cv_ceiling = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.recorder.history_capacity, 5);
        assert_relative_eq!(config.classifier.cv_ceiling, 0.5);
        assert_relative_eq!(config.classifier.bot_threshold, 0.7);
        assert_eq!(config.monitor.report_interval_secs, 30);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = Config::from_toml_str(
            r#"
            [classifier]
            suspicious_threshold = 0.9
            bot_threshold = 0.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_toml_is_toml_error() {
        let err = Config::from_toml_str("recorder = [").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
