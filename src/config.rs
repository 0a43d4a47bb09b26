//! Runner configuration
//!
//! Defaults cover a full paper-trading deployment; an optional
//! `paper-runner.yaml` file and `PAPER_RUNNER_*` environment variables layer
//! on top.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::gateway::MarketSource;
use crate::indicators::IndicatorConfig;
use crate::sentiment::SentimentProviderConfig;

/// How entry notional is computed from the current account state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SizingStrategy {
    /// Fixed fraction of the available cash balance
    FixedFraction { fraction: f64 },
    /// Risk a fixed share of equity against the stop distance, capped at a
    /// fraction of equity
    RiskBased { risk_pct: f64, max_equity_pct: f64 },
}

impl Default for SizingStrategy {
    fn default() -> Self {
        SizingStrategy::FixedFraction { fraction: 0.10 }
    }
}

/// Trailing-stop behavior for open trades
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    /// Floating PnL percent that arms the trail
    pub activation_pct: f64,
    /// Distance the stop keeps from price once armed, in percent
    pub distance_pct: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            activation_pct: 1.5,
            distance_pct: 1.0,
        }
    }
}

/// Full runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracked instruments
    pub pairs: Vec<String>,
    /// Instrument evaluated on the short focus interval
    pub focus_pair: String,
    /// Focus cycle cadence in seconds
    pub focus_interval_secs: u64,
    /// Background (random pair) cycle cadence in seconds
    pub roam_interval_secs: u64,
    /// Status heartbeat cadence in seconds
    pub heartbeat_interval_secs: u64,
    /// Per-request market data timeout in seconds
    pub fetch_timeout_secs: u64,
    /// Candles requested per timeframe
    pub candle_limit: usize,
    /// Confidence a decision must exceed before a trade opens
    pub min_confidence: f64,
    /// Smallest notional the book will open, in quote currency
    pub min_trade_size: f64,
    /// Flat commission applied to notional on close
    pub commission_rate: f64,
    /// Paper account starting cash
    pub starting_balance: f64,
    /// Per-outcome persona weight nudge
    pub learning_rate: f64,
    pub sizing: SizingStrategy,
    pub trailing: TrailingConfig,
    /// Market data sources, tried in order
    pub market_sources: Vec<MarketSource>,
    pub sentiment_providers: Vec<SentimentProviderConfig>,
    pub indicators: IndicatorConfig,
    /// Persisted-state location; `None` keeps state in memory only
    pub state_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pairs: vec![
                "BTC_USDT".to_string(),
                "ETH_USDT".to_string(),
                "SOL_USDT".to_string(),
                "TON_USDT".to_string(),
                "DOGE_USDT".to_string(),
            ],
            focus_pair: "BTC_USDT".to_string(),
            focus_interval_secs: 10,
            roam_interval_secs: 4,
            heartbeat_interval_secs: 30,
            fetch_timeout_secs: 4,
            candle_limit: 100,
            min_confidence: 70.0,
            min_trade_size: 10.0,
            commission_rate: 0.001,
            starting_balance: 10_000.0,
            learning_rate: 0.1,
            sizing: SizingStrategy::default(),
            trailing: TrailingConfig::default(),
            market_sources: vec![
                MarketSource::GateIo,
                MarketSource::Binance,
                MarketSource::Mock,
            ],
            sentiment_providers: SentimentProviderConfig::defaults(),
            indicators: IndicatorConfig::default(),
            state_file: Some(PathBuf::from("state/paper-runner.json")),
        }
    }
}

impl Settings {
    /// Layer defaults, the optional config file and environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("paper-runner").required(false))
            .add_source(
                config::Environment::with_prefix("PAPER_RUNNER").separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract_values() {
        let settings = Settings::default();
        assert_eq!(settings.focus_interval_secs, 10);
        assert_eq!(settings.roam_interval_secs, 4);
        assert_eq!(settings.min_confidence, 70.0);
        assert_eq!(settings.commission_rate, 0.001);
        assert_eq!(settings.trailing.activation_pct, 1.5);
        assert_eq!(settings.trailing.distance_pct, 1.0);
        assert!(settings.pairs.contains(&settings.focus_pair));
    }

    #[test]
    fn sizing_strategy_deserializes_by_tag() {
        let fixed: SizingStrategy =
            serde_json::from_str(r#"{"mode":"fixed_fraction","fraction":0.1}"#).unwrap();
        assert_eq!(fixed, SizingStrategy::FixedFraction { fraction: 0.1 });

        let risk: SizingStrategy = serde_json::from_str(
            r#"{"mode":"risk_based","risk_pct":0.02,"max_equity_pct":0.25}"#,
        )
        .unwrap();
        assert_eq!(
            risk,
            SizingStrategy::RiskBased {
                risk_pct: 0.02,
                max_equity_pct: 0.25
            }
        );
    }
}
