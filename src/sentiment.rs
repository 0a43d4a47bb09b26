//! External sentiment feed
//!
//! Each configured provider yields a scalar sentiment in [-1, 1] with a
//! confidence; the confidence-weighted mean of the healthy readings becomes
//! the global sentiment the decision aggregator blends in. Providers are
//! optional: with none enabled (or none healthy) the feed reports `None` and
//! the aggregator skips the blend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators::IndicatorSnapshot;

const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentProviderId {
    /// Public 24h market-change heuristic, no credentials required
    CoinGecko,
    /// Keyed consensus feed derived from the instrument's own indicator
    /// snapshot; stands in for premium signal APIs and works offline
    Consensus,
}

impl std::fmt::Display for SentimentProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentProviderId::CoinGecko => write!(f, "CoinGecko"),
            SentimentProviderId::Consensus => write!(f, "Consensus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentProviderConfig {
    pub id: SentimentProviderId,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SentimentProviderConfig {
    /// Default provider table: the public feed on, the keyed feed off
    pub fn defaults() -> Vec<SentimentProviderConfig> {
        vec![
            SentimentProviderConfig {
                id: SentimentProviderId::CoinGecko,
                enabled: true,
                api_key: None,
            },
            SentimentProviderConfig {
                id: SentimentProviderId::Consensus,
                enabled: false,
                api_key: None,
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentStatus {
    Ok,
    Error,
    AuthFailed,
    Disabled,
}

/// One provider's answer for one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    pub provider: SentimentProviderId,
    /// -1 strong sell .. 1 strong buy
    pub sentiment: f64,
    /// 0..100, used as the aggregation weight
    pub confidence: f64,
    pub status: SentimentStatus,
    pub details: String,
    pub fetched_at: DateTime<Utc>,
}

pub struct SentimentFeed {
    client: reqwest::Client,
    providers: Vec<SentimentProviderConfig>,
}

impl SentimentFeed {
    pub fn new(
        providers: Vec<SentimentProviderConfig>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, providers })
    }

    /// Query every enabled provider and aggregate.
    ///
    /// Returns the individual readings (for display) and the weighted global
    /// sentiment, `None` when no healthy reading exists.
    pub async fn global_sentiment(
        &self,
        pair: &str,
        indicators: Option<&IndicatorSnapshot>,
    ) -> (Vec<SentimentReading>, Option<f64>) {
        let mut readings = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if !provider.enabled {
                readings.push(disabled_reading(provider.id));
                continue;
            }
            let reading = match provider.id {
                SentimentProviderId::CoinGecko => self.fetch_coingecko(pair).await,
                SentimentProviderId::Consensus => {
                    consensus_reading(provider.api_key.as_deref(), indicators)
                }
            };
            readings.push(reading);
        }

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        for reading in &readings {
            if reading.status == SentimentStatus::Ok {
                let weight = reading.confidence / 100.0;
                total_score += reading.sentiment * weight;
                total_weight += weight;
            }
        }
        let global = if total_weight > 0.0 {
            Some(total_score / total_weight)
        } else {
            None
        };
        debug!(pair, ?global, "sentiment aggregated");
        (readings, global)
    }

    async fn fetch_coingecko(&self, pair: &str) -> SentimentReading {
        let id = coingecko_id(pair);
        let url = format!(
            "{COINGECKO_BASE_URL}/simple/price?ids={id}&vs_currencies=usd&include_24hr_change=true"
        );
        match self.coingecko_change(&url, id).await {
            Ok(change) => {
                let sentiment = if change > 2.0 {
                    0.8
                } else if change < -2.0 {
                    -0.8
                } else {
                    change / 10.0
                };
                SentimentReading {
                    provider: SentimentProviderId::CoinGecko,
                    sentiment,
                    confidence: 90.0,
                    status: SentimentStatus::Ok,
                    details: format!("24h change: {change:.2}%"),
                    fetched_at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(pair, "coingecko fetch failed: {e:#}");
                SentimentReading {
                    provider: SentimentProviderId::CoinGecko,
                    sentiment: 0.0,
                    confidence: 0.0,
                    status: SentimentStatus::Error,
                    details: "connection failed".to_string(),
                    fetched_at: Utc::now(),
                }
            }
        }
    }

    async fn coingecko_change(&self, url: &str, id: &str) -> anyhow::Result<f64> {
        let body: serde_json::Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.get(id)
            .and_then(|coin| coin.get("usd_24h_change"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("missing usd_24h_change for {id}"))
    }
}

fn coingecko_id(pair: &str) -> &'static str {
    match pair {
        "BTC_USDT" => "bitcoin",
        "ETH_USDT" => "ethereum",
        "SOL_USDT" => "solana",
        "TON_USDT" => "the-open-network",
        "DOGE_USDT" => "dogecoin",
        _ => "bitcoin",
    }
}

fn disabled_reading(provider: SentimentProviderId) -> SentimentReading {
    SentimentReading {
        provider,
        sentiment: 0.0,
        confidence: 0.0,
        status: SentimentStatus::Disabled,
        details: String::new(),
        fetched_at: Utc::now(),
    }
}

/// Deterministic consensus score from the instrument's own technicals.
/// Requires configured credentials so a half-configured deployment surfaces
/// as AUTH_FAILED instead of silently contributing zeros.
fn consensus_reading(
    api_key: Option<&str>,
    indicators: Option<&IndicatorSnapshot>,
) -> SentimentReading {
    if api_key.map(str::is_empty).unwrap_or(true) {
        return SentimentReading {
            provider: SentimentProviderId::Consensus,
            sentiment: 0.0,
            confidence: 0.0,
            status: SentimentStatus::AuthFailed,
            details: "missing API credentials".to_string(),
            fetched_at: Utc::now(),
        };
    }
    let Some(ind) = indicators else {
        return SentimentReading {
            provider: SentimentProviderId::Consensus,
            sentiment: 0.0,
            confidence: 0.0,
            status: SentimentStatus::Error,
            details: "no indicator snapshot this cycle".to_string(),
            fetched_at: Utc::now(),
        };
    };

    let mut score: f64 = 0.0;
    if ind.rsi < 30.0 {
        score += 0.5;
    }
    if ind.rsi > 70.0 {
        score -= 0.5;
    }
    if ind.macd.histogram > 0.0 {
        score += 0.3;
    }
    if ind.super_trend.direction == 1 {
        score += 0.2;
    } else {
        score -= 0.2;
    }
    SentimentReading {
        provider: SentimentProviderId::Consensus,
        sentiment: score.clamp(-1.0, 1.0),
        confidence: 75.0,
        status: SentimentStatus::Ok,
        details: "technical consensus".to_string(),
        fetched_at: Utc::now(),
    }
}
