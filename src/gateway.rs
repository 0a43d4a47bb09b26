//! Market data gateway - provider priority chain with a mock fallback
//!
//! Sources are tried in configured order; each request is bounded by the
//! fetch timeout so a dead venue cannot stall a cycle. The mock source
//! synthesizes a random-walk series and never fails, which keeps the engine
//! alive through full connectivity outages.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::{Candle, Timeframe};

const GATE_BASE_URL: &str = "https://api.gateio.ws/api/v4";
const BINANCE_BASE_URL: &str = "https://api.binance.com";

const USER_AGENT: &str = "paper-runner/0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSource {
    GateIo,
    Binance,
    Mock,
}

impl std::fmt::Display for MarketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketSource::GateIo => write!(f, "gate_io"),
            MarketSource::Binance => write!(f, "binance"),
            MarketSource::Mock => write!(f, "mock"),
        }
    }
}

pub struct MarketGateway {
    client: reqwest::Client,
    sources: Vec<MarketSource>,
    candle_limit: usize,
}

impl MarketGateway {
    pub fn new(
        sources: Vec<MarketSource>,
        timeout: Duration,
        candle_limit: usize,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            sources,
            candle_limit,
        })
    }

    /// Fetch an ascending candle window, walking the source chain until one
    /// answers. Fails only when every source is exhausted.
    pub async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, EngineError> {
        let mut last_error = String::from("no sources configured");
        for source in &self.sources {
            let attempt = match source {
                MarketSource::GateIo => self.gate_candles(pair, timeframe).await,
                MarketSource::Binance => self.binance_candles(pair, timeframe).await,
                MarketSource::Mock => {
                    return Ok(generate_mock_candles(pair, timeframe, self.candle_limit))
                }
            };
            match attempt {
                Ok(candles) => {
                    debug!(pair, %timeframe, %source, count = candles.len(), "candles fetched");
                    return Ok(candles);
                }
                Err(e) => {
                    warn!(pair, %timeframe, %source, "candle fetch failed: {e:#}");
                    last_error = format!("{source}: {e:#}");
                }
            }
        }
        Err(EngineError::DataUnavailable {
            pair: pair.to_string(),
            reason: last_error,
        })
    }

    /// Fetch the latest traded price through the same source chain.
    pub async fn fetch_price(&self, pair: &str) -> Result<f64, EngineError> {
        let mut last_error = String::from("no sources configured");
        for source in &self.sources {
            let attempt = match source {
                MarketSource::GateIo => self.gate_price(pair).await,
                MarketSource::Binance => self.binance_price(pair).await,
                MarketSource::Mock => return Ok(mock_price(pair)),
            };
            match attempt {
                Ok(price) => {
                    debug!(pair, %source, price, "price fetched");
                    return Ok(price);
                }
                Err(e) => {
                    warn!(pair, %source, "price fetch failed: {e:#}");
                    last_error = format!("{source}: {e:#}");
                }
            }
        }
        Err(EngineError::DataUnavailable {
            pair: pair.to_string(),
            reason: last_error,
        })
    }

    async fn gate_candles(&self, pair: &str, timeframe: Timeframe) -> anyhow::Result<Vec<Candle>> {
        let url = format!(
            "{GATE_BASE_URL}/spot/candlesticks?currency_pair={pair}&interval={}&limit={}",
            timeframe.as_str(),
            self.candle_limit
        );
        let rows: Vec<Vec<serde_json::Value>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Gate rows: [timestamp_s, quote_volume, close, high, low, open, ...]
        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                Some(Candle {
                    time: (value_to_f64(row.get(0)?)? * 1000.0) as i64,
                    volume: value_to_f64(row.get(1)?)?,
                    close: value_to_f64(row.get(2)?)?,
                    high: value_to_f64(row.get(3)?)?,
                    low: value_to_f64(row.get(4)?)?,
                    open: value_to_f64(row.get(5)?)?,
                })
            })
            .collect();
        anyhow::ensure!(!candles.is_empty(), "empty candle payload");
        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    async fn binance_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> anyhow::Result<Vec<Candle>> {
        let url = format!(
            "{BINANCE_BASE_URL}/api/v3/klines?symbol={}&interval={}&limit={}",
            binance_symbol(pair),
            timeframe.as_str(),
            self.candle_limit
        );
        let rows: Vec<Vec<serde_json::Value>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Binance klines: [open_time_ms, open, high, low, close, volume, ...]
        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                Some(Candle {
                    time: value_to_f64(row.get(0)?)? as i64,
                    open: value_to_f64(row.get(1)?)?,
                    high: value_to_f64(row.get(2)?)?,
                    low: value_to_f64(row.get(3)?)?,
                    close: value_to_f64(row.get(4)?)?,
                    volume: value_to_f64(row.get(5)?)?,
                })
            })
            .collect();
        anyhow::ensure!(!candles.is_empty(), "empty kline payload");
        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    async fn gate_price(&self, pair: &str) -> anyhow::Result<f64> {
        #[derive(Deserialize)]
        struct GateTicker {
            last: String,
        }

        let url = format!("{GATE_BASE_URL}/spot/tickers?currency_pair={pair}");
        let tickers: Vec<GateTicker> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let ticker = tickers
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty ticker payload"))?;
        Ok(ticker.last.parse()?)
    }

    async fn binance_price(&self, pair: &str) -> anyhow::Result<f64> {
        #[derive(Deserialize)]
        struct BinanceTicker {
            price: String,
        }

        let url = format!(
            "{BINANCE_BASE_URL}/api/v3/ticker/price?symbol={}",
            binance_symbol(pair)
        );
        let ticker: BinanceTicker = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ticker.price.parse()?)
    }
}

fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Gate-style "BTC_USDT" to Binance "BTCUSDT"
fn binance_symbol(pair: &str) -> String {
    pair.replace('_', "")
}

fn base_price(pair: &str) -> f64 {
    if pair.contains("BTC") {
        67_000.0
    } else if pair.contains("ETH") {
        3_600.0
    } else if pair.contains("SOL") {
        150.0
    } else {
        10.0
    }
}

/// Synthetic last price for the mock source
pub fn mock_price(pair: &str) -> f64 {
    let mut rng = rand::thread_rng();
    base_price(pair) * (1.0 + (rng.gen::<f64>() - 0.5) * 0.002)
}

/// Random-walk candle synthesis for outages and tests
pub fn generate_mock_candles(pair: &str, timeframe: Timeframe, count: usize) -> Vec<Candle> {
    synth_candles(&mut rand::thread_rng(), pair, timeframe, count)
}

/// Seedable variant so tests stay deterministic
pub fn synth_candles<R: Rng>(
    rng: &mut R,
    pair: &str,
    timeframe: Timeframe,
    count: usize,
) -> Vec<Candle> {
    let now = Utc::now().timestamp_millis();
    let step = timeframe.secs() * 1000;
    let mut candles = Vec::with_capacity(count);
    let mut price = base_price(pair);

    for offset in (0..count).rev() {
        let time = now - offset as i64 * step;
        let volatility = 0.003;
        let change = price * volatility * (rng.gen::<f64>() - 0.5);
        let close = price + change;
        let high = price.max(close) * (1.0 + rng.gen::<f64>() * 0.002);
        let low = price.min(close) * (1.0 - rng.gen::<f64>() * 0.002);
        candles.push(Candle {
            time,
            open: price,
            high,
            low,
            close,
            volume: rng.gen_range(500.0..1500.0),
        });
        price = close;
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mock_candles_are_ascending_and_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        let candles = synth_candles(&mut rng, "BTC_USDT", Timeframe::M5, 100);

        assert_eq!(candles.len(), 100);
        for pair in candles.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        for c in &candles {
            assert!(c.high >= c.low);
            assert!(c.close > 0.0 && c.open > 0.0);
            assert!(c.volume >= 500.0);
        }
    }

    #[test]
    fn mock_series_walks_from_the_pair_base_price() {
        let mut rng = StdRng::seed_from_u64(7);
        let candles = synth_candles(&mut rng, "SOL_USDT", Timeframe::M5, 50);
        assert_eq!(candles[0].open, 150.0);
    }

    #[test]
    fn binance_symbol_strips_separator() {
        assert_eq!(binance_symbol("BTC_USDT"), "BTCUSDT");
    }

    #[tokio::test]
    async fn mock_source_short_circuits_the_chain() {
        let gateway =
            MarketGateway::new(vec![MarketSource::Mock], Duration::from_secs(1), 100).unwrap();
        let candles = gateway.fetch_candles("BTC_USDT", Timeframe::M5).await.unwrap();
        assert!(candles.len() >= crate::brain::MIN_HISTORY);

        let price = gateway.fetch_price("BTC_USDT").await.unwrap();
        assert!(price > 0.0);
    }
}
