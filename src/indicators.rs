//! Indicator engine - pure candle-window math
//!
//! Every function tolerates windows shorter than its lookback by returning a
//! neutral default instead of failing, so cold-start data never crashes a
//! cycle. Several formulas are deliberate simplifications carried over for
//! behavioral parity: the MACD signal line is a fixed 0.8x scaling of the
//! MACD line (not a 9-period EMA), ATR is the single-bar true range of the
//! last two candles, and ADX is approximated from EMA(9)/EMA(21) divergence.

use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Lookback periods and multipliers for the full indicator battery.
///
/// Defaults match the engine's contract constants; all are overridable
/// through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub bollinger_period: usize,
    pub bollinger_mult: f64,
    pub stoch_period: usize,
    pub atr_period: usize,
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub cci_period: usize,
    pub williams_period: usize,
    pub momentum_period: usize,
    pub adx_period: usize,
    pub volume_sma_period: usize,
    pub tenkan_period: usize,
    pub kijun_period: usize,
    pub vwap_period: usize,
    pub supertrend_period: usize,
    pub supertrend_mult: f64,
    pub keltner_period: usize,
    pub keltner_mult: f64,
    pub keltner_atr_period: usize,
    pub donchian_period: usize,
    pub mfi_period: usize,
    pub ao_fast: usize,
    pub ao_slow: usize,
    pub cmf_period: usize,
    pub roc_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            stoch_period: 14,
            atr_period: 14,
            ema_short_period: 9,
            ema_long_period: 21,
            cci_period: 20,
            williams_period: 14,
            momentum_period: 10,
            adx_period: 14,
            volume_sma_period: 20,
            tenkan_period: 9,
            kijun_period: 26,
            vwap_period: 20,
            supertrend_period: 10,
            supertrend_mult: 3.0,
            keltner_period: 20,
            keltner_mult: 2.0,
            keltner_atr_period: 10,
            donchian_period: 20,
            mfi_period: 14,
            ao_fast: 5,
            ao_slow: 34,
            cmf_period: 20,
            roc_period: 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochValue {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IchimokuValue {
    pub tenkan: f64,
    pub kijun: f64,
}

/// SuperTrend reading: `direction` is +1 (bullish) or -1 (bearish), `value`
/// is the opposing band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperTrendValue {
    pub direction: i8,
    pub value: f64,
}

/// Upper/lower channel pair (Keltner, Donchian)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub upper: f64,
    pub lower: f64,
}

/// Full indicator battery computed from one candle window.
///
/// Stateless: recomputed from scratch each cycle, identical inputs produce
/// identical output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: MacdValue,
    pub bollinger: BollingerBands,
    pub ema_short: f64,
    pub ema_long: f64,
    pub stoch: StochValue,
    pub atr: f64,
    pub obv: f64,
    pub cci: f64,
    pub williams_r: f64,
    pub momentum: f64,
    pub adx: f64,
    pub volume_sma: f64,
    pub ichimoku: IchimokuValue,
    pub vwap: f64,
    pub super_trend: SuperTrendValue,
    pub psar: f64,
    pub keltner: Channel,
    pub donchian: Channel,
    pub mfi: f64,
    pub ao: f64,
    pub cmf: f64,
    pub roc: f64,
}

impl IndicatorSnapshot {
    pub fn compute(candles: &[Candle], cfg: &IndicatorConfig) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        Self {
            rsi: rsi(candles, cfg.rsi_period),
            macd: macd(&closes, cfg.macd_fast, cfg.macd_slow),
            bollinger: bollinger(&closes, cfg.bollinger_period, cfg.bollinger_mult),
            ema_short: ema(&closes, cfg.ema_short_period, None),
            ema_long: ema(&closes, cfg.ema_long_period, None),
            stoch: stochastic(candles, cfg.stoch_period),
            atr: atr(candles, cfg.atr_period),
            obv: obv(candles),
            cci: cci(candles, cfg.cci_period),
            williams_r: williams_r(candles, cfg.williams_period),
            momentum: momentum(&closes, cfg.momentum_period),
            adx: adx(candles, cfg.adx_period, cfg.ema_short_period, cfg.ema_long_period),
            volume_sma: volume_sma(candles, cfg.volume_sma_period),
            ichimoku: ichimoku(candles, cfg.tenkan_period, cfg.kijun_period),
            vwap: vwap(candles, cfg.vwap_period),
            super_trend: super_trend(candles, cfg.supertrend_period, cfg.supertrend_mult),
            psar: psar(candles),
            keltner: keltner(
                candles,
                cfg.keltner_period,
                cfg.keltner_mult,
                cfg.keltner_atr_period,
            ),
            donchian: donchian(candles, cfg.donchian_period),
            mfi: mfi(candles, cfg.mfi_period),
            ao: awesome_oscillator(candles, cfg.ao_fast, cfg.ao_slow),
            cmf: cmf(candles, cfg.cmf_period),
            roc: roc(&closes, cfg.roc_period),
        }
    }
}

/// Simple moving average over the trailing `period`; 0 on short windows.
fn sma(data: &[f64], period: usize) -> f64 {
    if period == 0 || data.len() < period {
        return 0.0;
    }
    let slice = &data[data.len() - period..];
    slice.iter().sum::<f64>() / period as f64
}

/// Exponential step from `seed`; without a seed this degrades to a plain SMA.
fn ema(data: &[f64], period: usize, seed: Option<f64>) -> f64 {
    if data.len() < period {
        return 0.0;
    }
    match seed {
        None => sma(data, period),
        Some(prev) => {
            let k = 2.0 / (period as f64 + 1.0);
            let price = data[data.len() - 1];
            price * k + prev * (1.0 - k)
        }
    }
}

/// Classic average-gain/average-loss RSI; 50 on short windows, 100 when the
/// window has no losses.
pub fn rsi(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 50.0;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in candles.len() - period..candles.len() {
        let diff = candles[i].close - candles[i - 1].close;
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line seeded from the prior window's SMA; signal = 0.8 x line.
pub fn macd(closes: &[f64], fast: usize, slow: usize) -> MacdValue {
    let prior = &closes[..closes.len().saturating_sub(1)];
    let ema_fast = ema(closes, fast, Some(sma(prior, fast)));
    let ema_slow = ema(closes, slow, Some(sma(prior, slow)));
    let line = ema_fast - ema_slow;
    let signal = line * 0.8;
    MacdValue {
        macd: line,
        signal,
        histogram: line - signal,
    }
}

/// SMA +/- `mult` population standard deviations; zeroed on short windows.
pub fn bollinger(closes: &[f64], period: usize, mult: f64) -> BollingerBands {
    if closes.len() < period || period == 0 {
        return BollingerBands {
            upper: 0.0,
            middle: 0.0,
            lower: 0.0,
        };
    }
    let middle = sma(closes, period);
    let slice = &closes[closes.len() - period..];
    let variance = slice
        .iter()
        .map(|v| (v - middle).powi(2))
        .sum::<f64>()
        / period as f64;
    let std_dev = variance.sqrt();
    BollingerBands {
        upper: middle + std_dev * mult,
        middle,
        lower: middle - std_dev * mult,
    }
}

/// %K over the trailing window, with D pinned to K; 50/50 when short or flat.
pub fn stochastic(candles: &[Candle], period: usize) -> StochValue {
    if candles.len() < period || period == 0 {
        return StochValue { k: 50.0, d: 50.0 };
    }
    let slice = &candles[candles.len() - period..];
    let low_min = slice.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let high_max = slice.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let range = high_max - low_min;
    if range == 0.0 {
        return StochValue { k: 50.0, d: 50.0 };
    }
    let close = candles[candles.len() - 1].close;
    let k = (close - low_min) / range * 100.0;
    StochValue { k, d: k }
}

/// Single-bar true range of the last two candles; 0 on short windows.
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 0.0;
    }
    let cur = &candles[candles.len() - 1];
    let prev = &candles[candles.len() - 2];
    (cur.high - cur.low)
        .max((cur.high - prev.close).abs())
        .max((cur.low - prev.close).abs())
}

/// On-balance volume accumulated over the whole window.
pub fn obv(candles: &[Candle]) -> f64 {
    let mut total = 0.0;
    for i in 1..candles.len() {
        if candles[i].close > candles[i - 1].close {
            total += candles[i].volume;
        } else if candles[i].close < candles[i - 1].close {
            total -= candles[i].volume;
        }
    }
    total
}

/// Commodity Channel Index; 0 on short or flat windows.
pub fn cci(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period || period == 0 {
        return 0.0;
    }
    let tps: Vec<f64> = candles[candles.len() - period..]
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();
    let sma_tp = tps.iter().sum::<f64>() / period as f64;
    let mean_dev = tps.iter().map(|tp| (tp - sma_tp).abs()).sum::<f64>() / period as f64;
    if mean_dev == 0.0 {
        return 0.0;
    }
    let current = tps[tps.len() - 1];
    (current - sma_tp) / (0.015 * mean_dev)
}

/// Williams %R; -50 on short or flat windows.
pub fn williams_r(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period || period == 0 {
        return -50.0;
    }
    let slice = &candles[candles.len() - period..];
    let high_max = slice.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low_min = slice.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let range = high_max - low_min;
    if range == 0.0 {
        return -50.0;
    }
    let close = candles[candles.len() - 1].close;
    (high_max - close) / range * -100.0
}

/// Absolute close-to-close change over `period` bars; 0 on short windows.
pub fn momentum(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 0.0;
    }
    closes[closes.len() - 1] - closes[closes.len() - 1 - period]
}

/// Trend-strength proxy scaled into [0, 100] from short/long EMA divergence;
/// neutral 25 on short windows.
pub fn adx(candles: &[Candle], period: usize, ema_short: usize, ema_long: usize) -> f64 {
    if candles.len() < period + 1 {
        return 25.0;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let short = ema(&closes, ema_short, None);
    let long = ema(&closes, ema_long, None);
    if long == 0.0 {
        return 25.0;
    }
    let divergence = (short - long).abs() / long * 1000.0;
    (20.0 + divergence * 2.0).clamp(0.0, 100.0)
}

pub fn volume_sma(candles: &[Candle], period: usize) -> f64 {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    sma(&volumes, period)
}

/// High/low midpoint over the trailing `period`; 0 on short windows.
fn midpoint(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period || period == 0 {
        return 0.0;
    }
    let slice = &candles[candles.len() - period..];
    let high = slice.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = slice.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    (high + low) / 2.0
}

/// Tenkan/Kijun midpoints only, no cloud spans.
pub fn ichimoku(candles: &[Candle], tenkan_period: usize, kijun_period: usize) -> IchimokuValue {
    IchimokuValue {
        tenkan: midpoint(candles, tenkan_period),
        kijun: midpoint(candles, kijun_period),
    }
}

/// Rolling typical-price VWAP over the trailing `period` (not session VWAP);
/// falls back to the last close on short or volume-less windows.
pub fn vwap(candles: &[Candle], period: usize) -> f64 {
    let last_close = match candles.last() {
        Some(c) => c.close,
        None => return 0.0,
    };
    if candles.len() < period {
        return last_close;
    }
    let slice = &candles[candles.len() - period..];
    let mut cum_tp_vol = 0.0;
    let mut cum_vol = 0.0;
    for c in slice {
        let tp = (c.high + c.low + c.close) / 3.0;
        cum_tp_vol += tp * c.volume;
        cum_vol += c.volume;
    }
    if cum_vol == 0.0 {
        last_close
    } else {
        cum_tp_vol / cum_vol
    }
}

/// Direction is inferred from last-vs-previous close only (no recursive band
/// tracking); value is the opposing band at `mult` ATRs off the hl2 midpoint.
pub fn super_trend(candles: &[Candle], period: usize, mult: f64) -> SuperTrendValue {
    if candles.len() < period || candles.len() < 2 {
        return SuperTrendValue {
            direction: 1,
            value: 0.0,
        };
    }
    let bar_range = atr(candles, period);
    let last = &candles[candles.len() - 1];
    let hl2 = (last.high + last.low) / 2.0;
    let basic_upper = hl2 + mult * bar_range;
    let basic_lower = hl2 - mult * bar_range;
    let prev_close = candles[candles.len() - 2].close;
    let is_up = last.close > prev_close;
    SuperTrendValue {
        direction: if is_up { 1 } else { -1 },
        value: if is_up { basic_lower } else { basic_upper },
    }
}

/// Simplified parabolic SAR from the last two closes with a fixed 0.02
/// acceleration; 0 under five candles.
pub fn psar(candles: &[Candle]) -> f64 {
    if candles.len() < 5 {
        return 0.0;
    }
    let last = &candles[candles.len() - 1];
    let prev = &candles[candles.len() - 2];
    let acceleration = 0.02;
    if last.close > prev.close {
        last.low * (1.0 - acceleration)
    } else {
        last.high * (1.0 + acceleration)
    }
}

/// EMA-centered channel at `mult` ATRs, using the shorter ATR lookback.
pub fn keltner(candles: &[Candle], period: usize, mult: f64, atr_period: usize) -> Channel {
    if candles.len() < period {
        return Channel {
            upper: 0.0,
            lower: 0.0,
        };
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let center = ema(&closes, period, None);
    let bar_range = atr(candles, atr_period);
    Channel {
        upper: center + mult * bar_range,
        lower: center - mult * bar_range,
    }
}

pub fn donchian(candles: &[Candle], period: usize) -> Channel {
    if candles.len() < period || period == 0 {
        return Channel {
            upper: 0.0,
            lower: 0.0,
        };
    }
    let slice = &candles[candles.len() - period..];
    Channel {
        upper: slice.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
        lower: slice.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
    }
}

/// Money Flow Index; 50 on short windows, 100 when there is no negative flow.
pub fn mfi(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 50.0;
    }
    let slice = &candles[candles.len() - (period + 1)..];
    let mut pos_flow = 0.0;
    let mut neg_flow = 0.0;
    for i in 1..slice.len() {
        let cur = &slice[i];
        let prev = &slice[i - 1];
        let tp = (cur.high + cur.low + cur.close) / 3.0;
        let prev_tp = (prev.high + prev.low + prev.close) / 3.0;
        let raw = tp * cur.volume;
        if tp > prev_tp {
            pos_flow += raw;
        } else if tp < prev_tp {
            neg_flow += raw;
        }
    }
    if neg_flow == 0.0 {
        return 100.0;
    }
    let ratio = pos_flow / neg_flow;
    100.0 - 100.0 / (1.0 + ratio)
}

/// Awesome Oscillator on high/low midpoints; 0 until the slow window fills.
pub fn awesome_oscillator(candles: &[Candle], fast: usize, slow: usize) -> f64 {
    if candles.len() < slow + 1 {
        return 0.0;
    }
    let mids: Vec<f64> = candles.iter().map(|c| (c.high + c.low) / 2.0).collect();
    sma(&mids, fast) - sma(&mids, slow)
}

/// Chaikin Money Flow; 0 on short or volume-less windows.
pub fn cmf(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period || period == 0 {
        return 0.0;
    }
    let slice = &candles[candles.len() - period..];
    let mut ad_sum = 0.0;
    let mut vol_sum = 0.0;
    for c in slice {
        let spread = c.high - c.low;
        let denom = if spread == 0.0 { 1.0 } else { spread };
        let mfv = ((c.close - c.low) - (c.high - c.close)) / denom;
        ad_sum += mfv * c.volume;
        vol_sum += c.volume;
    }
    if vol_sum == 0.0 {
        0.0
    } else {
        ad_sum / vol_sum
    }
}

/// Rate of change in percent over `period` bars; 0 on short windows.
pub fn roc(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 0.0;
    }
    let current = closes[closes.len() - 1];
    let past = closes[closes.len() - 1 - period];
    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}
