//! Decision aggregator - blends personas, timeframes and sentiment into one
//! BUY/SELL/HOLD verdict with stop and target levels
//!
//! Pure per cycle: reads the adaptive weights but never mutates shared state.

use tracing::debug;

use crate::brain::learning::PersonaWeights;
use crate::brain::personas;
use crate::error::EngineError;
use crate::indicators::{IndicatorConfig, IndicatorSnapshot};
use crate::types::{
    AnalysisResult, Candle, Decision, DominantPersona, Timeframe, TimeframeAnalysis,
    TimeframeCandles, TrendDirection,
};

/// Minimum candles on the shortest timeframe before a decision is attempted
pub const MIN_HISTORY: usize = 50;

/// Absolute aggregate score required for a BUY/SELL candidate
const SCORE_THRESHOLD: f64 = 0.35;

/// Blend weights for the 5m/15m/1h persona scores
const TIMEFRAME_BLEND: [f64; 3] = [0.2, 0.3, 0.5];

/// Share of the final score contributed by external sentiment when present
const SENTIMENT_SHARE: f64 = 0.2;

/// ADX floor for the trend-strength confirmation path
const ADX_TREND_FLOOR: f64 = 20.0;

/// Confidence bonus when SuperTrend and VWAP both confirm the candidate
const CONFIRMATION_BONUS: f64 = 10.0;

/// Confidence penalty for buying below the 1h Tenkan line
const TENKAN_PENALTY: f64 = 15.0;

/// Fixed reward-to-risk multiple for the take-profit level
const REWARD_RATIO: f64 = 2.0;

const MAX_CONFIDENCE: f64 = 99.0;

/// Per-persona aggregate scores across the three timeframes
#[derive(Debug, Clone, Copy)]
struct AggregateScores {
    conservative: f64,
    aggressive: f64,
    trend: f64,
}

pub struct DecisionEngine {
    indicators: IndicatorConfig,
}

impl DecisionEngine {
    pub fn new(indicators: IndicatorConfig) -> Self {
        Self { indicators }
    }

    /// Evaluate one instrument for one cycle.
    ///
    /// Fails with `InsufficientHistory` when the 5m feed is below the minimum
    /// window; the caller treats that as a transient data condition.
    pub fn analyze(
        &self,
        pair: &str,
        price: f64,
        candles: &TimeframeCandles,
        weights: &PersonaWeights,
        sentiment: Option<f64>,
    ) -> Result<AnalysisResult, EngineError> {
        if candles.m5.len() < MIN_HISTORY {
            return Err(EngineError::InsufficientHistory {
                pair: pair.to_string(),
                got: candles.m5.len(),
                need: MIN_HISTORY,
            });
        }

        let (analysis_5m, _) = self.analyze_timeframe(Timeframe::M5, &candles.m5);
        let (analysis_15m, _) = self.analyze_timeframe(Timeframe::M15, &candles.m15);
        let (analysis_1h, ind_1h) = self.analyze_timeframe(Timeframe::H1, &candles.h1);

        let scores = aggregate_scores(&analysis_5m, &analysis_15m, &analysis_1h);
        let mut total = blend_with_weights(&scores, weights);
        if let Some(sentiment) = sentiment {
            total = total * (1.0 - SENTIMENT_SHARE) + sentiment * SENTIMENT_SHARE;
        }

        let (decision, bonus) = confirm_candidate(total, &ind_1h, price);

        let mut confidence = total.abs() * 100.0 + bonus;
        if decision == Decision::Buy && price < ind_1h.ichimoku.tenkan {
            confidence -= TENKAN_PENALTY;
        }
        let confidence = confidence.clamp(0.0, MAX_CONFIDENCE).round();

        let (recommended_sl, recommended_tp) = stop_and_target(decision, price, &ind_1h);
        let dominant_persona = dominant(&scores);
        let reasoning = reasoning_text(decision, confidence, price, &ind_1h);

        debug!(
            pair,
            total,
            %decision,
            confidence,
            ?dominant_persona,
            "cycle decision"
        );

        Ok(AnalysisResult {
            pair: pair.to_string(),
            decision,
            confidence,
            recommended_sl,
            recommended_tp,
            risk_reward_ratio: REWARD_RATIO,
            dominant_persona,
            external_sentiment: sentiment,
            reasoning,
            breakdown: vec![analysis_5m, analysis_15m, analysis_1h],
        })
    }

    fn analyze_timeframe(
        &self,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> (TimeframeAnalysis, IndicatorSnapshot) {
        let snapshot = IndicatorSnapshot::compute(candles, &self.indicators);
        let verdicts = personas::score_all(&snapshot);
        let trend = if snapshot.super_trend.direction == 1 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };
        (
            TimeframeAnalysis {
                timeframe,
                trend,
                rsi: snapshot.rsi,
                personas: verdicts,
            },
            snapshot,
        )
    }
}

/// Blend each persona's three timeframe activations: 0.2 short, 0.3 medium,
/// 0.5 long.
fn aggregate_scores(
    m5: &TimeframeAnalysis,
    m15: &TimeframeAnalysis,
    h1: &TimeframeAnalysis,
) -> AggregateScores {
    let blend = |a: f64, b: f64, c: f64| {
        a * TIMEFRAME_BLEND[0] + b * TIMEFRAME_BLEND[1] + c * TIMEFRAME_BLEND[2]
    };
    AggregateScores {
        conservative: blend(
            m5.personas.conservative.activation,
            m15.personas.conservative.activation,
            h1.personas.conservative.activation,
        ),
        aggressive: blend(
            m5.personas.aggressive.activation,
            m15.personas.aggressive.activation,
            h1.personas.aggressive.activation,
        ),
        trend: blend(
            m5.personas.trend.activation,
            m15.personas.trend.activation,
            h1.personas.trend.activation,
        ),
    }
}

/// Combine the persona aggregates under the adaptive weights (normalized to
/// sum to 1, so fresh {1,1,1} weights reduce to a plain average).
fn blend_with_weights(scores: &AggregateScores, weights: &PersonaWeights) -> f64 {
    let w = weights.normalized();
    scores.conservative * w.conservative + scores.aggressive * w.aggressive
        + scores.trend * w.trend
}

/// Threshold the total score into a candidate and run the trend-confirmation
/// filter. Returns the confirmed decision and the confidence bonus earned.
///
/// A candidate survives only if the 1h SuperTrend direction and VWAP relation
/// both agree with it, or ADX exceeds the trend floor with a matching
/// SuperTrend; anything else downgrades to HOLD.
fn confirm_candidate(total: f64, ind_1h: &IndicatorSnapshot, price: f64) -> (Decision, f64) {
    let trend_strong = ind_1h.adx > ADX_TREND_FLOOR;
    let supertrend_bullish = ind_1h.super_trend.direction == 1;
    let vwap_bullish = price > ind_1h.vwap;

    if total > SCORE_THRESHOLD {
        if supertrend_bullish && vwap_bullish {
            return (Decision::Buy, CONFIRMATION_BONUS);
        }
        if trend_strong && supertrend_bullish {
            return (Decision::Buy, 0.0);
        }
    } else if total < -SCORE_THRESHOLD {
        if !supertrend_bullish && !vwap_bullish {
            return (Decision::Sell, CONFIRMATION_BONUS);
        }
        if trend_strong && !supertrend_bullish {
            return (Decision::Sell, 0.0);
        }
    }
    (Decision::Hold, 0.0)
}

/// Stop below the bullish SuperTrend band (or 2 ATR away when the band does
/// not apply), target at a fixed 2:1 multiple of the stop distance.
fn stop_and_target(decision: Decision, price: f64, ind_1h: &IndicatorSnapshot) -> (f64, f64) {
    // Degenerate ATR on thin history: fall back to 1% of price
    let atr = if ind_1h.atr == 0.0 {
        price * 0.01
    } else {
        ind_1h.atr
    };

    match decision {
        Decision::Buy => {
            let sl = if ind_1h.super_trend.direction == 1 {
                ind_1h.super_trend.value
            } else {
                price - atr * 2.0
            };
            let tp = price + (price - sl) * REWARD_RATIO;
            (sl, tp)
        }
        Decision::Sell => {
            let sl = if ind_1h.super_trend.direction == -1 {
                ind_1h.super_trend.value
            } else {
                price + atr * 2.0
            };
            let tp = price - (sl - price) * REWARD_RATIO;
            (sl, tp)
        }
        Decision::Hold => (0.0, 0.0),
    }
}

/// Persona with the largest absolute aggregate; exact ties mean no single
/// persona dominated.
fn dominant(scores: &AggregateScores) -> DominantPersona {
    let entries = [
        (DominantPersona::Conservative, scores.conservative.abs()),
        (DominantPersona::Aggressive, scores.aggressive.abs()),
        (DominantPersona::Trend, scores.trend.abs()),
    ];
    let max = entries
        .iter()
        .map(|(_, magnitude)| *magnitude)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut winners = entries.iter().filter(|(_, magnitude)| *magnitude == max);
    let first = winners.next().map(|(persona, _)| *persona);
    if winners.next().is_some() {
        return DominantPersona::Balanced;
    }
    first.unwrap_or(DominantPersona::Balanced)
}

fn reasoning_text(
    decision: Decision,
    confidence: f64,
    price: f64,
    ind_1h: &IndicatorSnapshot,
) -> String {
    let supertrend_bullish = ind_1h.super_trend.direction == 1;
    let mut text = format!(
        "Trend 1H: {} (ST: {}). VWAP: {} Price. ",
        if supertrend_bullish { "UP" } else { "DOWN" },
        if supertrend_bullish { "Bull" } else { "Bear" },
        if price > ind_1h.vwap { "<" } else { ">" },
    );
    if decision != Decision::Hold {
        text.push_str(&format!(
            "{} Signal. Conf: {:.0}%. MFI: {:.0}.",
            decision, confidence, ind_1h.mfi
        ));
    } else {
        text.push_str("No confluence found.");
    }
    text
}
