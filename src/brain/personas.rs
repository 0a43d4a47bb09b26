//! Fixed persona scoring - a linear model over normalized indicator inputs
//!
//! Each persona is a hard-coded 22-element weight vector plus bias; the
//! activation is `tanh(dot(inputs, weights) + bias)`. No training happens at
//! runtime - the only adaptation is the per-persona outcome nudge in
//! [`crate::brain::learning`].

use crate::indicators::IndicatorSnapshot;
use crate::types::{PersonaVerdict, PersonaVerdicts, VerdictLabel};

/// Number of normalized indicator inputs fed to every persona
pub const INPUT_COUNT: usize = 22;

/// Activation magnitude above which a persona's diagnostic label flips from
/// WAIT to BUY/SELL
pub const LABEL_THRESHOLD: f64 = 0.35;

/// One scoring persona: a named fixed linear model
#[derive(Debug, Clone, Copy)]
pub struct Persona {
    pub name: &'static str,
    pub weights: [f64; INPUT_COUNT],
    pub bias: f64,
}

/// Emphasizes RSI, Bollinger, SuperTrend, Keltner and VWAP
pub const CONSERVATIVE: Persona = Persona {
    name: "Conservative",
    weights: [
        -0.8, 0.2, -0.6, 0.2, -0.4, -0.2, 0.1, -0.2, -0.3, 0.1, 0.3, -0.1, //
        0.1, 0.5, 0.8, -0.2, -0.4, 0.1, 0.1, 0.2, 0.2, 0.1,
    ],
    bias: 0.3,
};

/// Emphasizes momentum, ROC, AO, CCI and Donchian breakouts
pub const AGGRESSIVE: Persona = Persona {
    name: "Aggressive",
    weights: [
        -0.2, 0.6, 0.1, 0.4, 0.3, 0.5, 0.3, 0.6, 0.2, 0.9, 0.2, 0.4, //
        0.2, 0.1, 0.2, 0.1, 0.1, 0.8, 0.3, 0.9, 0.4, 1.2,
    ],
    bias: -0.2,
};

/// Emphasizes ADX, EMA spread, SuperTrend, Ichimoku and PSAR
pub const TREND: Persona = Persona {
    name: "Trend",
    weights: [
        0.1, 0.8, 0.2, 1.2, 0.1, 0.1, 0.4, 0.2, 0.1, 0.3, 1.5, 0.5, //
        0.9, 0.2, 1.5, 0.7, 0.3, 0.4, 0.2, 0.3, 0.2, 0.5,
    ],
    bias: 0.1,
};

impl Persona {
    /// Activation in (-1, 1) for one normalized input vector
    pub fn score(&self, inputs: &[f64; INPUT_COUNT]) -> f64 {
        let dot: f64 = inputs
            .iter()
            .zip(self.weights.iter())
            .map(|(x, w)| x * w)
            .sum();
        (dot + self.bias).tanh()
    }

    /// Activation plus the diagnostic BUY/SELL/WAIT label
    pub fn verdict(&self, inputs: &[f64; INPUT_COUNT]) -> PersonaVerdict {
        let activation = self.score(inputs);
        let label = if activation > LABEL_THRESHOLD {
            VerdictLabel::Buy
        } else if activation < -LABEL_THRESHOLD {
            VerdictLabel::Sell
        } else {
            VerdictLabel::Wait
        };
        PersonaVerdict { activation, label }
    }
}

/// Run all three personas against one indicator snapshot
pub fn score_all(snapshot: &IndicatorSnapshot) -> PersonaVerdicts {
    let inputs = normalize_inputs(snapshot);
    PersonaVerdicts {
        conservative: CONSERVATIVE.verdict(&inputs),
        aggressive: AGGRESSIVE.verdict(&inputs),
        trend: TREND.verdict(&inputs),
    }
}

/// Map an indicator snapshot onto the fixed 22-entry input vector.
///
/// Each entry has its own normalization rule; the ordering is part of the
/// persona weight contract and must not change.
pub fn normalize_inputs(ind: &IndicatorSnapshot) -> [f64; INPUT_COUNT] {
    [
        (ind.rsi - 50.0) / 50.0,
        ind.macd.histogram * 10.0,
        if ind.bollinger.upper - ind.bollinger.lower == 0.0 {
            0.0
        } else {
            ind.rsi / 100.0
        },
        ind.ema_short - ind.ema_long,
        (ind.stoch.k - 50.0) / 50.0,
        ind.atr * 10.0,
        if ind.obv > 0.0 { 0.5 } else { -0.5 },
        ind.cci / 100.0,
        (ind.williams_r + 50.0) / 50.0,
        ind.momentum,
        (ind.adx - 25.0) / 25.0,
        if ind.volume_sma > 0.0 { 1.0 } else { 0.0 },
        ind.ichimoku.tenkan - ind.ichimoku.kijun,
        if ind.vwap > 0.0 { 1.0 } else { 0.0 },
        f64::from(ind.super_trend.direction),
        if ind.psar > 0.0 { 1.0 } else { -1.0 },
        ind.keltner.upper - ind.keltner.lower,
        ind.donchian.upper - ind.donchian.lower,
        (ind.mfi - 50.0) / 50.0,
        ind.ao,
        ind.cmf,
        ind.roc / 10.0,
    ]
}
