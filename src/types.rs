//! Core types shared across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle timeframes the engine evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    M5,
    M15,
    H1,
}

impl Timeframe {
    /// Exchange interval string ("5m", "15m", "1h")
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }

    /// Bucket length in seconds
    pub fn secs(&self) -> i64 {
        match self {
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OHLCV price bar. `time` is unix milliseconds; series are ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle windows for the three evaluated timeframes
#[derive(Debug, Clone)]
pub struct TimeframeCandles {
    pub m5: Vec<Candle>,
    pub m15: Vec<Candle>,
    pub h1: Vec<Candle>,
}

/// Final trade decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Long,
    Short,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Long => write!(f, "LONG"),
            TradeSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Which persona's aggregate score carried the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominantPersona {
    Conservative,
    Aggressive,
    Trend,
    Balanced,
}

impl std::fmt::Display for DominantPersona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DominantPersona::Conservative => write!(f, "Conservative"),
            DominantPersona::Aggressive => write!(f, "Aggressive"),
            DominantPersona::Trend => write!(f, "Trend"),
            DominantPersona::Balanced => write!(f, "Balanced"),
        }
    }
}

/// Diagnostic label a single persona emits for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    Buy,
    Sell,
    Wait,
}

/// One persona's activation on one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaVerdict {
    /// tanh activation in (-1, 1)
    pub activation: f64,
    pub label: VerdictLabel,
}

/// Per-timeframe persona verdicts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaVerdicts {
    pub conservative: PersonaVerdict,
    pub aggressive: PersonaVerdict,
    pub trend: PersonaVerdict,
}

/// Trend direction read off the SuperTrend for a timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Up,
    Down,
}

/// Single-timeframe analysis breakdown kept for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub trend: TrendDirection,
    pub rsi: f64,
    pub personas: PersonaVerdicts,
}

/// Full evaluation result for one instrument, produced fresh every cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub pair: String,
    pub decision: Decision,
    /// Clamped to [0, 99]
    pub confidence: f64,
    pub recommended_sl: f64,
    pub recommended_tp: f64,
    pub risk_reward_ratio: f64,
    pub dominant_persona: DominantPersona,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sentiment: Option<f64>,
    pub reasoning: String,
    pub breakdown: Vec<TimeframeAnalysis>,
}

/// Operator log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// One entry in the bounded operator event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Market data health shown to the operator instead of crashing on outages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Pending,
    Ok,
    Degraded,
}
