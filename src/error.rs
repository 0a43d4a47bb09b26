//! Engine error taxonomy
//!
//! Every variant is recoverable at the cycle boundary: a failed cycle for one
//! instrument is skipped and logged, never fatal to the scheduler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Market data fetch failed or timed out on every configured source
    #[error("market data unavailable for {pair}: {reason}")]
    DataUnavailable { pair: String, reason: String },

    /// Fewer candles than the decision engine's minimum window
    #[error("insufficient history for {pair}: {got} candles, need {need}")]
    InsufficientHistory {
        pair: String,
        got: usize,
        need: usize,
    },

    /// Computed position size below the minimum or exceeding free balance
    #[error("position sizing rejected: {reason}")]
    SizingRejected { reason: String },
}
