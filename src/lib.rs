//! Paper Runner
//!
//! Autonomous paper-trading engine: technical indicators over multi-timeframe
//! candle windows, persona-blended decision scoring with adaptive weights,
//! and a simulated portfolio that opens, tracks and closes positions against
//! those decisions.

pub mod brain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod indicators;
pub mod portfolio;
pub mod runner;
pub mod sentiment;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use brain::{DecisionEngine, LearningState, PersonaWeights};
pub use config::{Settings, SizingStrategy, TrailingConfig};
pub use error::EngineError;
pub use gateway::{MarketGateway, MarketSource};
pub use indicators::{IndicatorConfig, IndicatorSnapshot};
pub use portfolio::{PaperBook, Portfolio, Trade, TradeStatus};
pub use runner::BotRunner;
pub use sentiment::{SentimentFeed, SentimentProviderConfig};
pub use state::{EngineState, PersistedState, SharedState, StateStore};
pub use types::{AnalysisResult, Candle, Decision, Timeframe, TradeSide};
