//! Paper Runner - autonomous paper-trading agent
//!
//! 1. Loads settings and any persisted portfolio/learning state
//! 2. Fetches candles and prices through the market data source chain
//! 3. Scores each instrument with the persona brain
//! 4. Applies decisions to the simulated portfolio
//! 5. Nudges persona weights from every closed trade's outcome

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use paper_runner::config::Settings;
use paper_runner::gateway::MarketGateway;
use paper_runner::portfolio::dec;
use paper_runner::runner::BotRunner;
use paper_runner::sentiment::SentimentFeed;
use paper_runner::state::{EngineState, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Paper Runner...");

    let settings = Settings::load()?;
    info!(
        focus = %settings.focus_pair,
        pairs = ?settings.pairs,
        sizing = ?settings.sizing,
        "configuration loaded"
    );

    let store = match &settings.state_file {
        Some(path) => StateStore::file(path.clone()),
        None => StateStore::in_memory(),
    };
    let persisted = store
        .load_or_initial(dec(settings.starting_balance), settings.learning_rate)
        .await;
    info!(
        balance = %persisted.book.portfolio.cash_balance,
        epoch = persisted.learning.epoch,
        "state restored"
    );

    let state = Arc::new(Mutex::new(EngineState::from_persisted(
        persisted,
        settings.focus_pair.clone(),
    )));

    let timeout = Duration::from_secs(settings.fetch_timeout_secs);
    let gateway = MarketGateway::new(
        settings.market_sources.clone(),
        timeout,
        settings.candle_limit,
    )?;
    let sentiment = SentimentFeed::new(settings.sentiment_providers.clone(), timeout)?;

    let runner = BotRunner::new(settings, gateway, sentiment, store, state);
    runner.run().await
}
