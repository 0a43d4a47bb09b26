//! Bot runner - the periodic evaluation loop
//!
//! One task drives two cadences through a single `select!` loop: the focused
//! instrument on a short interval and a randomly chosen background instrument
//! on a faster one. Because both arms run on the same task, portfolio and
//! learning mutations are naturally serialized; the shared state lock exists
//! for presentation-layer readers.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::brain::DecisionEngine;
use crate::config::Settings;
use crate::error::EngineError;
use crate::gateway::MarketGateway;
use crate::indicators::IndicatorSnapshot;
use crate::portfolio::dec;
use crate::sentiment::SentimentFeed;
use crate::state::{SharedState, StateStore};
use crate::types::{Connectivity, Severity, Timeframe, TimeframeCandles};

pub struct BotRunner {
    settings: Settings,
    gateway: MarketGateway,
    sentiment: SentimentFeed,
    store: StateStore,
    state: SharedState,
    engine: DecisionEngine,
}

impl BotRunner {
    pub fn new(
        settings: Settings,
        gateway: MarketGateway,
        sentiment: SentimentFeed,
        store: StateStore,
        state: SharedState,
    ) -> Self {
        let engine = DecisionEngine::new(settings.indicators.clone());
        Self {
            settings,
            gateway,
            sentiment,
            store,
            state,
            engine,
        }
    }

    /// Shared state handle for presentation-layer readers
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Run the evaluation loop until the process stops
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            focus = %self.settings.focus_pair,
            pairs = self.settings.pairs.len(),
            "paper runner starting main loop"
        );

        let mut focus_interval = interval(Duration::from_secs(self.settings.focus_interval_secs));
        let mut roam_interval = interval(Duration::from_secs(self.settings.roam_interval_secs));
        let mut heartbeat_interval =
            interval(Duration::from_secs(self.settings.heartbeat_interval_secs));

        loop {
            tokio::select! {
                _ = focus_interval.tick() => {
                    let pair = self.state.lock().unwrap().focus_pair.clone();
                    self.run_once(&pair).await;
                }
                _ = roam_interval.tick() => {
                    if let Some(pair) = self.pick_roam_pair() {
                        self.run_once(&pair).await;
                    }
                }
                _ = heartbeat_interval.tick() => {
                    self.heartbeat();
                }
            }
        }
    }

    /// One guarded evaluation cycle. Every failure is absorbed here so a bad
    /// instrument or a dead venue never unwinds the scheduler.
    pub async fn run_once(&self, pair: &str) {
        match self.run_cycle(pair).await {
            Ok(()) => {}
            Err(EngineError::DataUnavailable { ref reason, .. }) => {
                warn!(pair, %reason, "cycle skipped, market data unavailable");
                let mut st = self.state.lock().unwrap();
                st.connectivity = Connectivity::Degraded;
                st.logs
                    .push(format!("data error {pair}: {reason}"), Severity::Error);
            }
            Err(EngineError::InsufficientHistory { got, need, .. }) => {
                debug!(pair, got, need, "cycle skipped, not enough history");
                self.state.lock().unwrap().logs.push(
                    format!("{pair}: only {got}/{need} candles, awaiting history"),
                    Severity::Warn,
                );
            }
            Err(e) => {
                // Sizing errors are handled inside the cycle; anything else
                // still must not take the loop down
                warn!(pair, "cycle error: {e}");
                self.state
                    .lock()
                    .unwrap()
                    .logs
                    .push(e.to_string(), Severity::Warn);
            }
        }
    }

    async fn run_cycle(&self, pair: &str) -> Result<(), EngineError> {
        let price = self.gateway.fetch_price(pair).await?;
        let (m5, m15, h1) = tokio::try_join!(
            self.gateway.fetch_candles(pair, Timeframe::M5),
            self.gateway.fetch_candles(pair, Timeframe::M15),
            self.gateway.fetch_candles(pair, Timeframe::H1),
        )?;
        let candles = TimeframeCandles { m5, m15, h1 };

        let snapshot_5m = IndicatorSnapshot::compute(&candles.m5, &self.settings.indicators);
        let (_readings, sentiment) = self
            .sentiment
            .global_sentiment(pair, Some(&snapshot_5m))
            .await;

        let weights = self.state.lock().unwrap().learning.weights;
        let analysis = self
            .engine
            .analyze(pair, price, &candles, &weights, sentiment)?;

        let now = Utc::now();
        let persisted = {
            let mut st = self.state.lock().unwrap();
            st.connectivity = Connectivity::Ok;

            // Close first: realized outcomes must land before a new entry is
            // considered for the same instrument
            let closed = st.book.mark_price(
                pair,
                price,
                &self.settings.trailing,
                dec(self.settings.commission_rate),
                now,
            );
            for trade in &closed {
                let won = trade.pnl_value > rust_decimal::Decimal::ZERO;
                st.logs.push(
                    format!(
                        "CLOSED {pair}: {} ({})",
                        trade.close_reason.as_deref().unwrap_or("closed"),
                        trade.pnl_value.round_dp(2)
                    ),
                    if won { Severity::Success } else { Severity::Error },
                );
                let brain_msg = st.learning.record_outcome(trade.strategy_used, won);
                st.logs.push(brain_msg, Severity::Warn);
            }

            match st.book.try_open(
                &analysis,
                price,
                &self.settings.sizing,
                self.settings.min_confidence,
                dec(self.settings.min_trade_size),
                now,
            ) {
                Ok(Some(trade)) => {
                    st.logs.push(
                        format!(
                            "OPEN {} {pair} @ {price:.2} [{}]",
                            trade.side, trade.strategy_used
                        ),
                        Severity::Info,
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    // Non-fatal by contract: entry is simply skipped
                    debug!(pair, "entry skipped: {e}");
                    st.logs.push(e.to_string(), Severity::Info);
                }
            }

            st.book.recompute_equity();
            st.last_analysis.insert(pair.to_string(), analysis);
            st.snapshot()
        };

        if let Err(e) = self.store.save(&persisted).await {
            warn!("state save failed: {e:#}");
        }
        Ok(())
    }

    /// Pick a random tracked pair for the background loop; the focused pair
    /// already has its own cadence, so it is skipped to avoid duplicate work.
    fn pick_roam_pair(&self) -> Option<String> {
        if self.settings.pairs.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.settings.pairs.len());
        let pair = &self.settings.pairs[index];
        let focus = self.state.lock().unwrap().focus_pair.clone();
        if *pair == focus {
            None
        } else {
            Some(pair.clone())
        }
    }

    fn heartbeat(&self) {
        let st = self.state.lock().unwrap();
        let open_trades = st.book.trades.iter().filter(|t| t.is_open()).count();
        info!(
            equity = %st.book.portfolio.equity.round_dp(2),
            open_trades,
            trades_total = st.book.portfolio.trades_count,
            win_rate = st.book.portfolio.win_rate,
            epoch = st.learning.epoch,
            connectivity = ?st.connectivity,
            "heartbeat"
        );
    }
}
