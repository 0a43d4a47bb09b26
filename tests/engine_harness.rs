//! End-to-end paper trading harness
//!
//! Validates the full decision loop:
//! candles → indicators → persona scoring → decision → paper book → learning
//! → persistence

use chrono::Utc;
use rust_decimal::Decimal;

use paper_runner::brain::{DecisionEngine, LearningState};
use paper_runner::config::{Settings, SizingStrategy, TrailingConfig};
use paper_runner::gateway::MarketGateway;
use paper_runner::indicators::IndicatorConfig;
use paper_runner::portfolio::{dec, PaperBook, TradeStatus};
use paper_runner::runner::BotRunner;
use paper_runner::sentiment::{SentimentFeed, SentimentProviderConfig, SentimentProviderId};
use paper_runner::state::{EngineState, PersistedState, StateStore};
use paper_runner::types::{
    AnalysisResult, Candle, Connectivity, Decision, DominantPersona, TimeframeCandles,
    TrendDirection,
};
use paper_runner::{EngineError, MarketSource, PersonaWeights};

/// A clean monotonic uptrend, strong enough to clear every confirmation
/// filter
fn rising_candles(count: usize) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    let mut price = 100.0;
    for i in 0..count {
        let close = price + 0.5;
        candles.push(Candle {
            time: i as i64 * 300_000,
            open: price,
            high: close + 0.2,
            low: price - 0.2,
            close,
            volume: 1000.0,
        });
        price = close;
    }
    candles
}

fn windows_of(candles: Vec<Candle>) -> TimeframeCandles {
    TimeframeCandles {
        m5: candles.clone(),
        m15: candles.clone(),
        h1: candles,
    }
}

fn default_trailing() -> TrailingConfig {
    TrailingConfig {
        activation_pct: 1.5,
        distance_pct: 1.0,
    }
}

const COMMISSION: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// Scenario: 60 rising candles must read bullish on every layer and survive
/// the trend-confirmation filter as a BUY.
#[test]
fn rising_series_produces_actionable_buy() {
    let engine = DecisionEngine::new(IndicatorConfig::default());
    let candles = rising_candles(60);
    let price = candles.last().unwrap().close;

    let analysis = engine
        .analyze(
            "BTC_USDT",
            price,
            &windows_of(candles),
            &PersonaWeights::default(),
            None,
        )
        .unwrap();

    assert_eq!(analysis.decision, Decision::Buy);
    assert!(analysis.confidence >= 70.0);
    assert!(analysis.confidence <= 99.0);
    for tf in &analysis.breakdown {
        assert_eq!(tf.trend, TrendDirection::Up);
        assert!(tf.rsi > 50.0);
    }

    println!(
        "1. BUY confirmed at {:.0}% confidence, SL {:.2} / TP {:.2}",
        analysis.confidence, analysis.recommended_sl, analysis.recommended_tp
    );
}

/// Scenario: open from a live analysis, tick through the target, verify the
/// close, the margin release and the learning update.
#[test]
fn full_trade_lifecycle_with_learning() {
    let engine = DecisionEngine::new(IndicatorConfig::default());
    let candles = rising_candles(60);
    let price = candles.last().unwrap().close;
    let analysis = engine
        .analyze(
            "BTC_USDT",
            price,
            &windows_of(candles),
            &PersonaWeights::default(),
            None,
        )
        .unwrap();
    assert_eq!(analysis.decision, Decision::Buy);

    // Step 1: entry
    let mut book = PaperBook::new(Decimal::from(10_000));
    let opened = book
        .try_open(
            &analysis,
            price,
            &SizingStrategy::FixedFraction { fraction: 0.10 },
            70.0,
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap()
        .expect("confirmed BUY must open");
    println!("1. Opened {} @ {}", opened.side, opened.entry_price);
    assert_eq!(book.portfolio.used_margin, opened.notional);

    // Step 2: price ticks through the take-profit
    let exit_price = analysis.recommended_tp + 1.0;
    let closed = book.mark_price("BTC_USDT", exit_price, &default_trailing(), COMMISSION, Utc::now());
    assert_eq!(closed.len(), 1);
    let trade = &closed[0];
    assert_eq!(trade.status, TradeStatus::Closed);
    assert_eq!(trade.close_reason.as_deref(), Some("TP Hit"));
    assert!(trade.pnl_value > Decimal::ZERO);
    assert_eq!(book.portfolio.used_margin, Decimal::ZERO);
    println!("2. Closed with PnL {}", trade.pnl_value.round_dp(2));

    // Step 3: the outcome feeds the learner
    let mut learning = LearningState::new(0.1);
    let epoch_before = learning.epoch;
    learning.record_outcome(trade.strategy_used, trade.pnl_value > Decimal::ZERO);
    assert_eq!(learning.epoch, epoch_before + 1);
    let w = learning.weights;
    for weight in [w.conservative, w.aggressive, w.trend] {
        assert!((0.1..=3.0).contains(&weight));
    }
    println!("3. Learning epoch advanced to {}", learning.epoch);

    book.recompute_equity();
    assert_eq!(
        book.portfolio.equity,
        book.portfolio.cash_balance + book.portfolio.used_margin
    );
}

/// Scenario: a winning Aggressive trade bumps exactly that weight by one
/// learning rate.
#[test]
fn aggressive_win_bumps_aggressive_weight() {
    let analysis = AnalysisResult {
        pair: "SOL_USDT".to_string(),
        decision: Decision::Buy,
        confidence: 85.0,
        recommended_sl: 95.0,
        recommended_tp: 110.0,
        risk_reward_ratio: 2.0,
        dominant_persona: DominantPersona::Aggressive,
        external_sentiment: None,
        reasoning: String::new(),
        breakdown: vec![],
    };

    let mut book = PaperBook::new(Decimal::from(10_000));
    book.try_open(
        &analysis,
        100.0,
        &SizingStrategy::FixedFraction { fraction: 0.10 },
        70.0,
        Decimal::from(10),
        Utc::now(),
    )
    .unwrap()
    .unwrap();

    let closed = book.mark_price("SOL_USDT", 111.0, &default_trailing(), COMMISSION, Utc::now());
    let trade = &closed[0];
    assert_eq!(trade.strategy_used, DominantPersona::Aggressive);

    let mut learning = LearningState::new(0.1);
    learning.record_outcome(trade.strategy_used, trade.pnl_value > Decimal::ZERO);
    assert!((learning.weights.aggressive - 1.1).abs() < 1e-12);
    assert_eq!(learning.weights.conservative, 1.0);
    assert_eq!(learning.weights.trend, 1.0);
    assert_eq!(learning.epoch, 1);
}

/// External sentiment carries a fixed fifth of the blended score, so a
/// strongly bearish feed visibly dampens an otherwise confident BUY.
#[test]
fn bearish_sentiment_dampens_confidence() {
    let engine = DecisionEngine::new(IndicatorConfig::default());
    let candles = rising_candles(60);
    let price = candles.last().unwrap().close;

    let neutral = engine
        .analyze(
            "BTC_USDT",
            price,
            &windows_of(candles.clone()),
            &PersonaWeights::default(),
            None,
        )
        .unwrap();
    let damped = engine
        .analyze(
            "BTC_USDT",
            price,
            &windows_of(candles),
            &PersonaWeights::default(),
            Some(-1.0),
        )
        .unwrap();

    assert_eq!(damped.external_sentiment, Some(-1.0));
    assert!(damped.confidence < neutral.confidence);
}

/// Run a real scheduler cycle against the mock market source and check the
/// cross-cutting invariants.
#[tokio::test]
async fn mock_market_cycle_preserves_invariants() {
    let settings = Settings {
        market_sources: vec![MarketSource::Mock],
        sentiment_providers: vec![SentimentProviderConfig {
            id: SentimentProviderId::CoinGecko,
            enabled: false,
            api_key: None,
        }],
        state_file: None,
        ..Settings::default()
    };

    let timeout = std::time::Duration::from_secs(1);
    let gateway = MarketGateway::new(settings.market_sources.clone(), timeout, 100).unwrap();
    let sentiment = SentimentFeed::new(settings.sentiment_providers.clone(), timeout).unwrap();
    let store = StateStore::in_memory();
    let persisted = store
        .load_or_initial(dec(settings.starting_balance), settings.learning_rate)
        .await;
    let state = std::sync::Arc::new(std::sync::Mutex::new(EngineState::from_persisted(
        persisted,
        settings.focus_pair.clone(),
    )));

    let runner = BotRunner::new(settings, gateway, sentiment, store, state);
    runner.run_once("BTC_USDT").await;
    runner.run_once("ETH_USDT").await;

    let st = runner.state();
    let st = st.lock().unwrap();
    assert_eq!(st.connectivity, Connectivity::Ok);

    let analysis = st
        .last_analysis
        .get("BTC_USDT")
        .expect("cycle must record an analysis");
    assert!((0.0..=99.0).contains(&analysis.confidence));
    assert_eq!(analysis.breakdown.len(), 3);

    // Margin invariant holds whatever the random walk decided
    assert_eq!(st.book.portfolio.used_margin, st.book.open_margin());
}

/// An empty source chain degrades connectivity instead of crashing the loop.
#[tokio::test]
async fn dead_market_chain_degrades_connectivity() {
    let settings = Settings {
        market_sources: vec![],
        state_file: None,
        ..Settings::default()
    };
    let timeout = std::time::Duration::from_secs(1);
    let gateway = MarketGateway::new(vec![], timeout, 100).unwrap();
    let sentiment =
        SentimentFeed::new(settings.sentiment_providers.clone(), timeout).unwrap();
    let store = StateStore::in_memory();
    let persisted = store
        .load_or_initial(dec(settings.starting_balance), settings.learning_rate)
        .await;
    let state = std::sync::Arc::new(std::sync::Mutex::new(EngineState::from_persisted(
        persisted,
        settings.focus_pair.clone(),
    )));

    let runner = BotRunner::new(settings, gateway, sentiment, store, state);
    runner.run_once("BTC_USDT").await;

    let st = runner.state();
    let st = st.lock().unwrap();
    assert_eq!(st.connectivity, Connectivity::Degraded);
    assert!(!st.logs.entries().is_empty());
}

/// Insufficient history is a transient skip, not a failure.
#[test]
fn short_history_yields_no_decision() {
    let engine = DecisionEngine::new(IndicatorConfig::default());
    let err = engine
        .analyze(
            "BTC_USDT",
            100.0,
            &windows_of(rising_candles(20)),
            &PersonaWeights::default(),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientHistory { .. }));
}

/// Persisted state survives a full save/load round trip, open trade included.
#[tokio::test]
async fn persistence_round_trips_open_positions() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::file(dir.path().join("state.json"));

    let mut persisted = PersistedState::initial(Decimal::from(10_000), 0.1);
    let analysis = AnalysisResult {
        pair: "BTC_USDT".to_string(),
        decision: Decision::Buy,
        confidence: 90.0,
        recommended_sl: 95.0,
        recommended_tp: 120.0,
        risk_reward_ratio: 2.0,
        dominant_persona: DominantPersona::Trend,
        external_sentiment: None,
        reasoning: String::new(),
        breakdown: vec![],
    };
    persisted
        .book
        .try_open(
            &analysis,
            100.0,
            &SizingStrategy::FixedFraction { fraction: 0.10 },
            70.0,
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap()
        .unwrap();
    persisted
        .learning
        .record_outcome(DominantPersona::Trend, true);
    store.save(&persisted).await.unwrap();

    let restored = store.load_or_initial(Decimal::from(1), 0.5).await;
    assert_eq!(restored.book.trades.len(), 1);
    let trade = &restored.book.trades[0];
    assert_eq!(trade.status, TradeStatus::Open);
    assert_eq!(trade.pair, "BTC_USDT");
    assert_eq!(restored.learning.epoch, 1);
    assert_eq!(
        restored.book.portfolio.used_margin,
        restored.book.open_margin()
    );
}

/// The operator reset restores the documented initial state.
#[test]
fn reset_command_reinitializes_everything() {
    let persisted = PersistedState::initial(Decimal::from(10_000), 0.1);
    let mut state = EngineState::from_persisted(persisted, "BTC_USDT".to_string());

    state.learning.record_outcome(DominantPersona::Aggressive, true);
    state.book.portfolio.cash_balance = Decimal::from(5);

    state.reset_all(Decimal::from(10_000), 0.1);
    assert_eq!(state.book.portfolio.cash_balance, Decimal::from(10_000));
    assert_eq!(state.book.portfolio.equity, Decimal::from(10_000));
    assert_eq!(state.learning.epoch, 0);
    assert_eq!(state.learning.weights, PersonaWeights::default());
    assert!(state.book.trades.is_empty());
}
