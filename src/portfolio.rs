//! Position and portfolio engine - the paper trading book
//!
//! Owns the portfolio and the full trade collection. Trades move
//! OPEN -> CLOSED exactly once, on a stop or target cross, and the portfolio
//! is updated synchronously before any new entry is considered for the same
//! instrument.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{SizingStrategy, TrailingConfig};
use crate::error::EngineError;
use crate::types::{AnalysisResult, Decision, DominantPersona, TradeSide};

/// Lossy f64 -> Decimal at the money boundary; indicator math stays in f64.
pub fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// One simulated position. While open, only the floating PnL fields and the
/// (possibly trailed) stop move; once CLOSED the record never changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub pair: String,
    pub side: TradeSide,
    pub entry_price: Decimal,
    /// Position size in quote currency, locked as margin while open
    pub notional: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub open_time: DateTime<Utc>,
    pub status: TradeStatus,
    pub trailing_active: bool,
    /// Persona label recorded at entry, consumed by the weight learner
    pub strategy_used: DominantPersona,
    pub reason: String,
    /// Floating (then final) PnL as a percent of notional, pre-commission
    pub pnl_percent: f64,
    /// Floating PnL while open; realized PnL net of commission once closed
    pub pnl_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

/// Paper account totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash_balance: Decimal,
    /// cash + used margin + floating PnL of open trades
    pub equity: Decimal,
    /// Sum of open trade notionals
    pub used_margin: Decimal,
    pub total_realized_profit: Decimal,
    pub trades_count: u32,
    /// Percent of closed trades with positive realized PnL
    pub win_rate: f64,
    /// Gross profit over gross loss across closed trades
    pub profit_factor: f64,
    #[serde(default)]
    gross_profit: Decimal,
    #[serde(default)]
    gross_loss: Decimal,
}

impl Portfolio {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            cash_balance: starting_cash,
            equity: starting_cash,
            used_margin: Decimal::ZERO,
            total_realized_profit: Decimal::ZERO,
            trades_count: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
        }
    }
}

/// The book: portfolio plus every trade ever taken this session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperBook {
    pub portfolio: Portfolio,
    pub trades: Vec<Trade>,
}

impl PaperBook {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            portfolio: Portfolio::new(starting_cash),
            trades: Vec::new(),
        }
    }

    /// The open trade for an instrument, if any (at most one exists)
    pub fn open_trade(&self, pair: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.is_open() && t.pair == pair)
    }

    /// Sum of open-trade notionals; must always equal `used_margin`
    pub fn open_margin(&self) -> Decimal {
        self.trades
            .iter()
            .filter(|t| t.is_open())
            .map(|t| t.notional)
            .sum()
    }

    fn floating_pnl(&self) -> Decimal {
        self.trades
            .iter()
            .filter(|t| t.is_open())
            .map(|t| t.pnl_value)
            .sum()
    }

    /// Advance every open trade on `pair` against a live price: refresh
    /// floating PnL, arm/ratchet the trailing stop, and close on a stop or
    /// target cross. Returns the trades closed by this tick.
    pub fn mark_price(
        &mut self,
        pair: &str,
        price: f64,
        trailing: &TrailingConfig,
        commission_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<Trade> {
        let price_d = dec(price);
        let trail_distance = dec(trailing.distance_pct) / Decimal::ONE_HUNDRED;
        let mut closed = Vec::new();

        for trade in self.trades.iter_mut() {
            if !trade.is_open() || trade.pair != pair {
                continue;
            }

            let diff = match trade.side {
                TradeSide::Long => price_d - trade.entry_price,
                TradeSide::Short => trade.entry_price - price_d,
            };
            let pnl_value = diff * trade.quantity;
            let pnl_percent = if trade.notional > Decimal::ZERO {
                to_f64(pnl_value / trade.notional * Decimal::ONE_HUNDRED)
            } else {
                0.0
            };
            trade.pnl_value = pnl_value;
            trade.pnl_percent = pnl_percent;

            if pnl_percent > trailing.activation_pct && !trade.trailing_active {
                trade.trailing_active = true;
                debug!(pair, trade = %trade.id, "trailing stop armed");
            }
            if trade.trailing_active {
                // Only ever tightens
                match trade.side {
                    TradeSide::Long => {
                        let candidate = price_d * (Decimal::ONE - trail_distance);
                        if candidate > trade.stop_loss {
                            trade.stop_loss = candidate;
                        }
                    }
                    TradeSide::Short => {
                        let candidate = price_d * (Decimal::ONE + trail_distance);
                        if candidate < trade.stop_loss {
                            trade.stop_loss = candidate;
                        }
                    }
                }
            }

            let close_reason = match trade.side {
                TradeSide::Long => {
                    if price_d >= trade.take_profit {
                        Some("TP Hit")
                    } else if price_d <= trade.stop_loss {
                        Some("SL Hit")
                    } else {
                        None
                    }
                }
                TradeSide::Short => {
                    if price_d <= trade.take_profit {
                        Some("TP Hit")
                    } else if price_d >= trade.stop_loss {
                        Some("SL Hit")
                    } else {
                        None
                    }
                }
            };

            if let Some(reason) = close_reason {
                let commission = trade.notional * commission_rate;
                let final_pnl = pnl_value - commission;

                let p = &mut self.portfolio;
                p.cash_balance += trade.notional + final_pnl;
                p.used_margin -= trade.notional;
                p.total_realized_profit += final_pnl;
                p.trades_count += 1;

                let count = f64::from(p.trades_count);
                if final_pnl > Decimal::ZERO {
                    p.gross_profit += final_pnl;
                    p.win_rate = (p.win_rate * (count - 1.0) + 100.0) / count;
                } else {
                    p.gross_loss += final_pnl.abs();
                    p.win_rate = p.win_rate * (count - 1.0) / count;
                }
                p.profit_factor = if p.gross_loss > Decimal::ZERO {
                    to_f64(p.gross_profit / p.gross_loss)
                } else {
                    to_f64(p.gross_profit)
                };

                trade.status = TradeStatus::Closed;
                trade.close_price = Some(price_d);
                trade.close_time = Some(now);
                trade.close_reason = Some(reason.to_string());
                trade.pnl_value = final_pnl;

                info!(
                    pair,
                    reason,
                    pnl = %final_pnl.round_dp(2),
                    "position closed"
                );
                closed.push(trade.clone());
            }
        }

        closed
    }

    /// Open a position for a confirmed decision.
    ///
    /// Returns `Ok(None)` when the book simply has nothing to do (HOLD,
    /// confidence too low, position already open); `SizingRejected` when a
    /// size was computed but cannot be taken.
    pub fn try_open(
        &mut self,
        analysis: &AnalysisResult,
        price: f64,
        sizing: &SizingStrategy,
        min_confidence: f64,
        min_trade_size: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<Trade>, EngineError> {
        if analysis.decision == Decision::Hold
            || analysis.confidence <= min_confidence
            || self.open_trade(&analysis.pair).is_some()
        {
            return Ok(None);
        }

        let price_d = dec(price);
        if price_d <= Decimal::ZERO {
            return Err(EngineError::SizingRejected {
                reason: format!("no usable price for {}", analysis.pair),
            });
        }

        let notional = match sizing {
            SizingStrategy::FixedFraction { fraction } => {
                self.portfolio.cash_balance * dec(*fraction)
            }
            SizingStrategy::RiskBased {
                risk_pct,
                max_equity_pct,
            } => {
                let stop = dec(analysis.recommended_sl);
                let stop_distance = (price_d - stop).abs();
                if stop_distance <= Decimal::ZERO {
                    return Err(EngineError::SizingRejected {
                        reason: "zero stop distance".to_string(),
                    });
                }
                let risk_fraction = stop_distance / price_d;
                let size = self.portfolio.equity * dec(*risk_pct) / risk_fraction;
                let cap = self.portfolio.equity * dec(*max_equity_pct);
                size.min(cap)
            }
        };

        if notional < min_trade_size {
            return Err(EngineError::SizingRejected {
                reason: format!(
                    "size {} below minimum {}",
                    notional.round_dp(2),
                    min_trade_size
                ),
            });
        }
        if notional > self.portfolio.cash_balance {
            return Err(EngineError::SizingRejected {
                reason: format!(
                    "size {} exceeds free balance {}",
                    notional.round_dp(2),
                    self.portfolio.cash_balance.round_dp(2)
                ),
            });
        }

        let side = if analysis.decision == Decision::Buy {
            TradeSide::Long
        } else {
            TradeSide::Short
        };
        let trade = Trade {
            id: Uuid::new_v4(),
            pair: analysis.pair.clone(),
            side,
            entry_price: price_d,
            notional,
            quantity: notional / price_d,
            stop_loss: dec(analysis.recommended_sl),
            take_profit: dec(analysis.recommended_tp),
            open_time: now,
            status: TradeStatus::Open,
            trailing_active: false,
            strategy_used: analysis.dominant_persona,
            reason: format!("Signal ({:.0}%)", analysis.confidence),
            pnl_percent: 0.0,
            pnl_value: Decimal::ZERO,
            close_price: None,
            close_time: None,
            close_reason: None,
        };

        self.portfolio.cash_balance -= notional;
        self.portfolio.used_margin += notional;
        self.trades.push(trade.clone());

        info!(
            pair = %trade.pair,
            side = %trade.side,
            entry = %trade.entry_price,
            notional = %trade.notional.round_dp(2),
            strategy = %trade.strategy_used,
            "position opened"
        );

        Ok(Some(trade))
    }

    /// Recompute equity from cash, locked margin and open floating PnL.
    /// Called at the end of every cycle.
    pub fn recompute_equity(&mut self) {
        self.portfolio.equity =
            self.portfolio.cash_balance + self.portfolio.used_margin + self.floating_pnl();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeframeAnalysis;

    fn analysis(decision: Decision, confidence: f64, sl: f64, tp: f64) -> AnalysisResult {
        AnalysisResult {
            pair: "BTC_USDT".to_string(),
            decision,
            confidence,
            recommended_sl: sl,
            recommended_tp: tp,
            risk_reward_ratio: 2.0,
            dominant_persona: DominantPersona::Trend,
            external_sentiment: None,
            reasoning: String::new(),
            breakdown: Vec::<TimeframeAnalysis>::new(),
        }
    }

    fn trailing() -> TrailingConfig {
        TrailingConfig {
            activation_pct: 1.5,
            distance_pct: 1.0,
        }
    }

    const COMMISSION: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

    #[test]
    fn take_profit_cross_closes_long_and_releases_margin() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = analysis(Decision::Buy, 80.0, 95.0, 110.0);

        let opened = book
            .try_open(
                &result,
                100.0,
                &SizingStrategy::FixedFraction { fraction: 0.10 },
                70.0,
                Decimal::from(10),
                Utc::now(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(opened.notional, Decimal::from(1000));
        assert_eq!(opened.quantity, Decimal::from(10));
        assert_eq!(book.portfolio.cash_balance, Decimal::from(9000));
        assert_eq!(book.portfolio.used_margin, Decimal::from(1000));
        assert_eq!(book.portfolio.used_margin, book.open_margin());

        // Price ticks through the target
        let closed = book.mark_price("BTC_USDT", 111.0, &trailing(), COMMISSION, Utc::now());
        assert_eq!(closed.len(), 1);
        let trade = &closed[0];
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.close_reason.as_deref(), Some("TP Hit"));

        // (111 - 100) * 10 minus 0.1% commission on the 1000 notional
        assert_eq!(trade.pnl_value, Decimal::from(109));
        assert_eq!(book.portfolio.used_margin, Decimal::ZERO);
        assert_eq!(book.portfolio.cash_balance, Decimal::from(10_109));
        assert_eq!(book.portfolio.total_realized_profit, Decimal::from(109));
        assert_eq!(book.portfolio.trades_count, 1);
        assert_eq!(book.portfolio.win_rate, 100.0);

        book.recompute_equity();
        assert_eq!(book.portfolio.equity, Decimal::from(10_109));
    }

    #[test]
    fn stop_cross_closes_short() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = AnalysisResult {
            pair: "ETH_USDT".to_string(),
            ..analysis(Decision::Sell, 80.0, 105.0, 90.0)
        };
        book.try_open(
            &result,
            100.0,
            &SizingStrategy::FixedFraction { fraction: 0.10 },
            70.0,
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        let closed = book.mark_price("ETH_USDT", 106.0, &trailing(), COMMISSION, Utc::now());
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_reason.as_deref(), Some("SL Hit"));
        // Short loses when price rises: (100 - 106) * 10 - 1
        assert_eq!(closed[0].pnl_value, Decimal::from(-61));
        assert_eq!(book.portfolio.win_rate, 0.0);
    }

    #[test]
    fn only_one_open_trade_per_pair() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = analysis(Decision::Buy, 80.0, 95.0, 120.0);
        let sizing = SizingStrategy::FixedFraction { fraction: 0.10 };

        let first = book
            .try_open(&result, 100.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap();
        assert!(first.is_some());

        let second = book
            .try_open(&result, 101.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap();
        assert!(second.is_none());
        assert_eq!(book.portfolio.used_margin, book.open_margin());
    }

    #[test]
    fn hold_and_low_confidence_do_not_open() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let sizing = SizingStrategy::FixedFraction { fraction: 0.10 };

        let hold = analysis(Decision::Hold, 90.0, 0.0, 0.0);
        assert!(book
            .try_open(&hold, 100.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap()
            .is_none());

        let timid = analysis(Decision::Buy, 50.0, 95.0, 110.0);
        assert!(book
            .try_open(&timid, 100.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn sizing_below_minimum_is_rejected() {
        let mut book = PaperBook::new(Decimal::from(50));
        let result = analysis(Decision::Buy, 80.0, 95.0, 110.0);
        let err = book
            .try_open(
                &result,
                100.0,
                &SizingStrategy::FixedFraction { fraction: 0.10 },
                70.0,
                Decimal::from(10),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SizingRejected { .. }));
        assert!(book.trades.is_empty());
        assert_eq!(book.portfolio.cash_balance, Decimal::from(50));
    }

    #[test]
    fn risk_based_sizing_caps_at_equity_share() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        // Tight stop: 0.5% away. Uncapped size would be 2% / 0.5% = 4x equity.
        let result = analysis(Decision::Buy, 80.0, 99.5, 103.0);
        let opened = book
            .try_open(
                &result,
                100.0,
                &SizingStrategy::RiskBased {
                    risk_pct: 0.02,
                    max_equity_pct: 0.25,
                },
                70.0,
                Decimal::from(10),
                Utc::now(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(opened.notional, Decimal::from(2500));
    }

    #[test]
    fn risk_based_sizing_rejects_zero_stop_distance() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = analysis(Decision::Buy, 80.0, 100.0, 110.0);
        let err = book
            .try_open(
                &result,
                100.0,
                &SizingStrategy::RiskBased {
                    risk_pct: 0.02,
                    max_equity_pct: 0.25,
                },
                70.0,
                Decimal::from(10),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SizingRejected { .. }));
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = analysis(Decision::Buy, 80.0, 95.0, 150.0);
        book.try_open(
            &result,
            100.0,
            &SizingStrategy::FixedFraction { fraction: 0.10 },
            70.0,
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        // +2% arms the trail and ratchets the stop to 1% below price
        book.mark_price("BTC_USDT", 102.0, &trailing(), COMMISSION, Utc::now());
        let stop_after_rally = book.open_trade("BTC_USDT").unwrap().stop_loss;
        assert!(book.open_trade("BTC_USDT").unwrap().trailing_active);
        assert_eq!(stop_after_rally, dec(102.0) * dec(0.99));

        // Higher price tightens further
        book.mark_price("BTC_USDT", 104.0, &trailing(), COMMISSION, Utc::now());
        let tightened = book.open_trade("BTC_USDT").unwrap().stop_loss;
        assert!(tightened > stop_after_rally);

        // A mild pullback must never loosen the stop
        book.mark_price("BTC_USDT", 103.5, &trailing(), COMMISSION, Utc::now());
        assert_eq!(book.open_trade("BTC_USDT").unwrap().stop_loss, tightened);

        // A deeper pullback crosses the trailed stop and closes in profit
        let closed = book.mark_price("BTC_USDT", 102.5, &trailing(), COMMISSION, Utc::now());
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_reason.as_deref(), Some("SL Hit"));
        assert!(closed[0].pnl_value > Decimal::ZERO);
    }

    #[test]
    fn win_rate_and_profit_factor_track_outcomes() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let sizing = SizingStrategy::FixedFraction { fraction: 0.10 };

        // Winner
        let win = analysis(Decision::Buy, 80.0, 95.0, 110.0);
        book.try_open(&win, 100.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap();
        book.mark_price("BTC_USDT", 111.0, &trailing(), COMMISSION, Utc::now());
        assert_eq!(book.portfolio.win_rate, 100.0);

        // Loser
        let lose = analysis(Decision::Buy, 80.0, 95.0, 140.0);
        book.try_open(&lose, 100.0, &sizing, 70.0, Decimal::from(10), Utc::now())
            .unwrap();
        book.mark_price("BTC_USDT", 94.0, &trailing(), COMMISSION, Utc::now());

        assert_eq!(book.portfolio.trades_count, 2);
        assert_eq!(book.portfolio.win_rate, 50.0);
        assert!(book.portfolio.profit_factor > 0.0);
        assert_eq!(book.portfolio.used_margin, book.open_margin());
    }

    #[test]
    fn mark_price_ignores_other_pairs_and_closed_trades() {
        let mut book = PaperBook::new(Decimal::from(10_000));
        let result = analysis(Decision::Buy, 80.0, 95.0, 110.0);
        book.try_open(
            &result,
            100.0,
            &SizingStrategy::FixedFraction { fraction: 0.10 },
            70.0,
            Decimal::from(10),
            Utc::now(),
        )
        .unwrap();

        let closed = book.mark_price("ETH_USDT", 1.0, &trailing(), COMMISSION, Utc::now());
        assert!(closed.is_empty());
        assert!(book.open_trade("BTC_USDT").is_some());
    }
}
