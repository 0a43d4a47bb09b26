//! Adaptive persona weights - the only feedback path in the system
//!
//! After every closed trade the persona that drove the entry gets a fixed
//! learning-rate nudge, up on a win and down on a loss, clamped to
//! [0.1, 3.0]. The weights feed the next cycle's decision aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::DominantPersona;

/// Lower clamp for any persona weight
pub const WEIGHT_MIN: f64 = 0.1;
/// Upper clamp for any persona weight
pub const WEIGHT_MAX: f64 = 3.0;

const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Adaptive per-persona blending weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaWeights {
    pub conservative: f64,
    pub aggressive: f64,
    pub trend: f64,
}

impl Default for PersonaWeights {
    fn default() -> Self {
        Self {
            conservative: 1.0,
            aggressive: 1.0,
            trend: 1.0,
        }
    }
}

impl PersonaWeights {
    /// Weights scaled to sum to 1 for score aggregation
    pub fn normalized(&self) -> PersonaWeights {
        let sum = self.conservative + self.aggressive + self.trend;
        if sum <= 0.0 {
            return PersonaWeights {
                conservative: 1.0 / 3.0,
                aggressive: 1.0 / 3.0,
                trend: 1.0 / 3.0,
            };
        }
        PersonaWeights {
            conservative: self.conservative / sum,
            aggressive: self.aggressive / sum,
            trend: self.trend / sum,
        }
    }

    fn clamp_all(&mut self) {
        self.conservative = self.conservative.clamp(WEIGHT_MIN, WEIGHT_MAX);
        self.aggressive = self.aggressive.clamp(WEIGHT_MIN, WEIGHT_MAX);
        self.trend = self.trend.clamp(WEIGHT_MIN, WEIGHT_MAX);
    }
}

/// Learner state, created once at startup and persisted across cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningState {
    pub weights: PersonaWeights,
    /// Count of learning updates ever applied
    pub epoch: u64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub last_correction: DateTime<Utc>,
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl Default for LearningState {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl LearningState {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            weights: PersonaWeights::default(),
            epoch: 0,
            learning_rate,
            last_correction: Utc::now(),
        }
    }

    /// Attribute a closed trade's outcome to the strategy that opened it.
    ///
    /// A weight that would leave [0.1, 3.0] is silently clamped; that is a
    /// bound, not an error. Returns the operator-log message.
    pub fn record_outcome(&mut self, strategy: DominantPersona, won: bool) -> String {
        let rate = if won {
            self.learning_rate
        } else {
            -self.learning_rate
        };
        let w = &mut self.weights;
        let direction = if won { "increased" } else { "decreased" };

        let message = match strategy {
            DominantPersona::Aggressive => {
                w.aggressive += rate;
                w.clamp_all();
                format!("Brain: Aggressive weight {} to {:.2}", direction, w.aggressive)
            }
            DominantPersona::Conservative => {
                w.conservative += rate;
                w.clamp_all();
                format!(
                    "Brain: Conservative weight {} to {:.2}",
                    direction, w.conservative
                )
            }
            DominantPersona::Trend => {
                w.trend += rate;
                w.clamp_all();
                format!("Brain: Trend weight {} to {:.2}", direction, w.trend)
            }
            DominantPersona::Balanced => {
                // No single persona dominated; split the nudge across the
                // steadier pair
                w.trend += rate / 2.0;
                w.conservative += rate / 2.0;
                w.clamp_all();
                "Brain: general weights adjusted".to_string()
            }
        };

        self.epoch += 1;
        self.last_correction = Utc::now();
        debug!(
            epoch = self.epoch,
            conservative = w.conservative,
            aggressive = w.aggressive,
            trend = w.trend,
            "learning update applied"
        );
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winning_trade_bumps_its_persona_by_exactly_one_rate() {
        let mut state = LearningState::new(0.1);
        state.record_outcome(DominantPersona::Aggressive, true);

        assert!((state.weights.aggressive - 1.1).abs() < 1e-12);
        assert_eq!(state.weights.conservative, 1.0);
        assert_eq!(state.weights.trend, 1.0);
        assert_eq!(state.epoch, 1);
    }

    #[test]
    fn losing_trade_decrements() {
        let mut state = LearningState::new(0.1);
        state.record_outcome(DominantPersona::Trend, false);
        assert!((state.weights.trend - 0.9).abs() < 1e-12);
        assert_eq!(state.epoch, 1);
    }

    #[test]
    fn balanced_outcome_splits_half_rate() {
        let mut state = LearningState::new(0.1);
        state.record_outcome(DominantPersona::Balanced, true);
        assert!((state.weights.trend - 1.05).abs() < 1e-12);
        assert!((state.weights.conservative - 1.05).abs() < 1e-12);
        assert_eq!(state.weights.aggressive, 1.0);
    }

    #[test]
    fn weights_stay_clamped_after_many_updates() {
        let mut state = LearningState::new(0.5);
        for _ in 0..100 {
            state.record_outcome(DominantPersona::Aggressive, true);
            state.record_outcome(DominantPersona::Conservative, false);
        }
        assert_eq!(state.weights.aggressive, WEIGHT_MAX);
        assert_eq!(state.weights.conservative, WEIGHT_MIN);
        assert_eq!(state.epoch, 200);
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let weights = PersonaWeights {
            conservative: 0.5,
            aggressive: 2.0,
            trend: 1.5,
        };
        let norm = weights.normalized();
        let sum = norm.conservative + norm.aggressive + norm.trend;
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((norm.aggressive - 0.5).abs() < 1e-12);
    }
}
