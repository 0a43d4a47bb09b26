//! Brain - persona scoring, decision aggregation and adaptive weights

pub mod engine;
pub mod learning;
pub mod personas;

pub use engine::{DecisionEngine, MIN_HISTORY};
pub use learning::{LearningState, PersonaWeights, WEIGHT_MAX, WEIGHT_MIN};
pub use personas::{Persona, AGGRESSIVE, CONSERVATIVE, TREND};
