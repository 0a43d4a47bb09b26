//! Persisted state and the shared in-process engine state
//!
//! The persisted shape is `{portfolio, trades, learning, logs}` as pretty
//! JSON, written after every mutating cycle. The store is storage-agnostic at
//! the call sites: a file-backed store for deployments, an in-memory store
//! for tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::brain::learning::LearningState;
use crate::portfolio::PaperBook;
use crate::types::{AnalysisResult, Connectivity, LogEntry, Severity};

/// Maximum retained operator log entries
pub const LOG_CAPACITY: usize = 50;

/// Bounded, newest-first operator event log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        self.entries.insert(
            0,
            LogEntry {
                message: message.into(),
                severity,
                timestamp: chrono::Utc::now(),
            },
        );
        self.entries.truncate(LOG_CAPACITY);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything that survives a restart: `{portfolio, trades, learning, logs}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Flattened into top-level `portfolio` and `trades` keys
    #[serde(flatten)]
    pub book: PaperBook,
    pub learning: LearningState,
    pub logs: EventLog,
}

impl PersistedState {
    pub fn initial(starting_balance: Decimal, learning_rate: f64) -> Self {
        Self {
            book: PaperBook::new(starting_balance),
            learning: LearningState::new(learning_rate),
            logs: EventLog::default(),
        }
    }
}

/// File-backed (or in-memory) state store
pub struct StateStore {
    path: Option<PathBuf>,
}

impl StateStore {
    pub fn file(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// No disk writes; `load_or_initial` always yields a fresh state
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// Restore persisted state, falling back to a fresh one when the file is
    /// missing or unreadable. Corruption is logged, never fatal.
    pub async fn load_or_initial(
        &self,
        starting_balance: Decimal,
        learning_rate: f64,
    ) -> PersistedState {
        let Some(path) = &self.path else {
            return PersistedState::initial(starting_balance, learning_rate);
        };
        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => {
                    debug!(path = %path.display(), "state restored");
                    state
                }
                Err(e) => {
                    warn!(path = %path.display(), "state file corrupt, starting fresh: {e}");
                    PersistedState::initial(starting_balance, learning_rate)
                }
            },
            Err(_) => PersistedState::initial(starting_balance, learning_rate),
        }
    }

    pub async fn save(&self, state: &PersistedState) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        fs::write(path, json).await?;
        debug!(path = %path.display(), "state saved");
        Ok(())
    }
}

/// Live engine state shared between the scheduler's cycles and any
/// presentation-layer reader. All mutation happens under one lock.
#[derive(Debug)]
pub struct EngineState {
    pub book: PaperBook,
    pub learning: LearningState,
    /// Latest analysis per instrument; only the newest matters
    pub last_analysis: HashMap<String, AnalysisResult>,
    pub logs: EventLog,
    pub connectivity: Connectivity,
    /// Instrument the short-interval task evaluates
    pub focus_pair: String,
}

pub type SharedState = Arc<Mutex<EngineState>>;

impl EngineState {
    pub fn from_persisted(persisted: PersistedState, focus_pair: String) -> Self {
        Self {
            book: persisted.book,
            learning: persisted.learning,
            last_analysis: HashMap::new(),
            logs: persisted.logs,
            connectivity: Connectivity::Pending,
            focus_pair,
        }
    }

    /// Snapshot for persistence; cheap clone taken under the lock
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            book: self.book.clone(),
            learning: self.learning.clone(),
            logs: self.logs.clone(),
        }
    }

    /// Operator reset: portfolio, trades, learning memory and logs all return
    /// to their documented initial values.
    pub fn reset_all(&mut self, starting_balance: Decimal, learning_rate: f64) {
        self.book = PaperBook::new(starting_balance);
        self.learning = LearningState::new(learning_rate);
        self.last_analysis.clear();
        self.logs.clear();
        self.logs.push("trading data and brain memory reset", Severity::Warn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::learning::PersonaWeights;
    use crate::types::DominantPersona;

    #[test]
    fn event_log_is_bounded_and_newest_first() {
        let mut log = EventLog::default();
        for i in 0..60 {
            log.push(format!("event {i}"), Severity::Info);
        }
        assert_eq!(log.entries().len(), LOG_CAPACITY);
        assert_eq!(log.entries()[0].message, "event 59");
        assert_eq!(log.entries()[LOG_CAPACITY - 1].message, "event 10");
    }

    #[test]
    fn reset_restores_initial_state() {
        let persisted = PersistedState::initial(Decimal::from(10_000), 0.1);
        let mut state = EngineState::from_persisted(persisted, "BTC_USDT".to_string());

        state.learning.record_outcome(DominantPersona::Trend, true);
        state.logs.push("something happened", Severity::Info);
        assert_eq!(state.learning.epoch, 1);

        state.reset_all(Decimal::from(10_000), 0.1);
        assert_eq!(state.learning.epoch, 0);
        assert_eq!(state.learning.weights, PersonaWeights::default());
        assert_eq!(state.book.portfolio.cash_balance, Decimal::from(10_000));
        assert!(state.book.trades.is_empty());
        // Reset itself leaves a single trace entry
        assert_eq!(state.logs.entries().len(), 1);
    }

    #[tokio::test]
    async fn in_memory_store_always_starts_fresh() {
        let store = StateStore::in_memory();
        let state = store.load_or_initial(Decimal::from(10_000), 0.1).await;
        assert_eq!(state.book.portfolio.cash_balance, Decimal::from(10_000));
        assert!(store.save(&state).await.is_ok());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::file(path);

        let mut state = store.load_or_initial(Decimal::from(10_000), 0.1).await;
        state.learning.record_outcome(DominantPersona::Aggressive, true);
        state.logs.push("persisted entry", Severity::Success);
        store.save(&state).await.unwrap();

        let restored = store.load_or_initial(Decimal::from(999), 0.5).await;
        assert_eq!(restored.learning.epoch, 1);
        assert!((restored.learning.weights.aggressive - 1.1).abs() < 1e-12);
        assert_eq!(restored.logs.entries()[0].message, "persisted entry");
        // Restored state wins over the fallback defaults
        assert_eq!(
            restored.book.portfolio.cash_balance,
            Decimal::from(10_000)
        );
    }

    #[tokio::test]
    async fn corrupt_state_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = StateStore::file(path);
        let state = store.load_or_initial(Decimal::from(10_000), 0.1).await;
        assert_eq!(state.learning.epoch, 0);
    }
}
