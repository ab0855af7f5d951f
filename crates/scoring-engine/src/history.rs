use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use analysis_core::{adaptive, AnalysisError};
use serde::{Deserialize, Serialize};

/// Indicator history keys
pub const MACD: &str = "macd";
pub const RSI: &str = "rsi";
pub const VOLUME: &str = "vol";

/// symbol -> indicator -> oldest-first raw values
pub type Histories = BTreeMap<String, BTreeMap<String, VecDeque<f64>>>;

/// Rolling per-symbol, per-indicator history used for z-score normalization.
pub struct HistoryStore {
    inner: Mutex<Histories>,
    max_len: usize,
}

impl HistoryStore {
    pub fn new(max_len: usize) -> Self {
        Self::from_histories(Histories::new(), max_len)
    }

    /// Adopt persisted histories, dropping non-finite values and trimming each
    /// series to `max_len`.
    pub fn from_histories(mut histories: Histories, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        for series in histories.values_mut().flat_map(|m| m.values_mut()) {
            series.retain(|v| v.is_finite());
            while series.len() > max_len {
                series.pop_front();
            }
        }
        Self {
            inner: Mutex::new(histories),
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Histories> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Score `raw` against the symbol's history for `indicator`, then append it
    /// (evicting the oldest value beyond `max_len`).
    pub fn score_and_record(&self, symbol: &str, indicator: &str, raw: f64) -> f64 {
        let mut histories = self.lock();
        let series = histories
            .entry(symbol.to_uppercase())
            .or_default()
            .entry(indicator.to_string())
            .or_default();

        let score = adaptive::normalize(raw, series.make_contiguous());

        if raw.is_finite() {
            series.push_back(raw);
            while series.len() > self.max_len {
                series.pop_front();
            }
        }
        score
    }

    /// Copy of one series, oldest first.
    pub fn series(&self, symbol: &str, indicator: &str) -> Vec<f64> {
        self.lock()
            .get(&symbol.to_uppercase())
            .and_then(|m| m.get(indicator))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Histories {
        self.lock().clone()
    }
}

/// On-disk state: the only data that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub histories: Histories,
    #[serde(default)]
    pub last_run: Option<String>,
}

/// Flat JSON state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, starting empty when the file is missing or unreadable.
    pub fn load(&self) -> PersistedState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting fresh", self.path.display());
                return PersistedState::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read state file {}: {}, starting fresh", self.path.display(), e);
                return PersistedState::default();
            }
        };

        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                tracing::info!(
                    "Loaded state from {} ({} symbols, last run {:?})",
                    self.path.display(),
                    state.histories.len(),
                    state.last_run
                );
                state
            }
            Err(e) => {
                tracing::warn!("Corrupt state file {}: {}, starting fresh", self.path.display(), e);
                PersistedState::default()
            }
        }
    }

    /// Overwrite the state file via a temp file and rename.
    pub fn save(&self, state: &PersistedState) -> Result<(), AnalysisError> {
        let json = serde_json::to_string(state).map_err(|e| AnalysisError::StateError(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)
            .map_err(|e| AnalysisError::StateError(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AnalysisError::StateError(format!("rename to {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_scores_neutral_then_records() {
        let store = HistoryStore::new(10);
        assert_eq!(store.score_and_record("AAPL", MACD, 3.7), 50.0);
        assert_eq!(store.series("AAPL", MACD), vec![3.7]);
    }

    #[test]
    fn test_constant_macd_history_scores_neutral() {
        let mut histories = Histories::new();
        histories
            .entry("AAPL".to_string())
            .or_default()
            .insert(MACD.to_string(), VecDeque::from(vec![1.0; 5]));
        let store = HistoryStore::from_histories(histories, 100);

        assert_eq!(store.score_and_record("AAPL", MACD, 1.0), 50.0);
        assert_eq!(store.series("AAPL", MACD).len(), 6);
    }

    #[test]
    fn test_history_is_fifo_bounded() {
        let store = HistoryStore::new(3);
        for v in 1..=5 {
            store.score_and_record("MSFT", RSI, v as f64);
        }
        assert_eq!(store.series("MSFT", RSI), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_score_uses_history_before_append() {
        let store = HistoryStore::new(10);
        store.score_and_record("NVDA", VOLUME, -1.0);
        store.score_and_record("NVDA", VOLUME, 1.0);
        // mean 0, std 1 => z = 3 => 100
        assert_eq!(store.score_and_record("NVDA", VOLUME, 3.0), 100.0);
    }

    #[test]
    fn test_symbols_and_indicators_are_independent() {
        let store = HistoryStore::new(10);
        store.score_and_record("AAPL", RSI, 70.0);
        store.score_and_record("aapl", MACD, 0.2);
        store.score_and_record("TSLA", RSI, 30.0);

        assert_eq!(store.series("AAPL", RSI), vec![70.0]);
        assert_eq!(store.series("AAPL", MACD), vec![0.2]);
        assert_eq!(store.series("TSLA", RSI), vec![30.0]);
        assert!(store.series("TSLA", MACD).is_empty());
    }

    #[test]
    fn test_loaded_histories_are_trimmed() {
        let mut histories = Histories::new();
        histories
            .entry("KO".to_string())
            .or_default()
            .insert(RSI.to_string(), (0..10).map(|v| v as f64).collect());
        let store = HistoryStore::from_histories(histories, 4);

        assert_eq!(store.series("KO", RSI), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_state_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("trade_state.json"));

        let store = HistoryStore::new(10);
        store.score_and_record("AAPL", RSI, 55.0);
        let state = PersistedState {
            histories: store.snapshot(),
            last_run: Some("2024-03-01 10:40:00".to_string()),
        };
        file.save(&state).unwrap();

        assert_eq!(file.load(), state);
    }

    #[test]
    fn test_state_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        let store = HistoryStore::new(10);
        store.score_and_record("AAPL", MACD, 0.5);
        file.save(&PersistedState { histories: store.snapshot(), last_run: None }).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(raw["histories"]["AAPL"]["macd"], serde_json::json!([0.5]));
        assert!(raw["last_run"].is_null());
    }

    #[test]
    fn test_missing_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("absent.json"));
        assert_eq!(file.load(), PersistedState::default());
    }

    #[test]
    fn test_corrupt_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"histories\": {\"AAPL\": [1, 2").unwrap();

        assert_eq!(StateFile::new(&path).load(), PersistedState::default());
    }

    #[test]
    fn test_legacy_state_without_histories_loads() {
        // Older state files carried only last_run and positions
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"last_run": "2024-03-01 10:00:00", "positions": {}}"#).unwrap();

        let state = StateFile::new(&path).load();
        assert!(state.histories.is_empty());
        assert_eq!(state.last_run.as_deref(), Some("2024-03-01 10:00:00"));
    }
}
