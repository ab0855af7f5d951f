pub mod bar_cache;
pub mod history;
pub mod scorer;

#[cfg(test)]
mod test_support;

pub use bar_cache::*;
pub use history::*;
pub use scorer::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_core::{AnalysisError, MarketDataProvider, Summary};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use technical_analysis::{compute_technical, TechnicalConfig};

/// `last_run` layout in the state file, in market-local time
pub const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configuration for the scoring service
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Provider bar interval, e.g. "1min"
    pub interval: String,
    pub bar_limit: u32,
    pub cache_ttl: Duration,
    pub history_max_len: usize,
    pub technical: TechnicalConfig,
    pub scorer: ScorerConfig,
    /// Zone used for MA window selection and `last_run`
    pub market_timezone: Tz,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            interval: "1min".to_string(),
            bar_limit: 200,
            cache_ttl: Duration::from_secs(30),
            history_max_len: 100,
            technical: TechnicalConfig::default(),
            scorer: ScorerConfig::default(),
            market_timezone: chrono_tz::US::Eastern,
        }
    }
}

/// Owns the bar cache, indicator history and scorer for a ticker universe.
///
/// All shared state lives here; callers hold one service (usually behind an
/// `Arc`) instead of reaching for globals.
pub struct ScoringService {
    fetcher: BarFetcher,
    history: HistoryStore,
    scorer: CompositeScorer,
    config: ScoringConfig,
    state_file: Option<StateFile>,
    last_run: Mutex<Option<String>>,
}

impl ScoringService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: ScoringConfig) -> Result<Self, AnalysisError> {
        let scorer = CompositeScorer::new(config.scorer.clone())?;
        let fetcher = BarFetcher::new(provider, config.cache_ttl, config.interval.clone(), config.bar_limit);

        tracing::info!(
            "Scoring service ready: weights={}, banding={}, interval={}, ttl={}s",
            config.scorer.weight_policy.name(),
            config.scorer.banding.name(),
            config.interval,
            config.cache_ttl.as_secs()
        );

        Ok(Self {
            fetcher,
            history: HistoryStore::new(config.history_max_len),
            scorer,
            config,
            state_file: None,
            last_run: Mutex::new(None),
        })
    }

    /// Restore history and `last_run` from `file` and persist there after each cycle.
    pub fn with_state_file(mut self, file: StateFile) -> Self {
        let state = file.load();
        self.history = HistoryStore::from_histories(state.histories, self.config.history_max_len);
        self.last_run = Mutex::new(state.last_run);
        self.state_file = Some(file);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn fetcher(&self) -> &BarFetcher {
        &self.fetcher
    }

    /// Summaries for `tickers` as of now.
    pub async fn get_summaries(&self, tickers: &[String]) -> Vec<Summary> {
        self.get_summaries_at(tickers, Utc::now()).await
    }

    /// Summaries for `tickers` in input order, evaluated at `now`. Tickers
    /// without usable data are logged and left out.
    pub async fn get_summaries_at(&self, tickers: &[String], now: DateTime<Utc>) -> Vec<Summary> {
        let mut summaries = Vec::with_capacity(tickers.len());
        for symbol in tickers {
            match self.evaluate(symbol, now).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::info!("Skipping {}: {}", symbol, e),
            }
        }
        tracing::info!("Scored {}/{} tickers", summaries.len(), tickers.len());
        summaries
    }

    async fn evaluate(&self, symbol: &str, now: DateTime<Utc>) -> Result<Summary, AnalysisError> {
        let bars = self.fetcher.get_bars(symbol).await;
        if bars.is_empty() {
            return Err(AnalysisError::InsufficientData("no bars".to_string()));
        }

        let market_time = now.with_timezone(&self.config.market_timezone).time();
        let snapshot = compute_technical(&bars, &self.config.technical, market_time)
            .ok_or_else(|| AnalysisError::InsufficientData("no bars".to_string()))?;

        // Check completeness before scoring so partial readings never reach history
        let indicators = snapshot.complete().ok_or_else(|| {
            AnalysisError::InsufficientData(format!(
                "{} bars, undefined {}",
                bars.len(),
                snapshot.missing().join(", ")
            ))
        })?;

        let breakdown = self.scorer.score(&snapshot, &self.history, symbol);

        Ok(Summary {
            symbol: symbol.to_string(),
            timestamp: now,
            score: breakdown.score,
            signal: breakdown.signal,
            weight_policy: self.config.scorer.weight_policy.name().to_string(),
            banding: self.config.scorer.banding.name().to_string(),
            indicators,
        })
    }

    /// One full evaluation cycle: score every ticker, stamp `last_run` and
    /// persist state. A failed save is logged, never fatal.
    pub async fn run_cycle(&self, tickers: &[String]) -> Vec<Summary> {
        let now = Utc::now();
        let summaries = self.get_summaries_at(tickers, now).await;

        let stamp = now
            .with_timezone(&self.config.market_timezone)
            .format(LAST_RUN_FORMAT)
            .to_string();
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(stamp);

        if let Err(e) = self.save_state() {
            tracing::error!("Failed to persist state: {}", e);
        }
        summaries
    }

    /// Market-local time the last cycle ran, if any.
    pub fn last_run(&self) -> Option<NaiveDateTime> {
        let guard = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        let raw = guard.as_deref()?;
        match NaiveDateTime::parse_from_str(raw, LAST_RUN_FORMAT) {
            Ok(ts) => Some(ts),
            Err(e) => {
                tracing::warn!("Ignoring unparseable last_run {:?}: {}", raw, e);
                None
            }
        }
    }

    pub fn save_state(&self) -> Result<(), AnalysisError> {
        let Some(file) = &self.state_file else {
            return Ok(());
        };
        let state = PersistedState {
            histories: self.history.snapshot(),
            last_run: self.last_run.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        };
        file.save(&state)?;
        tracing::debug!("State saved to {}", file.path().display());
        Ok(())
    }
}
