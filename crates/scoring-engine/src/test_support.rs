use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use analysis_core::{AnalysisError, Bar, BarsResponse, MarketDataProvider};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

/// Provider double that replays queued responses and counts calls.
/// Once the queue is empty it keeps returning `fallback`.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<BarsResponse, AnalysisError>>>,
    fallback: BarsResponse,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(fallback: BarsResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, response: Result<BarsResponse, AnalysisError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_bars(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: u32,
    ) -> Result<BarsResponse, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// `n` one-minute bars with closes 100.0, 100.1, ... and flat volume, oldest first.
pub fn rising_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + 0.1 * i as f64;
            Bar {
                timestamp: start + chrono::Duration::minutes(i as i64),
                high: close + 0.05,
                low: close - 0.05,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Same bars in the provider's newest-first order.
pub fn newest_first(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.reverse();
    bars
}
