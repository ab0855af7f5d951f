use std::sync::Arc;
use std::time::Duration;

use analysis_core::{Bar, BarsResponse, MarketDataProvider};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Internal cache entry with fetch instant
#[derive(Debug, Clone)]
struct CacheEntry {
    bars: Vec<Bar>,
    fetched_at: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Per-symbol bar cache.
///
/// Each symbol owns a slot guarded by an async mutex that is held across the
/// whole check-fetch-store sequence, so at most one fetch per symbol is ever
/// in flight. Entries are only replaced by successful fetches.
pub struct BarCache {
    slots: DashMap<String, Slot>,
    ttl: Duration,
}

impl BarCache {
    pub fn new(ttl: Duration) -> Self {
        Self { slots: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, symbol: &str) -> Slot {
        // Clone the Arc out so no DashMap shard lock is held across an await
        self.slots
            .entry(symbol.to_uppercase())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Fetches bars through the provider, serving fresh cache hits locally and
/// degrading every failure to stale or empty data.
pub struct BarFetcher {
    provider: Arc<dyn MarketDataProvider>,
    cache: BarCache,
    interval: String,
    limit: u32,
}

impl BarFetcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, ttl: Duration, interval: String, limit: u32) -> Self {
        Self {
            provider,
            cache: BarCache::new(ttl),
            interval,
            limit,
        }
    }

    pub fn cache(&self) -> &BarCache {
        &self.cache
    }

    /// Get oldest-first bars for a symbol. Never fails: rate limiting yields an
    /// empty sequence, other errors yield the last cached bars (even if stale)
    /// or an empty sequence.
    pub async fn get_bars(&self, symbol: &str) -> Vec<Bar> {
        let slot = self.cache.slot(symbol);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.cache.ttl {
                tracing::debug!("Bar cache hit for {} ({} bars)", symbol, cached.bars.len());
                return cached.bars.clone();
            }
        }

        match self.provider.fetch_bars(symbol, &self.interval, self.limit).await {
            Ok(BarsResponse::Bars(bars)) if !bars.is_empty() => {
                let bars = oldest_first(bars);
                tracing::debug!("Fetched {} bars for {}", bars.len(), symbol);
                *entry = Some(CacheEntry {
                    bars: bars.clone(),
                    fetched_at: Instant::now(),
                });
                bars
            }
            Ok(BarsResponse::Bars(_)) => {
                tracing::info!("{} no valid bars, using cached data if any", symbol);
                entry.as_ref().map(|c| c.bars.clone()).unwrap_or_default()
            }
            Ok(BarsResponse::RateLimited) => {
                tracing::warn!("{} RATE LIMITED by market data provider, no data this cycle", symbol);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch bars for {}: {}", symbol, e);
                entry.as_ref().map(|c| c.bars.clone()).unwrap_or_default()
            }
        }
    }
}

/// Put provider bars into ascending timestamp order.
fn oldest_first(mut bars: Vec<Bar>) -> Vec<Bar> {
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        if first.timestamp > last.timestamp {
            bars.reverse();
        }
    }
    if !bars.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        bars.sort_by_key(|b| b.timestamp);
    }
    bars
}
