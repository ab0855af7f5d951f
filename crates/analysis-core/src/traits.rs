use async_trait::async_trait;
use crate::{AnalysisError, Bar};

/// Raw outcome of one bar request against a market-data provider.
#[derive(Debug, Clone, PartialEq)]
pub enum BarsResponse {
    /// Bars in the provider's native order (newest first for TwelveData).
    Bars(Vec<Bar>),
    /// The provider refused the call because its quota was exhausted.
    RateLimited,
}

/// Trait for intraday bar providers
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<BarsResponse, AnalysisError>;
}
