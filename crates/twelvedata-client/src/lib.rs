use analysis_core::{AnalysisError, Bar, BarsResponse, MarketDataProvider, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub mod rate_limiter;
pub use rate_limiter::RateLimiter;

const BASE_URL: &str = "https://api.twelvedata.com";

/// Connection settings for the TwelveData REST API
#[derive(Debug, Clone)]
pub struct TwelveDataConfig {
    pub base_url: String,
    /// Calls allowed per `rate_window`. The free plan allows 8 per minute.
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TwelveDataConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            rate_limit: 8,
            // One extra second over the published minute keeps us clear of clock skew
            rate_window: Duration::from_secs(61),
            timeout: Duration::from_secs(8),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct TwelveDataClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl TwelveDataClient {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, TwelveDataConfig::default())
    }

    pub fn with_config(api_key: String, config: TwelveDataConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: config.base_url,
            client,
            rate_limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            retry: config.retry,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// One rate-limited request. Transport failures and 5xx responses are
    /// `ApiError`s the retry policy may repeat; other 4xx responses are
    /// `RequestRejected` and are never sent again.
    async fn send_once(&self, url: &str, query: &[(&str, String)]) -> Result<String, AnalysisError> {
        self.rate_limiter.admit().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AnalysisError::ApiError(format!("HTTP {}", status)));
        }
        if status.as_u16() == 429 {
            // Surface as a body the parser recognises as a quota refusal
            return Ok(r#"{"code":429,"status":"error","message":"HTTP 429"}"#.to_string());
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        if status.is_client_error() {
            return Err(AnalysisError::RequestRejected(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(AnalysisError::ApiError(format!("HTTP {}: {}", status, body)));
        }
        Ok(body)
    }

    /// Get intraday bars for a symbol, in the provider's native (newest-first) order
    pub async fn get_time_series(
        &self,
        symbol: &str,
        interval: &str,
        outputsize: u32,
    ) -> Result<BarsResponse, AnalysisError> {
        let url = format!("{}/time_series", self.base_url);
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("outputsize", outputsize.to_string()),
            ("apikey", self.api_key.clone()),
        ];

        let this = self;
        let url_ref = url.as_str();
        let query_ref = &query[..];
        let body = self
            .retry
            .run_if(
                &format!("TwelveData time_series {}", symbol),
                |e| matches!(e, AnalysisError::ApiError(_)),
                move || this.send_once(url_ref, query_ref),
            )
            .await?;

        parse_time_series(&body)
    }
}

#[async_trait]
impl MarketDataProvider for TwelveDataClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<BarsResponse, AnalysisError> {
        self.get_time_series(symbol, interval, limit).await
    }
}

/// Parse a `time_series` body into bars.
///
/// Fails closed: a body that is not an error envelope and not a complete
/// series (every record carrying datetime, high, low, close and volume) is
/// rejected as a whole rather than partially accepted.
pub fn parse_time_series(body: &str) -> Result<BarsResponse, AnalysisError> {
    let response: TimeSeriesResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::InvalidData(format!("malformed time_series body: {}", e)))?;

    if response.code == Some(429) {
        return Ok(BarsResponse::RateLimited);
    }
    if response.status.as_deref() == Some("error") {
        return Err(AnalysisError::ApiError(format!(
            "TwelveData error {}: {}",
            response.code.unwrap_or_default(),
            response.message.unwrap_or_default()
        )));
    }

    let values = response
        .values
        .ok_or_else(|| AnalysisError::InvalidData("time_series body has no values".to_string()))?;

    let tz: Option<Tz> = response
        .meta
        .and_then(|m| m.exchange_timezone)
        .and_then(|name| name.parse().ok());

    let bars = values
        .into_iter()
        .map(|v| v.into_bar(tz))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BarsResponse::Bars(bars))
}

fn parse_number(field: &str, raw: Option<String>) -> Result<f64, AnalysisError> {
    let raw = raw.ok_or_else(|| AnalysisError::InvalidData(format!("missing field '{}'", field)))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AnalysisError::InvalidData(format!("field '{}' is not a number: {}", field, raw)))?;
    if !value.is_finite() {
        return Err(AnalysisError::InvalidData(format!("field '{}' is not finite", field)));
    }
    Ok(value)
}

/// TwelveData stamps bars in exchange-local time without an offset.
fn parse_datetime(raw: &str, tz: Option<Tz>) -> Result<DateTime<Utc>, AnalysisError> {
    // Daily and coarser intervals come back as a bare date
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| AnalysisError::InvalidData(format!("unparseable datetime: {}", raw)))?;

    match tz {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| AnalysisError::InvalidData(format!("nonexistent local time: {}", raw))),
        None => Ok(Utc.from_utc_datetime(&naive)),
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(default)]
    meta: Option<TimeSeriesMeta>,
    #[serde(default)]
    values: Option<Vec<TimeSeriesValue>>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesMeta {
    #[serde(default)]
    exchange_timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesValue {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    high: Option<String>,
    #[serde(default)]
    low: Option<String>,
    #[serde(default)]
    close: Option<String>,
    #[serde(default)]
    volume: Option<String>,
}

impl TimeSeriesValue {
    fn into_bar(self, tz: Option<Tz>) -> Result<Bar, AnalysisError> {
        let datetime = self
            .datetime
            .ok_or_else(|| AnalysisError::InvalidData("missing field 'datetime'".to_string()))?;
        let bar = Bar {
            timestamp: parse_datetime(&datetime, tz)?,
            high: parse_number("high", self.high)?,
            low: parse_number("low", self.low)?,
            close: parse_number("close", self.close)?,
            volume: parse_number("volume", self.volume)?,
        };
        if bar.close <= 0.0 || bar.low < 0.0 || bar.high < bar.low || bar.volume < 0.0 {
            return Err(AnalysisError::InvalidData(format!("inconsistent bar at {}", datetime)));
        }
        Ok(bar)
    }
}
