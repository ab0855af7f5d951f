use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One intraday price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Discrete recommendation derived from a math score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Signal {
    /// Ordinal from most bearish (-2) to most bullish (2)
    pub fn rank(&self) -> i32 {
        match self {
            Signal::StrongBuy => 2,
            Signal::Buy => 1,
            Signal::Hold => 0,
            Signal::Sell => -1,
            Signal::StrongSell => -2,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Signal::StrongBuy => "strong_buy",
            Signal::Buy => "buy",
            Signal::Hold => "hold",
            Signal::Sell => "sell",
            Signal::StrongSell => "strong_sell",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_label())
    }
}

/// Indicator readings that went into a summary. Every field is defined;
/// symbols whose readings are incomplete never produce a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub price: f64,
    pub change: f64,
    pub volume: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub ma_short_window: usize,
    pub ma_long_window: usize,
    pub rsi: f64,
    pub atr: f64,
    pub vol_change: f64,
    /// Fast minus slow EMA; absent until the slow EMA has enough closes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
}

/// Scoring output for one symbol at one evaluation instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Composite math score, 0-100
    pub score: f64,
    pub signal: Signal,
    pub weight_policy: String,
    pub banding: String,
    pub indicators: IndicatorValues,
}
