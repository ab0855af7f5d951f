use analysis_core::{Bar, IndicatorValues};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::indicators::*;

/// Moving-average window pair used until `until` (exclusive) in market time.
/// The last bucket may leave `until` empty to cover the rest of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaWindowBucket {
    pub until: Option<NaiveTime>,
    pub short: usize,
    pub long: usize,
}

/// Time-of-day table of MA window lengths.
///
/// The open is noisy, so the first hour uses short windows; midday widens
/// them; the last stretch before the close tightens again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaWindowTable {
    buckets: Vec<MaWindowBucket>,
}

impl Default for MaWindowTable {
    fn default() -> Self {
        Self {
            buckets: vec![
                MaWindowBucket { until: NaiveTime::from_hms_opt(10, 30, 0), short: 5, long: 15 },
                MaWindowBucket { until: NaiveTime::from_hms_opt(14, 30, 0), short: 10, long: 20 },
                MaWindowBucket { until: None, short: 7, long: 15 },
            ],
        }
    }
}

impl MaWindowTable {
    /// Buckets are checked in order; the first whose `until` lies after the
    /// evaluation time wins.
    pub fn new(buckets: Vec<MaWindowBucket>) -> Self {
        Self { buckets }
    }

    /// A table that uses the same windows all day.
    pub fn fixed(short: usize, long: usize) -> Self {
        Self::new(vec![MaWindowBucket { until: None, short, long }])
    }

    /// (short, long) windows in force at `time`.
    pub fn windows_for(&self, time: NaiveTime) -> (usize, usize) {
        self.buckets
            .iter()
            .find(|b| b.until.map_or(true, |until| time < until))
            .or_else(|| self.buckets.last())
            .map(|b| (b.short, b.long))
            .unwrap_or((5, 20))
    }
}

/// Periods and windows for the indicator set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    /// Trailing bars used as the volume baseline, 30 to 120
    pub volume_window: usize,
    pub volume_baseline: VolumeBaseline,
    pub ma_windows: MaWindowTable,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            volume_window: 120,
            volume_baseline: VolumeBaseline::Mean,
            ma_windows: MaWindowTable::default(),
        }
    }
}

impl TechnicalConfig {
    pub const MIN_VOLUME_WINDOW: usize = 30;
    pub const MAX_VOLUME_WINDOW: usize = 120;

    pub fn with_volume_window(mut self, window: usize) -> Self {
        self.volume_window = window.clamp(Self::MIN_VOLUME_WINDOW, Self::MAX_VOLUME_WINDOW);
        self
    }
}

/// Latest indicator readings for one symbol. `None` marks a reading the bar
/// history is too short for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub price: f64,
    pub change: f64,
    pub volume: f64,
    pub ma_short: Option<f64>,
    pub ma_long: Option<f64>,
    pub ma_short_window: usize,
    pub ma_long_window: usize,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub vol_change: Option<f64>,
    /// Fast minus slow EMA, 0 while the slow EMA is undefined
    pub macd: f64,
    pub macd_defined: bool,
}

impl TechnicalSnapshot {
    /// Summary readings, if every required one is defined. MACD is optional
    /// and left empty until the slow EMA has enough closes.
    pub fn complete(&self) -> Option<IndicatorValues> {
        Some(IndicatorValues {
            price: self.price,
            change: self.change,
            volume: self.volume,
            ma_short: self.ma_short?,
            ma_long: self.ma_long?,
            ma_short_window: self.ma_short_window,
            ma_long_window: self.ma_long_window,
            rsi: self.rsi?,
            atr: self.atr?,
            vol_change: self.vol_change?,
            macd: self.macd_defined.then_some(self.macd),
        })
    }

    /// Names of the readings that are still undefined.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.ma_short.is_none() {
            missing.push("ma_short");
        }
        if self.ma_long.is_none() {
            missing.push("ma_long");
        }
        if self.rsi.is_none() {
            missing.push("rsi");
        }
        if self.atr.is_none() {
            missing.push("atr");
        }
        if self.vol_change.is_none() {
            missing.push("vol_change");
        }
        missing
    }
}

/// Compute the indicator snapshot for an oldest-first bar sequence.
///
/// `market_time` selects the MA windows from the config's table. Returns None
/// for an empty sequence.
pub fn compute_technical(
    bars: &[Bar],
    config: &TechnicalConfig,
    market_time: NaiveTime,
) -> Option<TechnicalSnapshot> {
    let last = bars.last()?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let prev = if bars.len() > 1 { bars[bars.len() - 2].close } else { last.close };
    let (short_window, long_window) = config.ma_windows.windows_for(market_time);

    Some(TechnicalSnapshot {
        price: last.close,
        change: last.close - prev,
        volume: last.volume,
        ma_short: sma(&closes, short_window),
        ma_long: sma(&closes, long_window),
        ma_short_window: short_window,
        ma_long_window: long_window,
        rsi: rsi(&closes, config.rsi_period),
        atr: atr(bars, config.atr_period),
        vol_change: volume_change(&volumes, config.volume_window, config.volume_baseline),
        macd: macd_value(&closes, config.macd_fast, config.macd_slow),
        macd_defined: closes.len() >= config.macd_fast.max(config.macd_slow),
    })
}
