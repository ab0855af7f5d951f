use analysis_core::Bar;
use serde::{Deserialize, Serialize};

// Every indicator returns its latest value, or None when the series is too
// short to compute it. None means "insufficient data", never zero.

/// Simple Moving Average of the last `window` values
pub fn sma(data: &[f64], window: usize) -> Option<f64> {
    if window == 0 || data.len() < window {
        return None;
    }
    let sum: f64 = data[data.len() - window..].iter().sum();
    Some(sum / window as f64)
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values
pub fn ema(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut value = data[..period].iter().sum::<f64>() / period as f64;
    for &x in &data[period..] {
        value = x * k + value * (1.0 - k);
    }
    Some(value)
}

/// Relative Strength Index with Wilder smoothing
pub fn rsi(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(-change);
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    let value = if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    Some(value.clamp(0.0, 100.0))
}

/// True range of each bar against the previous close
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| {
            let high_low = w[1].high - w[1].low;
            let high_close = (w[1].high - w[0].close).abs();
            let low_close = (w[1].low - w[0].close).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect()
}

/// Average True Range: mean of the last `period` true ranges.
///
/// With fewer than `period` ranges the mean of all available ranges is used,
/// not the latest range alone, so early-session readings stay smoothed.
/// ATR only feeds trend strength as a scale for MACD, where a usable estimate
/// beats a neutral fallback. None below 2 bars, where no range exists.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 {
        return None;
    }
    let tr = true_ranges(bars);
    let recent = &tr[tr.len().saturating_sub(period)..];
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

/// Baseline that the latest volume is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeBaseline {
    #[default]
    Mean,
    Median,
}

/// Percent deviation of the latest volume from the trailing `window` baseline.
/// The window shrinks to the available history; a zero baseline gives 0.
pub fn volume_change(volumes: &[f64], window: usize, baseline: VolumeBaseline) -> Option<f64> {
    let last = *volumes.last()?;
    let window = window.max(1).min(volumes.len());
    let recent = &volumes[volumes.len() - window..];

    let base = match baseline {
        VolumeBaseline::Mean => recent.iter().sum::<f64>() / recent.len() as f64,
        VolumeBaseline::Median => median(recent),
    };

    if base == 0.0 {
        return Some(0.0);
    }
    Some((last - base) / base * 100.0)
}

fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// MACD line value (fast EMA minus slow EMA). 0 when either EMA is undefined.
pub fn macd_value(data: &[f64], fast_period: usize, slow_period: usize) -> f64 {
    match (ema(data, fast_period), ema(data, slow_period)) {
        (Some(fast), Some(slow)) => fast - slow,
        _ => 0.0,
    }
}
