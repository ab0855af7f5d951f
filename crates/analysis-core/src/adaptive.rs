//! Adaptive normalization utilities for history-relative indicator scoring.
//!
//! A raw indicator value means little on its own: a MACD of 0.4 is large for a
//! slow utility stock and noise for a volatile tech name. These functions score
//! a reading against that symbol's own rolling history with a clipped z-score,
//! so every indicator lands on the same 0-100 scale.

/// Readings further than this many standard deviations from the mean are clipped.
pub const Z_CLIP: f64 = 3.0;

/// Score returned when the history carries no information.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Compute population standard deviation (divides by n).
pub fn population_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

/// Compute the z-score of `value` relative to `data`, clipped to +/- `Z_CLIP`.
/// Returns None when the history is empty or has no variance.
pub fn clipped_z_score(value: f64, data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let sd = population_std_dev(data);
    if sd < f64::EPSILON {
        return None;
    }
    Some(((value - mean(data)) / sd).clamp(-Z_CLIP, Z_CLIP))
}

/// Map a raw reading to 0-100 against its history.
///
/// z = -3 maps to 0, z = 0 to 50 and z = +3 to 100. Empty or constant
/// histories give the neutral 50.
pub fn normalize(value: f64, history: &[f64]) -> f64 {
    match clipped_z_score(value, history) {
        Some(z) => ((z + Z_CLIP) / (2.0 * Z_CLIP) * 100.0).clamp(0.0, 100.0),
        None => NEUTRAL_SCORE,
    }
}
