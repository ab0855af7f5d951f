use analysis_core::{AnalysisError, Signal};
use serde::{Deserialize, Serialize};
use technical_analysis::TechnicalSnapshot;

use crate::history::{HistoryStore, MACD, RSI, VOLUME};

const NEUTRAL: f64 = 50.0;

/// Component weights for trend, RSI and volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub trend: f64,
    pub rsi: f64,
    pub volume: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            trend: 0.45,
            rsi: 0.35,
            volume: 0.20,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.trend + self.rsi + self.volume
    }

    /// Scale so the weights sum to 1. Falls back to the defaults when the sum is 0.
    pub fn normalized(&self) -> Weights {
        let total = self.sum();
        if total <= f64::EPSILON {
            return Weights::default();
        }
        Weights {
            trend: self.trend / total,
            rsi: self.rsi / total,
            volume: self.volume / total,
        }
    }

    fn check_components(&self) -> Result<(), AnalysisError> {
        for (name, w) in [("trend", self.trend), ("rsi", self.rsi), ("volume", self.volume)] {
            if !w.is_finite() || w < 0.0 {
                return Err(AnalysisError::InvalidConfig(format!("{} weight must be >= 0, got {}", name, w)));
            }
        }
        Ok(())
    }

    /// Weights must be non-negative and sum to 1 within 1e-6.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.check_components()?;
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(AnalysisError::InvalidConfig(format!(
                "weights must sum to 1, got {:.6}",
                self.sum()
            )));
        }
        Ok(())
    }
}

/// How component weights are chosen for each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Same weights every time.
    Fixed(Weights),
    /// Start from the base weights and lean toward trend when `|macd| / atr`
    /// is high, toward RSI when it is low.
    Adaptive(Weights),
}

impl Default for WeightPolicy {
    fn default() -> Self {
        WeightPolicy::Fixed(Weights::default())
    }
}

impl WeightPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            WeightPolicy::Fixed(_) => "fixed",
            WeightPolicy::Adaptive(_) => "adaptive",
        }
    }
}

/// Score thresholds mapping a 0-100 score to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalBanding {
    /// >=85 strong_buy, >=70 buy, >=30 hold, >=15 sell, else strong_sell
    #[default]
    FiveBucket,
    /// >70 buy, <30 sell, else hold
    ThreeBucket,
}

impl SignalBanding {
    pub fn classify(&self, score: f64) -> Signal {
        match self {
            SignalBanding::FiveBucket => {
                if score >= 85.0 {
                    Signal::StrongBuy
                } else if score >= 70.0 {
                    Signal::Buy
                } else if score >= 30.0 {
                    Signal::Hold
                } else if score >= 15.0 {
                    Signal::Sell
                } else {
                    Signal::StrongSell
                }
            }
            SignalBanding::ThreeBucket => {
                if score > 70.0 {
                    Signal::Buy
                } else if score < 30.0 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalBanding::FiveBucket => "five_bucket",
            SignalBanding::ThreeBucket => "three_bucket",
        }
    }
}

/// Whether a high RSI reads bullish (momentum) or bearish (mean reversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiPolarity {
    #[default]
    Momentum,
    MeanReversion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub weight_policy: WeightPolicy,
    pub banding: SignalBanding,
    pub rsi_polarity: RsiPolarity,
    /// Share of each component taken from the history-normalized reading;
    /// the rest comes from the absolute reading.
    pub relative_weight: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weight_policy: WeightPolicy::default(),
            banding: SignalBanding::default(),
            rsi_polarity: RsiPolarity::default(),
            relative_weight: 0.4,
        }
    }
}

/// Per-component 0-100 scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub trend: f64,
    pub rsi: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub signal: Signal,
    pub weights: Weights,
    pub components: ComponentScores,
    pub trend_strength: f64,
}

/// Combines indicator readings into the composite math score.
pub struct CompositeScorer {
    config: ScorerConfig,
}

impl CompositeScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, AnalysisError> {
        match &config.weight_policy {
            WeightPolicy::Fixed(w) => w.validate()?,
            WeightPolicy::Adaptive(w) => {
                w.check_components()?;
                if w.sum() <= f64::EPSILON {
                    return Err(AnalysisError::InvalidConfig("adaptive base weights are all zero".to_string()));
                }
            }
        }
        if !(0.0..=1.0).contains(&config.relative_weight) {
            return Err(AnalysisError::InvalidConfig(format!(
                "relative_weight must be in [0, 1], got {}",
                config.relative_weight
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// `|macd| / atr` clipped to [0, 1]; 0 without a usable ATR.
    pub fn trend_strength(snapshot: &TechnicalSnapshot) -> f64 {
        match snapshot.atr {
            Some(atr) if atr > f64::EPSILON && snapshot.macd_defined => (snapshot.macd.abs() / atr).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Weights in force for a given trend strength. Always sums to 1.
    pub fn weights_for(&self, trend_strength: f64) -> Weights {
        match self.config.weight_policy {
            WeightPolicy::Fixed(w) => w,
            WeightPolicy::Adaptive(base) => {
                let s = trend_strength.clamp(0.0, 1.0);
                Weights {
                    trend: base.trend * (0.5 + s),
                    rsi: base.rsi * (1.5 - s),
                    volume: base.volume,
                }
                .normalized()
            }
        }
    }

    fn blend(&self, absolute: f64, normalized: f64) -> f64 {
        let r = self.config.relative_weight;
        ((1.0 - r) * absolute + r * normalized).clamp(0.0, 100.0)
    }

    /// Score one snapshot. Each defined reading is normalized against and then
    /// appended to the symbol's history; undefined readings contribute a
    /// neutral 50 and leave history untouched.
    pub fn score(&self, snapshot: &TechnicalSnapshot, history: &HistoryStore, symbol: &str) -> ScoreBreakdown {
        let crossover = match (snapshot.ma_short, snapshot.ma_long) {
            (Some(short), Some(long)) if short > long => 100.0,
            (Some(short), Some(long)) if short < long => 0.0,
            _ => NEUTRAL,
        };
        let macd_rel = if snapshot.macd_defined {
            history.score_and_record(symbol, MACD, snapshot.macd)
        } else {
            NEUTRAL
        };
        let trend = self.blend(crossover, macd_rel);

        let rsi = match snapshot.rsi {
            Some(value) => {
                let absolute = match self.config.rsi_polarity {
                    RsiPolarity::Momentum => value,
                    RsiPolarity::MeanReversion => 100.0 - value,
                };
                let mut relative = history.score_and_record(symbol, RSI, value);
                if self.config.rsi_polarity == RsiPolarity::MeanReversion {
                    relative = 100.0 - relative;
                }
                self.blend(absolute, relative)
            }
            None => NEUTRAL,
        };

        let volume = match snapshot.vol_change {
            Some(change) => {
                let absolute = (NEUTRAL + change / 2.0).clamp(0.0, 100.0);
                self.blend(absolute, history.score_and_record(symbol, VOLUME, change))
            }
            None => NEUTRAL,
        };

        let trend_strength = Self::trend_strength(snapshot);
        let weights = self.weights_for(trend_strength);
        let score =
            (weights.trend * trend + weights.rsi * rsi + weights.volume * volume).clamp(0.0, 100.0);

        tracing::debug!(
            "{} score {:.1} (trend {:.1}, rsi {:.1}, volume {:.1}, strength {:.2})",
            symbol,
            score,
            trend,
            rsi,
            volume,
            trend_strength
        );

        ScoreBreakdown {
            score,
            signal: self.config.banding.classify(score),
            weights,
            components: ComponentScores { trend, rsi, volume },
            trend_strength,
        }
    }
}
