use anyhow::{bail, Context, Result};
use scoring_engine::{RsiPolarity, ScorerConfig, ScoringConfig, SignalBanding, WeightPolicy, Weights};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use technical_analysis::{TechnicalConfig, VolumeBaseline};
use twelvedata_client::TwelveDataConfig;

const DEFAULT_WATCHLIST: &str = "AAPL,MSFT,AMZN,NVDA,GOOG,META,TSLA,NFLX,DIS,PYPL,INTC,CSCO,ADBE,\
ORCL,IBM,CRM,AMD,UBER,LYFT,SHOP,BABA,NKE,SBUX,QCOM,PEP,KO";

/// One week. Larger values would overflow `chrono::Duration::minutes`.
const MAX_CYCLE_INTERVAL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct BotConfig {
    // Provider
    pub twelvedata_api_key: String,
    pub rate_limit: usize,          // 8 calls
    pub rate_window_secs: u64,      // per 61s
    pub bar_interval: String,       // "1min"
    pub bar_limit: u32,             // 200 bars
    pub bar_cache_ttl_secs: u64,    // 30s

    // Universe and state
    pub watchlist: Vec<String>,
    pub state_file: PathBuf,

    // Loop
    pub cycle_interval_minutes: i64, // 30
    pub poll_interval_secs: u64,     // 60
    pub run_once: bool,

    // Scoring
    pub weight_policy: WeightPolicy,
    pub banding: SignalBanding,
    pub rsi_polarity: RsiPolarity,
    pub history_max_len: usize,     // 100
    pub volume_window: usize,       // 120, clamped to 30..=120
    pub volume_baseline: VolumeBaseline,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any key lookup; missing keys take their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let watchlist: Vec<String> = get("WATCHLIST", DEFAULT_WATCHLIST)
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if watchlist.is_empty() {
            bail!("WATCHLIST is empty");
        }

        let config = Self {
            twelvedata_api_key: var("TWELVEDATA_KEY").context("TWELVEDATA_KEY not set")?,
            rate_limit: get("TWELVEDATA_RATE_LIMIT", "8")
                .parse()
                .context("TWELVEDATA_RATE_LIMIT")?,
            rate_window_secs: get("TWELVEDATA_WINDOW_SECS", "61")
                .parse()
                .context("TWELVEDATA_WINDOW_SECS")?,
            bar_interval: get("BAR_INTERVAL", "1min"),
            bar_limit: get("BAR_LIMIT", "200").parse().context("BAR_LIMIT")?,
            bar_cache_ttl_secs: get("BAR_CACHE_TTL_SECS", "30")
                .parse()
                .context("BAR_CACHE_TTL_SECS")?,

            watchlist,
            state_file: PathBuf::from(get("STATE_FILE", "trade_state.json")),

            cycle_interval_minutes: get("CYCLE_INTERVAL_MINUTES", "30")
                .parse()
                .context("CYCLE_INTERVAL_MINUTES")?,
            poll_interval_secs: get("POLL_INTERVAL_SECS", "60")
                .parse()
                .context("POLL_INTERVAL_SECS")?,
            run_once: get("RUN_ONCE", "false").parse().context("RUN_ONCE")?,

            weight_policy: parse_weight_policy(&get("WEIGHT_POLICY", "fixed"))?,
            banding: parse_banding(&get("SIGNAL_BANDING", "five_bucket"))?,
            rsi_polarity: parse_rsi_polarity(&get("RSI_POLARITY", "momentum"))?,
            history_max_len: get("HISTORY_MAX_LEN", "100")
                .parse()
                .context("HISTORY_MAX_LEN")?,
            volume_window: get("VOLUME_WINDOW", "120")
                .parse::<usize>()
                .context("VOLUME_WINDOW")?
                .clamp(TechnicalConfig::MIN_VOLUME_WINDOW, TechnicalConfig::MAX_VOLUME_WINDOW),
            volume_baseline: parse_volume_baseline(&get("VOLUME_BASELINE", "mean"))?,
        };

        if config.rate_limit == 0 {
            bail!("TWELVEDATA_RATE_LIMIT must be at least 1");
        }
        if config.history_max_len == 0 {
            bail!("HISTORY_MAX_LEN must be at least 1");
        }
        if config.cycle_interval_minutes <= 0 {
            bail!("CYCLE_INTERVAL_MINUTES must be positive");
        }
        if config.cycle_interval_minutes > MAX_CYCLE_INTERVAL_MINUTES {
            bail!(
                "CYCLE_INTERVAL_MINUTES must be at most {} (one week)",
                MAX_CYCLE_INTERVAL_MINUTES
            );
        }

        Ok(config)
    }

    pub fn provider_config(&self) -> TwelveDataConfig {
        TwelveDataConfig {
            rate_limit: self.rate_limit,
            rate_window: Duration::from_secs(self.rate_window_secs),
            ..TwelveDataConfig::default()
        }
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            interval: self.bar_interval.clone(),
            bar_limit: self.bar_limit,
            cache_ttl: Duration::from_secs(self.bar_cache_ttl_secs),
            history_max_len: self.history_max_len,
            technical: TechnicalConfig {
                volume_baseline: self.volume_baseline,
                ..TechnicalConfig::default()
            }
            .with_volume_window(self.volume_window),
            scorer: ScorerConfig {
                weight_policy: self.weight_policy,
                banding: self.banding,
                rsi_polarity: self.rsi_polarity,
                ..ScorerConfig::default()
            },
            ..ScoringConfig::default()
        }
    }
}

fn parse_weight_policy(raw: &str) -> Result<WeightPolicy> {
    match raw.trim().to_lowercase().as_str() {
        "fixed" => Ok(WeightPolicy::Fixed(Weights::default())),
        "adaptive" => Ok(WeightPolicy::Adaptive(Weights::default())),
        other => bail!("WEIGHT_POLICY must be fixed or adaptive, got {:?}", other),
    }
}

fn parse_banding(raw: &str) -> Result<SignalBanding> {
    match raw.trim().to_lowercase().as_str() {
        "five_bucket" => Ok(SignalBanding::FiveBucket),
        "three_bucket" => Ok(SignalBanding::ThreeBucket),
        other => bail!("SIGNAL_BANDING must be five_bucket or three_bucket, got {:?}", other),
    }
}

fn parse_rsi_polarity(raw: &str) -> Result<RsiPolarity> {
    match raw.trim().to_lowercase().as_str() {
        "momentum" => Ok(RsiPolarity::Momentum),
        "mean_reversion" => Ok(RsiPolarity::MeanReversion),
        other => bail!("RSI_POLARITY must be momentum or mean_reversion, got {:?}", other),
    }
}

fn parse_volume_baseline(raw: &str) -> Result<VolumeBaseline> {
    match raw.trim().to_lowercase().as_str() {
        "mean" => Ok(VolumeBaseline::Mean),
        "median" => Ok(VolumeBaseline::Median),
        other => bail!("VOLUME_BASELINE must be mean or median, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<BotConfig> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        BotConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("TWELVEDATA_KEY", "demo")]).unwrap();

        assert_eq!(config.watchlist.len(), 26);
        assert_eq!(config.watchlist[0], "AAPL");
        assert_eq!(config.rate_limit, 8);
        assert_eq!(config.rate_window_secs, 61);
        assert_eq!(config.bar_limit, 200);
        assert_eq!(config.state_file, PathBuf::from("trade_state.json"));
        assert_eq!(config.weight_policy.name(), "fixed");
        assert_eq!(config.banding, SignalBanding::FiveBucket);
        assert!(!config.run_once);
    }

    #[test]
    fn test_missing_api_key_fails() {
        assert!(config(&[]).is_err());
    }

    #[test]
    fn test_policies_are_parsed() {
        let config = config(&[
            ("TWELVEDATA_KEY", "demo"),
            ("WEIGHT_POLICY", "Adaptive"),
            ("SIGNAL_BANDING", "three_bucket"),
            ("RSI_POLARITY", "mean_reversion"),
            ("VOLUME_BASELINE", "median"),
        ])
        .unwrap();

        assert_eq!(config.weight_policy.name(), "adaptive");
        assert_eq!(config.banding, SignalBanding::ThreeBucket);
        assert_eq!(config.rsi_polarity, RsiPolarity::MeanReversion);
        assert_eq!(config.volume_baseline, VolumeBaseline::Median);
    }

    #[test]
    fn test_unknown_policy_fails() {
        assert!(config(&[("TWELVEDATA_KEY", "demo"), ("SIGNAL_BANDING", "seven")]).is_err());
    }

    #[test]
    fn test_watchlist_is_trimmed_and_uppercased() {
        let config = config(&[("TWELVEDATA_KEY", "demo"), ("WATCHLIST", " aapl, msft ,,ko")]).unwrap();
        assert_eq!(config.watchlist, vec!["AAPL", "MSFT", "KO"]);
    }

    #[test]
    fn test_volume_window_is_clamped() {
        let config = config(&[("TWELVEDATA_KEY", "demo"), ("VOLUME_WINDOW", "500")]).unwrap();
        assert_eq!(config.volume_window, 120);
        assert_eq!(config.scoring_config().technical.volume_window, 120);
    }

    #[test]
    fn test_cycle_interval_bounds() {
        let with = |minutes: &str| config(&[("TWELVEDATA_KEY", "demo"), ("CYCLE_INTERVAL_MINUTES", minutes)]);

        assert_eq!(with("10080").unwrap().cycle_interval_minutes, MAX_CYCLE_INTERVAL_MINUTES);
        assert!(with("10081").is_err());
        assert!(with(&i64::MAX.to_string()).is_err());
        assert!(with("0").is_err());
        assert!(with("-5").is_err());
    }

    #[test]
    fn test_scoring_config_carries_settings() {
        let config = config(&[
            ("TWELVEDATA_KEY", "demo"),
            ("BAR_CACHE_TTL_SECS", "45"),
            ("HISTORY_MAX_LEN", "50"),
        ])
        .unwrap();
        let scoring = config.scoring_config();

        assert_eq!(scoring.cache_ttl, Duration::from_secs(45));
        assert_eq!(scoring.history_max_len, 50);
        assert_eq!(scoring.market_timezone, chrono_tz::US::Eastern);
        assert_eq!(config.provider_config().rate_window, Duration::from_secs(61));
    }
}
