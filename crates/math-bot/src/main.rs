use std::sync::Arc;
use std::time::Duration;

use analysis_core::{MarketDataProvider, Summary};
use anyhow::{Context, Result};
use scoring_engine::{ScoringService, StateFile};
use tokio::signal::unix::SignalKind;
use tokio::time;
use twelvedata_client::TwelveDataClient;

mod config;
mod schedule;

use config::BotConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();
    init_tracing();

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting math bot");

    // 2. Configuration
    let config = BotConfig::from_env().context("invalid configuration")?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Watchlist: {} symbols", config.watchlist.len());
    tracing::info!(
        "  Rate limit: {} calls per {}s",
        config.rate_limit,
        config.rate_window_secs
    );
    tracing::info!("  Cycle interval: {} minutes", config.cycle_interval_minutes);
    tracing::info!("  State file: {}", config.state_file.display());

    // 3. Provider and scoring service
    let provider: Arc<dyn MarketDataProvider> = Arc::new(TwelveDataClient::with_config(
        config.twelvedata_api_key.clone(),
        config.provider_config(),
    ));
    let service = ScoringService::new(provider, config.scoring_config())
        .context("invalid scoring configuration")?
        .with_state_file(StateFile::new(config.state_file.clone()));

    if config.run_once {
        let summaries = service.run_cycle(&config.watchlist).await;
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    tracing::info!(
        "Bot is now running. Polling every {}s. Press Ctrl+C to stop.",
        config.poll_interval_secs
    );

    // Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let cadence = chrono::Duration::minutes(config.cycle_interval_minutes);
    let mut was_open = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now_et = chrono::Utc::now().with_timezone(&service.config().market_timezone);

                let open = schedule::is_market_open(&now_et);
                if was_open != Some(open) {
                    tracing::info!("Market {} ({})", if open { "open" } else { "closed" }, now_et.format("%a %H:%M %Z"));
                    was_open = Some(open);
                }
                if !open {
                    continue;
                }

                if !schedule::cycle_due(service.last_run(), now_et.naive_local(), cadence) {
                    tracing::debug!("Cycle not due yet (last run {:?})", service.last_run());
                    continue;
                }

                // A full cycle can wait minutes on the rate limiter; a signal
                // abandons it and keeps the history of symbols already scored.
                let started = time::Instant::now();
                tokio::select! {
                    summaries = service.run_cycle(&config.watchlist) => {
                        log_summaries(&summaries);
                        tracing::info!(
                            "Cycle complete: {}/{} symbols scored in {:.1}s",
                            summaries.len(),
                            config.watchlist.len(),
                            started.elapsed().as_secs_f64()
                        );
                    }
                    _ = &mut shutdown => {
                        tracing::warn!(
                            "Shutdown signal received mid-cycle after {:.1}s, abandoning it",
                            started.elapsed().as_secs_f64()
                        );
                        save_final_state(&service);
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                save_final_state(&service);
                break;
            }
        }
    }

    tracing::info!("Math bot shut down.");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn save_final_state(service: &ScoringService) {
    if let Err(e) = service.save_state() {
        tracing::error!("Final state save failed: {}", e);
    }
}

fn log_summaries(summaries: &[Summary]) {
    for s in summaries {
        tracing::info!(
            "{:<5} {:>9.2} score {:>5.1} {:<11} rsi {:>5.1} vol {:>+7.1}% macd {}",
            s.symbol,
            s.indicators.price,
            s.score,
            s.signal.to_label(),
            s.indicators.rsi,
            s.indicators.vol_change,
            s.indicators.macd.map_or_else(|| "n/a".to_string(), |m| format!("{:+.3}", m))
        );
    }
}
