use anyhow::Result;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use data_ingestion::config::{AppConfig, DEFAULT_CONFIG_PATH};
use data_ingestion::connectors::{CoinGeckoConnector, CryptoPanicNews, KuCoinConnector};
use data_ingestion::databases::SqliteSignalStore;
use data_ingestion::notify::TelegramNotifier;
use data_ingestion::MultiSourceFeed;
use signal_generation::{CycleContext, CycleOutcome, LogNotifier, Notifier, SignalPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)?;

    info!("🚀 Starting anomaly hunter");
    info!(
        assets = ?config.pipeline.tracked_assets,
        interval_secs = config.runtime.interval_secs,
        min_confidence = config.pipeline.min_confidence,
        "Configuration loaded"
    );

    let timeout = config.runtime.http_timeout();
    let feed = MultiSourceFeed::new()
        .with_provider(Arc::new(
            CoinGeckoConnector::new(&config.providers.coingecko_url, timeout)?
                .with_coin_ids(config.providers.coin_ids.clone()),
        ))
        .with_provider(Arc::new(KuCoinConnector::new(&config.providers.kucoin_url, timeout)?));

    let store = SqliteSignalStore::connect(&config.runtime.database_url).await?;

    let notifier: Arc<dyn Notifier> = match config.telegram.credentials() {
        Some((token, chat_id)) => {
            info!("Publishing signals to Telegram");
            Arc::new(TelegramNotifier::new(&config.telegram.api_url, token, chat_id, timeout)?)
        }
        None => {
            warn!("Telegram credentials not set, signals go to the log only");
            Arc::new(LogNotifier)
        }
    };

    let mut pipeline = SignalPipeline::new(config.pipeline.clone(), config.risk.clone(), Arc::new(feed))
        .with_store(Arc::new(store))
        .with_notifier(notifier);

    match config.providers.cryptopanic_token.as_deref() {
        Some(token) if !token.is_empty() => {
            pipeline = pipeline.with_news(Arc::new(CryptoPanicNews::new(
                &config.providers.cryptopanic_url,
                token,
                timeout,
            )?));
        }
        _ => info!("No CryptoPanic token, scoring without news"),
    }

    let ctx = CycleContext::new(config.runtime.equity);
    let mut ticker = interval(config.runtime.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = pipeline.run_cycle(&ctx).await;
                match &report.outcome {
                    CycleOutcome::Emitted { signal, delivery } => info!(
                        asset = %signal.asset_id(),
                        score = signal.score(),
                        stored = delivery.stored,
                        notified = delivery.notified,
                        "Cycle complete: signal emitted"
                    ),
                    outcome => info!(
                        outcome = outcome.label(),
                        snapshot = report.snapshot_size,
                        excluded = report.excluded.len(),
                        "Cycle complete"
                    ),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Shutting down gracefully...");
                break;
            }
        }
    }

    Ok(())
}
