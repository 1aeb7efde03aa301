use super::{gather_intra_minute_data, gather_minute_data, populate_crypto_table};
use crate::api::CoinbaseClient;
use crate::config::IngestSettings;
use crate::db::Store;
use crate::Result;
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tokio::time::{interval, interval_at, Duration, Instant, MissedTickBehavior};

/// Seconds until the next XX:XX:00 boundary (0 when already on one)
pub fn seconds_until_next_minute(now: DateTime<Utc>) -> u64 {
    let second = now.second() as u64;
    if second == 0 && now.nanosecond() == 0 {
        0
    } else {
        60 - second
    }
}

/// Start of the minute containing `now`
pub fn minute_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Run the ticker, minute-candle and table-refresh loops until Ctrl+C
pub async fn run_worker<S: Store>(
    client: CoinbaseClient,
    store: S,
    settings: IngestSettings,
) -> Result<()> {
    let settings = Arc::new(settings);

    // Spawn intra-minute price loop
    let ticker_task = {
        let client = client.clone();
        let settings = settings.clone();
        tokio::spawn(async move { ticker_loop(client, settings).await })
    };

    // Spawn minute candle loop (aligned to XX:XX:00)
    let candle_task = {
        let client = client.clone();
        let settings = settings.clone();
        tokio::spawn(async move { candle_loop(client, settings).await })
    };

    // Spawn periodic table refresh
    let refresh_task = {
        let settings = settings.clone();
        tokio::spawn(async move { refresh_loop(client, store, settings).await })
    };

    tracing::info!("All ingestion loops spawned");
    tracing::info!("  Ticker: every {}s", settings.ticker_interval_secs);
    tracing::info!(
        "  Candles: every {}s (clock-aligned)",
        settings.candle_interval_secs
    );
    tracing::info!("  Refresh: every {} min", settings.refresh_interval_minutes);

    // Run until Ctrl+C or a loop dies
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = ticker_task => {
            tracing::error!("Ticker loop exited: {:?}", result);
        }
        result = candle_task => {
            tracing::error!("Candle loop exited: {:?}", result);
        }
        result = refresh_task => {
            tracing::error!("Refresh loop exited: {:?}", result);
        }
    }

    Ok(())
}

async fn ticker_loop(client: CoinbaseClient, settings: Arc<IngestSettings>) {
    let mut ticker = interval(Duration::from_secs(settings.ticker_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        gather_intra_minute_data(&client, &settings.symbols).await;
    }
}

async fn candle_loop(client: CoinbaseClient, settings: Arc<IngestSettings>) {
    // Wait for the next minute boundary before the first tick
    let wait = seconds_until_next_minute(Utc::now());
    let mut ticker = interval_at(
        Instant::now() + Duration::from_secs(wait),
        Duration::from_secs(settings.candle_interval_secs),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        // The bar that just closed
        let end = minute_floor(Utc::now());
        gather_minute_data(&client, &settings.symbols, end).await;
    }
}

async fn refresh_loop<S: Store>(client: CoinbaseClient, store: S, settings: Arc<IngestSettings>) {
    let mut ticker = interval(Duration::from_secs(settings.refresh_interval_minutes * 60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick fires immediately, so the table is filled at startup
    loop {
        ticker.tick().await;
        if let Err(e) = populate_crypto_table(&client, &store, &settings, Utc::now()).await {
            tracing::error!("Crypto table refresh failed: {}", e);
        }
    }
}
