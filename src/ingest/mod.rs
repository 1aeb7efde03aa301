pub mod worker;

pub use worker::run_worker;

use crate::api::{Candle, CoinbaseClient, Ticker};
use crate::config::IngestSettings;
use crate::db::Store;
use crate::models::NewCrypto;
use crate::Result;
use chrono::{DateTime, Duration, Utc};

/// Statistics from a crypto table refresh
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateStats {
    /// Rows fetched per symbol, in configured order
    pub per_symbol: Vec<(String, usize)>,
    pub deleted: u64,
    pub inserted: u64,
}

/// Refresh the crypto table with the candle window ending at `end`
///
/// Every symbol is fetched before anything is written; a single failed
/// fetch leaves the table as it was.
pub async fn populate_crypto_table<S: Store>(
    client: &CoinbaseClient,
    store: &S,
    settings: &IngestSettings,
    end: DateTime<Utc>,
) -> Result<PopulateStats> {
    let start = end - Duration::minutes(settings.window_minutes as i64);
    tracing::info!(
        "Starting to populate crypto table ({} symbols, {} -> {})",
        settings.symbols.len(),
        start,
        end
    );

    let mut rows = Vec::new();
    let mut per_symbol = Vec::with_capacity(settings.symbols.len());

    for symbol in &settings.symbols {
        let candles = client
            .get_candles(symbol, start, end, settings.granularity_secs)
            .await
            .inspect_err(|e| tracing::error!("Failed to fetch candles for {}: {}", symbol, e))?;

        per_symbol.push((symbol.clone(), candles.len()));
        rows.extend(candles.into_iter().map(|c| to_crypto_row(symbol, c)));
        tracing::info!("{} fetched successfully", symbol);
    }

    tracing::info!("Replacing old rows...");
    let refresh = store.replace_crypto(rows).await?;

    for (symbol, count) in &per_symbol {
        tracing::info!(symbol = %symbol, rows = count, "{} populated successfully", symbol);
    }
    tracing::info!(
        deleted = refresh.deleted,
        inserted = refresh.inserted,
        "All symbol data populated successfully"
    );

    Ok(PopulateStats {
        per_symbol,
        deleted: refresh.deleted,
        inserted: refresh.inserted,
    })
}

/// Fetch the ticker of every symbol and log its price
///
/// Failures are logged and skipped; the successful tickers are returned.
pub async fn gather_intra_minute_data(client: &CoinbaseClient, symbols: &[String]) -> Vec<Ticker> {
    let mut tickers = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        match client.get_ticker(symbol).await {
            Ok(ticker) => {
                tracing::info!("symbol: {} | {}", symbol, ticker.price);
                tickers.push(ticker);
            }
            Err(e) => tracing::warn!("Ticker fetch failed for {}: {}", symbol, e),
        }
    }

    tickers
}

/// Fetch the minute ending at `end` for every symbol and log its close
pub async fn gather_minute_data(
    client: &CoinbaseClient,
    symbols: &[String],
    end: DateTime<Utc>,
) -> Vec<(String, Candle)> {
    let mut closed = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        match client.get_last_minute(symbol, end).await {
            Ok(candles) => match latest(candles) {
                Some(candle) => {
                    tracing::info!("CLOSED: {} | {}", symbol, candle.close);
                    closed.push((symbol.clone(), candle));
                }
                None => tracing::warn!("No candle returned for {} ending {}", symbol, end),
            },
            Err(e) => tracing::warn!("Candle fetch failed for {}: {}", symbol, e),
        }
    }

    closed
}

/// Newest candle of a batch (the exchange sends newest first, but don't rely on it)
fn latest(candles: Vec<Candle>) -> Option<Candle> {
    candles.into_iter().max_by_key(|c| c.time)
}

fn to_crypto_row(symbol: &str, candle: Candle) -> NewCrypto {
    NewCrypto {
        date_and_time: candle.time,
        low: candle.low,
        high: candle.high,
        open: candle.open,
        close: candle.close,
        volume: candle.volume,
        symbol: symbol.to_string(),
    }
}
