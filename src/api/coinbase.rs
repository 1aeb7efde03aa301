use crate::config::ExchangeSettings;
use crate::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const INITIAL_BACKOFF_MS: u64 = 1000;

type CoinbaseRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Current price snapshot from the ticker endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

/// One OHLCV bar from the candles endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Build from the wire layout `[time, low, high, open, close, volume]`
    pub fn from_row(row: [f64; 6]) -> Result<Self> {
        let time = DateTime::from_timestamp(row[0] as i64, 0)
            .ok_or_else(|| Error::Decode(format!("invalid candle timestamp {}", row[0])))?;

        Ok(Self {
            time,
            low: row[1],
            high: row[2],
            open: row[3],
            close: row[4],
            volume: row[5],
        })
    }
}

/// Ticker payload; numbers arrive as strings
#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
    #[serde(default)]
    bid: Option<String>,
    #[serde(default)]
    ask: Option<String>,
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

/// Public market-data client for the Coinbase Exchange REST API
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct CoinbaseClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
    rate_limiter: Arc<CoinbaseRateLimiter>,
}

impl CoinbaseClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;

        let per_second = NonZeroU32::new(settings.requests_per_second)
            .ok_or_else(|| Error::validation("exchange.requests_per_second must be > 0"))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries.max(1),
            backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            rate_limiter,
        })
    }

    /// Override the initial retry backoff (doubles per attempt)
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current price for a trading pair, e.g. `BTC-USD`
    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let url = format!("{}/products/{}/ticker", self.base_url, symbol);
        let raw: TickerResponse = self.get_json(&url, &[]).await?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            price: parse_number("price", &raw.price)?,
            bid: raw.bid.as_deref().map(|v| parse_number("bid", v)).transpose()?,
            ask: raw.ask.as_deref().map(|v| parse_number("ask", v)).transpose()?,
            volume: raw
                .volume
                .as_deref()
                .map(|v| parse_number("volume", v))
                .transpose()?,
            time: raw.time,
        })
    }

    /// Historical candles between `start` and `end`, newest first
    pub async fn get_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/products/{}/candles", self.base_url, symbol);
        let query = [
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("granularity", granularity_secs.to_string()),
        ];

        let rows: Vec<[f64; 6]> = self.get_json(&url, &query).await?;
        tracing::debug!("Fetched {} candles for {}", rows.len(), symbol);

        rows.into_iter().map(Candle::from_row).collect()
    }

    /// One-minute candles covering the minute before `end`
    pub async fn get_last_minute(&self, symbol: &str, end: DateTime<Utc>) -> Result<Vec<Candle>> {
        self.get_candles(symbol, end - ChronoDuration::minutes(1), end, 60)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.make_request(url, query).await?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            Error::Decode(format!("{} ({}): {}", url, e, snippet))
        })
    }

    /// Rate-limited GET with retry on 429, 5xx and transport failures
    async fn make_request(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let mut attempt = 1;

        loop {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            let result = self
                .client
                .get(url)
                .query(query)
                .header(CONTENT_TYPE, "application/json")
                .send()
                .await;

            let retryable = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let error = Error::Exchange {
                        status: status.as_u16(),
                        body,
                    };

                    // Only rate limits and server errors are retried
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Err(error);
                    }
                    error
                }
                // Timeouts and connection resets
                Err(e) => Error::Http(e),
            };

            if attempt >= self.max_retries {
                return Err(retryable);
            }

            let backoff = self.backoff_for(attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                attempt,
                self.max_retries,
                url,
                retryable,
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Exponential backoff: the initial delay doubled per failed attempt
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::Decode(format!("invalid {} value {:?}", field, value)))
}
