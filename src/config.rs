use crate::{Error, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "cryptodesk.toml";
pub const DEFAULT_SYMBOLS: &[&str] = &["ETH-USD", "BTC-USD", "AVAX-USD"];
pub const COINBASE_API_BASE: &str = "https://api.exchange.coinbase.com";

/// Granularities (seconds) accepted by the candles endpoint
pub const VALID_GRANULARITIES: &[u32] = &[60, 300, 900, 3600, 21600, 86400];

/// Maximum number of candles the exchange returns per request
pub const MAX_CANDLES_PER_REQUEST: u64 = 300;

/// Longest symbol the tables accept
pub const MAX_SYMBOL_LEN: usize = 10;

/// Upper bound for `exchange.max_retries`
pub const MAX_EXCHANGE_RETRIES: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub requests_per_second: u32,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSettings {
    pub symbols: Vec<String>,
    pub window_minutes: u32,
    pub granularity_secs: u32,
    pub ticker_interval_secs: u64,
    pub candle_interval_secs: u64,
    pub refresh_interval_minutes: u64,
}

/// Application settings
///
/// Layered as: built-in defaults, then the optional TOML file, then
/// `CRYPTODESK__SECTION__KEY` environment variables. `DATABASE_URL` wins
/// over everything for the database url.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub exchange: ExchangeSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    /// Load settings from the given file (optional when it is the default path)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let mut builder = defaults()?
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("CRYPTODESK")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ingest.symbols")
                    .try_parsing(true),
            );

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text layered over the defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let ingest = &self.ingest;

        if ingest.symbols.is_empty() {
            return Err(Error::validation("ingest.symbols must not be empty"));
        }
        for symbol in &ingest.symbols {
            if symbol.trim().is_empty() || symbol.chars().count() > MAX_SYMBOL_LEN {
                return Err(Error::validation(format!(
                    "invalid symbol {:?}: must be 1..={} characters",
                    symbol, MAX_SYMBOL_LEN
                )));
            }
        }
        if !VALID_GRANULARITIES.contains(&ingest.granularity_secs) {
            return Err(Error::validation(format!(
                "ingest.granularity_secs must be one of {:?}",
                VALID_GRANULARITIES
            )));
        }
        if ingest.window_minutes == 0 {
            return Err(Error::validation("ingest.window_minutes must be > 0"));
        }
        let candles = ingest.window_minutes as u64 * 60 / ingest.granularity_secs as u64;
        if candles > MAX_CANDLES_PER_REQUEST {
            return Err(Error::validation(format!(
                "ingest window covers {} candles, exchange allows at most {}",
                candles, MAX_CANDLES_PER_REQUEST
            )));
        }
        if ingest.ticker_interval_secs == 0
            || ingest.candle_interval_secs == 0
            || ingest.refresh_interval_minutes == 0
        {
            return Err(Error::validation("ingest intervals must be > 0"));
        }
        if self.exchange.max_retries > MAX_EXCHANGE_RETRIES {
            return Err(Error::validation(format!(
                "exchange.max_retries must be at most {}",
                MAX_EXCHANGE_RETRIES
            )));
        }
        if self.exchange.requests_per_second == 0 {
            return Err(Error::validation("exchange.requests_per_second must be > 0"));
        }
        if self.database.connect_attempts == 0 {
            return Err(Error::validation("database.connect_attempts must be > 0"));
        }

        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("database.url", "postgres://localhost/cryptodesk")?
        .set_default("database.max_connections", 5)?
        .set_default("database.connect_attempts", 30)?
        .set_default("database.connect_delay_secs", 1)?
        .set_default("server.bind", "0.0.0.0:8000")?
        .set_default("exchange.base_url", COINBASE_API_BASE)?
        .set_default("exchange.timeout_secs", 30)?
        .set_default("exchange.max_retries", 3)?
        .set_default("exchange.requests_per_second", 10)?
        .set_default(
            "exchange.user_agent",
            concat!("cryptodesk/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("ingest.symbols", DEFAULT_SYMBOLS.to_vec())?
        .set_default("ingest.window_minutes", 300)?
        .set_default("ingest.granularity_secs", 60)?
        .set_default("ingest.ticker_interval_secs", 15)?
        .set_default("ingest.candle_interval_secs", 60)?
        .set_default("ingest.refresh_interval_minutes", 60)?;

    Ok(builder)
}
