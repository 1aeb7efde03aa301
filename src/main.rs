use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use cryptodesk::db::{wait_for_db, PostgresStore, Store};
use cryptodesk::ingest::{
    gather_intra_minute_data, gather_minute_data, populate_crypto_table, run_worker,
    worker::minute_floor,
};
use cryptodesk::models::NewUser;
use cryptodesk::{logging, server, CoinbaseClient, Settings};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cryptodesk", version, about = "Simulated crypto orders and market data ingestion")]
struct Cli {
    /// Settings file (defaults to ./cryptodesk.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the scheduled ingestion loops
    Worker,
    /// Refresh the crypto table once
    Populate,
    /// Log the current ticker price of every symbol once
    GatherTicker,
    /// Log the last closed minute candle of every symbol once
    GatherCandles,
    /// Create a user and print its API token
    CreateUser {
        email: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Create a staff superuser and print its API token
    CreateSuperuser {
        email: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Block until the database accepts connections
    WaitForDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Command::Serve { bind } => {
            let store = connect(&settings).await?;
            let addr = bind.unwrap_or_else(|| settings.server.bind.clone());
            server::serve(&addr, store).await?;
        }
        Command::Worker => {
            let store = connect(&settings).await?;
            let client = CoinbaseClient::new(&settings.exchange)?;
            tracing::info!("Ingestion worker starting for {:?}", settings.ingest.symbols);
            run_worker(client, store, settings.ingest).await?;
            tracing::info!("Ingestion worker stopped");
        }
        Command::Populate => {
            let store = connect(&settings).await?;
            let client = CoinbaseClient::new(&settings.exchange)?;
            let stats = populate_crypto_table(&client, &store, &settings.ingest, Utc::now())
                .await
                .context("Failed to populate crypto table")?;
            println!(
                "Crypto table refreshed: {} rows inserted, {} old rows deleted",
                stats.inserted, stats.deleted
            );
        }
        Command::GatherTicker => {
            let client = CoinbaseClient::new(&settings.exchange)?;
            let tickers = gather_intra_minute_data(&client, &settings.ingest.symbols).await;
            if tickers.len() < settings.ingest.symbols.len() {
                anyhow::bail!(
                    "Only {}/{} tickers fetched",
                    tickers.len(),
                    settings.ingest.symbols.len()
                );
            }
        }
        Command::GatherCandles => {
            let client = CoinbaseClient::new(&settings.exchange)?;
            let end = minute_floor(Utc::now());
            let closed = gather_minute_data(&client, &settings.ingest.symbols, end).await;
            if closed.len() < settings.ingest.symbols.len() {
                anyhow::bail!(
                    "Only {}/{} candles fetched",
                    closed.len(),
                    settings.ingest.symbols.len()
                );
            }
        }
        Command::CreateUser { email, name } => {
            let store = connect(&settings).await?;
            let user = store.create_user(NewUser::new(&email, &name)?).await?;
            println!("Created user {} (id {})", user.email, user.id);
            println!("API token: {}", user.api_token);
        }
        Command::CreateSuperuser { email, name } => {
            let store = connect(&settings).await?;
            let user = store.create_user(NewUser::superuser(&email, &name)?).await?;
            println!("Created superuser {} (id {})", user.email, user.id);
            println!("API token: {}", user.api_token);
        }
        Command::WaitForDb => {
            wait_for_db(
                &settings.database.url,
                settings.database.connect_attempts,
                Duration::from_secs(settings.database.connect_delay_secs),
            )
            .await?;
            println!("Database available!");
        }
    }

    Ok(())
}

async fn connect(settings: &Settings) -> Result<PostgresStore> {
    PostgresStore::connect(&settings.database.url, settings.database.max_connections)
        .await
        .context("Failed to connect to Postgres")
}
