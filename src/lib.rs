// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod server;

// Re-export commonly used types
pub use api::CoinbaseClient;
pub use config::Settings;
pub use db::{MemoryStore, PostgresStore, Store};
pub use error::Error;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
