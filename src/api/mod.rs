pub mod coinbase;

pub use coinbase::{Candle, CoinbaseClient, Ticker};
