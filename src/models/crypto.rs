use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Historical OHLCV bar for one trading pair, as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crypto {
    pub id: i64,
    pub date_and_time: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub symbol: String,
}

/// Bar waiting to be inserted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCrypto {
    pub date_and_time: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub symbol: String,
}

impl NewCrypto {
    pub fn into_row(self, id: i64) -> Crypto {
        Crypto {
            id,
            date_and_time: self.date_and_time,
            low: self.low,
            high: self.high,
            open: self.open,
            close: self.close,
            volume: self.volume,
            symbol: self.symbol,
        }
    }
}
