//! Common source types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub exchange: String,     // source identifier, e.g. BINANCE
    pub symbol: String,       // normalized BASE-QUOTE
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub interval: String,
    pub trades: Option<u64>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub closed: bool,
    /// Exchange-provided event time, if any
    pub timestamp: Option<DateTime<Utc>>,
}

impl Candle {
    /// Time to associate with the candle when writing it
    pub fn write_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(self.start)
    }
}

/// Window of a historical query, already normalized to `YYYY-MM-DD HH:MM:SS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalQuery {
    pub symbol: String,
    pub start: String,
    pub end: String,
    pub interval: String,
}

/// Convert a `BASE-QUOTE` symbol to the concatenated exchange form
pub fn exchange_symbol(symbol: &str) -> String {
    symbol.replace(['-', '/'], "").to_uppercase()
}
