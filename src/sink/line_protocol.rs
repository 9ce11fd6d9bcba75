//! InfluxDB line protocol encoding for candles
//!
//! One candle becomes one line:
//!
//! ```text
//! candles-BINANCE,symbol=BTC-USDT,interval=1m start=..,stop=..,trades=..,open=..,close=..,high=..,low=..,volume=..,receipt_timestamp=..,closed=true <time>
//! ```

use crate::error::{AppError, Result};
use crate::sources::types::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Default measurement prefix
pub const DEFAULT_KEY: &str = "candles";

/// Point timestamp precision, sent as the `precision` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Ns,
    #[default]
    Us,
    Ms,
    S,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Ns => "ns",
            Precision::Us => "us",
            Precision::Ms => "ms",
            Precision::S => "s",
        }
    }

    /// Express `dt` as an integer count of this unit since the epoch
    pub fn timestamp(&self, dt: DateTime<Utc>) -> Result<i64> {
        match self {
            Precision::Ns => dt
                .timestamp_nanos_opt()
                .ok_or_else(|| AppError::Format(format!("{} does not fit in nanoseconds", dt))),
            Precision::Us => Ok(dt.timestamp_micros()),
            Precision::Ms => Ok(dt.timestamp_millis()),
            Precision::S => Ok(dt.timestamp()),
        }
    }
}

/// Encodes candles as line protocol
#[derive(Debug, Clone)]
pub struct LineEncoder {
    key: String,
    precision: Precision,
}

impl LineEncoder {
    pub fn new(key: impl Into<String>, precision: Precision) -> Self {
        Self {
            key: key.into(),
            precision,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Encode one candle, stamped with `timestamp`
    pub fn encode(&self, candle: &Candle, timestamp: DateTime<Utc>) -> Result<String> {
        let mut line = String::with_capacity(256);

        push_escaped(&mut line, &format!("{}-{}", self.key, candle.exchange), false);
        line.push_str(",symbol=");
        push_escaped(&mut line, &candle.symbol, true);
        line.push_str(",interval=");
        push_escaped(&mut line, &candle.interval, true);

        let mut fields: Vec<(&str, f64)> = vec![
            ("start", epoch_secs(candle.start)),
            ("stop", epoch_secs(candle.stop)),
        ];
        if let Some(trades) = candle.trades {
            fields.push(("trades", trades as f64));
        }
        fields.extend([
            ("open", candle.open),
            ("close", candle.close),
            ("high", candle.high),
            ("low", candle.low),
            ("volume", candle.volume),
        ]);
        if let Some(ts) = candle.timestamp {
            fields.push(("timestamp", epoch_secs(ts)));
        }
        fields.push(("receipt_timestamp", epoch_secs(timestamp)));

        for (i, (name, value)) in fields.iter().enumerate() {
            if !value.is_finite() {
                return Err(AppError::Format(format!(
                    "{} {}: field {} is not finite",
                    candle.exchange, candle.symbol, name
                )));
            }
            line.push(if i == 0 { ' ' } else { ',' });
            // Writing into a String cannot fail
            let _ = write!(line, "{}={}", name, value);
        }
        let _ = write!(line, ",closed={}", candle.closed);

        let _ = write!(line, " {}", self.precision.timestamp(timestamp)?);
        Ok(line)
    }
}

impl Default for LineEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_KEY, Precision::default())
    }
}

fn epoch_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

/// Measurements escape commas and spaces; tag values also escape `=`
fn push_escaped(out: &mut String, value: &str, is_tag: bool) {
    for c in value.chars() {
        if c == ',' || c == ' ' || (is_tag && c == '=') {
            out.push('\\');
        }
        out.push(c);
    }
}
