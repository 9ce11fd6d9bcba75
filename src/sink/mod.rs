//! Sink side of the pipeline: write jobs, encoding and the write client

pub mod client;
pub mod line_protocol;

use crate::error::Result;
use crate::sources::types::Candle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use client::{HttpWriteClient, WriteClientConfig};
pub use line_protocol::{LineEncoder, Precision};

/// One queued write: a candle and the time to stamp it with
#[derive(Debug, Clone, PartialEq)]
pub struct WriteJob {
    pub candle: Candle,
    pub timestamp: DateTime<Utc>,
}

impl WriteJob {
    pub fn new(candle: Candle) -> Self {
        let timestamp = candle.write_timestamp();
        Self { candle, timestamp }
    }
}

/// Destination for encoded lines
///
/// Implementations own their connection state; `close` releases it and a
/// later `write` may open it again.
#[async_trait]
pub trait LineWriter: Send {
    /// Where writes go, for logging
    fn address(&self) -> &str;

    /// Write one payload; an error means the payload was not stored
    async fn write(&mut self, body: String) -> Result<()>;

    /// Release the underlying session
    async fn close(&mut self);
}
