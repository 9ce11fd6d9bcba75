//! Binance klines source (spot and USD-M futures)

use super::types::{exchange_symbol, Candle, HistoricalQuery};
use super::{CandleBatches, Source, SourceOptions};
use crate::error::{AppError, Result};
use crate::normalize::parse_iso8601;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const SPOT_URL: &str = "https://api.binance.com";
const FUTURES_URL: &str = "https://fapi.binance.com";

/// Max klines returned per request
const PAGE_LIMIT: usize = 1000;

const INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Market {
    Spot,
    Futures,
}

impl Market {
    fn id(self) -> &'static str {
        match self {
            Market::Spot => "BINANCE",
            Market::Futures => "BINANCE_FUTURES",
        }
    }

    fn default_url(self) -> &'static str {
        match self {
            Market::Spot => SPOT_URL,
            Market::Futures => FUTURES_URL,
        }
    }

    fn klines_path(self) -> &'static str {
        match self {
            Market::Spot => "/api/v3/klines",
            Market::Futures => "/fapi/v1/klines",
        }
    }
}

/// Binance REST klines source
pub struct BinanceSource {
    client: Client,
    base_url: String,
    market: Market,
}

/// Registry constructor for the spot market
pub fn spot_source(opts: &SourceOptions) -> Result<Arc<dyn Source>> {
    Ok(Arc::new(BinanceSource::spot(opts)?))
}

/// Registry constructor for USD-M futures
pub fn futures_source(opts: &SourceOptions) -> Result<Arc<dyn Source>> {
    Ok(Arc::new(BinanceSource::futures(opts)?))
}

impl BinanceSource {
    pub fn spot(opts: &SourceOptions) -> Result<Self> {
        Self::new(Market::Spot, opts)
    }

    pub fn futures(opts: &SourceOptions) -> Result<Self> {
        Self::new(Market::Futures, opts)
    }

    fn new(market: Market, opts: &SourceOptions) -> Result<Self> {
        let client = Client::builder().timeout(opts.timeout).build()?;
        let base_url = opts
            .base_url
            .as_deref()
            .unwrap_or(market.default_url())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            market,
        })
    }

    /// Request one page of klines starting at `start_ms`
    async fn fetch_page(
        &self,
        query: &HistoricalQuery,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}{}", self.base_url, self.market.klines_path());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", exchange_symbol(&query.symbol)),
                ("interval", query.interval.clone()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Source(format!(
                "{} klines for {} failed: {} - {}",
                self.market.id(),
                query.symbol,
                status.as_u16(),
                body
            )));
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        let now = Utc::now();

        rows.iter()
            .map(|row| self.parse_kline(query, row, now))
            .collect()
    }

    /// Fetch the page at `cursor` and compute where the next one starts
    async fn next_page(
        &self,
        query: &HistoricalQuery,
        cursor: Option<i64>,
        end_ms: i64,
    ) -> Result<Option<(Vec<Candle>, Option<i64>)>> {
        let Some(start_ms) = cursor else {
            return Ok(None);
        };
        if start_ms > end_ms {
            return Ok(None);
        }

        let batch = self.fetch_page(query, start_ms, end_ms).await?;
        let Some(last) = batch.last() else {
            return Ok(None);
        };

        // A short page means the window is exhausted
        let next = if batch.len() < PAGE_LIMIT {
            None
        } else {
            Some(last.stop.timestamp_millis() + 1)
        };

        debug!(
            "{} {}: page of {} candles from {}",
            self.market.id(),
            query.symbol,
            batch.len(),
            start_ms
        );
        Ok(Some((batch, next)))
    }

    /// Kline layout: [open_time, open, high, low, close, volume, close_time,
    /// quote_volume, trades, taker_base, taker_quote, ignore]
    fn parse_kline(
        &self,
        query: &HistoricalQuery,
        row: &[Value],
        now: DateTime<Utc>,
    ) -> Result<Candle> {
        let start = millis_to_utc(int_at(row, 0)?)?;
        let stop = millis_to_utc(int_at(row, 6)?)?;

        Ok(Candle {
            exchange: self.market.id().to_string(),
            symbol: query.symbol.clone(),
            start,
            stop,
            interval: query.interval.clone(),
            trades: row.get(8).and_then(Value::as_u64),
            open: num_at(row, 1)?,
            close: num_at(row, 4)?,
            high: num_at(row, 2)?,
            low: num_at(row, 3)?,
            volume: num_at(row, 5)?,
            closed: stop <= now,
            timestamp: Some(stop),
        })
    }
}

impl Source for BinanceSource {
    fn id(&self) -> &'static str {
        self.market.id()
    }

    fn intervals(&self) -> &'static [&'static str] {
        INTERVALS
    }

    fn fetch_historical(&self, query: HistoricalQuery) -> CandleBatches<'_> {
        let window = parse_iso8601(&query.start)
            .and_then(|start| Ok((start, parse_iso8601(&query.end)?)));
        let (start, end) = match window {
            Ok(w) => w,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let end_ms = end.timestamp_millis();

        stream::try_unfold(Some(start.timestamp_millis()), move |cursor| {
            let query = query.clone();
            async move { self.next_page(&query, cursor, end_ms).await }
        })
        .boxed()
    }
}

fn int_at(row: &[Value], idx: usize) -> Result<i64> {
    row.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Source(format!("kline field {} is not an integer", idx)))
}

/// Binance sends prices and volumes as decimal strings
fn num_at(row: &[Value], idx: usize) -> Result<f64> {
    let value = row.get(idx);
    value
        .and_then(|v| match v {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .ok_or_else(|| AppError::Source(format!("kline field {} is not a number", idx)))
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Source(format!("kline time out of range: {}", ms)))
}
