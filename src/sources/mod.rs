//! Historical data sources

pub mod types;
pub mod binance;

use crate::error::{AppError, Result};
use futures_util::stream::BoxStream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use types::*;

/// Lazy, finite sequence of candle batches for one historical query
pub type CandleBatches<'a> = BoxStream<'a, Result<Vec<Candle>>>;

/// Trait that all historical sources must implement
pub trait Source: Send + Sync {
    /// Exchange ID written with each candle (e.g., "BINANCE")
    fn id(&self) -> &'static str;

    /// Supported candle intervals
    fn intervals(&self) -> &'static [&'static str];

    /// Fetch candles for `query`, one page per batch
    ///
    /// Each call starts a fresh sequence; nothing is requested until the
    /// stream is polled.
    fn fetch_historical(&self, query: HistoricalQuery) -> CandleBatches<'_>;

    /// Dispatch a config-named fetch method
    fn fetch(&self, method: FetchMethod, query: HistoricalQuery) -> CandleBatches<'_> {
        match method {
            FetchMethod::Candles => self.fetch_historical(query),
        }
    }
}

/// Fetch methods that can be named in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Candles,
}

impl FetchMethod {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "candles" => Ok(FetchMethod::Candles),
            other => Err(AppError::Config(format!("Unknown fetch method: {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FetchMethod::Candles => "candles",
        }
    }
}

/// Options passed to a source constructor
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Override of the exchange REST base URL
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub type SourceConstructor = fn(&SourceOptions) -> Result<Arc<dyn Source>>;

/// Source registry keyed by config class name
pub struct SourceRegistry {
    constructors: BTreeMap<String, SourceConstructor>,
}

impl SourceRegistry {
    /// Create new registry with all built-in sources
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register("Binance", binance::spot_source);
        registry.register("BinanceFutures", binance::futures_source);

        registry
    }

    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, class: &str, constructor: SourceConstructor) {
        self.constructors.insert(class.to_string(), constructor);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    /// Construct the source registered under `class`
    pub fn create(&self, class: &str, opts: &SourceOptions) -> Result<Arc<dyn Source>> {
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| AppError::UnknownSource(class.to_string()))?;
        constructor(opts)
    }

    /// Registered class names, sorted
    pub fn list(&self) -> Vec<&str> {
        self.constructors.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
