//! Collector configuration
//!
//! Loaded from a TOML file with `[exchange]`, `[candles]`, `[callback]` and
//! `[queue]` tables. Write endpoint settings fall back to the
//! `INFLUXDB_V2_*` environment variables when the file leaves them unset.

use crate::error::{AppError, Result};
use crate::normalize::{normalize, TimeBoundary};
use crate::queue::DEFAULT_CAPACITY;
use crate::sink::line_protocol::DEFAULT_KEY;
use crate::sink::{Precision, WriteClientConfig};
use crate::sources::{FetchMethod, Source, SourceOptions, SourceRegistry};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_URL: &str = "INFLUXDB_V2_URL";
pub const ENV_ORG: &str = "INFLUXDB_V2_ORG";
pub const ENV_BUCKET: &str = "INFLUXDB_V2_BUCKET";
pub const ENV_TOKEN: &str = "INFLUXDB_V2_TOKEN";

const DEFAULT_ADDR: &str = "https://localhost:8086";
const DEFAULT_ORG: &str = "cryptofeed";
const DEFAULT_BUCKET: &str = "cryptofeed";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw config file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub exchange: ExchangeConfig,
    pub candles: CandlesConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Source registry name, e.g. "Binance"
    pub class: String,
    pub symbols: Vec<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandlesConfig {
    #[serde(default = "default_method")]
    pub method: String,
    /// ISO-8601 string, TOML datetime or epoch seconds
    pub start: toml::Value,
    /// Same forms as `start`; defaults to now
    pub end: Option<toml::Value>,
    #[serde(default = "default_interval")]
    pub interval: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackConfig {
    pub addr: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub precision: Precision,
    /// Measurement prefix
    pub key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

fn default_method() -> String {
    FetchMethod::Candles.name().to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Everything a run needs, validated
pub struct IngestPlan {
    pub source: Arc<dyn Source>,
    pub method: FetchMethod,
    pub symbols: Vec<String>,
    /// Normalized `YYYY-MM-DD HH:MM:SS`
    pub start: String,
    pub end: String,
    pub interval: String,
    pub write: WriteClientConfig,
    pub key: String,
    pub capacity: usize,
}

impl PipelineConfig {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validate against `registry`, using the process environment for defaults
    pub fn resolve(&self, registry: &SourceRegistry) -> Result<IngestPlan> {
        self.resolve_with_env(registry, |key| std::env::var(key).ok())
    }

    /// Validate against `registry`, reading defaults through `env`
    pub fn resolve_with_env<F>(&self, registry: &SourceRegistry, env: F) -> Result<IngestPlan>
    where
        F: Fn(&str) -> Option<String>,
    {
        let method = FetchMethod::from_name(&self.candles.method)?;

        if self.exchange.symbols.is_empty() {
            return Err(AppError::Config("exchange.symbols is empty".to_string()));
        }
        if self.queue.capacity == 0 {
            return Err(AppError::Config("queue.capacity must be positive".to_string()));
        }

        // Boundaries first: a bad window fails before anything touches the network
        let start = to_boundary(&self.candles.start)?;
        let end = match &self.candles.end {
            Some(value) => to_boundary(value)?,
            None => TimeBoundary::Timestamp(Utc::now()),
        };
        if start.to_utc()? > end.to_utc()? {
            return Err(AppError::Config(format!(
                "candles.start ({}) is after candles.end ({})",
                normalize(&start)?,
                normalize(&end)?
            )));
        }

        let source_options = SourceOptions {
            base_url: self.exchange.base_url.clone(),
            timeout: Duration::from_secs(self.exchange.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };
        let source = registry.create(&self.exchange.class, &source_options)?;

        if !source.intervals().contains(&self.candles.interval.as_str()) {
            return Err(AppError::Config(format!(
                "{} does not support interval '{}' (supported: {})",
                self.exchange.class,
                self.candles.interval,
                source.intervals().join(", ")
            )));
        }

        let cb = &self.callback;
        let write = WriteClientConfig {
            addr: setting(&cb.addr, &env, ENV_URL, DEFAULT_ADDR),
            org: setting(&cb.org, &env, ENV_ORG, DEFAULT_ORG),
            bucket: setting(&cb.bucket, &env, ENV_BUCKET, DEFAULT_BUCKET),
            token: cb.token.clone().or_else(|| env(ENV_TOKEN)),
            precision: cb.precision,
            skip_tls_verify: cb.skip_tls_verify,
            timeout: Duration::from_secs(cb.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };

        Ok(IngestPlan {
            source,
            method,
            symbols: self.exchange.symbols.clone(),
            start: normalize(&start)?,
            end: normalize(&end)?,
            interval: self.candles.interval.clone(),
            write,
            key: cb.key.clone().unwrap_or_else(|| DEFAULT_KEY.to_string()),
            capacity: self.queue.capacity,
        })
    }
}

/// File value, then environment, then built-in default
fn setting<F>(value: &Option<String>, env: &F, var: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    value
        .clone()
        .or_else(|| env(var))
        .unwrap_or_else(|| default.to_string())
}

fn to_boundary(value: &toml::Value) -> Result<TimeBoundary> {
    match value {
        toml::Value::String(s) => Ok(TimeBoundary::Text(s.clone())),
        toml::Value::Datetime(dt) => Ok(TimeBoundary::Text(dt.to_string())),
        toml::Value::Integer(secs) => TimeBoundary::from_epoch_secs(*secs),
        other => Err(AppError::Format(format!(
            "expected a datetime, got {}",
            other.type_str()
        ))),
    }
}
