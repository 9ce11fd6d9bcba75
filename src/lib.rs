//! Historify Ingest - historical candle collector
//!
//! Pulls historical candles from an exchange REST API and writes them to an
//! InfluxDB v2 bucket through a bounded queue and a single write worker.

pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod queue;
pub mod shutdown;
pub mod sink;
pub mod sources;
pub mod worker;

#[cfg(test)]
mod test_support;

use config::PipelineConfig;
use error::Result;
use pipeline::{Pipeline, PipelineReport};
use queue::JobQueue;
use sink::{HttpWriteClient, LineEncoder};
use sources::SourceRegistry;
use std::future::Future;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "historify_ingest=info,historify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Validate `config`, then run the pipeline until done or interrupted
pub async fn run_from_config<F>(config: &PipelineConfig, interrupt: F) -> Result<PipelineReport>
where
    F: Future<Output = ()>,
{
    let registry = SourceRegistry::new();
    let plan = config.resolve(&registry)?;

    tracing::info!(
        "Collecting {} {} candles for {} symbols from {} to {}",
        plan.source.id(),
        plan.interval,
        plan.symbols.len(),
        plan.start,
        plan.end
    );

    let writer = HttpWriteClient::new(plan.write.clone())?;
    let encoder = LineEncoder::new(plan.key.clone(), plan.write.precision);
    let queue = Arc::new(JobQueue::new(plan.capacity));

    Pipeline::from_plan(&plan)
        .run_until(queue, encoder, writer, interrupt)
        .await
}
