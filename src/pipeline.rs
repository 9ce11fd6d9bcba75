//! Pipeline driver
//!
//! Fetches every configured symbol in turn, enqueues one write job per
//! candle as each batch arrives, then hands over to the shutdown
//! coordinator. The write worker runs alongside, so writing starts while
//! later batches are still being fetched.

use crate::config::IngestPlan;
use crate::error::Result;
use crate::normalize::{normalize, TimeBoundary};
use crate::queue::JobQueue;
use crate::shutdown;
use crate::sink::{LineEncoder, LineWriter, WriteJob};
use crate::sources::types::HistoricalQuery;
use crate::sources::{FetchMethod, Source};
use crate::worker::{WorkerStats, WriteWorker};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Symbols whose fetch was started
    pub symbols: usize,
    pub batches: usize,
    /// Write jobs enqueued
    pub records: usize,
    /// Symbols whose fetch stopped on a source error
    pub failed_symbols: Vec<String>,
    pub worker: WorkerStats,
    /// The run was cut short; `worker.abandoned` jobs were never written
    pub interrupted: bool,
}

pub struct Pipeline {
    source: Arc<dyn Source>,
    method: FetchMethod,
    symbols: Vec<String>,
    start: TimeBoundary,
    end: TimeBoundary,
    interval: String,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn Source>,
        symbols: Vec<String>,
        start: impl Into<TimeBoundary>,
        end: impl Into<TimeBoundary>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            source,
            method: FetchMethod::Candles,
            symbols,
            start: start.into(),
            end: end.into(),
            interval: interval.into(),
        }
    }

    pub fn from_plan(plan: &IngestPlan) -> Self {
        Self::new(
            plan.source.clone(),
            plan.symbols.clone(),
            plan.start.as_str(),
            plan.end.as_str(),
            plan.interval.as_str(),
        )
        .with_method(plan.method)
    }

    pub fn with_method(mut self, method: FetchMethod) -> Self {
        self.method = method;
        self
    }

    /// Run to completion
    pub async fn run<W>(
        &self,
        queue: Arc<JobQueue<WriteJob>>,
        encoder: LineEncoder,
        writer: W,
    ) -> Result<PipelineReport>
    where
        W: LineWriter + 'static,
    {
        self.run_until(queue, encoder, writer, std::future::pending())
            .await
    }

    /// Run until done or until `interrupt` resolves
    ///
    /// On interrupt the worker finishes the write in flight and exits; the
    /// report counts the queued jobs that were dropped.
    pub async fn run_until<W, F>(
        &self,
        queue: Arc<JobQueue<WriteJob>>,
        encoder: LineEncoder,
        writer: W,
        interrupt: F,
    ) -> Result<PipelineReport>
    where
        W: LineWriter + 'static,
        F: Future<Output = ()>,
    {
        // Bad boundaries fail here, before the worker or any request exists
        let start = normalize(&self.start)?;
        let end = normalize(&self.end)?;

        let worker = WriteWorker::new(queue.clone(), encoder, writer).spawn();
        let mut report = PipelineReport::default();

        tokio::pin!(interrupt);

        let fed = {
            let feed = self.feed(&queue, &start, &end, &mut report);
            tokio::pin!(feed);
            tokio::select! {
                biased;
                _ = &mut interrupt => None,
                result = &mut feed => Some(result),
            }
        };

        let interrupted = match fed {
            None => true,
            Some(Err(e)) => {
                error!("Enqueue failed, stopping write worker: {}", e);
                shutdown::abort(worker).await?;
                return Err(e);
            }
            Some(Ok(())) => {
                tokio::select! {
                    biased;
                    _ = &mut interrupt => true,
                    _ = queue.join() => false,
                }
            }
        };

        report.interrupted = interrupted;
        report.worker = if interrupted {
            warn!("Interrupted, stopping after the current write");
            shutdown::abort(worker).await?
        } else {
            shutdown::drain_and_stop(&queue, worker).await?
        };

        info!(
            "{} symbols, {} batches, {} candles enqueued; {} written, {} failed",
            report.symbols,
            report.batches,
            report.records,
            report.worker.succeeded,
            report.worker.failed
        );
        Ok(report)
    }

    /// Fetch every symbol and enqueue its candles
    async fn feed(
        &self,
        queue: &JobQueue<WriteJob>,
        start: &str,
        end: &str,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let exchange = self.source.id();

        for symbol in &self.symbols {
            report.symbols += 1;
            let query = HistoricalQuery {
                symbol: symbol.clone(),
                start: start.to_string(),
                end: end.to_string(),
                interval: self.interval.clone(),
            };
            let mut batches = self.source.fetch(self.method, query);

            while let Some(batch) = batches.next().await {
                let batch = match batch {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!("Fetching {} {} failed: {}", exchange, symbol, e);
                        report.failed_symbols.push(symbol.clone());
                        break;
                    }
                };

                info!(exchange, symbol = %symbol, candles = batch.len(), "batch fetched");
                report.batches += 1;

                for candle in batch {
                    queue.put(WriteJob::new(candle)).await?;
                    report.records += 1;
                }
            }
        }

        Ok(())
    }
}
