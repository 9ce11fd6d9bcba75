//! Background write worker
//!
//! A single task pulls jobs off the [`JobQueue`] in FIFO order, encodes them
//! and hands them to a [`LineWriter`]. Every dequeued job is marked done
//! whether the write succeeded or not, so `join()` on the queue means
//! "everything was attempted".
//!
//! The worker runs until told to stop through its [`WorkerHandle`]:
//! - [`WorkerHandle::stop`] drains: the loop keeps going until the outstanding
//!   count is zero, then exits.
//! - [`WorkerHandle::abort_after_current`] exits once the job in flight
//!   finishes; queued jobs are abandoned.

use crate::error::{AppError, Result};
use crate::queue::JobQueue;
use crate::sink::{LineEncoder, LineWriter, WriteJob};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Commands sent to the worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Run,
    Drain,
    Abort,
}

/// Counters reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs still outstanding when the worker exited (non-zero only on abort)
    pub abandoned: usize,
}

pub struct WriteWorker<W: LineWriter> {
    queue: Arc<JobQueue<WriteJob>>,
    encoder: LineEncoder,
    writer: W,
    stats: WorkerStats,
}

impl<W: LineWriter + 'static> WriteWorker<W> {
    pub fn new(queue: Arc<JobQueue<WriteJob>>, encoder: LineEncoder, writer: W) -> Self {
        Self {
            queue,
            encoder,
            writer,
            stats: WorkerStats::default(),
        }
    }

    /// Start the worker task
    pub fn spawn(self) -> WorkerHandle {
        let (signal_tx, signal_rx) = watch::channel(StopSignal::Run);
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);

        let task = tokio::spawn(self.run(signal_rx, state_tx));

        WorkerHandle {
            signal: signal_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut signal: watch::Receiver<StopSignal>,
        state: watch::Sender<WorkerState>,
    ) -> Result<WorkerStats> {
        state.send_replace(WorkerState::Running);
        info!("Write worker started for {}", self.writer.address());

        let mut mode = StopSignal::Run;
        let mut signal_open = true;

        loop {
            match mode {
                StopSignal::Abort => break,
                StopSignal::Drain => {
                    if *state.borrow() != WorkerState::Draining {
                        state.send_replace(WorkerState::Draining);
                        debug!("Write worker draining {} jobs", self.queue.outstanding());
                    }
                    if self.queue.outstanding() == 0 {
                        break;
                    }
                }
                StopSignal::Run => {}
            }

            // Signals win over queued jobs so an abort is seen between jobs
            tokio::select! {
                biased;
                changed = signal.changed(), if signal_open => {
                    mode = match changed {
                        Ok(()) => *signal.borrow_and_update(),
                        Err(_) => {
                            // Handle dropped: nobody can stop us any more, so drain and exit
                            signal_open = false;
                            StopSignal::Drain
                        }
                    };
                }
                job = self.queue.get() => {
                    self.process(job?).await?;
                }
            }
        }

        self.stats.abandoned = self.queue.outstanding();
        if self.stats.abandoned > 0 {
            warn!(
                "Write worker stopped with {} jobs not written",
                self.stats.abandoned
            );
        }

        self.writer.close().await;
        state.send_replace(WorkerState::Stopped);
        info!(
            "Write worker stopped: {} attempted, {} succeeded, {} failed",
            self.stats.attempted, self.stats.succeeded, self.stats.failed
        );

        Ok(self.stats)
    }

    /// Write one job and mark it done, whatever the outcome
    async fn process(&mut self, job: WriteJob) -> Result<()> {
        self.stats.attempted += 1;

        let outcome = match self.encoder.encode(&job.candle, job.timestamp) {
            Ok(line) => self.writer.write(line).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => self.stats.succeeded += 1,
            Err(e) => {
                self.stats.failed += 1;
                // Write errors are already logged by the writer
                if !e.is_write_error() {
                    error!(
                        "Dropping {} {} candle at {}: {}",
                        job.candle.exchange, job.candle.symbol, job.candle.start, e
                    );
                }
            }
        }

        self.queue.task_done()
    }
}

/// Control handle for a spawned [`WriteWorker`]
pub struct WorkerHandle {
    signal: watch::Sender<StopSignal>,
    state: watch::Receiver<WorkerState>,
    task: JoinHandle<Result<WorkerStats>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Ask the worker to finish every outstanding job and exit
    pub fn stop(&self) {
        self.signal.send_replace(StopSignal::Drain);
    }

    /// Ask the worker to exit after the job in flight, abandoning the rest
    pub fn abort_after_current(&self) {
        self.signal.send_replace(StopSignal::Abort);
    }

    /// Wait for the worker task to exit
    pub async fn wait(self) -> Result<WorkerStats> {
        self.task
            .await
            .map_err(|e| AppError::Internal(format!("write worker task failed: {}", e)))?
    }
}
