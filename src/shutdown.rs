//! Shutdown coordination for the write worker
//!
//! Order matters: wait for the queue to drain, then stop the worker. Stopping
//! first would race the worker against jobs still sitting in the queue.

use crate::error::Result;
use crate::queue::JobQueue;
use crate::sink::WriteJob;
use crate::worker::{WorkerHandle, WorkerStats};
use tracing::{info, warn};

/// Wait until every enqueued job was attempted, then stop the worker
pub async fn drain_and_stop(
    queue: &JobQueue<WriteJob>,
    worker: WorkerHandle,
) -> Result<WorkerStats> {
    let pending = queue.outstanding();
    if pending > 0 {
        info!("Waiting for {} pending writes", pending);
    }

    queue.join().await;
    worker.stop();
    worker.wait().await
}

/// Stop the worker after its current job without draining
///
/// Jobs still queued are lost; the returned stats say how many.
pub async fn abort(worker: WorkerHandle) -> Result<WorkerStats> {
    worker.abort_after_current();
    let stats = worker.wait().await?;
    if stats.abandoned > 0 {
        warn!(
            "Shutdown interrupted: {} queued candles were not written",
            stats.abandoned
        );
    }
    Ok(stats)
}
