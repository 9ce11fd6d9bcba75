//! Bounded FIFO work queue with drain tracking
//!
//! `outstanding` counts jobs that were enqueued and not yet marked done, so it
//! covers both queued and in-flight jobs. [`JobQueue::join`] waits for it to
//! reach zero, which means every job was *attempted*, not that it succeeded.

use crate::error::{AppError, Result};
use tokio::sync::{mpsc, watch, Mutex};

/// Default number of jobs buffered before `put` applies backpressure
pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct JobQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    outstanding: watch::Sender<usize>,
    capacity: usize,
}

impl<T> JobQueue<T> {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (outstanding, _) = watch::channel(0usize);

        Self {
            tx,
            rx: Mutex::new(rx),
            outstanding,
            capacity,
        }
    }

    /// Append a job, waiting for space when the queue is full
    ///
    /// The outstanding count is bumped only once a slot is reserved, so a
    /// cancelled `put` leaves the count untouched.
    pub async fn put(&self, job: T) -> Result<()> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| AppError::Queue("queue is closed".to_string()))?;

        self.outstanding.send_modify(|n| *n += 1);
        permit.send(job);
        Ok(())
    }

    /// Remove and return the head job, waiting while the queue is empty
    pub async fn get(&self) -> Result<T> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| AppError::Queue("queue is closed".to_string()))
    }

    /// Mark one dequeued job as processed
    ///
    /// Must be called exactly once per job returned by [`get`](Self::get).
    pub fn task_done(&self) -> Result<()> {
        let mut underflow = false;
        self.outstanding.send_if_modified(|n| {
            if *n == 0 {
                underflow = true;
                false
            } else {
                *n -= 1;
                true
            }
        });

        if underflow {
            return Err(AppError::Queue(
                "task_done() called more times than jobs were enqueued".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait until every enqueued job has been marked done
    pub async fn join(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Jobs enqueued or in flight
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Jobs waiting to be dequeued
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
