//! C3 — WorkerPool: executes batch invocations with a bounded number in flight.

use crate::cancellation::CancellationSignal;
use crate::types::{Batch, BatchFailure, BatchOutcome};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

/// Executes at most `max_concurrent` batches concurrently, streaming
/// [`BatchOutcome`]s back to the caller as they complete (not necessarily in
/// batch-index order — callers reassemble order using `BatchOutcome::index`).
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool that runs at most `max_concurrent` batches at once.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Concurrency bound this pool enforces.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of batches currently executing (for tests asserting P4).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn one task per batch from `batches`, running `process` for each,
    /// bounded by the pool's semaphore. Returns the receiving end of a
    /// channel of outcomes; the sender is dropped once every spawned task
    /// finishes, so the receiver naturally ends when drained.
    ///
    /// `on_dispatch_started` is called with a batch's index right after a
    /// permit for it is acquired (i.e. dispatch has genuinely started, not
    /// merely been considered), so callers can advance `currentBatch`-style
    /// bookkeeping per I5 without waiting for the batch to finish.
    ///
    /// Dispatch stops handing out new batches once `cancel` is raised;
    /// batches already dispatched are allowed to race to completion.
    pub fn submit<T, R, F, Fut>(
        &self,
        batches: Vec<Batch<T>>,
        cancel: CancellationSignal,
        on_dispatch_started: impl Fn(u32) + Send + Sync + 'static,
        process: F,
    ) -> mpsc::Receiver<BatchOutcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(Batch<T>, CancellationSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, BatchFailure>> + Send,
    {
        let (tx, rx) = mpsc::channel(self.max_concurrent.saturating_mul(2).max(2));
        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        let process = Arc::new(process);

        tokio::spawn(async move {
            for batch in batches {
                if cancel.is_cancelled() {
                    debug!("dispatch stopped before batch {}: cancelled", batch.index);
                    break;
                }

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                if cancel.is_cancelled() {
                    drop(permit);
                    break;
                }

                on_dispatch_started(batch.index);

                let tx = tx.clone();
                let process = Arc::clone(&process);
                let cancel = cancel.clone();
                let in_flight = Arc::clone(&in_flight);
                let index = batch.index;
                let len = batch.len() as u32;

                in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let _permit = permit;
                    let start = Instant::now();
                    let outcome = process(batch, cancel).await;
                    let duration_millis = start.elapsed().as_millis() as u32;
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    let _ = tx
                        .send(BatchOutcome {
                            index,
                            outcome,
                            duration_millis,
                        })
                        .await;
                    let _ = len;
                });
            }
        });

        rx
    }
}
