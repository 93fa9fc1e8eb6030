//! C4 — BatchOperationManager: the full orchestration loop.

use crate::cancellation::{CancelCause, CancellationSignal};
use crate::error::{BatchCoreError, Result};
use crate::memory_advisor::MemoryAdvisor;
use crate::processor::Processor;
use crate::progress::ProgressTracker;
use crate::types::{
    Batch, BatchError, BatchErrorCause, BatchFailure, OperationOptions, OperationResult, Status,
};
use crate::worker_pool::WorkerPool;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};

/// Orchestrates partitioning, dispatch, progress, cancellation, and
/// aggregation for one [`BatchOperationManager::execute`] call.
pub struct BatchOperationManager {
    memory_advisor: Option<Arc<dyn MemoryAdvisor>>,
}

impl BatchOperationManager {
    /// Create a manager with adaptive sizing disabled (no advisor).
    pub fn new() -> Self {
        Self { memory_advisor: None }
    }

    /// Create a manager that consults `advisor` between batches when
    /// `OperationOptions::adaptive_batch_size` is set.
    pub fn with_memory_advisor(advisor: Arc<dyn MemoryAdvisor>) -> Self {
        Self {
            memory_advisor: Some(advisor),
        }
    }

    /// Run `processor` over `items` under `options`, returning the
    /// aggregated result once every dispatched batch has settled.
    ///
    /// There is no way to cancel this call from outside once it has started;
    /// use [`BatchOperationManager::execute_with_cancellation`] if the caller
    /// needs to raise external cancellation while the operation is in flight.
    pub async fn execute<T, R, P>(
        &self,
        items: Vec<T>,
        processor: P,
        options: OperationOptions,
    ) -> Result<OperationResult<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        P: Processor<T, R> + 'static,
    {
        self.execute_with_cancellation(items, processor, options, CancellationSignal::new())
            .await
    }

    /// Run `processor` over `items` under `options`, sharing cancellation
    /// with `cancel`. The caller keeps a clone of `cancel` and may call
    /// `cancel.cancel(CancelCause::External)` from another task at any point
    /// while this future is being polled; dispatch of not-yet-started
    /// batches stops and the operation's final status becomes `Cancelled`
    /// (unless timeout or fail-fast already won the race — see
    /// [`CancellationSignal`]'s first-cause-wins semantics).
    pub async fn execute_with_cancellation<T, R, P>(
        &self,
        items: Vec<T>,
        processor: P,
        options: OperationOptions,
        cancel: CancellationSignal,
    ) -> Result<OperationResult<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        P: Processor<T, R> + 'static,
    {
        options.validate()?;

        let operation_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("batch_operation", operation_id = %operation_id);
        self.execute_inner(items, processor, options, operation_id, cancel)
            .instrument(span)
            .await
    }

    async fn execute_inner<T, R, P>(
        &self,
        items: Vec<T>,
        processor: P,
        options: OperationOptions,
        operation_id: String,
        cancel: CancellationSignal,
    ) -> Result<OperationResult<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        P: Processor<T, R> + 'static,
    {
        let total_items = items.len() as u64;
        let total_batches_estimate = div_ceil(total_items, options.batch_size as u64) as u32;
        let effective_concurrency = options
            .max_concurrent_batches
            .min(total_batches_estimate.max(1) as usize)
            .max(1);

        let tracker = Arc::new(ProgressTracker::new(
            operation_id.clone(),
            effective_concurrency as u32,
        ));

        if total_items == 0 {
            tracker.initialize(0, 0);
            tracker.record_status(Status::Completed);
            let snapshot = tracker.snapshot();
            self.maybe_emit_snapshot(&options, &snapshot);
            return Ok(OperationResult {
                operation_id,
                total: 0,
                successful: 0,
                failed: 0,
                errors: Vec::new(),
                merged_results: Vec::new(),
                final_progress: snapshot,
            });
        }

        tracker.initialize(total_items, total_batches_estimate);
        self.maybe_emit(&options, &tracker);

        let timeout_task = options.timeout.map(|duration| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                debug!("operation timeout elapsed after {:?}", duration);
                cancel.cancel(CancelCause::Timeout);
            })
        });

        let (batches, first_item_index) = self.partition(items, &options);
        let batch_lengths: Vec<u32> = batches.iter().map(|b| b.len() as u32).collect();

        let pool = WorkerPool::new(effective_concurrency);
        let processor = Arc::new(processor);
        let process_batch = move |batch: Batch<T>, cancel: CancellationSignal| {
            let processor = Arc::clone(&processor);
            async move {
                let expected = batch.len();
                let result = processor
                    .process_batch(&batch.items, batch.index, &cancel)
                    .await;
                match result {
                    Ok(results) if results.len() == expected => Ok(results),
                    Ok(results) => Err(BatchFailure::ContractViolation {
                        expected,
                        actual: Some(results.len()),
                    }),
                    Err(e) => Err(BatchFailure::Processor(e)),
                }
            }
        };

        let batch_count = batches.len();
        let mut results_by_batch: Vec<Option<Vec<R>>> = (0..batch_count).map(|_| None).collect();
        let mut errors = Vec::new();

        let tracker_for_dispatch = Arc::clone(&tracker);
        let mut rx = pool.submit(
            batches,
            cancel.clone(),
            move |idx| tracker_for_dispatch.record_dispatch_started(idx),
            process_batch,
        );
        while let Some(outcome) = rx.recv().await {
            let idx = outcome.index as usize;
            match outcome.outcome {
                Ok(results) => {
                    let count = results.len() as u64;
                    tracker.record_batch_completed(outcome.index, count, 0, outcome.duration_millis);
                    results_by_batch[idx] = Some(results);
                }
                Err(failure) => {
                    let item_count = batch_lengths[idx];
                    tracker.record_batch_completed(
                        outcome.index,
                        0,
                        item_count as u64,
                        outcome.duration_millis,
                    );
                    warn!(batch_index = outcome.index, %failure, "batch failed");
                    let message = failure.to_string();
                    errors.push(BatchError {
                        batch_index: outcome.index,
                        first_item_index: first_item_index[idx],
                        item_count,
                        message,
                        cause: BatchErrorCause::from(&failure),
                    });
                    if options.fail_fast {
                        cancel.cancel(CancelCause::FailFast);
                    }
                }
            }
            self.maybe_emit(&options, &tracker);
        }

        if let Some(handle) = timeout_task {
            handle.abort();
        }

        let snapshot_before_final = tracker.snapshot();
        let final_status = match cancel.cause() {
            Some(CancelCause::Timeout) => Status::TimedOut,
            Some(CancelCause::External) => Status::Cancelled,
            Some(CancelCause::FailFast) => Status::Failed,
            None if !errors.is_empty() => {
                if snapshot_before_final.failed == total_items {
                    Status::Failed
                } else {
                    Status::Completed
                }
            }
            None => Status::Completed,
        };
        tracker.record_status(final_status);
        let final_progress = tracker.snapshot();
        self.maybe_emit_snapshot(&options, &final_progress);

        if final_status == Status::Failed && errors.is_empty() {
            error!("operation marked failed with no recorded batch errors");
        }

        let merged_results: Vec<R> = results_by_batch.into_iter().flatten().flatten().collect();

        Ok(OperationResult {
            operation_id,
            total: total_items,
            successful: final_progress.successful,
            failed: final_progress.failed,
            errors,
            merged_results,
            final_progress,
        })
    }

    /// Partition `items` into batches, consulting the memory advisor (when
    /// configured and enabled) before carving each successive batch.
    /// Returns the batches alongside each batch's first-item index in the
    /// original sequence.
    fn partition<T>(&self, items: Vec<T>, options: &OperationOptions) -> (Vec<Batch<T>>, Vec<u64>) {
        let mut iter = items.into_iter();
        let mut current_size = options.batch_size;
        let mut batches = Vec::new();
        let mut first_item_indices = Vec::new();
        let mut index = 0u32;
        let mut offset = 0u64;

        loop {
            if options.adaptive_batch_size {
                if let Some(advisor) = &self.memory_advisor {
                    let pressure = advisor.current_pressure_or_low();
                    current_size = advisor.recommend(current_size, options.batch_size, pressure);
                }
            }

            let chunk: Vec<T> = iter.by_ref().take(current_size.max(1)).collect();
            if chunk.is_empty() {
                break;
            }

            let len = chunk.len() as u64;
            first_item_indices.push(offset);
            batches.push(Batch {
                index,
                items: chunk,
                attempt_count: 1,
            });

            offset += len;
            index += 1;
        }

        (batches, first_item_indices)
    }

    /// Emit a snapshot built from `tracker`'s current state, but only when
    /// monitoring is enabled — per I6, `tracker.snapshot()` itself must not
    /// run (locks, atomic reads) when monitoring is off.
    fn maybe_emit(&self, options: &OperationOptions, tracker: &ProgressTracker) {
        if !options.enable_progress_monitoring {
            return;
        }
        self.emit_snapshot(options, tracker.snapshot());
    }

    /// Emit `snapshot` when monitoring is enabled. Use this variant when the
    /// snapshot was already built for another purpose (e.g. it also becomes
    /// part of the returned `OperationResult`), so no extra snapshot work is
    /// introduced by the emit itself.
    fn maybe_emit_snapshot(&self, options: &OperationOptions, snapshot: &crate::types::ProgressSnapshot) {
        if !options.enable_progress_monitoring {
            return;
        }
        self.emit_snapshot(options, snapshot.clone());
    }

    fn emit_snapshot(&self, options: &OperationOptions, snapshot: crate::types::ProgressSnapshot) {
        if let Some(sink) = &options.on_progress {
            let sink = Arc::clone(sink);
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(snapshot)));
            if result.is_err() {
                error!("progress callback panicked; ignoring");
            }
        }
    }
}

impl Default for BatchOperationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        0
    } else {
        (numerator + denominator - 1) / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_advisor::{Pressure, ScriptedMemoryAdvisor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn double(items: &[i32], _idx: u32, _cancel: &CancellationSignal) -> anyhow::Result<Vec<i32>> {
        Ok(items.iter().map(|x| x + 1).collect())
    }

    #[tokio::test]
    async fn scenario_s1_happy_path() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..1000).collect();
        let snapshots = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let snapshots_clone = Arc::clone(&snapshots);

        let options = OperationOptions::builder()
            .batch_size(100)
            .max_concurrent_batches(4)
            .on_progress(move |snap| snapshots_clone.lock().push(snap))
            .build()
            .unwrap();

        let result = manager.execute(items, double, options).await.unwrap();

        assert_eq!(result.successful, 1000);
        assert_eq!(result.failed, 0);
        assert_eq!(result.merged_results, (1..=1000).collect::<Vec<_>>());
        assert_eq!(result.final_progress.status, Status::Completed);
        assert_eq!(result.final_progress.percentage, 100.0);
        assert!(snapshots.lock().len() >= 10);
    }

    #[tokio::test]
    async fn scenario_s2_every_third_batch_fails() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..100).collect();

        async fn flaky(items: &[i32], idx: u32, _cancel: &CancellationSignal) -> anyhow::Result<Vec<i32>> {
            if idx % 3 == 0 {
                anyhow::bail!("synthetic failure on batch {idx}");
            }
            Ok(items.to_vec())
        }

        let options = OperationOptions::builder()
            .batch_size(20)
            .max_concurrent_batches(1)
            .fail_fast(false)
            .build()
            .unwrap();

        let result = manager.execute(items, flaky, options).await.unwrap();

        assert_eq!(result.final_progress.total_batches, 5);
        assert_eq!(result.failed, 40);
        assert_eq!(result.successful, 60);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.final_progress.status, Status::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_s3_timeout() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..100).collect();

        async fn slow(items: &[i32], _idx: u32, _cancel: &CancellationSignal) -> anyhow::Result<Vec<i32>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(items.to_vec())
        }

        let options = OperationOptions::builder()
            .batch_size(20)
            .max_concurrent_batches(1)
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), manager.execute(items, slow, options))
            .await
            .expect("execute future should resolve")
            .unwrap();

        assert_eq!(result.final_progress.status, Status::TimedOut);
        assert!(result.final_progress.processed_items < 100);
    }

    #[tokio::test]
    async fn scenario_s4_contract_violation() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..10).collect();

        async fn returns_empty(_items: &[i32], _idx: u32, _cancel: &CancellationSignal) -> anyhow::Result<Vec<i32>> {
            Ok(Vec::new())
        }

        let options = OperationOptions::builder().batch_size(10).build().unwrap();
        let result = manager.execute(items, returns_empty, options).await.unwrap();

        assert_eq!(result.failed, 10);
        assert_eq!(result.successful, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.final_progress.status, Status::Failed);
    }

    #[tokio::test]
    async fn scenario_s5_adaptive_shrink_under_pressure() {
        let advisor = Arc::new(ScriptedMemoryAdvisor::new(vec![Pressure::Low, Pressure::Critical]));
        let manager = BatchOperationManager::with_memory_advisor(advisor);
        let items: Vec<i32> = (0..5000).collect();

        let options = OperationOptions::builder()
            .batch_size(1000)
            .max_concurrent_batches(2)
            .adaptive_batch_size(true)
            .build()
            .unwrap();

        let result = manager.execute(items, double, options).await.unwrap();

        assert_eq!(result.final_progress.total_batches, 5);
        assert_eq!(result.successful, 5000);
        assert_eq!(result.failed, 0);
        assert_eq!(result.final_progress.status, Status::Completed);
    }

    #[tokio::test]
    async fn scenario_p7_empty_input_short_circuits() {
        let manager = BatchOperationManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let processor = move |_items: &[i32], _idx: u32, _cancel: &CancellationSignal| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<Vec<i32>, anyhow::Error>(Vec::new())
            }
        };

        let result = manager
            .execute(Vec::<i32>::new(), processor, OperationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.final_progress.status, Status::Completed);
        assert_eq!(result.total, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scenario_p8_fail_fast_stops_after_first_failure() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..100).collect();
        let dispatched = Arc::new(AtomicUsize::new(0));
        let dispatched_clone = Arc::clone(&dispatched);

        let processor = move |items: &[i32], idx: u32, _cancel: &CancellationSignal| {
            let dispatched = Arc::clone(&dispatched_clone);
            let items = items.to_vec();
            async move {
                dispatched.fetch_add(1, Ordering::SeqCst);
                if idx == 0 {
                    anyhow::bail!("boom");
                }
                Ok::<Vec<i32>, anyhow::Error>(items)
            }
        };

        let options = OperationOptions::builder()
            .batch_size(10)
            .max_concurrent_batches(1)
            .fail_fast(true)
            .build()
            .unwrap();

        let result = manager.execute(items, processor, options).await.unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.final_progress.status, Status::Failed);
        assert!(dispatched.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn external_cancellation_stops_dispatch_of_remaining_batches() {
        let manager = BatchOperationManager::new();
        let items: Vec<i32> = (0..100).collect();
        let cancel = CancellationSignal::new();
        let cancel_for_caller = cancel.clone();

        async fn slow_identity(items: &[i32], _idx: u32, _cancel: &CancellationSignal) -> anyhow::Result<Vec<i32>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(items.to_vec())
        }

        let options = OperationOptions::builder()
            .batch_size(10)
            .max_concurrent_batches(1)
            .build()
            .unwrap();

        let execution = manager.execute_with_cancellation(items, slow_identity, options, cancel);

        let caller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            cancel_for_caller.cancel(CancelCause::External);
        });

        let result = execution.await.unwrap();
        caller.await.unwrap();

        assert_eq!(result.final_progress.status, Status::Cancelled);
        assert!(result.final_progress.processed_items < 100);
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_dispatch() {
        let manager = BatchOperationManager::new();
        let options = OperationOptions::builder().batch_size(0).build();
        assert!(options.is_err());

        let mut bad_options = OperationOptions::default();
        bad_options.batch_size = 0;
        let result = manager
            .execute(vec![1, 2, 3], double, bad_options)
            .await;
        assert!(matches!(result, Err(BatchCoreError::InvalidOptions(_))));
    }
}
