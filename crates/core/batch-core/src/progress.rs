//! C2 — ProgressTracker: authoritative counters and snapshot production.

use crate::types::{ProgressSnapshot, Status};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const DURATION_RING_CAPACITY: usize = 20;

/// Owns the counters and status for one operation and produces consistent snapshots.
///
/// All public methods are safe to call concurrently from multiple worker tasks.
pub struct ProgressTracker {
    operation_id: String,
    max_concurrent_batches: u32,
    total_items: AtomicU64,
    processed_items: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_batches: AtomicU32,
    current_batch: AtomicU32,
    status: Mutex<Status>,
    started_at: Mutex<Option<(Instant, u64)>>,
    durations: Mutex<VecDeque<u32>>,
}

impl ProgressTracker {
    /// Create a tracker for `operation_id`, not yet initialized (`Status::Pending`).
    pub fn new(operation_id: String, max_concurrent_batches: u32) -> Self {
        Self {
            operation_id,
            max_concurrent_batches: max_concurrent_batches.max(1),
            total_items: AtomicU64::new(0),
            processed_items: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_batches: AtomicU32::new(0),
            current_batch: AtomicU32::new(0),
            status: Mutex::new(Status::Pending),
            started_at: Mutex::new(None),
            durations: Mutex::new(VecDeque::with_capacity(DURATION_RING_CAPACITY)),
        }
    }

    /// Set totals, transition `Pending -> Processing`, and record the start time.
    pub fn initialize(&self, total_items: u64, total_batches: u32) {
        self.total_items.store(total_items, Ordering::SeqCst);
        self.total_batches.store(total_batches, Ordering::SeqCst);
        *self.started_at.lock() = Some((Instant::now(), now_epoch_millis()));
        self.record_status(Status::Processing);
    }

    /// Add counters for one completed batch and advance `current_batch`.
    pub fn record_batch_completed(
        &self,
        batch_index: u32,
        succeeded_count: u64,
        failed_count: u64,
        duration_millis: u32,
    ) {
        self.successful.fetch_add(succeeded_count, Ordering::SeqCst);
        self.failed.fetch_add(failed_count, Ordering::SeqCst);
        self.processed_items
            .fetch_add(succeeded_count + failed_count, Ordering::SeqCst);

        self.current_batch.fetch_max(batch_index + 1, Ordering::SeqCst);

        let mut durations = self.durations.lock();
        if durations.len() == DURATION_RING_CAPACITY {
            durations.pop_front();
        }
        durations.push_back(duration_millis);
    }

    /// Record that dispatch of `batch_index` has started (advances `current_batch`, I5).
    pub fn record_dispatch_started(&self, batch_index: u32) {
        self.current_batch.fetch_max(batch_index + 1, Ordering::SeqCst);
    }

    /// Transition to `status`, enforcing I4. Idempotent once in a terminal state.
    pub fn record_status(&self, status: Status) {
        let mut current = self.status.lock();
        if current.is_terminal() {
            return;
        }
        if *current == status {
            return;
        }
        match (*current, status) {
            (Status::Pending, Status::Processing) => *current = status,
            (Status::Processing, s) if s.is_terminal() => *current = status,
            (Status::Pending, s) if s.is_terminal() => *current = status,
            _ => {}
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Build a consistent snapshot of current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let total_items = self.total_items.load(Ordering::SeqCst);
        let processed_items = self.processed_items.load(Ordering::SeqCst);
        let successful = self.successful.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total_batches = self.total_batches.load(Ordering::SeqCst);
        let current_batch = self.current_batch.load(Ordering::SeqCst);
        let status = self.status();

        let (started_instant, started_epoch) = self
            .started_at
            .lock()
            .unwrap_or((Instant::now(), now_epoch_millis()));
        let elapsed = started_instant.elapsed();

        let percentage = 100.0 * processed_items as f64 / (total_items.max(1)) as f64;

        let estimated_remaining_millis = {
            let durations = self.durations.lock();
            if durations.is_empty() {
                None
            } else {
                let avg = durations.iter().copied().sum::<u32>() as f64 / durations.len() as f64;
                let remaining_batches = total_batches.saturating_sub(current_batch);
                let effective_concurrency = self.max_concurrent_batches.max(1) as f64;
                Some(((avg * remaining_batches as f64) / effective_concurrency) as u32)
            }
        };

        ProgressSnapshot {
            operation_id: self.operation_id.clone(),
            status,
            total_items,
            processed_items,
            successful,
            failed,
            total_batches,
            current_batch,
            percentage,
            started_at_epoch_millis: started_epoch,
            elapsed_millis: elapsed.as_millis() as u32,
            estimated_remaining_millis,
        }
    }
}

fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_transitions_to_processing() {
        let tracker = ProgressTracker::new("op1".into(), 2);
        assert_eq!(tracker.status(), Status::Pending);
        tracker.initialize(100, 5);
        assert_eq!(tracker.status(), Status::Processing);
        let snap = tracker.snapshot();
        assert_eq!(snap.total_items, 100);
        assert_eq!(snap.total_batches, 5);
        assert_eq!(snap.percentage, 0.0);
    }

    #[test]
    fn record_batch_completed_updates_counters_and_current_batch() {
        let tracker = ProgressTracker::new("op1".into(), 1);
        tracker.initialize(100, 5);
        tracker.record_batch_completed(0, 18, 2, 40);
        let snap = tracker.snapshot();
        assert_eq!(snap.successful, 18);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.processed_items, 20);
        assert_eq!(snap.current_batch, 1);
        assert_eq!(snap.percentage, 20.0);
        assert_eq!(snap.estimated_remaining_millis, Some(40 * 4));
    }

    #[test]
    fn current_batch_never_decreases() {
        let tracker = ProgressTracker::new("op1".into(), 1);
        tracker.initialize(100, 5);
        tracker.record_batch_completed(3, 20, 0, 10);
        assert_eq!(tracker.snapshot().current_batch, 4);
        tracker.record_batch_completed(1, 20, 0, 10);
        assert_eq!(tracker.snapshot().current_batch, 4);
    }

    #[test]
    fn status_transitions_are_idempotent_once_terminal() {
        let tracker = ProgressTracker::new("op1".into(), 1);
        tracker.initialize(10, 1);
        tracker.record_status(Status::Completed);
        assert_eq!(tracker.status(), Status::Completed);
        tracker.record_status(Status::Failed);
        assert_eq!(tracker.status(), Status::Completed);
    }

    #[test]
    fn empty_duration_ring_means_no_eta() {
        let tracker = ProgressTracker::new("op1".into(), 1);
        tracker.initialize(10, 1);
        assert!(tracker.snapshot().estimated_remaining_millis.is_none());
    }

    #[test]
    fn duration_ring_is_bounded_to_twenty() {
        let tracker = ProgressTracker::new("op1".into(), 1);
        tracker.initialize(1000, 30);
        for i in 0..30u32 {
            tracker.record_batch_completed(i, 1, 0, i + 1);
        }
        assert_eq!(tracker.durations.lock().len(), DURATION_RING_CAPACITY);
    }
}
