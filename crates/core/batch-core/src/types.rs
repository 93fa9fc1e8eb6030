//! Shared data model: batches, outcomes, options, progress snapshots, and results.

use serde::{Deserialize, Serialize};

/// A contiguous slice of input items dispatched as one processor invocation.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    /// Position of this batch among all batches produced for the operation.
    pub index: u32,
    /// The items assigned to this batch. Immutable once handed to the pool.
    pub items: Vec<T>,
    /// Number of times this batch has been attempted (starts at 1).
    pub attempt_count: u16,
}

impl<T> Batch<T> {
    /// Number of items in this batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this batch carries no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single batch's worth of processor output, or the reason it failed.
///
/// The distilled spec models `items`/`error` as a sentinel pair where exactly
/// one is set; here that invariant is enforced at the type level by using a
/// `Result` instead (see REDESIGN FLAGS in `SPEC_FULL.md`).
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Index of the batch this outcome was produced for.
    pub index: u32,
    /// The batch's result: the same-length output sequence, or the failure that occurred.
    pub outcome: Result<Vec<R>, BatchFailure>,
    /// Wall-clock duration of the batch invocation.
    pub duration_millis: u32,
}

/// Why a batch failed.
#[derive(Debug)]
pub enum BatchFailure {
    /// The processor's output length did not match its input length, or it returned nothing.
    ContractViolation {
        /// Expected output length.
        expected: usize,
        /// Actual output length, if any was returned.
        actual: Option<usize>,
    },
    /// The processor raised an error.
    Processor(anyhow::Error),
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchFailure::ContractViolation { expected, actual } => write!(
                f,
                "processor contract violation: expected {expected} items, got {actual:?}"
            ),
            BatchFailure::Processor(e) => write!(f, "{e}"),
        }
    }
}

/// Serializable tagged value for `BatchError::cause` (spec.md §3's `ErrorValue`):
/// the structured reason a batch failed, independent of the display-formatted
/// `BatchError::message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchErrorCause {
    /// The processor's output length did not match its input length, or it returned nothing.
    ContractViolation {
        /// Expected output length.
        expected: usize,
        /// Actual output length, if any was returned.
        actual: Option<usize>,
    },
    /// The processor raised an error; its message is preserved (the
    /// underlying `anyhow::Error` itself is not `Clone`/`Serialize`).
    Processor {
        /// Display-formatted processor error.
        message: String,
    },
}

impl From<&BatchFailure> for BatchErrorCause {
    fn from(failure: &BatchFailure) -> Self {
        match failure {
            BatchFailure::ContractViolation { expected, actual } => BatchErrorCause::ContractViolation {
                expected: *expected,
                actual: *actual,
            },
            BatchFailure::Processor(e) => BatchErrorCause::Processor { message: e.to_string() },
        }
    }
}

/// Options controlling one `execute` invocation.
#[derive(Clone)]
pub struct OperationOptions {
    /// Initial items per batch. Must be positive.
    pub batch_size: usize,
    /// Upper bound on in-flight batches. Must be positive.
    pub max_concurrent_batches: usize,
    /// Wall-clock limit on the whole operation; `None` means no limit.
    pub timeout: Option<std::time::Duration>,
    /// Whether progress snapshots are produced at all.
    pub enable_progress_monitoring: bool,
    /// Sink invoked with a snapshot after state-changing events, when monitoring is enabled.
    pub on_progress: Option<std::sync::Arc<dyn Fn(ProgressSnapshot) + Send + Sync>>,
    /// Whether batch size may be revised between batches using the memory advisor.
    pub adaptive_batch_size: bool,
    /// If true, the first batch failure transitions the operation to `failed` and cancels the rest.
    pub fail_fast: bool,
}

impl std::fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationOptions")
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("timeout", &self.timeout)
            .field("enable_progress_monitoring", &self.enable_progress_monitoring)
            .field("on_progress", &self.on_progress.is_some())
            .field("adaptive_batch_size", &self.adaptive_batch_size)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::config::default_batch_size(),
            max_concurrent_batches: crate::config::default_max_concurrent_batches(),
            timeout: None,
            enable_progress_monitoring: false,
            on_progress: None,
            adaptive_batch_size: crate::config::default_adaptive_batch_size(),
            fail_fast: false,
        }
    }
}

impl OperationOptions {
    /// Start building options from defaults.
    pub fn builder() -> OperationOptionsBuilder {
        OperationOptionsBuilder::default()
    }

    /// Validate field ranges. Invalid options must be rejected before any work starts.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::error::BatchCoreError::invalid_options(
                "batchSize must be positive",
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(crate::error::BatchCoreError::invalid_options(
                "maxConcurrentBatches must be positive",
            ));
        }
        if let Some(t) = self.timeout {
            if t.is_zero() {
                return Err(crate::error::BatchCoreError::invalid_options(
                    "timeoutMillis must be positive when set",
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`OperationOptions`].
#[derive(Default, Clone)]
pub struct OperationOptionsBuilder {
    inner: OptionalFields,
}

#[derive(Default, Clone)]
struct OptionalFields {
    batch_size: Option<usize>,
    max_concurrent_batches: Option<usize>,
    timeout: Option<std::time::Duration>,
    enable_progress_monitoring: Option<bool>,
    on_progress: Option<std::sync::Arc<dyn Fn(ProgressSnapshot) + Send + Sync>>,
    adaptive_batch_size: Option<bool>,
    fail_fast: Option<bool>,
}

impl OperationOptionsBuilder {
    /// Set the initial batch size.
    pub fn batch_size(mut self, value: usize) -> Self {
        self.inner.batch_size = Some(value);
        self
    }

    /// Set the concurrency bound.
    pub fn max_concurrent_batches(mut self, value: usize) -> Self {
        self.inner.max_concurrent_batches = Some(value);
        self
    }

    /// Set the wall-clock timeout.
    pub fn timeout(mut self, value: std::time::Duration) -> Self {
        self.inner.timeout = Some(value);
        self
    }

    /// Enable progress monitoring and register a sink.
    pub fn on_progress(mut self, sink: impl Fn(ProgressSnapshot) + Send + Sync + 'static) -> Self {
        self.inner.enable_progress_monitoring = Some(true);
        self.inner.on_progress = Some(std::sync::Arc::new(sink));
        self
    }

    /// Explicitly toggle progress monitoring (independent of `on_progress`).
    pub fn enable_progress_monitoring(mut self, value: bool) -> Self {
        self.inner.enable_progress_monitoring = Some(value);
        self
    }

    /// Toggle adaptive batch sizing.
    pub fn adaptive_batch_size(mut self, value: bool) -> Self {
        self.inner.adaptive_batch_size = Some(value);
        self
    }

    /// Toggle fail-fast behavior.
    pub fn fail_fast(mut self, value: bool) -> Self {
        self.inner.fail_fast = Some(value);
        self
    }

    /// Build the final, validated options.
    pub fn build(self) -> crate::error::Result<OperationOptions> {
        let defaults = OperationOptions::default();
        let options = OperationOptions {
            batch_size: self.inner.batch_size.unwrap_or(defaults.batch_size),
            max_concurrent_batches: self
                .inner
                .max_concurrent_batches
                .unwrap_or(defaults.max_concurrent_batches),
            timeout: self.inner.timeout.or(defaults.timeout),
            enable_progress_monitoring: self
                .inner
                .enable_progress_monitoring
                .unwrap_or(defaults.enable_progress_monitoring),
            on_progress: self.inner.on_progress.or(defaults.on_progress),
            adaptive_batch_size: self
                .inner
                .adaptive_batch_size
                .unwrap_or(defaults.adaptive_batch_size),
            fail_fast: self.inner.fail_fast.unwrap_or(defaults.fail_fast),
        };
        options.validate()?;
        Ok(options)
    }
}

/// Operation lifecycle status. Transitions only along
/// `Pending -> Processing -> {Completed | Failed | Cancelled | TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet started.
    Pending,
    /// Dispatching and awaiting batches.
    Processing,
    /// Ran to completion (possibly with some batch failures aggregated).
    Completed,
    /// Aborted: either every item failed, or fail-fast fired.
    Failed,
    /// Aborted by an external cancellation signal.
    Cancelled,
    /// Aborted because the wall-clock timeout elapsed.
    TimedOut,
}

impl Status {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending | Status::Processing)
    }
}

/// An immutable view of operation state at a moment in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Identifier of the operation this snapshot belongs to.
    pub operation_id: String,
    /// Current lifecycle status.
    pub status: Status,
    /// Total items across the whole input.
    pub total_items: u64,
    /// Items whose batch has completed (successfully or not).
    pub processed_items: u64,
    /// Items that completed successfully.
    pub successful: u64,
    /// Items that failed.
    pub failed: u64,
    /// Total number of batches the input was partitioned into at start.
    pub total_batches: u32,
    /// Highest batch index whose dispatch has started.
    pub current_batch: u32,
    /// `processed_items / total_items * 100`, in `[0, 100]`.
    pub percentage: f64,
    /// Epoch millis at which the operation started.
    pub started_at_epoch_millis: u64,
    /// Milliseconds elapsed since the operation started.
    pub elapsed_millis: u32,
    /// Estimated milliseconds remaining, or `None` if not yet estimable.
    pub estimated_remaining_millis: Option<u32>,
}

/// One batch's recorded failure, aggregated into the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Index of the failing batch.
    pub batch_index: u32,
    /// Index (in the original input) of the batch's first item.
    pub first_item_index: u64,
    /// Number of items in the failing batch.
    pub item_count: u32,
    /// Human-readable message.
    pub message: String,
    /// Structured reason, for callers that need more than the display message.
    pub cause: BatchErrorCause,
}

/// Result of a completed `execute` call.
#[derive(Debug)]
pub struct OperationResult<R> {
    /// Identifier of the operation.
    pub operation_id: String,
    /// Total items in the input.
    pub total: u64,
    /// Items that succeeded.
    pub successful: u64,
    /// Items that failed.
    pub failed: u64,
    /// One entry per failing batch.
    pub errors: Vec<BatchError>,
    /// Results in input order; failed batches contribute nothing.
    pub merged_results: Vec<R>,
    /// The operation's final progress snapshot.
    pub final_progress: ProgressSnapshot,
}
