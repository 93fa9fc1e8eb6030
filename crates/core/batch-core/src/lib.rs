//! Batch Operation Core
//!
//! Bounded-concurrency batch processing for document-ingestion pipelines:
//! adaptive batch sizing under memory pressure, live progress tracking,
//! per-batch failure isolation, cooperative cancellation, and a wall-clock
//! timeout, orchestrated by [`BatchOperationManager::execute`].
//!
//! # Example
//!
//! ```no_run
//! use batch_core::{BatchOperationManager, CancellationSignal, OperationOptions};
//!
//! # async fn run() -> batch_core::Result<()> {
//! let manager = BatchOperationManager::new();
//! let items: Vec<u32> = (0..10_000).collect();
//! let options = OperationOptions::builder()
//!     .batch_size(200)
//!     .max_concurrent_batches(8)
//!     .build()?;
//!
//! let double = |batch: &[u32], _idx: u32, _cancel: &CancellationSignal| async move {
//!     anyhow::Ok(batch.iter().map(|x| x * 2).collect::<Vec<u32>>())
//! };
//! let result = manager.execute(items, double, options).await?;
//!
//! println!("{} succeeded, {} failed", result.successful, result.failed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancellation;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory_advisor;
pub mod processor;
pub mod progress;
pub mod resilience;
pub mod types;
pub mod worker_pool;

pub use cancellation::{CancelCause, CancellationSignal};
pub use config::load_env;
pub use error::{BatchCoreError, Result};
pub use manager::BatchOperationManager;
pub use memory_advisor::{MemoryAdvisor, Pressure, ScriptedMemoryAdvisor, SystemMemoryAdvisor};
pub use processor::Processor;
pub use progress::ProgressTracker;
pub use resilience::{retry_with_backoff, CircuitBreaker, CircuitState, RetryConfig};
pub use types::{
    Batch, BatchError, BatchErrorCause, BatchFailure, BatchOutcome, OperationOptions,
    OperationOptionsBuilder, OperationResult, ProgressSnapshot, Status,
};
pub use worker_pool::WorkerPool;
