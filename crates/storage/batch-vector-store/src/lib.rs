//! Vector-store batching
//!
//! A [`batcher::VectorStoreBatcher`] built on `batch_core`'s
//! [`batch_core::BatchOperationManager`]: bounded-concurrency upsert and
//! delete against a [`client::VectorStoreClient`], with per-batch retry and
//! collection dimension enforcement.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batcher;
pub mod client;
pub mod error;
pub mod types;

pub use batcher::{VectorBatchOptions, VectorStoreBatcher};
pub use client::{LocalVectorStoreClient, VectorStoreClient};
pub use error::{Result, VectorStoreError};
pub use types::{DeleteReport, Point, UpsertReport, VectorStoreProgress};
