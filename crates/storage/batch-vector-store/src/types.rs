//! Wire-shaped types for the vector-store batching layer.

use batch_core::{ProgressSnapshot, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One vector record: an identifier, its embedding, and opaque payload fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    /// Stable identifier within its collection. Upserting an existing id replaces it.
    pub id: String,
    /// The embedding itself.
    pub vector: Vec<f32>,
    /// Arbitrary metadata carried alongside the vector.
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

impl Point {
    /// Construct a point with an empty payload.
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: HashMap::new(),
        }
    }
}

/// Progress view exposed to callers of [`crate::batcher::VectorStoreBatcher`],
/// omitting the batch-core internals (successful/failed split, started-at
/// epoch, status) that aren't meaningful outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreProgress {
    /// Points processed so far (upserted or deleted, successfully or not).
    pub processed: u64,
    /// Total points in this call.
    pub total: u64,
    /// `processed / total * 100`.
    pub percentage: f64,
    /// Highest batch index dispatched.
    pub current_batch: u32,
    /// Total batches the call was partitioned into at start.
    pub total_batches: u32,
    /// Milliseconds elapsed since the call started.
    pub duration_millis: u32,
}

impl From<ProgressSnapshot> for VectorStoreProgress {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            processed: snapshot.processed_items,
            total: snapshot.total_items,
            percentage: snapshot.percentage,
            current_batch: snapshot.current_batch,
            total_batches: snapshot.total_batches,
            duration_millis: snapshot.elapsed_millis,
        }
    }
}

/// Outcome of one [`crate::batcher::VectorStoreBatcher::upsert`] call.
#[derive(Debug)]
pub struct UpsertReport {
    /// Identifier of the underlying batch operation.
    pub operation_id: String,
    /// Total points submitted.
    pub total: u64,
    /// Points successfully upserted.
    pub successful: u64,
    /// Points that failed.
    pub failed: u64,
    /// One entry per failing batch.
    pub errors: Vec<batch_core::BatchError>,
    /// Ids that were upserted, in input order.
    pub upserted_ids: Vec<String>,
    /// Whether the call ran to completion (`batch_core::Status::Completed`).
    pub completed: bool,
}

/// Outcome of a [`crate::batcher::VectorStoreBatcher::delete_by_ids`] or
/// [`crate::batcher::VectorStoreBatcher::delete_by_collection`] call.
#[derive(Debug)]
pub struct DeleteReport {
    /// Identifier of the underlying batch operation, when the delete was batched.
    pub operation_id: String,
    /// Total ids submitted for deletion (0 for a whole-collection delete).
    pub total: u64,
    /// Ids successfully deleted.
    pub successful: u64,
    /// Ids that failed to delete.
    pub failed: u64,
    /// One entry per failing batch.
    pub errors: Vec<batch_core::BatchError>,
    /// Whether the call ran to completion.
    pub completed: bool,
}

pub(crate) fn is_completed(status: Status) -> bool {
    status == Status::Completed
}
