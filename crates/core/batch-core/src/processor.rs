//! The `Processor<T, R>` external interface (§6): user-supplied, opaque per-batch work.

use crate::cancellation::CancellationSignal;
use async_trait::async_trait;

/// Per-batch work supplied by the caller of [`crate::manager::BatchOperationManager::execute`].
///
/// Contract: on success, the returned sequence's length equals `batch.len()`.
/// Implementations should check `cancel.is_cancelled()` at reasonable points
/// and return promptly once it is set, but may also run to completion.
#[async_trait]
pub trait Processor<T, R>: Send + Sync
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Process one batch, returning one result per input item.
    async fn process_batch(
        &self,
        items: &[T],
        batch_index: u32,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<R>>;
}

/// Blanket impl so a plain async closure `Fn(&[T], u32, &CancellationSignal) -> Fut`
/// can be used wherever a [`Processor`] is expected, matching the teacher's
/// preference for closure-based `process` callbacks in `BatchProcessor::process`.
#[async_trait]
impl<T, R, F, Fut> Processor<T, R> for F
where
    T: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&[T], u32, &CancellationSignal) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Vec<R>>> + Send,
{
    async fn process_batch(
        &self,
        items: &[T],
        batch_index: u32,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<R>> {
        self(items, batch_index, cancel).await
    }
}
