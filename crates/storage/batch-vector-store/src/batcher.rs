//! C5 — VectorStoreBatcher: upsert/delete built on top of the batch operation
//! core, adding per-batch retry against a [`VectorStoreClient`].

use crate::client::VectorStoreClient;
use crate::error::{Result, VectorStoreError};
use crate::types::{is_completed, DeleteReport, Point, UpsertReport, VectorStoreProgress};
use batch_core::{
    retry_with_backoff, BatchOperationManager, CancellationSignal, CircuitBreaker, MemoryAdvisor,
    OperationOptions, RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Options for one [`VectorStoreBatcher`] call. A thin builder over
/// [`batch_core::OperationOptions`] that reshapes progress snapshots into
/// [`VectorStoreProgress`] before handing them to the caller's sink.
#[derive(Clone, Default)]
pub struct VectorBatchOptions {
    batch_size: Option<usize>,
    max_concurrent_batches: Option<usize>,
    timeout: Option<Duration>,
    fail_fast: Option<bool>,
    adaptive_batch_size: Option<bool>,
    on_progress: Option<Arc<dyn Fn(VectorStoreProgress) + Send + Sync>>,
}

impl VectorBatchOptions {
    /// Points per batch.
    pub fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = Some(value);
        self
    }

    /// Upper bound on in-flight batches.
    pub fn max_concurrent_batches(mut self, value: usize) -> Self {
        self.max_concurrent_batches = Some(value);
        self
    }

    /// Wall-clock limit on the whole call.
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// If true, the first failing batch (after retries) aborts the call.
    pub fn fail_fast(mut self, value: bool) -> Self {
        self.fail_fast = Some(value);
        self
    }

    /// Whether batch size may shrink or grow under memory pressure.
    pub fn adaptive_batch_size(mut self, value: bool) -> Self {
        self.adaptive_batch_size = Some(value);
        self
    }

    /// Register a sink invoked with reshaped progress as batches settle.
    pub fn on_progress(mut self, sink: impl Fn(VectorStoreProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(sink));
        self
    }

    fn into_operation_options(self) -> batch_core::Result<OperationOptions> {
        let mut builder = OperationOptions::builder();
        if let Some(v) = self.batch_size {
            builder = builder.batch_size(v);
        }
        if let Some(v) = self.max_concurrent_batches {
            builder = builder.max_concurrent_batches(v);
        }
        if let Some(v) = self.timeout {
            builder = builder.timeout(v);
        }
        if let Some(v) = self.fail_fast {
            builder = builder.fail_fast(v);
        }
        if let Some(v) = self.adaptive_batch_size {
            builder = builder.adaptive_batch_size(v);
        }
        if let Some(sink) = self.on_progress {
            builder = builder.on_progress(move |snapshot| sink(VectorStoreProgress::from(snapshot)));
        }
        builder.build()
    }
}

/// Drives upserts and deletes against a [`VectorStoreClient`] through the
/// batch operation core, retrying transient per-batch failures with backoff.
pub struct VectorStoreBatcher<C: VectorStoreClient + 'static> {
    client: Arc<C>,
    manager: BatchOperationManager,
    retry_config: RetryConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl<C: VectorStoreClient + 'static> VectorStoreBatcher<C> {
    /// Create a batcher with adaptive sizing disabled and default retry settings.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            manager: BatchOperationManager::new(),
            retry_config: RetryConfig::default(),
            circuit_breaker: Arc::new(Self::default_circuit_breaker()),
        }
    }

    /// Create a batcher that consults `advisor` for adaptive batch sizing.
    pub fn with_memory_advisor(client: Arc<C>, advisor: Arc<dyn MemoryAdvisor>) -> Self {
        Self {
            client,
            manager: BatchOperationManager::with_memory_advisor(advisor),
            retry_config: RetryConfig::default(),
            circuit_breaker: Arc::new(Self::default_circuit_breaker()),
        }
    }

    fn default_circuit_breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, 2, Duration::from_secs(30))
    }

    /// Override the per-batch retry policy (default: 3 retries, 200ms base, 2x multiplier).
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Override the circuit breaker guarding calls to the underlying client
    /// (default: opens after 5 consecutive failures, closes after 2
    /// successful trial calls, half-opens after 30s).
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Arc::new(circuit_breaker);
        self
    }

    /// Ensure `collection_id` exists with `dimension`. A no-op if it already
    /// exists with the same dimension; an error if it exists with a different one.
    pub async fn ensure_collection(&self, collection_id: &str, dimension: usize) -> Result<()> {
        if self.client.collection_exists(collection_id).await? {
            if let Some(existing) = self.client.collection_dimension(collection_id).await? {
                if existing != dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        collection_id: collection_id.to_string(),
                        expected: existing,
                        actual: dimension,
                    });
                }
            }
            Ok(())
        } else {
            self.client.create_collection(collection_id, dimension).await
        }
    }

    /// Upsert `points` into `collection_id` in bounded-concurrency batches,
    /// retrying each batch's write against transient failures.
    pub async fn upsert(
        &self,
        collection_id: impl Into<String>,
        points: Vec<Point>,
        options: VectorBatchOptions,
    ) -> Result<UpsertReport> {
        let collection_id = collection_id.into();
        let options = options.into_operation_options()?;
        let client = Arc::clone(&self.client);
        let retry_config = self.retry_config.clone();
        let circuit_breaker = Arc::clone(&self.circuit_breaker);

        let process = move |batch: &[Point], _batch_index: u32, _cancel: &CancellationSignal| {
            let client = Arc::clone(&client);
            let collection_id = collection_id.clone();
            let retry_config = retry_config.clone();
            let circuit_breaker = Arc::clone(&circuit_breaker);
            let batch = batch.to_vec();
            async move {
                let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
                circuit_breaker
                    .call(move || {
                        retry_with_backoff(&retry_config, VectorStoreError::is_transient, move || {
                            let client = Arc::clone(&client);
                            let collection_id = collection_id.clone();
                            let points = batch.clone();
                            async move { client.upsert_points(&collection_id, points).await }
                        })
                    })
                    .await
                    .map_err(|e| anyhow::Error::new(e.unwrap_or(VectorStoreError::CircuitOpen)))?;
                Ok(ids)
            }
        };

        let result = self.manager.execute(points, process, options).await?;
        Ok(UpsertReport {
            operation_id: result.operation_id,
            total: result.total,
            successful: result.successful,
            failed: result.failed,
            errors: result.errors,
            upserted_ids: result.merged_results,
            completed: is_completed(result.final_progress.status),
        })
    }

    /// Delete points by id from `collection_id` in bounded-concurrency batches.
    pub async fn delete_by_ids(
        &self,
        collection_id: impl Into<String>,
        ids: Vec<String>,
        options: VectorBatchOptions,
    ) -> Result<DeleteReport> {
        let collection_id = collection_id.into();
        let options = options.into_operation_options()?;
        let client = Arc::clone(&self.client);
        let retry_config = self.retry_config.clone();
        let circuit_breaker = Arc::clone(&self.circuit_breaker);

        let process = move |batch: &[String], _batch_index: u32, _cancel: &CancellationSignal| {
            let client = Arc::clone(&client);
            let collection_id = collection_id.clone();
            let retry_config = retry_config.clone();
            let circuit_breaker = Arc::clone(&circuit_breaker);
            let batch = batch.to_vec();
            async move {
                let len = batch.len();
                circuit_breaker
                    .call(move || {
                        retry_with_backoff(&retry_config, VectorStoreError::is_transient, move || {
                            let client = Arc::clone(&client);
                            let collection_id = collection_id.clone();
                            let ids = batch.clone();
                            async move { client.delete_points(&collection_id, ids).await }
                        })
                    })
                    .await
                    .map_err(|e| anyhow::Error::new(e.unwrap_or(VectorStoreError::CircuitOpen)))?;
                Ok(vec![(); len])
            }
        };

        let result = self.manager.execute(ids, process, options).await?;
        Ok(DeleteReport {
            operation_id: result.operation_id,
            total: result.total,
            successful: result.successful,
            failed: result.failed,
            errors: result.errors,
            completed: is_completed(result.final_progress.status),
        })
    }

    /// Drop a whole collection. Not batched: a single administrative call.
    pub async fn delete_by_collection(&self, collection_id: impl Into<String>) -> Result<DeleteReport> {
        let collection_id = collection_id.into();
        self.client.delete_collection(&collection_id).await?;
        Ok(DeleteReport {
            operation_id: String::new(),
            total: 0,
            successful: 0,
            failed: 0,
            errors: Vec::new(),
            completed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalVectorStoreClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyOnceClient {
        inner: LocalVectorStoreClient,
        upsert_calls: AtomicUsize,
        fail_first_n: usize,
    }

    impl FlakyOnceClient {
        fn new(fail_first_n: usize) -> Self {
            Self {
                inner: LocalVectorStoreClient::new(),
                upsert_calls: AtomicUsize::new(0),
                fail_first_n,
            }
        }
    }

    #[async_trait]
    impl VectorStoreClient for FlakyOnceClient {
        async fn create_collection(&self, collection_id: &str, dimension: usize) -> Result<()> {
            self.inner.create_collection(collection_id, dimension).await
        }

        async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
            self.inner.collection_exists(collection_id).await
        }

        async fn collection_dimension(&self, collection_id: &str) -> Result<Option<usize>> {
            self.inner.collection_dimension(collection_id).await
        }

        async fn upsert_points(&self, collection_id: &str, points: Vec<Point>) -> Result<()> {
            let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(VectorStoreError::Transient("simulated timeout".into()));
            }
            self.inner.upsert_points(collection_id, points).await
        }

        async fn delete_points(&self, collection_id: &str, ids: Vec<String>) -> Result<()> {
            self.inner.delete_points(collection_id, ids).await
        }

        async fn delete_collection(&self, collection_id: &str) -> Result<()> {
            self.inner.delete_collection(collection_id).await
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn scenario_s6_retries_transient_failure_then_succeeds() {
        let client = Arc::new(FlakyOnceClient::new(2));
        client.create_collection("docs", 2).await.unwrap();

        let batcher = VectorStoreBatcher::new(Arc::clone(&client)).with_retry_config(fast_retry());
        let points = vec![
            Point::new("a", vec![1.0, 0.0]),
            Point::new("b", vec![0.0, 1.0]),
        ];

        let report = batcher
            .upsert("docs", points, VectorBatchOptions::default().batch_size(10))
            .await
            .unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);
        assert!(report.completed);
        assert_eq!(client.inner.len("docs"), 2);
    }

    #[tokio::test]
    async fn upsert_gives_up_after_exhausting_retries() {
        let client = Arc::new(FlakyOnceClient::new(100));
        client.create_collection("docs", 2).await.unwrap();

        let batcher = VectorStoreBatcher::new(client).with_retry_config(fast_retry());
        let points = vec![Point::new("a", vec![1.0, 0.0])];

        let report = batcher
            .upsert("docs", points, VectorBatchOptions::default().batch_size(10))
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn upsert_trips_circuit_breaker_after_repeated_batch_failures() {
        let client = Arc::new(FlakyOnceClient::new(100));
        client.create_collection("docs", 2).await.unwrap();

        let batcher = VectorStoreBatcher::new(client)
            .with_retry_config(fast_retry())
            .with_circuit_breaker(CircuitBreaker::new(2, 1, Duration::from_secs(60)));
        let points: Vec<Point> = (0..4)
            .map(|i| Point::new(i.to_string(), vec![i as f32, 0.0]))
            .collect();

        let report = batcher
            .upsert("docs", points, VectorBatchOptions::default().batch_size(1))
            .await
            .unwrap();

        assert_eq!(report.failed, 4);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e.cause, batch_core::BatchErrorCause::Processor { .. })));
    }

    #[tokio::test]
    async fn ensure_collection_rejects_dimension_change() {
        let client = Arc::new(LocalVectorStoreClient::new());
        let batcher = VectorStoreBatcher::new(client);
        batcher.ensure_collection("docs", 768).await.unwrap();
        let result = batcher.ensure_collection("docs", 384).await;
        assert!(matches!(result, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn delete_by_ids_batches_and_removes() {
        let client = Arc::new(LocalVectorStoreClient::new());
        client.create_collection("docs", 2).await.unwrap();
        let points: Vec<Point> = (0..50)
            .map(|i| Point::new(i.to_string(), vec![i as f32, 0.0]))
            .collect();
        client.upsert_points("docs", points).await.unwrap();

        let batcher = VectorStoreBatcher::new(Arc::clone(&client));
        let ids: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let report = batcher
            .delete_by_ids("docs", ids, VectorBatchOptions::default().batch_size(10))
            .await
            .unwrap();

        assert_eq!(report.successful, 50);
        assert_eq!(client.len("docs"), 0);
    }

    #[tokio::test]
    async fn delete_by_collection_removes_it_entirely() {
        let client = Arc::new(LocalVectorStoreClient::new());
        client.create_collection("docs", 2).await.unwrap();
        let batcher = VectorStoreBatcher::new(Arc::clone(&client));
        let report = batcher.delete_by_collection("docs").await.unwrap();
        assert!(report.completed);
        assert!(!client.collection_exists("docs").await.unwrap());
    }
}
