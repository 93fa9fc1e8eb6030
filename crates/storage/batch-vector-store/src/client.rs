//! `VectorStoreClient`: the external collaborator a [`crate::batcher::VectorStoreBatcher`]
//! drives. Grounded on the teacher's `LocalVectorStore` (HNSW-backed local
//! store), narrowed here to the write-path operations batching needs.

use crate::error::{Result, VectorStoreError};
use crate::types::Point;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Collection lifecycle and point mutation operations a vector store must expose.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Create a collection sized for `dimension`-length vectors.
    async fn create_collection(&self, collection_id: &str, dimension: usize) -> Result<()>;

    /// Whether `collection_id` already exists.
    async fn collection_exists(&self, collection_id: &str) -> Result<bool>;

    /// The dimension a collection was created with, if it exists.
    async fn collection_dimension(&self, collection_id: &str) -> Result<Option<usize>>;

    /// Insert or replace `points` in `collection_id`.
    async fn upsert_points(&self, collection_id: &str, points: Vec<Point>) -> Result<()>;

    /// Remove points by id from `collection_id`. Unknown ids are not an error.
    async fn delete_points(&self, collection_id: &str, ids: Vec<String>) -> Result<()>;

    /// Remove an entire collection. Not an error if it does not exist.
    async fn delete_collection(&self, collection_id: &str) -> Result<()>;
}

struct Collection {
    dimension: usize,
    points: HashMap<String, Point>,
}

/// In-process reference [`VectorStoreClient`], storing points in memory
/// behind a collection name. No persistence and no similarity search:
/// only the write-path surface the batching layer exercises.
#[derive(Default)]
pub struct LocalVectorStoreClient {
    collections: RwLock<HashMap<String, Collection>>,
}

impl LocalVectorStoreClient {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points currently stored in `collection_id` (0 if absent).
    pub fn len(&self, collection_id: &str) -> usize {
        self.collections
            .read()
            .get(collection_id)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStoreClient for LocalVectorStoreClient {
    async fn create_collection(&self, collection_id: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write();
        collections
            .entry(collection_id.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: HashMap::new(),
            });
        debug!(collection_id, dimension, "collection ensured");
        Ok(())
    }

    async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(collection_id))
    }

    async fn collection_dimension(&self, collection_id: &str) -> Result<Option<usize>> {
        Ok(self
            .collections
            .read()
            .get(collection_id)
            .map(|c| c.dimension))
    }

    async fn upsert_points(&self, collection_id: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(collection_id)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection_id.to_string()))?;

        for point in &points {
            if point.vector.len() != collection.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    collection_id: collection_id.to_string(),
                    expected: collection.dimension,
                    actual: point.vector.len(),
                });
            }
        }

        for point in points {
            collection.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_points(&self, collection_id: &str, ids: Vec<String>) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(collection) = collections.get_mut(collection_id) {
            for id in ids {
                collection.points.remove(&id);
            }
        }
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.collections.write().remove(collection_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let client = LocalVectorStoreClient::new();
        client.create_collection("docs", 3).await.unwrap();
        client.create_collection("docs", 3).await.unwrap();
        assert_eq!(client.collection_dimension("docs").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let client = LocalVectorStoreClient::new();
        client.create_collection("docs", 3).await.unwrap();
        let result = client
            .upsert_points("docs", vec![Point::new("a", vec![1.0, 2.0])])
            .await;
        assert!(matches!(result, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let client = LocalVectorStoreClient::new();
        client.create_collection("docs", 2).await.unwrap();
        client
            .upsert_points("docs", vec![Point::new("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        client
            .upsert_points("docs", vec![Point::new("a", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(client.len("docs"), 1);
    }

    #[tokio::test]
    async fn delete_points_ignores_unknown_ids() {
        let client = LocalVectorStoreClient::new();
        client.create_collection("docs", 2).await.unwrap();
        client
            .delete_points("docs", vec!["missing".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_collection_removes_everything() {
        let client = LocalVectorStoreClient::new();
        client.create_collection("docs", 2).await.unwrap();
        client
            .upsert_points("docs", vec![Point::new("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        client.delete_collection("docs").await.unwrap();
        assert!(!client.collection_exists("docs").await.unwrap());
    }
}
