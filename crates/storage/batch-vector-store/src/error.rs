//! Error taxonomy for the vector-store batching layer.

use thiserror::Error;

/// Errors surfaced by [`crate::client::VectorStoreClient`] and
/// [`crate::batcher::VectorStoreBatcher`].
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Likely to succeed on retry (timeout, connection reset, rate limit).
    #[error("transient vector store error: {0}")]
    Transient(String),

    /// Will not succeed on retry without intervention (auth, malformed request).
    #[error("permanent vector store error: {0}")]
    Permanent(String),

    /// A collection's declared dimension does not match the embeddings being written.
    #[error("dimension mismatch for collection {collection_id:?}: expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection whose dimension disagreed.
        collection_id: String,
        /// Dimension the collection was created with.
        expected: usize,
        /// Dimension of the rejected write.
        actual: usize,
    },

    /// A collection name was referenced that does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The circuit breaker guarding this collaborator is open; the call was skipped.
    #[error("circuit breaker open, call skipped")]
    CircuitOpen,

    /// Propagated from the underlying batch operation core.
    #[error(transparent)]
    Core(#[from] batch_core::BatchCoreError),
}

impl VectorStoreError {
    /// Whether retrying the same call is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, VectorStoreError::Transient(_))
    }
}

/// Convenient `Result` alias using [`VectorStoreError`].
pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(VectorStoreError::Transient("timeout".into()).is_transient());
        assert!(!VectorStoreError::Permanent("bad request".into()).is_transient());
        assert!(!VectorStoreError::DimensionMismatch {
            collection_id: "docs".into(),
            expected: 768,
            actual: 384
        }
        .is_transient());
    }
}
