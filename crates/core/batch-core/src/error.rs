//! Error types for the batch operation core

use thiserror::Error;

/// Errors surfaced by the batch operation core.
#[derive(Debug, Error)]
pub enum BatchCoreError {
    /// Options failed validation before any work started.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The processor returned a result sequence of the wrong length, or none at all.
    #[error("processor contract violation for batch {batch_index}: expected {expected} items, got {actual:?}")]
    ProcessorContractViolation {
        /// Index of the offending batch.
        batch_index: u32,
        /// Expected output length (equal to the batch's input length).
        expected: usize,
        /// Actual output length, or `None` if the processor returned nothing.
        actual: Option<usize>,
    },

    /// The processor raised an error for a batch.
    #[error("processor failed for batch {batch_index}: {source}")]
    ProcessorFailure {
        /// Index of the failing batch.
        batch_index: u32,
        /// Underlying error from the processor.
        #[source]
        source: anyhow::Error,
    },

    /// The operation was cancelled by an external signal.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's wall-clock timeout elapsed.
    #[error("operation timed out")]
    TimedOut,

    /// The memory advisor could not be read; callers should treat this as pressure `low`.
    #[error("memory advisor unavailable: {0}")]
    AdvisorUnavailable(String),
}

/// Convenient `Result` alias using [`BatchCoreError`].
pub type Result<T> = std::result::Result<T, BatchCoreError>;

impl BatchCoreError {
    /// Build an [`BatchCoreError::InvalidOptions`].
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// Build an [`BatchCoreError::AdvisorUnavailable`].
    pub fn advisor_unavailable(msg: impl Into<String>) -> Self {
        Self::AdvisorUnavailable(msg.into())
    }

    /// Build an [`BatchCoreError::ProcessorFailure`].
    pub fn processor_failure(batch_index: u32, source: anyhow::Error) -> Self {
        Self::ProcessorFailure { batch_index, source }
    }
}
