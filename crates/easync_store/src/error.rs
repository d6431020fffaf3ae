//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`crate::BatchStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The batch is too large for one transaction. Splitting may help.
    #[error("transaction too large: {ops} operation(s), {bytes} byte(s)")]
    SizeLimitExceeded {
        /// Operations in the rejected batch.
        ops: usize,
        /// Estimated payload size of the rejected batch.
        bytes: usize,
    },

    /// A back-reference does not point at an earlier insert in the same batch.
    #[error("operation {index} back-references invalid entry {target}")]
    InvalidBackReference {
        /// Index of the operation holding the reference.
        index: usize,
        /// Referenced index.
        target: usize,
    },

    /// The store rejected the batch for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if only a smaller batch can succeed.
    pub fn is_size_limit(&self) -> bool {
        matches!(self, StoreError::SizeLimitExceeded { .. })
    }
}
