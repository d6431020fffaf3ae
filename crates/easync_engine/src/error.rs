//! Error types for the sync engine.

use std::time::Duration;

use easync_codec::CodecError;
use easync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for batch execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised while committing a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The store failed for a reason splitting cannot fix.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A deferred mutation references an entry outside its sub-batch.
    #[error("entry {offset} back-references {target}, before sub-batch start {start}")]
    DanglingBackReference {
        /// Offset of the deferred entry.
        offset: usize,
        /// Offset it references.
        target: usize,
        /// First offset of the sub-batch being sent.
        start: usize,
    },

    /// A sub-batch is too large and every cut would break a back-reference.
    #[error("cannot split {len} entries at offset {start} without breaking a back-reference")]
    Unsplittable {
        /// First offset of the sub-batch.
        start: usize,
        /// Entries in the sub-batch.
        len: usize,
    },

    /// A single entry is larger than one transaction allows.
    #[error("entry {offset} alone exceeds the transaction size limit")]
    TransactionTooLarge {
        /// Offset of the entry.
        offset: usize,
    },

    /// Halving went deeper than the configured limit.
    #[error("gave up after splitting {depth} times")]
    SplitDepthExceeded {
        /// Depth reached.
        depth: usize,
    },

    /// The store returned the wrong number of results.
    #[error("store returned {actual} results for {expected} operations")]
    ResultCountMismatch {
        /// Operations sent.
        expected: usize,
        /// Results received.
        actual: usize,
    },
}

impl ExecError {
    /// Returns true if re-running the pass later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Store(StoreError::Unavailable(_)))
    }
}

/// Errors that can occur during a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request encoding or response decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Committing the parsed changes failed.
    #[error("commit failed: {0}")]
    Exec(#[from] ExecError),

    /// Reading local state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The device must be provisioned before syncing.
    #[error("provisioning required (status {status})")]
    NeedsProvisioning {
        /// Server status or HTTP code.
        status: u16,
    },

    /// The folder hierarchy is stale and has been scheduled for a resync.
    #[error("folder hierarchy refresh required (status {status})")]
    NeedsFolderRefresh {
        /// Server status.
        status: u16,
    },

    /// Transient server condition.
    #[error("server busy (status {status})")]
    Retry {
        /// Server status.
        status: u16,
        /// Suggested wait before the next attempt.
        delay_hint: Option<Duration>,
    },

    /// Status the client cannot recover from.
    #[error("fatal sync status {status}")]
    Fatal {
        /// Server status.
        status: u16,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidState {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Retry { .. } => true,
            SyncError::NeedsFolderRefresh { .. } => true,
            SyncError::Exec(err) => err.is_retryable(),
            SyncError::Store(err) => matches!(err, StoreError::Unavailable(_)),
            _ => false,
        }
    }

    /// Server-suggested delay before retrying, if any.
    pub fn delay_hint(&self) -> Option<Duration> {
        match self {
            SyncError::Retry { delay_hint, .. } => *delay_hint,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Retry {
            status: 5,
            delay_hint: None
        }
        .is_retryable());
        assert!(SyncError::NeedsFolderRefresh { status: 12 }.is_retryable());
        assert!(!SyncError::Fatal { status: 4 }.is_retryable());
        assert!(!SyncError::NeedsProvisioning { status: 142 }.is_retryable());
        assert!(!SyncError::Authentication("401".into()).is_retryable());
    }

    #[test]
    fn exec_classification() {
        let unavailable = ExecError::Store(StoreError::Unavailable("locked".into()));
        assert!(SyncError::from(unavailable).is_retryable());
        assert!(!SyncError::from(ExecError::TransactionTooLarge { offset: 3 }).is_retryable());
    }

    #[test]
    fn codec_errors_convert() {
        let err: SyncError = CodecError::IntegerOverflow.into();
        assert!(matches!(err, SyncError::Codec(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ExecError::DanglingBackReference {
            offset: 5,
            target: 1,
            start: 3,
        };
        assert_eq!(
            err.to_string(),
            "entry 5 back-references 1, before sub-batch start 3"
        );
        let err = SyncError::Retry {
            status: 16,
            delay_hint: Some(Duration::from_secs(15)),
        };
        assert!(err.to_string().contains("16"));
        assert_eq!(err.delay_hint(), Some(Duration::from_secs(15)));
    }
}
