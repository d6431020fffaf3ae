//! Server status interpretation.
//!
//! Every status code the server can send maps to exactly one
//! [`StatusOutcome`]. Codes nobody knows about are [`StatusOutcome::Fatal`].

use std::time::Duration;

use crate::error::SyncError;

/// Wait suggested for transient server conditions.
pub const RETRY_DELAY_HINT: Duration = Duration::from_secs(15);

/// Action implied by a server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Continue normally.
    Success,
    /// Transient condition; try later.
    Retry {
        /// Suggested wait.
        delay_hint: Option<Duration>,
    },
    /// The sync key is no longer valid; start over from `"0"`.
    ResetCollection,
    /// The device must be provisioned.
    NeedsProvisioning,
    /// The folder hierarchy changed under us.
    NeedsFolderRefresh,
    /// Local changes were rejected; keep the sync key.
    UpsyncConflict,
    /// Unrecoverable.
    Fatal(u16),
}

impl StatusOutcome {
    /// Returns true for [`StatusOutcome::Success`].
    pub fn is_success(self) -> bool {
        self == StatusOutcome::Success
    }

    /// The error surfaced for outcomes that abort the pass.
    pub fn into_error(self, status: u16) -> Option<SyncError> {
        match self {
            StatusOutcome::Retry { delay_hint } => Some(SyncError::Retry { status, delay_hint }),
            StatusOutcome::NeedsProvisioning => Some(SyncError::NeedsProvisioning { status }),
            StatusOutcome::NeedsFolderRefresh => Some(SyncError::NeedsFolderRefresh { status }),
            StatusOutcome::Fatal(status) => Some(SyncError::Fatal { status }),
            StatusOutcome::Success
            | StatusOutcome::ResetCollection
            | StatusOutcome::UpsyncConflict => None,
        }
    }
}

/// Sync status codes.
pub mod code {
    /// Success.
    pub const SUCCESS: u16 = 1;
    /// Invalid or mismatched sync key.
    pub const BAD_SYNC_KEY: u16 = 3;
    /// Server error.
    pub const SERVER_ERROR: u16 = 5;
    /// Client changes conflicted with the server.
    pub const CONFLICT: u16 = 7;
    /// Object not found.
    pub const OBJECT_NOT_FOUND: u16 = 8;
    /// The folder hierarchy has changed.
    pub const FOLDER_HIERARCHY_CHANGED: u16 = 12;
    /// Retry the request.
    pub const RETRY: u16 = 16;

    /// Server busy.
    pub const SERVER_ERROR_RETRY: u16 = 111;
    /// Access denied range start.
    pub const ACCESS_DENIED_FIRST: u16 = 126;
    /// Access denied range end.
    pub const ACCESS_DENIED_LAST: u16 = 131;
    /// Server busy.
    pub const TRANSIENT_FIRST: u16 = 132;
    /// Server busy.
    pub const TRANSIENT_LAST: u16 = 133;
    /// Invalid sync state.
    pub const INVALID_SYNC_STATE: u16 = 134;
    /// Sync state corrupt.
    pub const SYNC_STATE_CORRUPT: u16 = 136;
    /// Device blocked.
    pub const DEVICE_QUARANTINED: u16 = 139;
    /// Remote wipe requested.
    pub const REMOTE_WIPE: u16 = 140;
    /// Legacy device disallowed.
    pub const LEGACY_DEVICE: u16 = 141;
    /// Device not provisioned.
    pub const NOT_PROVISIONED: u16 = 142;
    /// Policy refresh needed.
    pub const POLICY_REFRESH: u16 = 143;
    /// Invalid policy key.
    pub const INVALID_POLICY_KEY: u16 = 144;
    /// Account has no mailbox.
    pub const NO_MAILBOX: u16 = 177;
}

/// Interprets a collection-level sync status.
pub fn interpret(status: u16) -> StatusOutcome {
    use code::*;
    match status {
        SUCCESS => StatusOutcome::Success,
        BAD_SYNC_KEY | INVALID_SYNC_STATE | SYNC_STATE_CORRUPT => StatusOutcome::ResetCollection,
        SERVER_ERROR | RETRY | SERVER_ERROR_RETRY | TRANSIENT_FIRST..=TRANSIENT_LAST => {
            StatusOutcome::Retry {
                delay_hint: Some(RETRY_DELAY_HINT),
            }
        }
        CONFLICT => StatusOutcome::UpsyncConflict,
        OBJECT_NOT_FOUND | FOLDER_HIERARCHY_CHANGED => StatusOutcome::NeedsFolderRefresh,
        REMOTE_WIPE | NOT_PROVISIONED | POLICY_REFRESH | INVALID_POLICY_KEY => {
            StatusOutcome::NeedsProvisioning
        }
        other => StatusOutcome::Fatal(other),
    }
}

/// Folder hierarchy status codes.
pub mod folder_code {
    /// Success.
    pub const SUCCESS: u16 = 1;
    /// Server error.
    pub const SERVER_ERROR: u16 = 6;
    /// Invalid sync key.
    pub const INVALID_KEY: u16 = 9;
}

/// Interprets a FolderSync status.
///
/// The hierarchy has its own code space below 100. Codes from the shared
/// command range follow [`interpret`], except that anything which is not a
/// reset, a provisioning request or an access denial is retried.
pub fn interpret_folder(status: u16) -> StatusOutcome {
    match status {
        folder_code::SUCCESS => StatusOutcome::Success,
        folder_code::INVALID_KEY => StatusOutcome::ResetCollection,
        _ => match interpret(status) {
            StatusOutcome::ResetCollection if status >= 100 => StatusOutcome::ResetCollection,
            StatusOutcome::NeedsProvisioning => StatusOutcome::NeedsProvisioning,
            StatusOutcome::Fatal(code) if is_denied(code) => StatusOutcome::Fatal(code),
            _ => StatusOutcome::Retry { delay_hint: None },
        },
    }
}

/// Returns true for the access-denied command statuses.
pub fn is_denied(status: u16) -> bool {
    use code::*;
    matches!(
        status,
        ACCESS_DENIED_FIRST..=ACCESS_DENIED_LAST | DEVICE_QUARANTINED | LEGACY_DEVICE | NO_MAILBOX
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_table() {
        assert_eq!(interpret(1), StatusOutcome::Success);
        assert_eq!(interpret(3), StatusOutcome::ResetCollection);
        assert!(matches!(interpret(5), StatusOutcome::Retry { .. }));
        assert!(matches!(interpret(16), StatusOutcome::Retry { .. }));
        assert_eq!(interpret(7), StatusOutcome::UpsyncConflict);
        assert_eq!(interpret(8), StatusOutcome::NeedsFolderRefresh);
        assert_eq!(interpret(12), StatusOutcome::NeedsFolderRefresh);
        assert_eq!(interpret(4), StatusOutcome::Fatal(4));
        assert_eq!(interpret(255), StatusOutcome::Fatal(255));
    }

    #[test]
    fn command_status_classes() {
        for status in [134, 136] {
            assert_eq!(interpret(status), StatusOutcome::ResetCollection);
        }
        for status in [140, 142, 143, 144] {
            assert_eq!(interpret(status), StatusOutcome::NeedsProvisioning);
        }
        for status in [111, 132, 133] {
            assert!(matches!(interpret(status), StatusOutcome::Retry { .. }));
        }
        for status in [126, 130, 131, 139, 141, 177] {
            assert_eq!(interpret(status), StatusOutcome::Fatal(status));
            assert!(is_denied(status));
        }
    }

    #[test]
    fn folder_table() {
        assert_eq!(interpret_folder(1), StatusOutcome::Success);
        assert_eq!(interpret_folder(9), StatusOutcome::ResetCollection);
        assert_eq!(interpret_folder(134), StatusOutcome::ResetCollection);
        assert_eq!(interpret_folder(142), StatusOutcome::NeedsProvisioning);
        assert_eq!(interpret_folder(129), StatusOutcome::Fatal(129));
        assert_eq!(
            interpret_folder(6),
            StatusOutcome::Retry { delay_hint: None }
        );
        assert_eq!(
            interpret_folder(3),
            StatusOutcome::Retry { delay_hint: None }
        );
    }

    #[test]
    fn aborting_outcomes_become_errors() {
        assert!(StatusOutcome::Success.into_error(1).is_none());
        assert!(StatusOutcome::ResetCollection.into_error(3).is_none());
        assert!(matches!(
            interpret(142).into_error(142),
            Some(SyncError::NeedsProvisioning { status: 142 })
        ));
        assert!(matches!(
            interpret(99).into_error(99),
            Some(SyncError::Fatal { status: 99 })
        ));
    }
}
