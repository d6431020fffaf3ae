//! Session state shared with the supervisor.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Mutable session fields guarded by the session lock.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Set by the supervisor to tear the session down.
    pub stopped: bool,
    /// Server-side changes seen in the current cycle.
    pub change_count: u32,
    /// The server rejected locally-originated changes.
    pub upsync_failed: bool,
    /// A full hierarchy resync was requested.
    pub folder_refresh_requested: bool,
}

/// A cloneable handle on one sync session.
///
/// The supervisor and the engine both hold a handle. The executor checks
/// the stop flag with the lock held and keeps it held for the commit, so a
/// concurrent [`Session::stop`] either lands before the check or waits for
/// the commit to finish.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Creates a running session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the session. Blocks while a commit is in flight.
    pub fn stop(&self) {
        self.inner.lock().stopped = true;
    }

    /// Returns true once [`Session::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Locks the session.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock()
    }

    /// Counts server-side changes.
    pub fn add_changes(&self, count: u32) {
        let mut state = self.inner.lock();
        state.change_count = state.change_count.saturating_add(count);
    }

    /// Server-side changes counted so far.
    pub fn change_count(&self) -> u32 {
        self.inner.lock().change_count
    }

    /// Resets the change counter.
    pub fn reset_changes(&self) {
        self.inner.lock().change_count = 0;
    }

    /// Records whether local changes were rejected.
    pub fn set_upsync_failed(&self, failed: bool) {
        self.inner.lock().upsync_failed = failed;
    }

    /// Returns true if local changes were rejected.
    pub fn upsync_failed(&self) -> bool {
        self.inner.lock().upsync_failed
    }

    /// Asks the supervisor for a full folder hierarchy resync.
    pub fn request_folder_refresh(&self) {
        self.inner.lock().folder_refresh_requested = true;
    }

    /// Returns and clears the folder refresh request.
    pub fn take_folder_refresh(&self) -> bool {
        std::mem::take(&mut self.inner.lock().folder_refresh_requested)
    }
}
