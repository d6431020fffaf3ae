//! Configuration for the sync engine.

use std::time::Duration;

/// Protocol version 2.5.
pub const PROTOCOL_2_5: f32 = 2.5;
/// Protocol version 12.0 (Exchange 2007).
pub const PROTOCOL_12_0: f32 = 12.0;
/// Protocol version 12.1 (Exchange 2007 SP1).
pub const PROTOCOL_12_1: f32 = 12.1;
/// Protocol version 14.0 (Exchange 2010).
pub const PROTOCOL_14_0: f32 = 14.0;

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Negotiated protocol version.
    pub protocol_version: f32,
    /// Transport timeout for ordinary passes.
    pub timeout: Duration,
    /// Transport timeout while the sync key is `"0"`.
    pub initial_timeout: Duration,
    /// Items the server may return per pass.
    pub window_size: u32,
    /// Body truncation size for protocol 12.0 and later.
    pub truncation_size: u32,
    /// MIME truncation size for protocol 2.5.
    pub mime_truncation_size: u32,
    /// Consecutive looping passes the driver tolerates.
    pub max_looping_passes: u32,
    /// Whether the account is configured for push.
    pub account_push: bool,
}

impl SyncConfig {
    /// Creates a configuration for the given protocol version.
    pub fn new(protocol_version: f32) -> Self {
        Self {
            protocol_version,
            timeout: Duration::from_secs(30),
            initial_timeout: Duration::from_secs(120),
            window_size: 5,
            truncation_size: 200_000,
            mime_truncation_size: 100_000,
            max_looping_passes: 100,
            account_push: false,
        }
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the initial-sync transport timeout.
    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Sets the window size.
    pub fn with_window_size(mut self, size: u32) -> Self {
        self.window_size = size;
        self
    }

    /// Sets the body truncation size.
    pub fn with_truncation_size(mut self, size: u32) -> Self {
        self.truncation_size = size;
        self
    }

    /// Sets the looping pass limit.
    pub fn with_max_looping_passes(mut self, passes: u32) -> Self {
        self.max_looping_passes = passes;
        self
    }

    /// Marks the account as push-enabled.
    pub fn with_account_push(mut self, push: bool) -> Self {
        self.account_push = push;
        self
    }

    /// Returns true if the negotiated version is at least `version`.
    pub fn supports(&self, version: f32) -> bool {
        self.protocol_version >= version
    }

    /// Timeout to use for a pass.
    pub fn timeout_for(&self, initial_sync: bool) -> Duration {
        if initial_sync {
            self.initial_timeout
        } else {
            self.timeout
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(PROTOCOL_14_0)
    }
}

/// Configuration for the batch executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// How many times a sub-batch may be halved before giving up.
    pub max_split_depth: usize,
}

impl ExecutorConfig {
    /// Sets the split depth limit.
    pub fn with_max_split_depth(mut self, depth: usize) -> Self {
        self.max_split_depth = depth;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_split_depth: 16,
        }
    }
}
