//! # easync engine
//!
//! The sync engine of the easync mailbox sync client.
//!
//! This crate provides:
//! - The per-collection cursor ([`CollectionSyncState`]) and the pass state
//!   machine that advances it ([`SyncEngine`])
//! - Server status interpretation ([`status`])
//! - The batch executor that commits a pass and splits it when the store
//!   refuses a transaction ([`BatchExecutor`])
//! - The collection variants for mail and the folder hierarchy ([`collection`])
//! - A transport abstraction with a scripted mock ([`Transport`], [`MockTransport`])
//!
//! ## A pass
//!
//! 1. Build the request from the current sync key, options and local changes
//! 2. Send it and parse the response into variant-owned pending changes
//! 3. Turn the changes and the next cursor into one [`Batch`]
//! 4. Commit the batch; the cursor is only replaced once it is stored
//!
//! ## Key Invariants
//!
//! - A parsed sync key is only kept when the response status is success
//! - Server state and the cursor that acknowledges it are committed together
//! - A split batch never separates a record from the record it refers to
//! - A stopped session commits nothing more

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
pub mod collection;
mod config;
mod error;
mod session;
mod state;
pub mod status;
mod transport;

pub use batch::{Batch, BatchEntry, BatchExecutor, PendingMutation};
pub use collection::{CollectionVariant, EmailCollection, FolderHierarchy, MailboxInfo, MailboxType};
pub use config::{
    ExecutorConfig, SyncConfig, PROTOCOL_12_0, PROTOCOL_12_1, PROTOCOL_14_0, PROTOCOL_2_5,
};
pub use error::{ExecError, ExecResult, SyncError, SyncResult};
pub use session::{Session, SessionState};
pub use state::{
    CollectionSyncState, Lookback, PassOutcome, PassState, SyncEngine, SyncInterval, SyncKey,
    SyncSummary,
};
pub use status::StatusOutcome;
pub use transport::{MockTransport, RecordedRequest, Response, Transport};
