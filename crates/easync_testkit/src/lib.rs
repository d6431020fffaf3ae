//! # easync testkit
//!
//! Test utilities for the easync workspace.
//!
//! This crate provides:
//! - Response fixtures built with the real encoder
//! - Store seeding helpers for mailboxes and local changes
//! - Property-based test generators using proptest
//! - Fuzz harnesses for the decoder and the sync pass
//! - A scripted transport that records requests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use easync_testkit::prelude::*;
//!
//! #[test]
//! fn first_sync() {
//!     let body = SyncResponse::new("A1").add(MessageFixture::new("1:1")).build();
//!     let transport = ScriptedTransport::new().respond(body);
//!     // ... run a pass
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::init_test_logging;
    pub use crate::transport::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use transport::*;

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
