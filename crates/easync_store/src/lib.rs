//! # easync store
//!
//! The persistence boundary of the sync engine.
//!
//! The engine never talks to a database directly. It hands ordered
//! [`MutationRecord`] batches to a [`BatchStore`], which applies each batch
//! as one transaction and may refuse a batch that is too large. Records can
//! refer to rows inserted earlier in the same batch through
//! [`FieldValue::BackReference`].
//!
//! [`MemoryStore`] is the reference implementation used by tests, with a
//! configurable [`SizeLimit`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod record;
mod store;
mod value;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, SizeLimit};
pub use record::{MutationRecord, MutationResult, RowId, Selector};
pub use store::{BatchStore, RecordReader, Row};
pub use value::{FieldValue, Values};
