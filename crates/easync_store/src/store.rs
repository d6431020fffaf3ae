//! Persistence boundary traits.

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::record::{MutationRecord, MutationResult, RowId, Selector};
use crate::value::{FieldValue, Values};

/// A transactional batch-apply service.
///
/// # Invariants
///
/// - A batch is applied atomically: either every record takes effect or none does
/// - Results are returned in record order, one per record
/// - A [`FieldValue::BackReference`]`(i)` resolves to the row id produced by
///   record `i` of the *same* call
/// - A batch the store cannot fit in one transaction fails with
///   [`crate::StoreError::SizeLimitExceeded`] and has no effect
pub trait BatchStore: Send + Sync {
    /// Applies `ops` atomically within `scope`.
    ///
    /// # Errors
    ///
    /// Returns `SizeLimitExceeded` if the batch is too large, or another error
    /// if it cannot be applied.
    fn apply_batch(&self, scope: &str, ops: Vec<MutationRecord>)
        -> StoreResult<Vec<MutationResult>>;
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Row id.
    pub id: RowId,
    /// Column values.
    pub values: Values,
}

impl Row {
    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    /// Get a text column.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_text)
    }

    /// Get an integer column.
    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(FieldValue::as_integer)
    }
}

/// Read access used when building mutations from local state.
pub trait RecordReader: Send + Sync {
    /// Returns the rows of `table` in `scope` matched by `selector`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find(&self, scope: &str, table: &str, selector: &Selector) -> StoreResult<Vec<Row>>;
}
