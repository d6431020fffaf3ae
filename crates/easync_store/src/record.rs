//! Mutation records and their results.

use serde::{Deserialize, Serialize};

use crate::value::{FieldValue, Values};

/// Store-assigned row identifier.
pub type RowId = u64;

/// Rows a mutation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// A single row by id.
    Id(RowId),
    /// Rows whose columns equal all of the given values. Empty matches all rows.
    Where(Vec<(String, FieldValue)>),
}

impl Selector {
    /// Shorthand for a single-column equality selector.
    pub fn field(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Selector::Where(vec![(column.into(), value.into())])
    }

    /// Selector matching every row of a table.
    pub fn all() -> Self {
        Selector::Where(Vec::new())
    }

    /// Add another equality condition.
    #[must_use]
    pub fn and(self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        match self {
            Selector::Id(id) => Selector::Id(id),
            Selector::Where(mut conditions) => {
                conditions.push((column.into(), value.into()));
                Selector::Where(conditions)
            }
        }
    }

    /// Returns true if a row with `id` and `values` is selected.
    pub fn matches(&self, id: RowId, values: &Values) -> bool {
        match self {
            Selector::Id(wanted) => *wanted == id,
            Selector::Where(conditions) => conditions
                .iter()
                .all(|(column, value)| values.get(column).unwrap_or(&FieldValue::Null) == value),
        }
    }
}

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationRecord {
    /// Insert a new row.
    Insert {
        /// Target table.
        table: String,
        /// Column values.
        values: Values,
    },
    /// Overwrite columns of the selected rows.
    Update {
        /// Target table.
        table: String,
        /// Rows to update.
        selector: Selector,
        /// Columns to set.
        values: Values,
    },
    /// Delete the selected rows.
    Delete {
        /// Target table.
        table: String,
        /// Rows to delete.
        selector: Selector,
    },
}

impl MutationRecord {
    /// An insert with no columns yet.
    pub fn insert(table: impl Into<String>) -> Self {
        MutationRecord::Insert {
            table: table.into(),
            values: Values::new(),
        }
    }

    /// An update with no columns yet.
    pub fn update(table: impl Into<String>, selector: Selector) -> Self {
        MutationRecord::Update {
            table: table.into(),
            selector,
            values: Values::new(),
        }
    }

    /// A delete.
    pub fn delete(table: impl Into<String>, selector: Selector) -> Self {
        MutationRecord::Delete {
            table: table.into(),
            selector,
        }
    }

    /// Set a column value. No-op on deletes.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column value in place. No-op on deletes.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        match self {
            MutationRecord::Insert { values, .. } | MutationRecord::Update { values, .. } => {
                values.insert(column.into(), value.into());
            }
            MutationRecord::Delete { .. } => {}
        }
    }

    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            MutationRecord::Insert { table, .. }
            | MutationRecord::Update { table, .. }
            | MutationRecord::Delete { table, .. } => table,
        }
    }

    /// Column values, if any.
    pub fn values(&self) -> Option<&Values> {
        match self {
            MutationRecord::Insert { values, .. } | MutationRecord::Update { values, .. } => {
                Some(values)
            }
            MutationRecord::Delete { .. } => None,
        }
    }

    /// Batch indices this record back-references.
    pub fn back_references(&self) -> Vec<usize> {
        let mut refs: Vec<usize> = self
            .values()
            .into_iter()
            .flat_map(|values| values.values())
            .filter_map(FieldValue::as_back_reference)
            .collect();
        if let MutationRecord::Update { selector, .. } | MutationRecord::Delete { selector, .. } =
            self
        {
            if let Selector::Where(conditions) = selector {
                refs.extend(conditions.iter().filter_map(|(_, v)| v.as_back_reference()));
            }
        }
        refs
    }

    /// Rough payload size, used by byte-bounded stores.
    pub fn estimated_size(&self) -> usize {
        let values: usize = self
            .values()
            .map(|values| {
                values
                    .iter()
                    .map(|(column, value)| column.len() + value.estimated_size())
                    .sum()
            })
            .unwrap_or(0);
        self.table().len() + values
    }
}

/// Outcome of one applied record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutationResult {
    /// Id of the inserted row, for inserts.
    pub row_id: Option<RowId>,
    /// Rows touched.
    pub affected: usize,
}

impl MutationResult {
    /// Result of an insert.
    pub fn inserted(row_id: RowId) -> Self {
        Self {
            row_id: Some(row_id),
            affected: 1,
        }
    }

    /// Result of an update or delete.
    pub fn affected(affected: usize) -> Self {
        Self {
            row_id: None,
            affected,
        }
    }
}
