//! In-memory store for testing.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{MutationRecord, MutationResult, RowId, Selector};
use crate::store::{BatchStore, RecordReader, Row};
use crate::value::{FieldValue, Values};

/// Transaction size limit enforced by [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeLimit {
    /// Any batch fits.
    #[default]
    Unlimited,
    /// At most this many records per batch.
    Operations(usize),
    /// At most this many estimated payload bytes per batch.
    Bytes(usize),
}

impl SizeLimit {
    fn admits(self, ops: usize, bytes: usize) -> bool {
        match self {
            SizeLimit::Unlimited => true,
            SizeLimit::Operations(max) => ops <= max,
            SizeLimit::Bytes(max) => bytes <= max,
        }
    }
}

type Tables = BTreeMap<String, BTreeMap<RowId, Values>>;

#[derive(Debug, Default)]
struct Inner {
    scopes: BTreeMap<String, Tables>,
    next_id: RowId,
    limit: SizeLimit,
    commits: Vec<usize>,
    rejected: usize,
    fail_after: Option<usize>,
}

/// An in-memory [`BatchStore`].
///
/// Each batch is applied to a copy of the scope's tables and swapped in on
/// success, so a failing batch leaves no trace. Row ids are unique across
/// all scopes and never reused.
///
/// # Example
///
/// ```rust
/// use easync_store::{BatchStore, MemoryStore, MutationRecord, FieldValue, SizeLimit, StoreError};
///
/// let store = MemoryStore::with_limit(SizeLimit::Operations(2));
/// let ops = vec![
///     MutationRecord::insert("messages").with("subject", "hi"),
///     MutationRecord::insert("bodies").with("message_key", FieldValue::BackReference(0)),
/// ];
/// let results = store.apply_batch("acct", ops.clone()).unwrap();
/// assert_eq!(results.len(), 2);
///
/// let mut three = ops;
/// three.push(MutationRecord::insert("messages"));
/// assert!(matches!(
///     store.apply_batch("acct", three),
///     Err(StoreError::SizeLimitExceeded { ops: 3, .. })
/// ));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given size limit.
    #[must_use]
    pub fn with_limit(limit: SizeLimit) -> Self {
        let store = Self::new();
        store.set_limit(limit);
        store
    }

    /// Changes the size limit.
    pub fn set_limit(&self, limit: SizeLimit) {
        self.inner.lock().limit = limit;
    }

    /// Makes the batch after the next `commits` successful ones fail with
    /// [`StoreError::Unavailable`].
    pub fn fail_after(&self, commits: usize) {
        self.inner.lock().fail_after = Some(commits);
    }

    /// Returns the rows of a table in id order.
    #[must_use]
    pub fn rows(&self, scope: &str, table: &str) -> Vec<Row> {
        let inner = self.inner.lock();
        inner
            .scopes
            .get(scope)
            .and_then(|tables| tables.get(table))
            .map(|rows| {
                rows.iter()
                    .map(|(id, values)| Row {
                        id: *id,
                        values: values.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of rows in a table.
    #[must_use]
    pub fn count(&self, scope: &str, table: &str) -> usize {
        let inner = self.inner.lock();
        inner
            .scopes
            .get(scope)
            .and_then(|tables| tables.get(table))
            .map_or(0, BTreeMap::len)
    }

    /// Record counts of the batches committed so far, in order.
    #[must_use]
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.inner.lock().commits.clone()
    }

    /// Number of batches rejected for size.
    #[must_use]
    pub fn rejected_batches(&self) -> usize {
        self.inner.lock().rejected
    }

    /// Removes all data and statistics. The size limit is kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let limit = inner.limit;
        *inner = Inner {
            limit,
            ..Inner::default()
        };
    }
}

impl BatchStore for MemoryStore {
    fn apply_batch(
        &self,
        scope: &str,
        ops: Vec<MutationRecord>,
    ) -> StoreResult<Vec<MutationResult>> {
        let mut inner = self.inner.lock();

        let count = ops.len();
        let bytes: usize = ops.iter().map(MutationRecord::estimated_size).sum();
        if !inner.limit.admits(count, bytes) {
            inner.rejected += 1;
            debug!(scope, ops = count, bytes, "batch rejected for size");
            return Err(StoreError::SizeLimitExceeded { ops: count, bytes });
        }

        match inner.fail_after.take() {
            Some(0) => {
                return Err(StoreError::Unavailable("injected failure".into()));
            }
            Some(n) => inner.fail_after = Some(n - 1),
            None => {}
        }

        let mut tables = inner.scopes.get(scope).cloned().unwrap_or_default();
        let mut next_id = inner.next_id;
        let mut results: Vec<MutationResult> = Vec::with_capacity(count);

        for (index, op) in ops.into_iter().enumerate() {
            let result = match resolve(index, op, &results)? {
                MutationRecord::Insert { table, values } => {
                    next_id += 1;
                    tables.entry(table).or_default().insert(next_id, values);
                    MutationResult::inserted(next_id)
                }
                MutationRecord::Update {
                    table,
                    selector,
                    values,
                } => {
                    let mut affected = 0;
                    if let Some(rows) = tables.get_mut(&table) {
                        for (id, row) in rows.iter_mut() {
                            if selector.matches(*id, row) {
                                row.extend(values.clone());
                                affected += 1;
                            }
                        }
                    }
                    MutationResult::affected(affected)
                }
                MutationRecord::Delete { table, selector } => {
                    let mut affected = 0;
                    if let Some(rows) = tables.get_mut(&table) {
                        let before = rows.len();
                        rows.retain(|id, row| !selector.matches(*id, row));
                        affected = before - rows.len();
                    }
                    MutationResult::affected(affected)
                }
            };
            results.push(result);
        }

        inner.scopes.insert(scope.to_string(), tables);
        inner.next_id = next_id;
        inner.commits.push(count);
        debug!(scope, ops = count, "batch applied");
        Ok(results)
    }
}

impl RecordReader for MemoryStore {
    fn find(&self, scope: &str, table: &str, selector: &Selector) -> StoreResult<Vec<Row>> {
        Ok(self
            .rows(scope, table)
            .into_iter()
            .filter(|row| selector.matches(row.id, &row.values))
            .collect())
    }
}

/// Replaces back-references in `op` with the row ids they point at.
fn resolve(
    index: usize,
    mut op: MutationRecord,
    results: &[MutationResult],
) -> StoreResult<MutationRecord> {
    let lookup = |target: usize| -> StoreResult<FieldValue> {
        results
            .get(target)
            .and_then(|r| r.row_id)
            .map(FieldValue::from)
            .ok_or(StoreError::InvalidBackReference { index, target })
    };

    match &mut op {
        MutationRecord::Insert { values, .. } => resolve_values(values, &lookup)?,
        MutationRecord::Update {
            selector, values, ..
        } => {
            resolve_values(values, &lookup)?;
            resolve_selector(selector, &lookup)?;
        }
        MutationRecord::Delete { selector, .. } => resolve_selector(selector, &lookup)?,
    }
    Ok(op)
}

fn resolve_values(
    values: &mut Values,
    lookup: &impl Fn(usize) -> StoreResult<FieldValue>,
) -> StoreResult<()> {
    for value in values.values_mut() {
        if let FieldValue::BackReference(target) = value {
            *value = lookup(*target)?;
        }
    }
    Ok(())
}

fn resolve_selector(
    selector: &mut Selector,
    lookup: &impl Fn(usize) -> StoreResult<FieldValue>,
) -> StoreResult<()> {
    if let Selector::Where(conditions) = selector {
        for (_, value) in conditions.iter_mut() {
            if let FieldValue::BackReference(target) = value {
                *value = lookup(*target)?;
            }
        }
    }
    Ok(())
}
