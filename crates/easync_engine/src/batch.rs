//! Mutation batches and the splitting executor.
//!
//! A [`Batch`] is an ordered list of pending mutations with optional
//! separator markers. [`BatchExecutor::execute`] tries to commit the whole
//! batch in one transaction. When the store reports that the transaction is
//! too large, the batch is committed in pieces:
//!
//! 1. split at the separators, keeping order
//! 2. any piece that is still too large is halved at a point no
//!    back-reference crosses, recursively
//! 3. a single entry that does not fit is fatal
//!
//! Deferred entries hold the absolute offset of the entry they reference.
//! The offset is rebased onto the first entry of the piece actually sent,
//! which is only known at that point.

use std::sync::Arc;

use easync_store::{BatchStore, FieldValue, MutationRecord, MutationResult};
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecError, ExecResult};
use crate::session::Session;

/// A write waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    /// A complete record.
    ///
    /// Ready records are sent as-is and must not carry back-references of
    /// their own, since those could not be rebased.
    Ready(MutationRecord),
    /// A record one of whose columns is the row id produced by an earlier
    /// entry of the same batch.
    Deferred {
        /// Record without the referencing column.
        template: MutationRecord,
        /// Column receiving the row id.
        field: String,
        /// Batch offset of the referenced entry.
        recorded_offset: usize,
    },
}

impl PendingMutation {
    /// Offset this entry depends on, if any.
    pub fn dependency(&self) -> Option<usize> {
        match self {
            PendingMutation::Ready(_) => None,
            PendingMutation::Deferred {
                recorded_offset, ..
            } => Some(*recorded_offset),
        }
    }

    /// Produces the record to send for entry `offset` of a sub-batch that
    /// starts at `start`.
    pub fn resolve(&self, offset: usize, start: usize) -> ExecResult<MutationRecord> {
        match self {
            PendingMutation::Ready(record) => Ok(record.clone()),
            PendingMutation::Deferred {
                template,
                field,
                recorded_offset,
            } => {
                if *recorded_offset < start || *recorded_offset >= offset {
                    return Err(ExecError::DanglingBackReference {
                        offset,
                        target: *recorded_offset,
                        start,
                    });
                }
                let mut record = template.clone();
                record.set(
                    field.clone(),
                    FieldValue::BackReference(recorded_offset - start),
                );
                Ok(record)
            }
        }
    }
}

/// One position in a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    /// A mutation.
    Mutation(PendingMutation),
    /// A point where the batch may be split.
    Separator,
}

/// An ordered list of pending mutations.
///
/// Offsets count mutations only, separators do not take one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
    mutations: usize,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a ready record and returns its offset.
    pub fn push(&mut self, record: MutationRecord) -> usize {
        self.push_mutation(PendingMutation::Ready(record))
    }

    /// Appends a record whose `field` is the row id of entry `target`, and
    /// returns its offset.
    pub fn push_deferred(
        &mut self,
        template: MutationRecord,
        field: impl Into<String>,
        target: usize,
    ) -> usize {
        self.push_mutation(PendingMutation::Deferred {
            template,
            field: field.into(),
            recorded_offset: target,
        })
    }

    /// Appends a pending mutation and returns its offset.
    pub fn push_mutation(&mut self, mutation: PendingMutation) -> usize {
        let offset = self.mutations;
        self.entries.push(BatchEntry::Mutation(mutation));
        self.mutations += 1;
        offset
    }

    /// Marks a safe split point.
    pub fn separator(&mut self) {
        self.entries.push(BatchEntry::Separator);
    }

    /// Offset the next mutation will get.
    pub fn next_offset(&self) -> usize {
        self.mutations
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.mutations
    }

    /// Returns true if the batch has no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations == 0
    }

    /// Entries in order, separators included.
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Appends all entries of `other`, shifting its back-references.
    pub fn extend(&mut self, other: Batch) {
        let base = self.mutations;
        for entry in other.entries {
            match entry {
                BatchEntry::Separator => self.separator(),
                BatchEntry::Mutation(PendingMutation::Deferred {
                    template,
                    field,
                    recorded_offset,
                }) => {
                    self.push_deferred(template, field, recorded_offset + base);
                }
                BatchEntry::Mutation(mutation) => {
                    self.push_mutation(mutation);
                }
            }
        }
    }

    /// Splits into the mutations and the offsets where separators stood.
    ///
    /// Cuts are sorted and unique, and never 0 or `len`: leading, trailing
    /// and repeated separators add nothing.
    pub fn into_parts(self) -> (Vec<PendingMutation>, Vec<usize>) {
        let mut mutations = Vec::with_capacity(self.mutations);
        let mut cuts = Vec::new();
        for entry in self.entries {
            match entry {
                BatchEntry::Mutation(mutation) => mutations.push(mutation),
                BatchEntry::Separator => {
                    let at = mutations.len();
                    if at > 0 && at < self.mutations && cuts.last() != Some(&at) {
                        cuts.push(at);
                    }
                }
            }
        }
        (mutations, cuts)
    }
}

/// Commits batches, splitting them when the store says they are too large.
///
/// Once a piece commits its effects are permanent even if a later piece
/// fails, so the code that built the batch must tolerate re-running.
pub struct BatchExecutor {
    store: Arc<dyn BatchStore>,
    session: Session,
    scope: String,
    config: ExecutorConfig,
}

enum Applied {
    Committed,
    Stopped,
}

impl BatchExecutor {
    /// Creates an executor writing into `scope`.
    pub fn new(store: Arc<dyn BatchStore>, session: Session, scope: impl Into<String>) -> Self {
        Self {
            store,
            session,
            scope: scope.into(),
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the executor configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Store scope written to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Commits `batch` and returns one result per mutation, in batch order.
    ///
    /// Returns an empty vector without writing anything further if the
    /// session is stopped before a commit.
    pub fn execute(&self, batch: Batch) -> ExecResult<Vec<MutationResult>> {
        let (mutations, cuts) = batch.into_parts();
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        let len = mutations.len();
        let mut results = vec![MutationResult::default(); len];

        let applied = match self.apply(&mutations, 0, len, &mut results) {
            Err(ExecError::Store(err)) if err.is_size_limit() => {
                warn!(scope = %self.scope, ops = len, pieces = cuts.len() + 1, "batch too large, splitting");
                self.commit_pieces(&mutations, &cuts, &mut results)?
            }
            other => other?,
        };

        match applied {
            Applied::Committed => Ok(results),
            Applied::Stopped => Ok(Vec::new()),
        }
    }

    fn commit_pieces(
        &self,
        mutations: &[PendingMutation],
        cuts: &[usize],
        results: &mut [MutationResult],
    ) -> ExecResult<Applied> {
        if cuts.is_empty() {
            return self.halve(mutations, 0, mutations.len(), 1, results);
        }
        let bounds: Vec<usize> = std::iter::once(0)
            .chain(cuts.iter().copied())
            .chain(std::iter::once(mutations.len()))
            .collect();
        for piece in bounds.windows(2) {
            if let Applied::Stopped = self.commit_range(mutations, piece[0], piece[1], 0, results)? {
                return Ok(Applied::Stopped);
            }
        }
        Ok(Applied::Committed)
    }

    fn commit_range(
        &self,
        mutations: &[PendingMutation],
        start: usize,
        end: usize,
        depth: usize,
        results: &mut [MutationResult],
    ) -> ExecResult<Applied> {
        match self.apply(mutations, start, end, results) {
            Err(ExecError::Store(err)) if err.is_size_limit() => {
                self.halve(mutations, start, end, depth + 1, results)
            }
            other => other,
        }
    }

    fn halve(
        &self,
        mutations: &[PendingMutation],
        start: usize,
        end: usize,
        depth: usize,
        results: &mut [MutationResult],
    ) -> ExecResult<Applied> {
        if end - start <= 1 {
            return Err(ExecError::TransactionTooLarge { offset: start });
        }
        if depth > self.config.max_split_depth {
            return Err(ExecError::SplitDepthExceeded { depth });
        }
        let cut = safe_cut(mutations, start, end).ok_or(ExecError::Unsplittable {
            start,
            len: end - start,
        })?;
        warn!(scope = %self.scope, offset = start, ops = end - start, cut, depth, "halving sub-batch");

        if let Applied::Stopped = self.commit_range(mutations, start, cut, depth, results)? {
            return Ok(Applied::Stopped);
        }
        self.commit_range(mutations, cut, end, depth, results)
    }

    /// Sends `mutations[start..end]` as one transaction.
    fn apply(
        &self,
        mutations: &[PendingMutation],
        start: usize,
        end: usize,
        results: &mut [MutationResult],
    ) -> ExecResult<Applied> {
        let ops = mutations[start..end]
            .iter()
            .enumerate()
            .map(|(i, mutation)| mutation.resolve(start + i, start))
            .collect::<ExecResult<Vec<_>>>()?;

        let session = self.session.lock();
        if session.stopped {
            debug!(scope = %self.scope, offset = start, "session stopped, skipping commit");
            return Ok(Applied::Stopped);
        }
        let applied = self.store.apply_batch(&self.scope, ops);
        drop(session);

        let applied = applied?;
        if applied.len() != end - start {
            return Err(ExecError::ResultCountMismatch {
                expected: end - start,
                actual: applied.len(),
            });
        }
        results[start..end].copy_from_slice(&applied);
        debug!(scope = %self.scope, offset = start, ops = end - start, "sub-batch committed");
        Ok(Applied::Committed)
    }
}

/// The cut in `(start, end)` nearest the midpoint that no back-reference
/// crosses.
///
/// A cut `c` is safe when every entry at or after `c` references nothing
/// before `c`.
fn safe_cut(mutations: &[PendingMutation], start: usize, end: usize) -> Option<usize> {
    let mut suffix_min = vec![usize::MAX; end - start + 1];
    for offset in (start..end).rev() {
        let own = mutations[offset].dependency().unwrap_or(usize::MAX);
        suffix_min[offset - start] = own.min(suffix_min[offset - start + 1]);
    }
    let mid = start + (end - start) / 2;
    (start + 1..end)
        .filter(|&cut| suffix_min[cut - start] >= cut)
        .min_by_key(|&cut| cut.abs_diff(mid))
}
