//! # Insert/Delete Versions
//!
//! `VersionInfo` decides which rows of a node group exist for a reader. Each
//! 2048-row vector records who inserted and who deleted every row:
//!
//! ```text
//! vectors[i]: None                       every row committed long ago, none deleted
//!             Some(VectorVersions {
//!                 inserted: Uniform(v) | PerRow([v; 2048]),
//!                 deleted:  None | Uniform(v) | PerRow([v | NOT_DELETED; 2048]),
//!             })
//! ```
//!
//! A bulk append by one transaction stays `Uniform`; a second writer in the
//! same vector or a first delete materializes the per-row array.
//! `finalize_status` folds fully committed vectors back into the compact forms.
//!
//! Versions follow the transaction convention: values below
//! `TRANSACTION_ID_START` are commit timestamps, values at or above are live
//! transaction ids. Rolled-back inserts carry `ABORTED_INSERT`, which no reader
//! can see.

use eyre::{ensure, Result};
use tracing::trace;

use crate::config::{DEFAULT_VECTOR_CAPACITY, DEFAULT_VECTOR_CAPACITY_LOG2};
use crate::encoding::{Deserializer, Serializer};

use super::transaction::{is_committed_version, ReadContext, TxnId, WriteCheckResult};
use super::WriteConflictError;

pub const NOT_DELETED: TxnId = u64::MAX;
pub const ABORTED_INSERT: TxnId = u64::MAX - 1;

const VECTOR: usize = DEFAULT_VECTOR_CAPACITY as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Versions {
    Uniform(TxnId),
    PerRow(Box<[TxnId]>),
}

impl Versions {
    fn get(&self, row: usize) -> TxnId {
        match self {
            Versions::Uniform(v) => *v,
            Versions::PerRow(rows) => rows[row],
        }
    }

    fn rows_mut(&mut self) -> &mut [TxnId] {
        if let Versions::Uniform(v) = *self {
            *self = Versions::PerRow(vec![v; VECTOR].into_boxed_slice());
        }
        match self {
            Versions::PerRow(rows) => rows,
            Versions::Uniform(_) => unreachable!("materialized above"),
        }
    }

    fn set_range(&mut self, start: usize, end: usize, version: TxnId) {
        if let Versions::Uniform(v) = self {
            if *v == version {
                return;
            }
        }
        self.rows_mut()[start..end].fill(version);
    }

    fn replace(&mut self, start: usize, end: usize, from: TxnId, to: TxnId) -> usize {
        match self {
            Versions::Uniform(v) if *v == from => {
                *v = to;
                end - start
            }
            Versions::Uniform(_) => 0,
            Versions::PerRow(rows) => {
                let mut n = 0;
                for slot in &mut rows[start..end] {
                    if *slot == from {
                        *slot = to;
                        n += 1;
                    }
                }
                n
            }
        }
    }

    fn compact(&mut self, num_rows: usize) {
        if let Versions::PerRow(rows) = self {
            let first = rows[0];
            if rows[..num_rows].iter().all(|&v| v == first) {
                *self = Versions::Uniform(first);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VectorVersions {
    inserted: Versions,
    deleted: Option<Versions>,
}

impl VectorVersions {
    fn committed(version: TxnId) -> Self {
        Self {
            inserted: Versions::Uniform(version),
            deleted: None,
        }
    }

    fn delete_version(&self, row: usize) -> TxnId {
        self.deleted.as_ref().map_or(NOT_DELETED, |d| d.get(row))
    }

    fn deleted_mut(&mut self) -> &mut Versions {
        self.deleted.get_or_insert(Versions::Uniform(NOT_DELETED))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    vectors: Vec<Option<VectorVersions>>,
}

fn split(row: u64) -> (usize, usize) {
    (
        (row >> DEFAULT_VECTOR_CAPACITY_LOG2) as usize,
        (row & (DEFAULT_VECTOR_CAPACITY - 1)) as usize,
    )
}

/// Visits `[start, start + num_rows)` one vector slice at a time as
/// `(vector_idx, first_row_in_vector, end_row_in_vector, offset_from_start)`.
fn for_each_vector(start: u64, num_rows: u64, mut f: impl FnMut(usize, usize, usize, u64)) {
    let mut row = start;
    let end = start + num_rows;
    while row < end {
        let (vector_idx, in_vector) = split(row);
        let n = ((VECTOR - in_vector) as u64).min(end - row) as usize;
        f(vector_idx, in_vector, in_vector + n, row - start);
        row += n as u64;
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    fn vector(&self, vector_idx: usize) -> Option<&VectorVersions> {
        self.vectors.get(vector_idx).and_then(|v| v.as_ref())
    }

    fn vector_mut(&mut self, vector_idx: usize) -> &mut VectorVersions {
        if self.vectors.len() <= vector_idx {
            self.vectors.resize(vector_idx + 1, None);
        }
        self.vectors[vector_idx].get_or_insert_with(|| VectorVersions::committed(0))
    }

    /// Marks `num_rows` rows from `start_row` as inserted by `version`.
    pub fn append(&mut self, version: TxnId, start_row: u64, num_rows: u64) {
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if self.vectors.len() <= vector_idx {
                self.vectors.resize(vector_idx + 1, None);
            }
            let slot = &mut self.vectors[vector_idx];
            if slot.is_none() && start == 0 {
                *slot = Some(VectorVersions::committed(version));
                return;
            }
            let vector = slot.get_or_insert_with(|| VectorVersions::committed(0));
            vector.inserted.set_range(start, end, version);
            if let Some(deleted) = vector.deleted.as_mut() {
                deleted.set_range(start, end, NOT_DELETED);
            }
        });
    }

    pub fn insert_version(&self, row: u64) -> TxnId {
        let (vector_idx, in_vector) = split(row);
        self.vector(vector_idx).map_or(0, |v| v.inserted.get(in_vector))
    }

    pub fn delete_version(&self, row: u64) -> TxnId {
        let (vector_idx, in_vector) = split(row);
        self.vector(vector_idx)
            .map_or(NOT_DELETED, |v| v.delete_version(in_vector))
    }

    pub fn is_inserted(&self, ctx: ReadContext, row: u64) -> bool {
        ctx.is_visible(self.insert_version(row))
    }

    pub fn is_deleted(&self, ctx: ReadContext, row: u64) -> bool {
        let version = self.delete_version(row);
        version != NOT_DELETED && ctx.is_visible(version)
    }

    pub fn is_visible(&self, ctx: ReadContext, row: u64) -> bool {
        self.is_inserted(ctx, row) && !self.is_deleted(ctx, row)
    }

    /// Deletes `row` on behalf of `ctx`. Returns false if the row is already
    /// deleted from `ctx`'s point of view.
    pub fn delete(&mut self, ctx: ReadContext, row: u64) -> Result<bool> {
        ensure!(
            self.is_inserted(ctx, row),
            "row {} is not visible to the deleting transaction",
            row
        );
        let version = ctx.txn_id().unwrap_or(0);
        let (vector_idx, in_vector) = split(row);
        let vector = self.vector_mut(vector_idx);
        let existing = vector.delete_version(in_vector);
        if existing != NOT_DELETED {
            return match ctx.can_write(existing) {
                WriteCheckResult::CanWrite => Ok(false),
                _ => Err(WriteConflictError {
                    vector_idx: vector_idx as u64,
                    row_in_vector: in_vector as u64,
                    conflicting_version: existing,
                }
                .into()),
            };
        }
        vector.deleted_mut().rows_mut()[in_vector] = version;
        trace!(row, version, "deleted row");
        Ok(true)
    }

    /// Copies a delete version verbatim (merging groups).
    pub(crate) fn set_delete_version(&mut self, row: u64, version: TxnId) {
        let (vector_idx, in_vector) = split(row);
        self.vector_mut(vector_idx).deleted_mut().rows_mut()[in_vector] = version;
    }

    pub fn commit_insert(&mut self, start_row: u64, num_rows: u64, txn_id: TxnId, commit_ts: TxnId) -> usize {
        let mut stamped = 0;
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if let Some(Some(vector)) = self.vectors.get_mut(vector_idx) {
                stamped += vector.inserted.replace(start, end, txn_id, commit_ts);
            }
        });
        stamped
    }

    pub fn rollback_insert(&mut self, start_row: u64, num_rows: u64, txn_id: TxnId) -> usize {
        let mut undone = 0;
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if let Some(Some(vector)) = self.vectors.get_mut(vector_idx) {
                undone += vector.inserted.replace(start, end, txn_id, ABORTED_INSERT);
            }
        });
        undone
    }

    pub fn commit_delete(&mut self, start_row: u64, num_rows: u64, txn_id: TxnId, commit_ts: TxnId) -> usize {
        let mut stamped = 0;
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if let Some(Some(VectorVersions {
                deleted: Some(deleted),
                ..
            })) = self.vectors.get_mut(vector_idx)
            {
                stamped += deleted.replace(start, end, txn_id, commit_ts);
            }
        });
        stamped
    }

    pub fn rollback_delete(&mut self, start_row: u64, num_rows: u64, txn_id: TxnId) -> usize {
        let mut undone = 0;
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if let Some(Some(VectorVersions {
                deleted: Some(deleted),
                ..
            })) = self.vectors.get_mut(vector_idx)
            {
                undone += deleted.replace(start, end, txn_id, NOT_DELETED);
            }
        });
        undone
    }

    /// Positions (relative to `start_row`) of the rows visible to `ctx`.
    pub fn visible_rows(&self, ctx: ReadContext, start_row: u64, num_rows: u64) -> Vec<u64> {
        let mut out = Vec::with_capacity(num_rows as usize);
        for_each_vector(start_row, num_rows, |vector_idx, start, end, base| match self.vector(vector_idx) {
            None => out.extend(base..base + (end - start) as u64),
            Some(vector) => {
                for (i, row) in (start..end).enumerate() {
                    let deleted = vector.delete_version(row);
                    if ctx.is_visible(vector.inserted.get(row))
                        && !(deleted != NOT_DELETED && ctx.is_visible(deleted))
                    {
                        out.push(base + i as u64);
                    }
                }
            }
        });
        out
    }

    pub fn num_deletions(&self, ctx: ReadContext, start_row: u64, num_rows: u64) -> u64 {
        let mut count = 0;
        for_each_vector(start_row, num_rows, |vector_idx, start, end, _| {
            if let Some(vector) = self.vector(vector_idx) {
                count += (start..end)
                    .filter(|&row| {
                        let v = vector.delete_version(row);
                        v != NOT_DELETED && ctx.is_visible(v)
                    })
                    .count() as u64;
            }
        });
        count
    }

    pub fn has_deletions(&self, ctx: ReadContext, num_rows: u64) -> bool {
        self.num_deletions(ctx, 0, num_rows) > 0
    }

    /// Whether any version in the first `num_rows` rows is still a live
    /// transaction id.
    pub fn has_uncommitted(&self, num_rows: u64) -> bool {
        let mut found = false;
        for_each_vector(0, num_rows, |vector_idx, start, end, _| {
            if let Some(vector) = self.vector(vector_idx) {
                found |= (start..end).any(|row| {
                    let ins = vector.inserted.get(row);
                    let del = vector.delete_version(row);
                    (!is_committed_version(ins) && ins != ABORTED_INSERT)
                        || (del != NOT_DELETED && !is_committed_version(del))
                });
            }
        });
        found
    }

    /// Compacts fully committed vectors of the first `num_rows` rows.
    pub fn finalize_status(&mut self, num_rows: u64) {
        for_each_vector(0, num_rows, |vector_idx, _, end, _| {
            let Some(slot) = self.vectors.get_mut(vector_idx) else {
                return;
            };
            let Some(vector) = slot.as_mut() else { return };
            vector.inserted.compact(end);
            if let Some(deleted) = vector.deleted.as_mut() {
                deleted.compact(end);
                if *deleted == Versions::Uniform(NOT_DELETED) {
                    vector.deleted = None;
                }
            }
            if vector.deleted.is_none()
                && matches!(vector.inserted, Versions::Uniform(v) if is_committed_version(v))
                && end == VECTOR
            {
                *slot = None;
            }
        });
    }

    /// Persists committed deletions; every row is considered committed on
    /// reload.
    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_field("deletions");
        let deletions: Vec<(u64, TxnId)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(idx, v)| v.as_ref().map(|v| (idx, v)))
            .flat_map(|(vector_idx, vector)| {
                (0..VECTOR).filter_map(move |row| {
                    let version = vector.delete_version(row);
                    (version != NOT_DELETED && is_committed_version(version))
                        .then_some(((vector_idx * VECTOR + row) as u64, version))
                })
            })
            .collect();
        ser.write_varint(deletions.len() as u64);
        for (row, version) in deletions {
            ser.write_varint(row);
            ser.write_u64(version);
        }
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        de.expect_field("deletions")?;
        let count = de.read_varint()?;
        let mut info = VersionInfo::new();
        for _ in 0..count {
            let row = de.read_varint()?;
            let version = de.read_u64()?;
            ensure!(is_committed_version(version), "persisted deletion carries live version {}", version);
            let (vector_idx, in_vector) = split(row);
            info.vector_mut(vector_idx).deleted_mut().rows_mut()[in_vector] = version;
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TRANSACTION_ID_START;

    const T1: TxnId = TRANSACTION_ID_START + 1;
    const T2: TxnId = TRANSACTION_ID_START + 2;

    fn ctx(id: TxnId, start_ts: TxnId) -> ReadContext {
        ReadContext::Transactional { id, start_ts }
    }

    #[test]
    fn uncommitted_inserts_are_private() {
        let mut info = VersionInfo::new();
        info.append(T1, 0, 100);
        assert!(info.is_inserted(ctx(T1, 1), 50));
        assert!(!info.is_inserted(ctx(T2, 1), 50));
        assert_eq!(info.commit_insert(0, 100, T1, 2), 100);
        assert!(info.is_inserted(ctx(T2, 2), 50));
        assert!(!info.is_inserted(ctx(T2, 1), 50));
    }

    #[test]
    fn second_writer_materializes_rows() {
        let mut info = VersionInfo::new();
        info.append(T1, 0, 10);
        info.append(T2, 10, 5);
        assert_eq!(info.insert_version(9), T1);
        assert_eq!(info.insert_version(12), T2);
        assert_eq!(info.rollback_insert(10, 5, T2), 5);
        assert_eq!(info.visible_rows(ReadContext::Direct, 0, 15).len(), 0);
        info.commit_insert(0, 10, T1, 2);
        assert_eq!(info.visible_rows(ReadContext::Direct, 0, 15), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_delete_conflicts() {
        let mut info = VersionInfo::new();
        info.append(1, 0, 4096);
        assert!(info.delete(ctx(T1, 1), 2050).unwrap());
        assert!(!info.delete(ctx(T1, 1), 2050).unwrap());
        let err = info.delete(ctx(T2, 1), 2050).unwrap_err();
        let conflict = err.downcast_ref::<WriteConflictError>().unwrap();
        assert_eq!((conflict.vector_idx, conflict.row_in_vector), (1, 2));

        info.commit_delete(0, 4096, T1, 2);
        assert!(info.is_deleted(ctx(T2 + 1, 2), 2050));
        assert!(!info.is_deleted(ctx(T2 + 1, 1), 2050));
        assert_eq!(info.num_deletions(ReadContext::Direct, 0, 4096), 1);
        assert!(info.delete(ctx(T2, 1), 2050).is_err());
    }

    #[test]
    fn rollback_delete_restores_row() {
        let mut info = VersionInfo::new();
        info.append(1, 0, 10);
        info.delete(ctx(T1, 1), 3).unwrap();
        assert!(info.has_uncommitted(10));
        assert_eq!(info.rollback_delete(0, 10, T1), 1);
        assert!(!info.has_deletions(ReadContext::Direct, 10));
        assert!(!info.has_uncommitted(10));
    }

    #[test]
    fn finalize_and_persist_deletions() {
        let mut info = VersionInfo::new();
        info.append(T1, 0, 2048);
        info.commit_insert(0, 2048, T1, 2);
        info.append(T2, 2048, 10);
        info.commit_insert(2048, 10, T2, 3);
        info.delete(ctx(T1 + 5, 3), 2050).unwrap();
        info.commit_delete(0, 2058, T1 + 5, 4);
        info.finalize_status(2058);
        assert!(info.vector(0).is_none());

        let mut ser = Serializer::new();
        info.serialize(&mut ser);
        let bytes = ser.finish();
        let restored = VersionInfo::deserialize(&mut Deserializer::new(&bytes)).unwrap();
        assert!(restored.is_deleted(ReadContext::Direct, 2050));
        assert!(restored.is_visible(ReadContext::Direct, 2049));
    }
}
