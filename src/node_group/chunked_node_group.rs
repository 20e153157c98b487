//! A fixed-capacity group of column chunks sharing one set of row versions.
//!
//! Row counts and insert/delete versions live behind the group's state lock;
//! column values and their update chains live in the per-column
//! `ColumnChunk`s. A scan decodes the requested columns and then returns the
//! versions' selection of rows visible to the reader.

use std::sync::Arc;

use eyre::{bail, ensure, Result};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::column::Column;
use crate::encoding::{Deserializer, Serializer};
use crate::mvcc::{ReadContext, TxnId, VersionInfo, NOT_DELETED};
use crate::vector::{SelectionVector, ValueVector};

use super::column_chunk::{CheckpointSummary, ColumnChunk};

#[derive(Debug, Default)]
struct GroupState {
    num_rows: u64,
    versions: VersionInfo,
}

/// A fixed-capacity row group: one `ColumnChunk` per column plus the
/// insert/delete versions of every row.
#[derive(Debug)]
pub struct ChunkedNodeGroup {
    start_row: u64,
    capacity: u64,
    state: RwLock<GroupState>,
    chunks: Vec<ColumnChunk>,
}

impl ChunkedNodeGroup {
    pub fn new(columns: &[Arc<Column>], start_row: u64, capacity: u64, enable_compression: bool) -> Self {
        let chunks = columns
            .iter()
            .map(|column| ColumnChunk::new(Arc::clone(column), enable_compression))
            .collect();
        Self::from_chunks(chunks, start_row, capacity, 0, VersionInfo::new())
    }

    fn from_chunks(
        chunks: Vec<ColumnChunk>,
        start_row: u64,
        capacity: u64,
        num_rows: u64,
        versions: VersionInfo,
    ) -> Self {
        Self {
            start_row,
            capacity,
            state: RwLock::new(GroupState { num_rows, versions }),
            chunks,
        }
    }

    pub fn start_row(&self) -> u64 {
        self.start_row
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn num_rows(&self) -> u64 {
        self.state.read().num_rows
    }

    pub fn is_full(&self) -> bool {
        self.num_rows() >= self.capacity
    }

    pub fn num_columns(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, column_id: usize) -> Result<&ColumnChunk> {
        match self.chunks.get(column_id) {
            Some(chunk) => Ok(chunk),
            None => bail!(
                "column {} out of range for a group of {} columns",
                column_id,
                self.chunks.len()
            ),
        }
    }

    fn insert_version(ctx: ReadContext) -> TxnId {
        ctx.txn_id().unwrap_or(0)
    }

    /// Appends rows `[start, start + num_rows)` of `vectors` (one per column)
    /// until the group is full; returns how many rows were taken.
    pub fn append(
        &self,
        ctx: ReadContext,
        vectors: &[ValueVector],
        start: u64,
        num_rows: u64,
    ) -> Result<u64> {
        ensure!(
            vectors.len() == self.chunks.len(),
            "append of {} vectors into a group of {} columns",
            vectors.len(),
            self.chunks.len()
        );
        let mut state = self.state.write();
        let n = num_rows.min(self.capacity - state.num_rows);
        if n == 0 {
            return Ok(0);
        }
        let sel = SelectionVector::from_positions(start..start + n);
        for (chunk, vector) in self.chunks.iter().zip(vectors) {
            chunk.append(vector, &sel)?;
        }
        let first = state.num_rows;
        state.versions.append(Self::insert_version(ctx), first, n);
        state.num_rows += n;
        trace!(start_row = self.start_row, first, n, "appended rows to node group");
        Ok(n)
    }

    /// Appends every row of `other`, carrying its insert and delete versions.
    /// `other` must have no pending column updates.
    pub fn merge(&self, other: &ChunkedNodeGroup) -> Result<u64> {
        ensure!(
            other.chunks.len() == self.chunks.len(),
            "merge of a {}-column group into a {}-column group",
            other.chunks.len(),
            self.chunks.len()
        );
        ensure!(!std::ptr::eq(self, other), "cannot merge a node group into itself");
        ensure!(!other.has_updates(), "cannot merge a group with pending updates");
        let other_state = other.state.read();
        let mut state = self.state.write();
        let n = other_state.num_rows;
        ensure!(
            state.num_rows + n <= self.capacity,
            "merging {} rows overflows a group holding {} of {}",
            n,
            state.num_rows,
            self.capacity
        );
        for (chunk, src) in self.chunks.iter().zip(&other.chunks) {
            chunk.append_column_chunk(src)?;
        }
        let base = state.num_rows;
        let mut row = 0;
        while row < n {
            let version = other_state.versions.insert_version(row);
            let mut end = row + 1;
            while end < n && other_state.versions.insert_version(end) == version {
                end += 1;
            }
            state.versions.append(version, base + row, end - row);
            row = end;
        }
        for row in 0..n {
            let deleted = other_state.versions.delete_version(row);
            if deleted != NOT_DELETED {
                state.versions.set_delete_version(base + row, deleted);
            }
        }
        state.num_rows += n;
        debug!(start_row = self.start_row, merged = n, "merged node group");
        Ok(n)
    }

    /// Scans `[start, start + num_rows)` of `column_ids` into `out` (one vector
    /// per column id, from position 0) and returns the positions visible to
    /// `ctx`.
    pub fn scan(
        &self,
        ctx: ReadContext,
        start: u64,
        num_rows: u64,
        column_ids: &[usize],
        out: &mut [ValueVector],
    ) -> Result<SelectionVector> {
        ensure!(
            column_ids.len() == out.len(),
            "{} output vectors for {} columns",
            out.len(),
            column_ids.len()
        );
        let state = self.state.read();
        ensure!(
            start + num_rows <= state.num_rows,
            "scan of [{}, {}) past {} rows",
            start,
            start + num_rows,
            state.num_rows
        );
        for (&column_id, vector) in column_ids.iter().zip(out.iter_mut()) {
            self.chunk(column_id)?.scan(ctx, start, num_rows, vector, 0)?;
        }
        let visible = state.versions.visible_rows(ctx, start, num_rows);
        if visible.len() as u64 == num_rows {
            return Ok(SelectionVector::unfiltered(num_rows as usize));
        }
        Ok(SelectionVector::from_positions(visible))
    }

    /// Scan as seen by checkpoint: every committed version.
    pub fn scan_committed(
        &self,
        start: u64,
        num_rows: u64,
        column_ids: &[usize],
        out: &mut [ValueVector],
    ) -> Result<SelectionVector> {
        self.scan(ReadContext::Direct, start, num_rows, column_ids, out)
    }

    /// Reads one row into `out[i][pos_in_out]`; false when the row is not
    /// visible to `ctx`.
    pub fn lookup(
        &self,
        ctx: ReadContext,
        row: u64,
        column_ids: &[usize],
        out: &mut [ValueVector],
        pos_in_out: u64,
    ) -> Result<bool> {
        let state = self.state.read();
        if row >= state.num_rows || !state.versions.is_visible(ctx, row) {
            return Ok(false);
        }
        for (&column_id, vector) in column_ids.iter().zip(out.iter_mut()) {
            self.chunk(column_id)?.lookup(ctx, row, vector, pos_in_out)?;
        }
        Ok(true)
    }

    pub fn update(
        &self,
        ctx: ReadContext,
        row: u64,
        column_id: usize,
        src: &ValueVector,
        pos_in_src: u64,
    ) -> Result<()> {
        let state = self.state.read();
        ensure!(
            row < state.num_rows && state.versions.is_visible(ctx, row),
            "row {} of node group {} is not visible to the updating transaction",
            row,
            self.start_row
        );
        self.chunk(column_id)?.update(ctx, row, src, pos_in_src)
    }

    /// Marks `row` deleted; false if the transaction already deleted it.
    pub fn delete(&self, ctx: ReadContext, row: u64) -> Result<bool> {
        let mut state = self.state.write();
        ensure!(
            row < state.num_rows,
            "delete of row {} past {} rows",
            row,
            state.num_rows
        );
        state.versions.delete(ctx, row)
    }

    pub fn commit_insert(&self, start: u64, num_rows: u64, txn_id: TxnId, commit_ts: TxnId) -> usize {
        self.state
            .write()
            .versions
            .commit_insert(start, num_rows, txn_id, commit_ts)
    }

    /// Undoes an insert. Rows at the end of the group are dropped from the
    /// in-memory chunks; others stay behind as aborted inserts.
    pub fn rollback_insert(&self, start: u64, num_rows: u64, txn_id: TxnId) -> Result<usize> {
        let mut state = self.state.write();
        let undone = state.versions.rollback_insert(start, num_rows, txn_id);
        let end = (start + num_rows).min(state.num_rows);
        if end == state.num_rows && start < end {
            let drop = end - start;
            if self.chunks.iter().all(|c| c.can_truncate(drop)) {
                for chunk in &self.chunks {
                    chunk.truncate(drop)?;
                }
                state.num_rows = start;
                trace!(start_row = self.start_row, drop, "truncated rolled back rows");
            }
        }
        Ok(undone)
    }

    pub fn commit_delete(&self, start: u64, num_rows: u64, txn_id: TxnId, commit_ts: TxnId) -> usize {
        self.state
            .write()
            .versions
            .commit_delete(start, num_rows, txn_id, commit_ts)
    }

    pub fn rollback_delete(&self, start: u64, num_rows: u64, txn_id: TxnId) -> usize {
        self.state.write().versions.rollback_delete(start, num_rows, txn_id)
    }

    /// Stamps every insert, delete and update of `txn_id` with `commit_ts`.
    pub fn commit(&self, txn_id: TxnId, commit_ts: TxnId) -> usize {
        let num_rows = self.num_rows();
        let mut stamped = self.commit_insert(0, num_rows, txn_id, commit_ts);
        stamped += self.commit_delete(0, num_rows, txn_id, commit_ts);
        stamped += self
            .chunks
            .iter()
            .map(|c| c.commit_updates(txn_id, commit_ts))
            .sum::<usize>();
        stamped
    }

    /// Undoes every insert, delete and update of `txn_id`.
    pub fn rollback(&self, txn_id: TxnId) -> Result<usize> {
        let mut undone = 0;
        for chunk in &self.chunks {
            undone += chunk.rollback_updates(txn_id)?;
        }
        let num_rows = self.num_rows();
        undone += self.rollback_delete(0, num_rows, txn_id);
        let first = {
            let state = self.state.read();
            (0..num_rows).find(|&row| state.versions.insert_version(row) == txn_id)
        };
        if let Some(first) = first {
            undone += self.rollback_insert(first, num_rows - first, txn_id)?;
        }
        Ok(undone)
    }

    pub fn vacuum(&self, watermark: TxnId) -> Result<usize> {
        let mut removed = 0;
        for chunk in &self.chunks {
            removed += chunk.vacuum(watermark)?;
        }
        Ok(removed)
    }

    pub fn has_updates(&self) -> bool {
        self.chunks.iter().any(|c| c.has_updates())
    }

    pub fn num_updated_rows(&self, column_id: usize) -> Result<u64> {
        self.chunk(column_id)?.num_updated_rows()
    }

    pub fn num_deletions(&self, ctx: ReadContext) -> u64 {
        let state = self.state.read();
        state.versions.num_deletions(ctx, 0, state.num_rows)
    }

    pub fn has_deletions(&self, ctx: ReadContext) -> bool {
        let state = self.state.read();
        state.versions.has_deletions(ctx, state.num_rows)
    }

    /// A flushed copy of this group. Every version must be committed and no
    /// column may have pending updates.
    pub fn flush_as_new(&self) -> Result<ChunkedNodeGroup> {
        let state = self.state.read();
        ensure!(
            !state.versions.has_uncommitted(state.num_rows),
            "node group {} has uncommitted rows",
            self.start_row
        );
        let chunks = self
            .chunks
            .iter()
            .map(|c| c.flush())
            .collect::<Result<Vec<_>>>()?;
        let mut versions = state.versions.clone();
        versions.finalize_status(state.num_rows);
        debug!(start_row = self.start_row, rows = state.num_rows, "flushed node group");
        Ok(Self::from_chunks(
            chunks,
            self.start_row,
            self.capacity,
            state.num_rows,
            versions,
        ))
    }

    /// Folds committed updates into every column and flushes in-memory data.
    /// Rows deleted by committed transactions stay in place, masked by the
    /// group's versions.
    pub fn checkpoint(&self) -> Result<CheckpointSummary> {
        let mut state = self.state.write();
        ensure!(
            !state.versions.has_uncommitted(state.num_rows),
            "node group {} has uncommitted rows",
            self.start_row
        );
        let mut summary = CheckpointSummary::default();
        for chunk in &self.chunks {
            summary += chunk.checkpoint()?;
        }
        let num_rows = state.num_rows;
        state.versions.finalize_status(num_rows);
        debug!(
            start_row = self.start_row,
            rows = num_rows,
            in_place = summary.in_place,
            rewritten = summary.rewritten,
            "checkpointed node group"
        );
        Ok(summary)
    }

    /// Persists the on-disk descriptor. The group must be flushed.
    pub fn serialize(&self, ser: &mut Serializer) -> Result<()> {
        let state = self.state.read();
        ensure!(
            self.chunks.iter().all(|c| !c.is_in_memory()),
            "node group {} holds unflushed data",
            self.start_row
        );
        ser.write_field("start_row");
        ser.write_u64(self.start_row);
        ser.write_field("capacity");
        ser.write_u64(self.capacity);
        ser.write_field("num_rows");
        ser.write_u64(state.num_rows);
        state.versions.serialize(ser);
        ser.write_field("columns");
        ser.write_varint(self.chunks.len() as u64);
        for chunk in &self.chunks {
            chunk.serialize(ser)?;
        }
        Ok(())
    }

    pub fn deserialize(
        columns: &[Arc<Column>],
        de: &mut Deserializer<'_>,
        enable_compression: bool,
    ) -> Result<Self> {
        de.expect_field("start_row")?;
        let start_row = de.read_u64()?;
        de.expect_field("capacity")?;
        let capacity = de.read_u64()?;
        de.expect_field("num_rows")?;
        let num_rows = de.read_u64()?;
        ensure!(
            num_rows <= capacity,
            "node group {} claims {} rows for capacity {}",
            start_row,
            num_rows,
            capacity
        );
        let versions = VersionInfo::deserialize(de)?;
        de.expect_field("columns")?;
        let count = de.read_varint()? as usize;
        ensure!(
            count == columns.len(),
            "node group {} has {} columns, expected {}",
            start_row,
            count,
            columns.len()
        );
        let chunks = columns
            .iter()
            .map(|column| ColumnChunk::deserialize(Arc::clone(column), de, enable_compression))
            .collect::<Result<Vec<_>>>()?;
        for (chunk, column) in chunks.iter().zip(columns) {
            ensure!(
                chunk.num_values() == num_rows,
                "column '{}' holds {} rows, node group {} has {}",
                column.name(),
                chunk.num_values(),
                start_row,
                num_rows
            );
        }
        Ok(Self::from_chunks(chunks, start_row, capacity, num_rows, versions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, TRANSACTION_ID_START};
    use crate::mvcc::WriteConflictError;
    use crate::storage::FileHandle;
    use crate::types::{LogicalType, Value};

    const T1: TxnId = TRANSACTION_ID_START + 1;
    const T2: TxnId = TRANSACTION_ID_START + 2;

    fn columns() -> Vec<Arc<Column>> {
        let file = Arc::new(FileHandle::in_memory());
        vec![
            Arc::new(Column::new("id", LogicalType::Int64, Arc::clone(&file), StorageConfig::default())),
            Arc::new(Column::new("name", LogicalType::String, file, StorageConfig::default())),
        ]
    }

    fn batch(range: std::ops::Range<i64>) -> Vec<ValueVector> {
        let ids: Vec<Value> = range.clone().map(Value::Int64).collect();
        let names: Vec<Value> = range.map(|i| Value::String(format!("n{}", i))).collect();
        vec![
            ValueVector::from_values(LogicalType::Int64, &ids).unwrap(),
            ValueVector::from_values(LogicalType::String, &names).unwrap(),
        ]
    }

    fn ctx(id: TxnId, start_ts: TxnId) -> ReadContext {
        ReadContext::Transactional { id, start_ts }
    }

    fn outputs() -> Vec<ValueVector> {
        vec![
            ValueVector::new(LogicalType::Int64, 64),
            ValueVector::new(LogicalType::String, 64),
        ]
    }

    #[test]
    fn append_stops_at_capacity() {
        let group = ChunkedNodeGroup::new(&columns(), 0, 100, true);
        assert_eq!(group.append(ReadContext::Direct, &batch(0..80), 0, 80).unwrap(), 80);
        assert_eq!(group.append(ReadContext::Direct, &batch(0..80), 0, 80).unwrap(), 20);
        assert!(group.is_full());
        assert_eq!(group.append(ReadContext::Direct, &batch(0..1), 0, 1).unwrap(), 0);
    }

    #[test]
    fn uncommitted_inserts_are_private() {
        let group = ChunkedNodeGroup::new(&columns(), 0, 1000, true);
        group.append(ctx(T1, 1), &batch(0..10), 0, 10).unwrap();
        let mut out = outputs();
        let sel = group.scan(ctx(T2, 1), 0, 10, &[0, 1], &mut out).unwrap();
        assert!(sel.is_empty());
        let sel = group.scan(ctx(T1, 1), 0, 10, &[0, 1], &mut out).unwrap();
        assert_eq!(sel.len(), 10);

        group.commit(T1, 2);
        let sel = group.scan(ctx(T2, 2), 0, 10, &[0, 1], &mut out).unwrap();
        assert_eq!(sel.len(), 10);
        assert_eq!(out[1].get_value(9), Value::String("n9".into()));
    }

    #[test]
    fn rollback_of_tail_insert_truncates() {
        let group = ChunkedNodeGroup::new(&columns(), 0, 1000, true);
        group.append(ReadContext::Direct, &batch(0..5), 0, 5).unwrap();
        group.append(ctx(T1, 1), &batch(5..9), 0, 4).unwrap();
        group.rollback(T1).unwrap();
        assert_eq!(group.num_rows(), 5);
        assert_eq!(group.chunk(1).unwrap().num_values(), 5);
    }

    #[test]
    fn delete_conflicts_and_masks() {
        let group = ChunkedNodeGroup::new(&columns(), 0, 1000, true);
        group.append(ReadContext::Direct, &batch(0..4), 0, 4).unwrap();
        assert!(group.delete(ctx(T1, 1), 2).unwrap());
        assert!(!group.delete(ctx(T1, 1), 2).unwrap());
        let err = group.delete(ctx(T2, 1), 2).unwrap_err();
        assert!(err.downcast_ref::<WriteConflictError>().is_some());

        group.commit(T1, 5);
        let mut out = outputs();
        let sel = group.scan(ReadContext::Direct, 0, 4, &[0], &mut out[..1]).unwrap();
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(group.num_deletions(ReadContext::Direct), 1);
    }

    #[test]
    fn checkpoint_then_reopen_from_descriptor() {
        let cols = columns();
        let group = ChunkedNodeGroup::new(&cols, 0, 1000, true);
        group.append(ReadContext::Direct, &batch(0..300), 0, 300).unwrap();
        let flushed = group.flush_as_new().unwrap();

        let update = ValueVector::from_values(LogicalType::String, &[Value::from("renamed")]).unwrap();
        flushed.update(ctx(T1, 1), 7, 1, &update, 0).unwrap();
        flushed.delete(ctx(T1, 1), 8).unwrap();
        flushed.commit(T1, 2);
        flushed.checkpoint().unwrap();

        let mut ser = Serializer::new();
        flushed.serialize(&mut ser).unwrap();
        let bytes = ser.finish();
        let reopened = ChunkedNodeGroup::deserialize(&cols, &mut Deserializer::new(&bytes), true).unwrap();
        assert_eq!(reopened.num_rows(), 300);

        let mut out = outputs();
        assert!(reopened.lookup(ReadContext::Direct, 7, &[1], &mut out[1..], 0).unwrap());
        assert_eq!(out[1].get_value(0), Value::from("renamed"));
        assert!(!reopened.lookup(ReadContext::Direct, 8, &[1], &mut out[1..], 0).unwrap());
    }

    #[test]
    fn merge_carries_versions() {
        let cols = columns();
        let target = ChunkedNodeGroup::new(&cols, 0, 1000, true);
        target.append(ReadContext::Direct, &batch(0..3), 0, 3).unwrap();
        let source = ChunkedNodeGroup::new(&cols, 0, 1000, true);
        source.append(ctx(T1, 1), &batch(10..12), 0, 2).unwrap();

        assert_eq!(target.merge(&source).unwrap(), 2);
        assert_eq!(target.num_rows(), 5);
        let mut out = outputs();
        assert!(!target.lookup(ReadContext::Direct, 4, &[0], &mut out[..1], 0).unwrap());
        target.commit(T1, 3);
        assert!(target.lookup(ReadContext::Direct, 4, &[0], &mut out[..1], 0).unwrap());
        assert_eq!(out[0].get_value(0), Value::Int64(11));
    }
}
