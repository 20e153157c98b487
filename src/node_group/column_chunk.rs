//! One column of a node group: a list of segments plus the column's
//! update chains.
//!
//! Segments are kept in row order. Flushed segments come first; at most one
//! in-memory segment follows them and receives appends. Readers clone the
//! `Arc` under a short read lock and work on that snapshot, so a checkpoint
//! that swaps in new segments never invalidates an in-flight scan.

use std::sync::Arc;

use eyre::{bail, ensure, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::chunk::ColumnChunkData;
use crate::column::Column;
use crate::config::DEFAULT_VECTOR_CAPACITY;
use crate::encoding::{Deserializer, Serializer};
use crate::mvcc::{ReadContext, TxnId, UpdateInfo};
use crate::vector::{SelectionVector, ValueVector};

/// Segment counts touched by a checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub in_place: usize,
    pub rewritten: usize,
    pub flushed: usize,
}

impl std::ops::AddAssign for CheckpointSummary {
    fn add_assign(&mut self, other: Self) {
        self.in_place += other.in_place;
        self.rewritten += other.rewritten;
        self.flushed += other.flushed;
    }
}

#[derive(Debug)]
pub struct ColumnChunk {
    column: Arc<Column>,
    enable_compression: bool,
    segments: RwLock<Arc<Vec<ColumnChunkData>>>,
    update_info: UpdateInfo,
}

/// Index of the segment holding `row` and the row's offset inside it.
fn locate(segments: &[ColumnChunkData], row: u64) -> Option<(usize, u64)> {
    let mut start = 0;
    for (idx, segment) in segments.iter().enumerate() {
        let n = segment.num_values();
        if row < start + n {
            return Some((idx, row - start));
        }
        start += n;
    }
    None
}

impl ColumnChunk {
    pub fn new(column: Arc<Column>, enable_compression: bool) -> Self {
        Self::from_segments(column, Vec::new(), enable_compression)
    }

    pub fn from_segments(
        column: Arc<Column>,
        segments: Vec<ColumnChunkData>,
        enable_compression: bool,
    ) -> Self {
        let update_info = UpdateInfo::new(column.data_type().clone(), enable_compression);
        Self {
            column,
            enable_compression,
            segments: RwLock::new(Arc::new(segments)),
            update_info,
        }
    }

    pub fn column(&self) -> &Arc<Column> {
        &self.column
    }

    pub fn update_info(&self) -> &UpdateInfo {
        &self.update_info
    }

    /// Snapshot of the current segments.
    pub fn segments(&self) -> Arc<Vec<ColumnChunkData>> {
        Arc::clone(&self.segments.read())
    }

    pub fn num_values(&self) -> u64 {
        self.segments.read().iter().map(|s| s.num_values()).sum()
    }

    pub fn is_in_memory(&self) -> bool {
        self.segments.read().iter().any(|s| s.is_in_memory())
    }

    pub fn has_updates(&self) -> bool {
        self.update_info.has_updates()
    }

    pub fn num_updated_rows(&self) -> Result<u64> {
        self.update_info.num_updated_rows()
    }

    fn with_tail<R>(&self, f: impl FnOnce(&mut ColumnChunkData) -> Result<R>) -> Result<R> {
        let mut guard = self.segments.write();
        let segments = Arc::make_mut(&mut guard);
        if !segments.last().is_some_and(|s| s.is_in_memory()) {
            segments.push(ColumnChunkData::new(
                self.column.data_type().clone(),
                DEFAULT_VECTOR_CAPACITY,
                self.enable_compression,
            ));
        }
        let last = segments.len() - 1;
        f(&mut segments[last])
    }

    pub fn append(&self, vector: &ValueVector, sel: &SelectionVector) -> Result<()> {
        self.with_tail(|tail| tail.append(vector, sel))
    }

    pub fn append_chunk(&self, src: &ColumnChunkData, start: u64, num_values: u64) -> Result<()> {
        self.with_tail(|tail| tail.append_chunk(src, start, num_values))
    }

    /// Appends every row of `other` (base values only).
    pub fn append_column_chunk(&self, other: &ColumnChunk) -> Result<()> {
        for segment in other.segments().iter() {
            if segment.is_in_memory() {
                self.append_chunk(segment, 0, segment.num_values())?;
            } else {
                let loaded = other.column.read_chunk(segment)?;
                self.append_chunk(&loaded, 0, loaded.num_values())?;
            }
        }
        Ok(())
    }

    /// Whether the last `num_rows` rows live in the in-memory tail.
    pub fn can_truncate(&self, num_rows: u64) -> bool {
        self.segments
            .read()
            .last()
            .is_some_and(|s| s.is_in_memory() && s.num_values() >= num_rows)
            || num_rows == 0
    }

    /// Drops the last `num_rows` rows from the in-memory tail.
    pub fn truncate(&self, num_rows: u64) -> Result<()> {
        if num_rows == 0 {
            return Ok(());
        }
        let mut guard = self.segments.write();
        let segments = Arc::make_mut(&mut guard);
        let Some(tail) = segments
            .last_mut()
            .filter(|s| s.is_in_memory() && s.num_values() >= num_rows)
        else {
            bail!(
                "column '{}' cannot drop {} flushed rows",
                self.column.name(),
                num_rows
            );
        };
        let keep = tail.num_values() - num_rows;
        tail.set_num_values(keep)
    }

    /// Base values of `[start, start + n)`, without update overlay.
    pub fn scan_committed_base(
        &self,
        start: u64,
        num_values: u64,
        out: &mut ValueVector,
        pos_in_out: u64,
    ) -> Result<()> {
        let segments = self.segments();
        let end = start + num_values;
        let total: u64 = segments.iter().map(|s| s.num_values()).sum();
        ensure!(
            end <= total,
            "column '{}' scan of [{}, {}) past {} rows",
            self.column.name(),
            start,
            end,
            total
        );
        let mut seg_start = 0;
        for segment in segments.iter() {
            if seg_start >= end {
                break;
            }
            let seg_end = seg_start + segment.num_values();
            let lo = start.max(seg_start);
            let hi = end.min(seg_end);
            if lo < hi {
                let pos = pos_in_out + (lo - start);
                if segment.is_in_memory() {
                    segment.scan(out, lo - seg_start, hi - lo, pos)?;
                } else {
                    let state = self.column.init_chunk_state(segment)?;
                    self.column.scan(&state, lo - seg_start, hi - lo, out, pos)?;
                }
            }
            seg_start = seg_end;
        }
        Ok(())
    }

    pub fn scan(
        &self,
        ctx: ReadContext,
        start: u64,
        num_values: u64,
        out: &mut ValueVector,
        pos_in_out: u64,
    ) -> Result<()> {
        self.scan_committed_base(start, num_values, out, pos_in_out)?;
        self.update_info.scan(ctx, start, num_values, out, pos_in_out)
    }

    pub fn lookup(&self, ctx: ReadContext, row: u64, out: &mut ValueVector, pos_in_out: u64) -> Result<()> {
        if self.update_info.lookup(ctx, row, out, pos_in_out)? {
            return Ok(());
        }
        let segments = self.segments();
        let Some((idx, offset)) = locate(&segments, row) else {
            bail!("column '{}' has no row {}", self.column.name(), row);
        };
        let segment = &segments[idx];
        if segment.is_in_memory() {
            segment.lookup(offset, out, pos_in_out)
        } else {
            let state = self.column.init_chunk_state(segment)?;
            self.column.lookup(&state, offset, out, pos_in_out)
        }
    }

    pub fn update(&self, ctx: ReadContext, row: u64, src: &ValueVector, pos_in_src: u64) -> Result<()> {
        let num_values = self.num_values();
        ensure!(
            row < num_values,
            "column '{}' update of row {} past {} rows",
            self.column.name(),
            row,
            num_values
        );
        self.update_info.update(ctx, row, src, pos_in_src)
    }

    pub fn commit_updates(&self, txn_id: TxnId, commit_ts: TxnId) -> usize {
        self.update_info.commit(txn_id, commit_ts)
    }

    pub fn rollback_updates(&self, txn_id: TxnId) -> Result<usize> {
        self.update_info.rollback(txn_id)
    }

    pub fn vacuum(&self, watermark: TxnId) -> Result<usize> {
        self.update_info.vacuum(watermark)
    }

    /// A copy of this chunk with every in-memory segment flushed. Pending
    /// updates are not carried over, so there must be none.
    pub fn flush(&self) -> Result<ColumnChunk> {
        ensure!(
            !self.update_info.has_updates(),
            "column '{}' has pending updates; checkpoint instead of flushing",
            self.column.name()
        );
        let mut flushed = Vec::new();
        for segment in self.segments().iter() {
            if !segment.is_in_memory() {
                flushed.push(segment.clone());
            } else if segment.num_values() > 0 {
                let mut segment = segment.clone();
                segment.finalize()?;
                flushed.extend(self.column.flush_split(&segment)?);
            }
        }
        Ok(ColumnChunk::from_segments(
            Arc::clone(&self.column),
            flushed,
            self.enable_compression,
        ))
    }

    /// Folds committed updates into the segments and flushes the in-memory
    /// tail. Only a single checkpointing thread may run this per chunk.
    pub fn checkpoint(&self) -> Result<CheckpointSummary> {
        ensure!(
            !self.update_info.has_uncommitted(),
            "column '{}' has uncommitted updates",
            self.column.name()
        );
        let updates = self.update_info.collect_updates(ReadContext::Direct)?;
        let segments = self.segments();
        let mut summary = CheckpointSummary::default();
        let mut result = Vec::with_capacity(segments.len());
        let mut seg_start = 0;
        let mut next_update = 0;
        for segment in segments.iter() {
            let seg_end = seg_start + segment.num_values();
            let (rows, values) = match &updates {
                Some(updates) => {
                    let first = next_update;
                    while next_update < updates.len() && updates.offsets[next_update] < seg_end {
                        next_update += 1;
                    }
                    let rows: Vec<u64> = updates.offsets[first..next_update]
                        .iter()
                        .map(|&row| row - seg_start)
                        .collect();
                    let mut values = ColumnChunkData::new(
                        self.column.data_type().clone(),
                        rows.len() as u64,
                        self.enable_compression,
                    );
                    values.append_chunk(&updates.values, first as u64, rows.len() as u64)?;
                    (rows, values)
                }
                None => (
                    Vec::new(),
                    ColumnChunkData::new(self.column.data_type().clone(), 0, self.enable_compression),
                ),
            };
            if segment.is_in_memory() {
                if segment.num_values() > 0 {
                    result.extend(self.column.checkpoint_in_memory(segment, &rows, &values)?);
                    summary.flushed += 1;
                }
            } else if rows.is_empty() {
                result.push(segment.clone());
            } else {
                let outcome = self.column.checkpoint_segment(segment, &rows, &values)?;
                if outcome.in_place {
                    summary.in_place += 1;
                } else {
                    summary.rewritten += 1;
                }
                result.extend(outcome.segments);
            }
            seg_start = seg_end;
        }
        *self.segments.write() = Arc::new(result);
        self.update_info.clear();
        debug!(
            column = %self.column.name(),
            in_place = summary.in_place,
            rewritten = summary.rewritten,
            flushed = summary.flushed,
            "checkpointed column chunk"
        );
        Ok(summary)
    }

    pub fn serialize(&self, ser: &mut Serializer) -> Result<()> {
        let segments = self.segments();
        ser.write_field("segments");
        ser.write_varint(segments.len() as u64);
        for segment in segments.iter() {
            segment.serialize(ser)?;
        }
        Ok(())
    }

    pub fn deserialize(
        column: Arc<Column>,
        de: &mut Deserializer<'_>,
        enable_compression: bool,
    ) -> Result<Self> {
        de.expect_field("segments")?;
        let count = de.read_varint()?;
        let mut segments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let segment = ColumnChunkData::deserialize(de)?;
            ensure!(
                segment.data_type() == column.data_type(),
                "segment of type {} in column '{}' of type {}",
                segment.data_type(),
                column.name(),
                column.data_type()
            );
            segments.push(segment);
        }
        Ok(Self::from_segments(column, segments, enable_compression))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, TRANSACTION_ID_START};
    use crate::storage::FileHandle;
    use crate::types::{LogicalType, Value};

    fn chunk(data_type: LogicalType) -> ColumnChunk {
        let column = Column::new(
            "c",
            data_type,
            Arc::new(FileHandle::in_memory()),
            StorageConfig::default(),
        );
        ColumnChunk::new(Arc::new(column), true)
    }

    fn ints(values: impl IntoIterator<Item = i64>) -> ValueVector {
        let values: Vec<Value> = values.into_iter().map(Value::Int64).collect();
        ValueVector::from_values(LogicalType::Int64, &values).unwrap()
    }

    fn read(chunk: &ColumnChunk, ctx: ReadContext, row: u64) -> Value {
        let mut out = ValueVector::new(LogicalType::Int64, 1);
        chunk.lookup(ctx, row, &mut out, 0).unwrap();
        out.get_value(0)
    }

    #[test]
    fn scans_span_flushed_and_in_memory_segments() {
        let first = chunk(LogicalType::Int64);
        first.append(&ints(0..3000), &SelectionVector::unfiltered(3000)).unwrap();
        let flushed = first.flush().unwrap();
        assert!(!flushed.is_in_memory());
        flushed.append(&ints(3000..3100), &SelectionVector::unfiltered(100)).unwrap();
        assert_eq!(flushed.num_values(), 3100);

        let mut out = ValueVector::new(LogicalType::Int64, 200);
        flushed.scan(ReadContext::Direct, 2950, 100, &mut out, 0).unwrap();
        assert_eq!(out.get_value(0), Value::Int64(2950));
        assert_eq!(out.get_value(99), Value::Int64(3049));
    }

    #[test]
    fn checkpoint_folds_committed_updates() {
        let chunk = chunk(LogicalType::Int64);
        chunk.append(&ints(0..500), &SelectionVector::unfiltered(500)).unwrap();
        let chunk = chunk.flush().unwrap();
        let txn = ReadContext::Transactional {
            id: TRANSACTION_ID_START + 1,
            start_ts: 1,
        };
        chunk.update(txn, 10, &ints([77]), 0).unwrap();
        assert!(chunk.checkpoint().is_err());

        chunk.commit_updates(TRANSACTION_ID_START + 1, 2);
        let summary = chunk.checkpoint().unwrap();
        assert_eq!(summary.in_place, 1);
        assert!(!chunk.has_updates());
        assert_eq!(read(&chunk, ReadContext::Direct, 10), Value::Int64(77));
        assert_eq!(read(&chunk, ReadContext::Direct, 11), Value::Int64(11));
    }

    #[test]
    fn snapshot_survives_checkpoint_swap() {
        let chunk = chunk(LogicalType::Int64);
        chunk.append(&ints(0..100), &SelectionVector::unfiltered(100)).unwrap();
        let before = chunk.segments();
        chunk.checkpoint().unwrap();
        assert!(before[0].is_in_memory());
        assert!(!chunk.segments()[0].is_in_memory());
    }

    #[test]
    fn truncate_only_touches_the_tail() {
        let chunk = chunk(LogicalType::Int64);
        chunk.append(&ints(0..10), &SelectionVector::unfiltered(10)).unwrap();
        assert!(chunk.can_truncate(4));
        chunk.truncate(4).unwrap();
        assert_eq!(chunk.num_values(), 6);

        let flushed = chunk.flush().unwrap();
        assert!(!flushed.can_truncate(1));
        assert!(flushed.truncate(1).is_err());
    }
}
