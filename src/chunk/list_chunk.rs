//! # List Chunks
//!
//! LIST and ARRAY rows are stored as three child chunks next to the parent's
//! null chunk:
//!
//! ```text
//! row:      0        1      2        3
//! value:  [a, b]    NULL   []     [c, d, e]
//! sizes:    2        0      0        3          UINT32, no nulls
//! offsets:  2        2      2        5          UINT64 END offsets, no nulls
//! data:   [ a | b | c | d | e ]                 child type, own nulls
//!
//! start(i) = offsets[i] - sizes[i]
//! ```
//!
//! Appends always extend `data` in row order. Random writes append the new
//! list's elements at the end of `data` and repoint the row, leaving the old
//! elements behind as garbage; `finalize` rewrites `data` in row order when
//! that has happened. Null rows have size 0 and their offsets are never read.

use eyre::{eyre, Result};

use crate::config::LIST_DATA_INITIAL_CAPACITY;
use crate::types::LogicalType;
use crate::vector::{ListEntry, SelectionVector, ValueVector};

use super::{ColumnChunkData, NullChunkData};

#[derive(Debug, Clone)]
pub struct ListChunk {
    offsets: ColumnChunkData,
    sizes: ColumnChunkData,
    data: ColumnChunkData,
    check_offset_sorted_asc: bool,
}

fn child_type_of(data_type: &LogicalType) -> LogicalType {
    data_type
        .child_type()
        .cloned()
        .unwrap_or(LogicalType::Int64)
}

fn row_is_null(nulls: Option<&NullChunkData>, pos: u64) -> bool {
    nulls.is_some_and(|n| n.is_null(pos))
}

impl ListChunk {
    pub fn new(data_type: &LogicalType, capacity: u64, enable_compression: bool) -> Self {
        Self {
            offsets: ColumnChunkData::without_nulls(LogicalType::UInt64, capacity, enable_compression),
            sizes: ColumnChunkData::without_nulls(LogicalType::UInt32, capacity, enable_compression),
            data: ColumnChunkData::new(child_type_of(data_type), LIST_DATA_INITIAL_CAPACITY, enable_compression),
            check_offset_sorted_asc: false,
        }
    }

    pub(crate) fn from_parts(offsets: ColumnChunkData, sizes: ColumnChunkData, data: ColumnChunkData) -> Self {
        Self {
            offsets,
            sizes,
            data,
            check_offset_sorted_asc: false,
        }
    }

    pub fn offsets(&self) -> &ColumnChunkData {
        &self.offsets
    }

    pub fn sizes(&self) -> &ColumnChunkData {
        &self.sizes
    }

    pub fn data(&self) -> &ColumnChunkData {
        &self.data
    }

    pub(crate) fn offsets_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.offsets
    }

    pub(crate) fn sizes_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.sizes
    }

    pub(crate) fn data_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.data
    }

    /// True once a random write may have left `data` out of row order.
    pub fn needs_defrag_check(&self) -> bool {
        self.check_offset_sorted_asc
    }

    pub fn list_size(&self, pos: u64, nulls: Option<&NullChunkData>) -> u64 {
        if row_is_null(nulls, pos) || pos >= self.sizes.num_values() {
            return 0;
        }
        self.sizes.get::<u32>(pos) as u64
    }

    pub fn list_end_offset(&self, pos: u64, nulls: Option<&NullChunkData>) -> u64 {
        if row_is_null(nulls, pos) || pos >= self.offsets.num_values() {
            return 0;
        }
        self.offsets.get::<u64>(pos)
    }

    pub fn list_start_offset(&self, pos: u64, nulls: Option<&NullChunkData>) -> u64 {
        self.list_end_offset(pos, nulls) - self.list_size(pos, nulls)
    }

    /// Whether the non-null rows of `[start, end)` store their elements
    /// back to back in row order.
    pub fn is_consecutive_ascending(&self, start: u64, end: u64, nulls: Option<&NullChunkData>) -> bool {
        let mut prev_end: Option<u64> = None;
        for pos in start..end {
            if row_is_null(nulls, pos) {
                continue;
            }
            let size = self.list_size(pos, nulls);
            let row_end = self.list_end_offset(pos, nulls);
            if let Some(prev) = prev_end {
                if row_end != prev + size {
                    return false;
                }
            }
            prev_end = Some(row_end);
        }
        true
    }

    fn set_row(&mut self, pos: u64, size: u64, end: u64) {
        self.sizes.set::<u32>(pos, size as u32);
        self.offsets.set::<u64>(pos, end);
    }

    pub(crate) fn append_null_list(&mut self, pos: u64) {
        let end = self.data.num_values();
        self.set_row(pos, 0, end);
    }

    pub(crate) fn resize(&mut self, capacity: u64) {
        self.offsets.resize(capacity);
        self.sizes.resize(capacity);
    }

    pub(crate) fn set_num_values(&mut self, num_values: u64) -> Result<()> {
        self.offsets.set_num_values(num_values)?;
        self.sizes.set_num_values(num_values)
    }

    pub(crate) fn append_vector(&mut self, vector: &ValueVector, sel: &SelectionVector, base: u64) -> Result<()> {
        let child = vector
            .list_child()
            .ok_or_else(|| eyre!("list chunk given a {} vector", vector.data_type()))?;
        let mut end = self.data.num_values();
        let mut child_positions = Vec::new();
        for (i, pos) in sel.iter().enumerate() {
            let entry = if vector.is_null(pos) {
                ListEntry::default()
            } else {
                vector.list_entry(pos)
            };
            end += entry.size as u64;
            self.set_row(base + i as u64, entry.size as u64, end);
            child_positions.extend(entry.offset..entry.offset + entry.size as u64);
        }
        if !child_positions.is_empty() {
            self.data
                .append(child, &SelectionVector::from_positions(child_positions))?;
        }
        Ok(())
    }

    pub(crate) fn write_vector_value(
        &mut self,
        vector: &ValueVector,
        pos_in_vector: u64,
        offset_in_chunk: u64,
        is_null: bool,
    ) -> Result<()> {
        if offset_in_chunk < self.offsets.num_values() {
            self.check_offset_sorted_asc = true;
        }
        if is_null {
            self.append_null_list(offset_in_chunk);
            return Ok(());
        }
        let child = vector
            .list_child()
            .ok_or_else(|| eyre!("list chunk given a {} vector", vector.data_type()))?;
        let entry = vector.list_entry(pos_in_vector);
        if entry.size > 0 {
            let sel = SelectionVector::from_positions(entry.offset..entry.offset + entry.size as u64);
            self.data.append(child, &sel)?;
        }
        let end = self.data.num_values();
        self.set_row(offset_in_chunk, entry.size as u64, end);
        Ok(())
    }

    pub(crate) fn write_from(
        &mut self,
        src: &ListChunk,
        src_nulls: Option<&NullChunkData>,
        src_offset: u64,
        dst_offset: u64,
        num_values: u64,
        random_write: bool,
    ) -> Result<()> {
        if random_write && dst_offset < self.offsets.num_values() {
            self.check_offset_sorted_asc = true;
        }
        for i in 0..num_values {
            let start = src.list_start_offset(src_offset + i, src_nulls);
            let size = src.list_size(src_offset + i, src_nulls);
            self.data.append_chunk(&src.data, start, size)?;
            let end = self.data.num_values();
            self.set_row(dst_offset + i, size, end);
        }
        Ok(())
    }

    pub(crate) fn scan_into(
        &self,
        vector: &mut ValueVector,
        nulls: Option<&NullChunkData>,
        offset: u64,
        num_values: u64,
        pos_in_vector: u64,
    ) -> Result<()> {
        let mut first_child_pos = None;
        let mut total = 0u64;
        for i in 0..num_values {
            let size = self.list_size(offset + i, nulls);
            let child_pos = vector.reserve_list(pos_in_vector + i, size as u32);
            first_child_pos.get_or_insert(child_pos);
            total += size;
        }
        let Some(mut child_pos) = first_child_pos else {
            return Ok(());
        };
        let child = vector
            .list_child_mut()
            .ok_or_else(|| eyre!("cannot scan a list chunk into a non-list vector"))?;
        if self.is_consecutive_ascending(offset, offset + num_values, nulls) {
            let start = (offset..offset + num_values)
                .find(|&p| !row_is_null(nulls, p))
                .map_or(0, |p| self.list_start_offset(p, nulls));
            return self.data.scan(child, start, total, child_pos);
        }
        for i in 0..num_values {
            let size = self.list_size(offset + i, nulls);
            let start = self.list_start_offset(offset + i, nulls);
            self.data.scan(child, start, size, child_pos)?;
            child_pos += size;
        }
        Ok(())
    }

    /// Rewrites `data` so rows occupy consecutive ascending ranges.
    pub(crate) fn finalize(&mut self, nulls: Option<&NullChunkData>, num_values: u64) -> Result<()> {
        if num_values == 0 || !self.check_offset_sorted_asc {
            return Ok(());
        }
        let total = self.data.num_values();
        if total < self.data.capacity() / 2 {
            return Ok(());
        }
        if self.is_consecutive_ascending(0, num_values, nulls) {
            self.check_offset_sorted_asc = false;
            return Ok(());
        }
        let capacity = self.offsets.capacity();
        let enable_compression = self.data.enable_compression();
        let mut rebuilt = ListChunk {
            offsets: ColumnChunkData::without_nulls(LogicalType::UInt64, capacity, enable_compression),
            sizes: ColumnChunkData::without_nulls(LogicalType::UInt32, capacity, enable_compression),
            data: ColumnChunkData::new(self.data.data_type().clone(), total, enable_compression),
            check_offset_sorted_asc: false,
        };
        for pos in 0..num_values {
            if row_is_null(nulls, pos) {
                rebuilt.append_null_list(pos);
                continue;
            }
            let start = self.list_start_offset(pos, nulls);
            let size = self.list_size(pos, nulls);
            rebuilt.data.append_chunk(&self.data, start, size)?;
            let end = rebuilt.data.num_values();
            rebuilt.set_row(pos, size, end);
        }
        *self = rebuilt;
        Ok(())
    }

    pub(crate) fn reset_to_empty(&mut self, data_type: &LogicalType, enable_compression: bool) {
        self.offsets.reset_to_empty();
        self.sizes.reset_to_empty();
        self.data = ColumnChunkData::new(child_type_of(data_type), 0, enable_compression);
        self.check_offset_sorted_asc = false;
    }

    pub fn sanity_check(&self, num_values: u64) -> bool {
        if self.sizes.num_values() != num_values || self.offsets.num_values() != num_values {
            return false;
        }
        if !self.data.is_in_memory() {
            return true;
        }
        let data_len = self.data.num_values();
        (0..num_values).all(|pos| {
            let end = self.offsets.get::<u64>(pos);
            let size = self.sizes.get::<u32>(pos) as u64;
            end >= size && end <= data_len
        }) && self.data.sanity_check()
    }

    pub fn estimated_memory_usage(&self) -> u64 {
        self.offsets.estimated_memory_usage()
            + self.sizes.estimated_memory_usage()
            + self.data.estimated_memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().map(|v| Value::Int64(*v)).collect())
    }

    fn list_chunk(values: &[Value]) -> ColumnChunkData {
        let ty = LogicalType::list(LogicalType::Int64);
        let vector = ValueVector::from_values(ty.clone(), values).unwrap();
        let mut chunk = ColumnChunkData::new(ty, 2, true);
        chunk
            .append(&vector, &SelectionVector::unfiltered(values.len()))
            .unwrap();
        chunk
    }

    #[test]
    fn offsets_are_end_offsets() {
        let chunk = list_chunk(&[ints(&[1, 2]), Value::Null, ints(&[]), ints(&[3, 4, 5])]);
        let list = chunk.list().unwrap();
        let nulls = chunk.null_data();
        assert_eq!(list.offsets().get::<u64>(0), 2);
        assert_eq!(list.offsets().get::<u64>(3), 5);
        assert_eq!(list.list_size(1, nulls), 0);
        assert_eq!(list.list_start_offset(3, nulls), 2);
        assert!(list.is_consecutive_ascending(0, 4, nulls));
        assert!(chunk.sanity_check());
        assert_eq!(chunk.get_value(3).unwrap(), ints(&[3, 4, 5]));
        assert_eq!(chunk.get_value(1).unwrap(), Value::Null);
        assert_eq!(chunk.get_value(2).unwrap(), ints(&[]));
    }

    #[test]
    fn random_write_then_finalize_defragments() {
        let mut chunk = list_chunk(&[ints(&[1, 2]), ints(&[3]), ints(&[4, 5])]);
        let update =
            ValueVector::from_values(LogicalType::list(LogicalType::Int64), &[ints(&[9, 9, 9])])
                .unwrap();
        chunk.write_value(&update, 0, 1).unwrap();

        let list = chunk.list().unwrap();
        assert!(list.needs_defrag_check());
        assert_eq!(list.data().num_values(), 8);
        assert_eq!(list.list_start_offset(1, chunk.null_data()), 5);
        assert!(!list.is_consecutive_ascending(0, 3, chunk.null_data()));
        assert_eq!(chunk.get_value(1).unwrap(), ints(&[9, 9, 9]));

        chunk.finalize().unwrap();
        let list = chunk.list().unwrap();
        assert_eq!(list.data().num_values(), 7);
        assert_eq!(list.offsets().get::<u64>(0), 2);
        assert_eq!(list.offsets().get::<u64>(1), 5);
        assert_eq!(list.offsets().get::<u64>(2), 7);
        assert!(!list.needs_defrag_check());
        assert_eq!(chunk.get_value(2).unwrap(), ints(&[4, 5]));
    }

    #[test]
    fn scan_with_fragmented_rows() {
        let mut chunk = list_chunk(&[ints(&[1]), ints(&[2]), ints(&[3])]);
        let update =
            ValueVector::from_values(LogicalType::list(LogicalType::Int64), &[ints(&[7, 8])])
                .unwrap();
        chunk.write_value(&update, 0, 0).unwrap();
        let mut out = ValueVector::new(LogicalType::list(LogicalType::Int64), 4);
        chunk.scan(&mut out, 0, 3, 1).unwrap();
        assert_eq!(out.get_value(1), ints(&[7, 8]));
        assert_eq!(out.get_value(2), ints(&[2]));
        assert_eq!(out.get_value(3), ints(&[3]));
    }

    #[test]
    fn copy_pads_with_null_lists() {
        let src = list_chunk(&[ints(&[5, 6])]);
        let mut dst = ColumnChunkData::new(LogicalType::list(LogicalType::Int64), 1, true);
        dst.copy(&src, 0, 2, 1).unwrap();
        assert_eq!(dst.num_values(), 3);
        assert_eq!(dst.get_value(0).unwrap(), Value::Null);
        assert_eq!(dst.get_value(2).unwrap(), ints(&[5, 6]));
        assert!(dst.sanity_check());
    }
}
