//! Null bits of a chunk, stored as a BOOL chunk (bit set = null).
//!
//! `may_have_null` is conservative: once any null bit is set it stays true
//! until the chunk is reset, so "false" is a guarantee and "true" only a
//! hint. Scans use it to skip bit copying entirely.

use eyre::Result;

use crate::types::LogicalType;
use crate::vector::null_mask::{copy_null_bits, count_nulls_in, is_null_in, set_null_in, set_null_range_in};
use crate::vector::NullMask;

use super::{ChunkBuffer, ColumnChunkData};

#[derive(Debug, Clone)]
pub struct NullChunkData {
    data: ColumnChunkData,
    may_have_null: bool,
}

impl NullChunkData {
    pub fn new(capacity: u64, enable_compression: bool) -> Self {
        Self {
            data: ColumnChunkData::without_nulls(LogicalType::Bool, capacity, enable_compression),
            may_have_null: false,
        }
    }

    pub(crate) fn from_data(data: ColumnChunkData, may_have_null: bool) -> Self {
        Self {
            data,
            may_have_null,
        }
    }

    pub fn data(&self) -> &ColumnChunkData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.data
    }

    pub fn num_values(&self) -> u64 {
        self.data.num_values()
    }

    pub fn capacity(&self) -> u64 {
        self.data.capacity()
    }

    pub fn may_have_null(&self) -> bool {
        self.may_have_null
    }

    pub fn no_nulls_guarantee(&self) -> bool {
        !self.may_have_null
    }

    pub fn words(&self) -> &[u64] {
        match self.data.buffer() {
            ChunkBuffer::Bits(words) => words,
            ChunkBuffer::Bytes(_) => &[],
        }
    }

    fn words_mut(&mut self) -> &mut [u64] {
        match self.data.buffer_mut() {
            ChunkBuffer::Bits(words) => words,
            ChunkBuffer::Bytes(_) => &mut [],
        }
    }

    /// Null words for codec/statistics calls; `None` when nothing is null.
    pub fn words_if_any(&self) -> Option<&[u64]> {
        if self.may_have_null {
            Some(self.words())
        } else {
            None
        }
    }

    #[inline]
    pub fn is_null(&self, pos: u64) -> bool {
        self.may_have_null && pos < self.data.capacity() && is_null_in(self.words(), pos)
    }

    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        self.data.ensure_capacity(pos + 1);
        set_null_in(self.words_mut(), pos, is_null);
        if is_null {
            self.may_have_null = true;
        }
        if pos >= self.data.num_values() {
            self.data.set_num_values_unchecked(pos + 1);
        }
    }

    pub fn set_null_range(&mut self, offset: u64, num_values: u64, is_null: bool) {
        if num_values == 0 {
            return;
        }
        self.data.ensure_capacity(offset + num_values);
        set_null_range_in(self.words_mut(), offset, num_values, is_null);
        if is_null {
            self.may_have_null = true;
        }
        if offset + num_values > self.data.num_values() {
            self.data.set_num_values_unchecked(offset + num_values);
        }
    }

    /// Copies `num_values` bits from `src` (bit offset `src_offset`) to
    /// `dst_offset`; `src == None` means the source has no nulls.
    pub fn copy_bits_from(
        &mut self,
        src: Option<&[u64]>,
        src_offset: u64,
        dst_offset: u64,
        num_values: u64,
    ) {
        match src {
            Some(words) => {
                self.data.ensure_capacity(dst_offset + num_values);
                if copy_null_bits(words, src_offset, self.words_mut(), dst_offset, num_values, false) {
                    self.may_have_null = true;
                }
                if dst_offset + num_values > self.data.num_values() {
                    self.data.set_num_values_unchecked(dst_offset + num_values);
                }
            }
            None => self.set_null_range(dst_offset, num_values, false),
        }
    }

    pub fn append_from(&mut self, other: &NullChunkData, start: u64, num_values: u64) {
        let dst = self.num_values();
        self.copy_bits_from(other.words_if_any(), start, dst, num_values);
    }

    /// Copies this chunk's bits into a vector's null mask.
    pub fn scan_into(&self, mask: &mut NullMask, offset: u64, pos_in_vector: u64, num_values: u64) {
        if self.may_have_null {
            mask.copy_from(self.words(), offset, pos_in_vector, num_values, false);
        } else {
            mask.set_null_range(pos_in_vector, num_values, false);
        }
    }

    pub fn count_nulls(&self) -> u64 {
        if !self.may_have_null {
            return 0;
        }
        count_nulls_in(self.words(), 0, self.num_values())
    }

    pub fn resize(&mut self, capacity: u64) {
        self.data.resize(capacity);
    }

    pub fn set_num_values(&mut self, num_values: u64) -> Result<()> {
        self.data.set_num_values(num_values)
    }

    pub fn reset_to_empty(&mut self) {
        self.data.reset_to_empty();
        self.may_have_null = false;
    }

    pub fn reset_to_all_null(&mut self) {
        let capacity = self.data.capacity();
        if capacity > 0 {
            set_null_range_in(self.words_mut(), 0, capacity, true);
            self.may_have_null = true;
        }
    }

    pub fn estimated_memory_usage(&self) -> u64 {
        self.data.estimated_memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn may_have_null_tracks_writes() {
        let mut nulls = NullChunkData::new(10, true);
        assert!(nulls.no_nulls_guarantee());
        nulls.set_null(3, false);
        assert!(nulls.no_nulls_guarantee());
        assert_eq!(nulls.num_values(), 4);
        nulls.set_null(70, true);
        assert!(nulls.capacity() >= 71);
        assert!(nulls.is_null(70));
        assert!(!nulls.is_null(3));
        assert_eq!(nulls.count_nulls(), 1);
    }

    #[test]
    fn bit_copy_across_word_boundaries() {
        let mut src = NullChunkData::new(200, true);
        src.set_null_range(60, 10, true);
        let mut dst = NullChunkData::new(200, true);
        dst.set_null_range(0, 5, false);
        dst.append_from(&src, 58, 20);
        for i in 0..20u64 {
            let expected = (60..70).contains(&(58 + i));
            assert_eq!(dst.is_null(5 + i), expected, "bit {}", i);
        }
        assert_eq!(dst.num_values(), 25);
    }

    #[test]
    fn reset_to_all_null_marks_capacity() {
        let mut nulls = NullChunkData::new(100, false);
        nulls.reset_to_all_null();
        assert!(nulls.is_null(99));
        nulls.reset_to_empty();
        assert!(!nulls.is_null(99));
        assert_eq!(nulls.num_values(), 0);
    }
}
