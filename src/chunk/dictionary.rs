//! # String Dictionary
//!
//! A STRING chunk stores one `u32` index per row; the strings themselves live
//! in a dictionary made of two child chunks:
//!
//! ```text
//! offsets:     [ 0 | 3 | 3 | 8 ]          UINT64 start offsets, no nulls
//! string_data: "foo" "" "hello" ...       UINT8 bytes, no nulls
//!
//! length(i) = offsets[i + 1] - offsets[i]      (last entry: data len - start)
//! ```
//!
//! With deduplication on, equal strings share an index. The lookup map is
//! rebuilt lazily from the children after a chunk is read back from disk.

use eyre::{ensure, Result};
use hashbrown::HashMap;

use crate::types::{FixedValue, LogicalType};

use super::ColumnChunkData;

#[derive(Debug, Clone)]
pub struct DictionaryChunk {
    string_data: ColumnChunkData,
    offsets: ColumnChunkData,
    index: HashMap<String, u32>,
    index_built: bool,
    enable_dedup: bool,
}

impl DictionaryChunk {
    pub fn new(capacity: u64, enable_dedup: bool) -> Self {
        Self {
            string_data: ColumnChunkData::without_nulls(LogicalType::UInt8, 0, enable_dedup),
            offsets: ColumnChunkData::without_nulls(LogicalType::UInt64, capacity, enable_dedup),
            index: HashMap::new(),
            index_built: true,
            enable_dedup,
        }
    }

    pub(crate) fn from_parts(
        string_data: ColumnChunkData,
        offsets: ColumnChunkData,
        enable_dedup: bool,
    ) -> Self {
        Self {
            string_data,
            offsets,
            index: HashMap::new(),
            index_built: false,
            enable_dedup,
        }
    }

    pub fn string_data(&self) -> &ColumnChunkData {
        &self.string_data
    }

    pub fn offsets(&self) -> &ColumnChunkData {
        &self.offsets
    }

    pub(crate) fn string_data_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.string_data
    }

    pub(crate) fn offsets_mut(&mut self) -> &mut ColumnChunkData {
        &mut self.offsets
    }

    pub fn num_strings(&self) -> u64 {
        self.offsets.num_values()
    }

    pub fn enable_dedup(&self) -> bool {
        self.enable_dedup
    }

    fn range_of(&self, index: u32) -> Result<(usize, usize)> {
        let index = index as u64;
        ensure!(
            index < self.num_strings(),
            "dictionary index {} out of {} strings",
            index,
            self.num_strings()
        );
        let start: u64 = self.offsets.get(index);
        let end = if index + 1 < self.num_strings() {
            self.offsets.get::<u64>(index + 1)
        } else {
            self.string_data.num_values()
        };
        ensure!(
            start <= end && end <= self.string_data.num_values(),
            "malformed dictionary: string {} spans [{}, {}) of {} bytes",
            index,
            start,
            end,
            self.string_data.num_values()
        );
        Ok((start as usize, end as usize))
    }

    pub fn string_length(&self, index: u32) -> Result<u64> {
        let (start, end) = self.range_of(index)?;
        Ok((end - start) as u64)
    }

    pub fn get_string(&self, index: u32) -> Result<&str> {
        let (start, end) = self.range_of(index)?;
        let bytes = &self.string_data.buffer().bytes()[start..end];
        std::str::from_utf8(bytes)
            .map_err(|e| eyre::eyre!("malformed dictionary: string {} is not utf-8: {}", index, e))
    }

    /// Adds `value` and returns its index, reusing an equal string when
    /// deduplication is on.
    pub fn append_string(&mut self, value: &str) -> Result<u32> {
        if self.enable_dedup {
            if !self.index_built {
                self.rebuild_index()?;
            }
            if let Some(&existing) = self.index.get(value) {
                return Ok(existing);
            }
        }
        let next = self.num_strings();
        ensure!(
            next < u32::MAX as u64,
            "dictionary is full ({} strings)",
            next
        );
        let index = next as u32;
        let start = self.string_data.num_values();
        self.offsets.set::<u64>(next, start);
        self.string_data.append_bytes(value.as_bytes());
        if self.enable_dedup {
            self.index.insert(value.to_string(), index);
        }
        Ok(index)
    }

    pub fn rebuild_index(&mut self) -> Result<()> {
        let mut index = HashMap::with_capacity(self.num_strings() as usize);
        for i in 0..self.num_strings() as u32 {
            index.entry(self.get_string(i)?.to_string()).or_insert(i);
        }
        self.index = index;
        self.index_built = true;
        Ok(())
    }

    pub fn reset_to_empty(&mut self) {
        self.string_data.reset_to_empty();
        self.offsets.reset_to_empty();
        self.index.clear();
        self.index_built = true;
    }

    /// Offsets are non-decreasing and inside the byte buffer.
    pub fn sanity_check(&self) -> bool {
        let data_len = self.string_data.num_values();
        let mut prev = 0u64;
        for i in 0..self.num_strings() {
            let offset = u64::read_at(self.offsets.buffer().bytes(), i as usize);
            if offset < prev || offset > data_len {
                return false;
            }
            prev = offset;
        }
        true
    }

    pub fn estimated_memory_usage(&self) -> u64 {
        self.string_data.estimated_memory_usage() + self.offsets.estimated_memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_shares_indices() {
        let mut dict = DictionaryChunk::new(4, true);
        let a = dict.append_string("alpha").unwrap();
        let b = dict.append_string("").unwrap();
        let c = dict.append_string("alpha").unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(dict.num_strings(), 2);
        assert_eq!(dict.get_string(a).unwrap(), "alpha");
        assert_eq!(dict.get_string(b).unwrap(), "");
        assert_eq!(dict.string_length(a).unwrap(), 5);
        assert!(dict.get_string(7).is_err());
        assert!(dict.sanity_check());
    }

    #[test]
    fn without_dedup_every_string_is_new() {
        let mut dict = DictionaryChunk::new(0, false);
        dict.append_string("x").unwrap();
        dict.append_string("x").unwrap();
        assert_eq!(dict.num_strings(), 2);
        assert_eq!(dict.string_data().num_values(), 2);
    }

    #[test]
    fn index_rebuilds_from_children() {
        let mut source = DictionaryChunk::new(4, true);
        source.append_string("a").unwrap();
        source.append_string("bc").unwrap();
        let mut dict = DictionaryChunk::from_parts(
            source.string_data().clone(),
            source.offsets().clone(),
            true,
        );
        assert_eq!(dict.append_string("bc").unwrap(), 1);
        assert_eq!(dict.append_string("d").unwrap(), 2);
    }
}
