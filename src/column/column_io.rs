//! # Column
//!
//! `Column` moves one column's chunks between memory and pages. It owns no
//! data: a flushed chunk is described by an on-disk `ColumnChunkData` tree
//! (metadata per node, no buffers) and every operation takes that descriptor
//! as an argument.
//!
//! ## Column Tree
//!
//! Columns mirror the chunk tree. Every column except the internal children
//! of STRING and LIST has a null column, and the null column is always
//! handled first.
//!
//! ```text
//! INT64         [nulls]
//! STRING        [nulls] children: string_data (UINT8), offsets (UINT64)
//! LIST<T>       [nulls] children: offsets (UINT64), sizes (UINT32), data (T)
//! STRUCT{a,b}   [nulls] children: a, b
//! ```
//!
//! ## Reading
//!
//! `init_chunk_state` builds a `ChunkState` for a descriptor (loading ALP
//! exceptions once). `read_range` decodes `[offset, offset + n)` page by page
//! into a fresh in-memory chunk; `scan` and `lookup` read through it and copy
//! into a `ValueVector`. STRING reads fetch only the dictionary slice the
//! selected rows reference; LIST reads fetch only the data range the
//! selected rows span.
//!
//! ## Checkpoint
//!
//! ```text
//! pending updates (rows sorted, values chunk)
//!         │
//!         ▼
//! can_write_in_place? ──yes──> write pages in place (update_page),
//!         │                    bump counts, merge ALP exceptions
//!         │no
//!         ▼
//! read whole segment ─> apply updates ─> finalize ─> flush (maybe split)
//!                                                     ─> free old pages
//! ```
//!
//! In place requires, for every node of the tree: the written rows stay
//! inside the pages the segment owns, rows past the end extend it without
//! gaps, and the codec accepts the new values under the existing metadata.
//! STRING updates append their strings to the on-disk dictionary. LIST
//! updates append their elements to the data child and repoint the rows;
//! they are only attempted under `ListCheckpointPolicy::AllowInPlace`.

use std::sync::Arc;

use eyre::{bail, ensure, eyre, Result};
use tracing::{debug, trace};

use crate::chunk::{
    ChunkKind, ColumnChunkData, ColumnChunkMetadata, DictionaryChunk, ListChunk, NullChunkData,
};
use crate::compression::{
    choose_metadata, collect_exceptions, compress_pages, compute_min_max, exceptions_from_page,
    exceptions_per_page, exceptions_to_pages, merge_exceptions, patch_exceptions, AlpException,
    Codec, CompressionAlg, CompressionMetadata, CompressionPolicy, StorageValue, ValuesMut,
    ValuesRef,
};
use crate::config::{ListCheckpointPolicy, StorageConfig, MAX_SEGMENT_SIZE};
use crate::storage::{FileHandle, PageCursor, PageRange};
use crate::types::{LogicalType, PhysicalType};
use crate::vector::null_mask::num_words_for;
use crate::vector::ValueVector;

/// Read state of one on-disk chunk and its children.
#[derive(Debug)]
pub struct ChunkState<'a> {
    chunk: &'a ColumnChunkData,
    exceptions: Vec<AlpException>,
    null_state: Option<Box<ChunkState<'a>>>,
    children: Vec<ChunkState<'a>>,
}

impl<'a> ChunkState<'a> {
    pub fn chunk(&self) -> &'a ColumnChunkData {
        self.chunk
    }

    pub fn num_values(&self) -> u64 {
        self.chunk.num_values()
    }

    pub fn metadata(&self) -> &'a ColumnChunkMetadata {
        self.chunk.metadata()
    }

    pub fn num_exceptions(&self) -> usize {
        self.exceptions.len()
    }
}

/// New descriptors for a checkpointed segment.
#[derive(Debug)]
pub struct CheckpointOutcome {
    pub segments: Vec<ColumnChunkData>,
    pub in_place: bool,
}

#[derive(Debug)]
pub struct Column {
    name: String,
    data_type: LogicalType,
    physical: PhysicalType,
    file: Arc<FileHandle>,
    config: StorageConfig,
    null_column: Option<Box<Column>>,
    children: Vec<Column>,
}

/// `(index into rows, first row, run length)` for each run of consecutive rows.
fn runs(rows: &[u64]) -> Vec<(usize, u64, u64)> {
    let mut out: Vec<(usize, u64, u64)> = Vec::new();
    for (i, &row) in rows.iter().enumerate() {
        match out.last_mut() {
            Some((_, first, len)) if *first + *len == row => *len += 1,
            _ => out.push((i, row, 1)),
        }
    }
    out
}

/// Rows at or past `num_values` must continue the segment without gaps.
fn extends_contiguously(num_values: u64, rows: &[u64]) -> bool {
    let tail = rows.partition_point(|&r| r < num_values);
    rows[tail..]
        .iter()
        .enumerate()
        .all(|(j, &r)| r == num_values + j as u64)
}

fn append_rows(start: u64, n: u64) -> Vec<u64> {
    (start..start + n).collect()
}

fn reborrow<'b>(dst: &'b mut ValuesMut<'_>) -> ValuesMut<'b> {
    match dst {
        ValuesMut::Bytes(bytes) => ValuesMut::Bytes(bytes),
        ValuesMut::Bits(words) => ValuesMut::Bits(words),
    }
}

/// Null flags of `values` as a BOOL chunk (set = null).
fn null_flags_of(values: &ColumnChunkData) -> ColumnChunkData {
    let n = values.num_values();
    let mut flags = ColumnChunkData::without_nulls(LogicalType::Bool, n, false);
    for pos in 0..n {
        flags.set_bool(pos, values.is_null(pos));
    }
    flags
}

/// Dictionary pieces that append the non-null strings of `values` to an
/// on-disk dictionary.
struct DictionaryAppend {
    bytes: ColumnChunkData,
    offsets: ColumnChunkData,
    indices: ColumnChunkData,
}

/// List pieces that append the elements of `values` to an on-disk list.
struct ListAppend {
    data: ColumnChunkData,
    offsets: ColumnChunkData,
    sizes: ColumnChunkData,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        data_type: LogicalType,
        file: Arc<FileHandle>,
        config: StorageConfig,
    ) -> Self {
        Self::build(name.into(), data_type, file, config, true)
    }

    fn build(
        name: String,
        data_type: LogicalType,
        file: Arc<FileHandle>,
        config: StorageConfig,
        has_null: bool,
    ) -> Self {
        let physical = data_type.physical_type();
        let null_column = has_null.then(|| {
            Box::new(Self::build(
                format!("{}.null", name),
                LogicalType::Bool,
                Arc::clone(&file),
                config,
                false,
            ))
        });
        let child = |suffix: &str, data_type: LogicalType, has_null: bool| {
            Self::build(
                format!("{}.{}", name, suffix),
                data_type,
                Arc::clone(&file),
                config,
                has_null,
            )
        };
        let children = match physical {
            PhysicalType::String => vec![
                child("data", LogicalType::UInt8, false),
                child("offset", LogicalType::UInt64, false),
            ],
            PhysicalType::List | PhysicalType::Array => vec![
                child("offset", LogicalType::UInt64, false),
                child("size", LogicalType::UInt32, false),
                child(
                    "data",
                    data_type.child_type().cloned().unwrap_or(LogicalType::Int64),
                    true,
                ),
            ],
            PhysicalType::Struct => data_type
                .fields()
                .iter()
                .map(|f| child(&f.name, f.data_type.clone(), true))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            name,
            data_type,
            physical,
            file,
            config,
            null_column,
            children,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &LogicalType {
        &self.data_type
    }

    pub fn file(&self) -> &Arc<FileHandle> {
        &self.file
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn null_column(&self) -> Option<&Column> {
        self.null_column.as_deref()
    }

    pub fn children(&self) -> &[Column] {
        &self.children
    }

    fn require_null_column(&self) -> Result<&Column> {
        self.null_column
            .as_deref()
            .ok_or_else(|| eyre!("column '{}' has no null column", self.name))
    }

    fn child(&self, idx: usize) -> Result<&Column> {
        self.children
            .get(idx)
            .ok_or_else(|| eyre!("column '{}' has no child {}", self.name, idx))
    }

    fn policy_for(&self, chunk: &ColumnChunkData) -> CompressionPolicy {
        CompressionPolicy {
            enable_compression: chunk.enable_compression() && self.config.enable_compression(),
            alp_max_exception_ratio: self.config.alp_max_exception_ratio(),
        }
    }

    // ------------------------------------------------------------------
    // Flush
    // ------------------------------------------------------------------

    /// Compresses an in-memory chunk into freshly allocated pages and
    /// returns its on-disk descriptor.
    pub fn flush(&self, chunk: &ColumnChunkData) -> Result<ColumnChunkData> {
        ensure!(
            chunk.is_in_memory(),
            "column '{}' asked to flush a chunk that is already on disk",
            self.name
        );
        ensure!(
            chunk.physical_type() == self.physical,
            "column '{}' of type {} cannot flush a {} chunk",
            self.name,
            self.data_type,
            chunk.data_type()
        );
        let null_data = match chunk.null_data() {
            Some(nulls) => Some(NullChunkData::from_data(
                self.require_null_column()?.flush(nulls.data())?,
                nulls.may_have_null(),
            )),
            None => None,
        };
        let metadata = self.flush_buffer(chunk)?;
        let kind = match chunk.kind() {
            ChunkKind::Fixed => ChunkKind::Fixed,
            ChunkKind::Bool => ChunkKind::Bool,
            ChunkKind::InternalId { common_table_id } => ChunkKind::InternalId {
                common_table_id: *common_table_id,
            },
            ChunkKind::String(dict) => ChunkKind::String(Box::new(DictionaryChunk::from_parts(
                self.child(0)?.flush(dict.string_data())?,
                self.child(1)?.flush(dict.offsets())?,
                chunk.enable_compression(),
            ))),
            ChunkKind::List(list) => ChunkKind::List(Box::new(ListChunk::from_parts(
                self.child(0)?.flush(list.offsets())?,
                self.child(1)?.flush(list.sizes())?,
                self.child(2)?.flush(list.data())?,
            ))),
            ChunkKind::Struct(fields) => ChunkKind::Struct(
                fields
                    .iter()
                    .zip(&self.children)
                    .map(|(field, column)| column.flush(field))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(ColumnChunkData::new_on_disk(
            chunk.data_type().clone(),
            chunk.enable_compression(),
            metadata,
            null_data,
            kind,
        ))
    }

    fn flush_buffer(&self, chunk: &ColumnChunkData) -> Result<ColumnChunkMetadata> {
        let num_values = chunk.num_values();
        if self.physical.is_nested() {
            return Ok(ColumnChunkMetadata::new(
                PageRange::empty(),
                num_values,
                CompressionMetadata::constant(StorageValue::zero(self.physical)),
            ));
        }
        let src = chunk.buffer().values_ref();
        let nulls = chunk.null_words();
        let stats = compute_min_max(self.physical, src, 0, num_values, nulls);
        let compression = choose_metadata(
            self.physical,
            src,
            num_values,
            nulls,
            stats,
            &self.policy_for(chunk),
        );
        let pages = compress_pages(self.physical, src, num_values, nulls, &compression)?;
        let range = self.file.allocate_page_range(pages.num_pages() as u32)?;
        for (page_idx, page) in range.iter().zip(pages.into_pages()) {
            self.file.write_page(page_idx, &page)?;
        }
        trace!(
            column = %self.name,
            num_values,
            compression = ?compression.compression,
            pages = range.num_pages,
            "flushed chunk"
        );
        Ok(ColumnChunkMetadata::new(range, num_values, compression))
    }

    /// Flushes `chunk`, splitting it into several segments when it is larger
    /// than `MAX_SEGMENT_SIZE`.
    pub fn flush_split(&self, chunk: &ColumnChunkData) -> Result<Vec<ColumnChunkData>> {
        let size = chunk.estimated_memory_usage();
        let num_values = chunk.num_values();
        if size <= MAX_SEGMENT_SIZE || num_values <= 1 {
            return Ok(vec![self.flush(chunk)?]);
        }
        let pieces = size.div_ceil(MAX_SEGMENT_SIZE).min(num_values);
        let rows_per_piece = num_values.div_ceil(pieces);
        debug!(
            column = %self.name,
            num_values,
            size,
            pieces,
            "splitting chunk into segments"
        );
        let mut segments = Vec::with_capacity(pieces as usize);
        let mut start = 0;
        while start < num_values {
            let n = rows_per_piece.min(num_values - start);
            let mut piece = if chunk.has_null_data() {
                ColumnChunkData::new(chunk.data_type().clone(), n, chunk.enable_compression())
            } else {
                ColumnChunkData::without_nulls(chunk.data_type().clone(), n, chunk.enable_compression())
            };
            piece.append_chunk(chunk, start, n)?;
            piece.finalize()?;
            segments.push(self.flush(&piece)?);
            start += n;
        }
        Ok(segments)
    }

    /// Returns every page range of an on-disk chunk tree to the allocator.
    pub fn free_chunk(&self, chunk: &ColumnChunkData) -> Result<()> {
        if chunk.is_in_memory() {
            return Ok(());
        }
        if let Some(nulls) = chunk.null_data() {
            self.require_null_column()?.free_chunk(nulls.data())?;
        }
        self.file.free_page_range(chunk.metadata().page_range)?;
        match chunk.kind() {
            ChunkKind::String(dict) => {
                self.child(0)?.free_chunk(dict.string_data())?;
                self.child(1)?.free_chunk(dict.offsets())?;
            }
            ChunkKind::List(list) => {
                self.child(0)?.free_chunk(list.offsets())?;
                self.child(1)?.free_chunk(list.sizes())?;
                self.child(2)?.free_chunk(list.data())?;
            }
            ChunkKind::Struct(fields) => {
                for (field, column) in fields.iter().zip(&self.children) {
                    column.free_chunk(field)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    pub fn init_chunk_state<'a>(&self, chunk: &'a ColumnChunkData) -> Result<ChunkState<'a>> {
        ensure!(
            !chunk.is_in_memory(),
            "column '{}' reads on-disk chunks only",
            self.name
        );
        let null_state = match chunk.null_data() {
            Some(nulls) => Some(Box::new(
                self.require_null_column()?.init_chunk_state(nulls.data())?,
            )),
            None => None,
        };
        let children = match chunk.kind() {
            ChunkKind::String(dict) => vec![
                self.child(0)?.init_chunk_state(dict.string_data())?,
                self.child(1)?.init_chunk_state(dict.offsets())?,
            ],
            ChunkKind::List(list) => vec![
                self.child(0)?.init_chunk_state(list.offsets())?,
                self.child(1)?.init_chunk_state(list.sizes())?,
                self.child(2)?.init_chunk_state(list.data())?,
            ],
            ChunkKind::Struct(fields) => fields
                .iter()
                .zip(&self.children)
                .map(|(field, column)| column.init_chunk_state(field))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        self.file.prefetch(chunk.metadata().page_range);
        Ok(ChunkState {
            chunk,
            exceptions: self.read_exceptions(chunk)?,
            null_state,
            children,
        })
    }

    fn read_exceptions(&self, chunk: &ColumnChunkData) -> Result<Vec<AlpException>> {
        let meta = chunk.metadata();
        let Some(alp) = meta.compression.alp else {
            return Ok(Vec::new());
        };
        let mut remaining = alp.exception_count as usize;
        let mut exceptions = Vec::with_capacity(remaining);
        let per_page = exceptions_per_page(self.physical) as usize;
        let mut page_idx = meta.start_page() + meta.num_data_pages(self.physical) as u32;
        while remaining > 0 {
            let count = remaining.min(per_page);
            exceptions.extend(
                self.file
                    .optimistic_read(page_idx, |page| exceptions_from_page(self.physical, page, count))??,
            );
            remaining -= count;
            page_idx += 1;
        }
        Ok(exceptions)
    }

    /// Decodes the main buffer values `[offset, offset + n)` of an on-disk
    /// chunk into `dst` starting at `dst_offset`.
    fn read_values(
        &self,
        chunk: &ColumnChunkData,
        exceptions: &[AlpException],
        offset: u64,
        num_values: u64,
        mut dst: ValuesMut<'_>,
        dst_offset: u64,
    ) -> Result<()> {
        if num_values == 0 {
            return Ok(());
        }
        ensure!(
            offset + num_values <= chunk.num_values(),
            "column '{}' read of [{}, {}) past {} values",
            self.name,
            offset,
            offset + num_values,
            chunk.num_values()
        );
        let meta = &chunk.metadata().compression;
        let codec = Codec::for_metadata(self.physical, meta);
        let per_page = meta.num_values_per_page(self.physical);
        if per_page == u64::MAX {
            codec.decompress_from_page(&[], offset, reborrow(&mut dst), dst_offset, num_values, meta)?;
        } else {
            let start_page = chunk.metadata().start_page();
            let mut done = 0;
            while done < num_values {
                let cursor = PageCursor::for_offset(start_page, offset + done, per_page);
                let n = (num_values - done).min(per_page - cursor.elem_pos_in_page);
                let view = reborrow(&mut dst);
                self.file.optimistic_read(cursor.page_idx, |page| {
                    codec.decompress_from_page(page, cursor.elem_pos_in_page, view, dst_offset + done, n, meta)
                })??;
                done += n;
            }
        }
        if !exceptions.is_empty() {
            if let ValuesMut::Bytes(bytes) = dst {
                patch_exceptions(self.physical, exceptions, offset, num_values, bytes, dst_offset);
            }
        }
        Ok(())
    }

    fn empty_chunk(&self, chunk: &ColumnChunkData, capacity: u64) -> ColumnChunkData {
        if chunk.has_null_data() {
            ColumnChunkData::new(chunk.data_type().clone(), capacity, chunk.enable_compression())
        } else {
            ColumnChunkData::without_nulls(chunk.data_type().clone(), capacity, chunk.enable_compression())
        }
    }

    /// Reads `[offset, offset + n)` of an on-disk chunk into a new in-memory
    /// chunk.
    pub fn read_range(&self, state: &ChunkState<'_>, offset: u64, num_values: u64) -> Result<ColumnChunkData> {
        let chunk = state.chunk;
        ensure!(
            offset + num_values <= chunk.num_values(),
            "column '{}' read of [{}, {}) past {} values",
            self.name,
            offset,
            offset + num_values,
            chunk.num_values()
        );
        let mut out = self.empty_chunk(chunk, num_values);
        if let Some(null_state) = state.null_state.as_deref() {
            let mut words = vec![0u64; num_words_for(num_values)];
            self.require_null_column()?.read_values(
                null_state.chunk,
                &[],
                offset,
                num_values,
                ValuesMut::Bits(&mut words),
                0,
            )?;
            if let Some(nulls) = out.null_data_mut() {
                nulls.copy_bits_from(Some(&words), 0, 0, num_values);
            }
        }
        match chunk.kind() {
            ChunkKind::Fixed | ChunkKind::Bool => {
                self.read_values(chunk, &state.exceptions, offset, num_values, out.buffer_mut().values_mut(), 0)?;
            }
            ChunkKind::InternalId { common_table_id } => {
                self.read_values(chunk, &[], offset, num_values, out.buffer_mut().values_mut(), 0)?;
                out.set_table_id(*common_table_id);
            }
            ChunkKind::String(dict) => {
                let dict = self.read_dictionary_slice(state, dict, &mut out, offset, num_values)?;
                *out.kind_mut() = ChunkKind::String(Box::new(dict));
            }
            ChunkKind::List(_) => {
                let list = self.read_list_slice(state, &out, offset, num_values)?;
                *out.kind_mut() = ChunkKind::List(Box::new(list));
            }
            ChunkKind::Struct(_) => {
                let fields = self
                    .children
                    .iter()
                    .zip(&state.children)
                    .map(|(column, child_state)| column.read_range(child_state, offset, num_values))
                    .collect::<Result<Vec<_>>>()?;
                *out.kind_mut() = ChunkKind::Struct(fields);
            }
        }
        out.set_num_values_unchecked(num_values);
        Ok(out)
    }

    /// Reads the dictionary indices of the selected rows into `out` and
    /// returns the dictionary slice they reference, with indices rebased.
    fn read_dictionary_slice(
        &self,
        state: &ChunkState<'_>,
        dict: &DictionaryChunk,
        out: &mut ColumnChunkData,
        offset: u64,
        num_values: u64,
    ) -> Result<DictionaryChunk> {
        self.read_values(state.chunk, &[], offset, num_values, out.buffer_mut().values_mut(), 0)?;
        let referenced = (0..num_values)
            .filter(|&i| !out.is_null(i))
            .map(|i| out.get::<u32>(i) as u64);
        let (lo, hi) = referenced.fold((u64::MAX, 0), |(lo, hi), idx| (lo.min(idx), hi.max(idx)));
        if lo == u64::MAX {
            return Ok(DictionaryChunk::new(0, out.enable_compression()));
        }
        let num_strings = dict.num_strings();
        ensure!(
            hi < num_strings,
            "malformed dictionary in column '{}': index {} of {} strings",
            self.name,
            hi,
            num_strings
        );
        let (data_column, offset_column) = (self.child(0)?, self.child(1)?);
        let (data_state, offset_state) = (&state.children[0], &state.children[1]);
        let starts = offset_column.read_range(offset_state, lo, hi + 1 - lo)?;
        let byte_start = starts.get::<u64>(0);
        let byte_end = if hi + 1 < num_strings {
            offset_column.read_range(offset_state, hi + 1, 1)?.get::<u64>(0)
        } else {
            dict.string_data().num_values()
        };
        ensure!(
            byte_start <= byte_end,
            "malformed dictionary in column '{}': strings span [{}, {})",
            self.name,
            byte_start,
            byte_end
        );
        let bytes = data_column.read_range(data_state, byte_start, byte_end - byte_start)?;
        let count = hi + 1 - lo;
        let mut rebased = ColumnChunkData::without_nulls(LogicalType::UInt64, count, out.enable_compression());
        for j in 0..count {
            rebased.set::<u64>(j, starts.get::<u64>(j) - byte_start);
        }
        for i in 0..num_values {
            let index = if out.is_null(i) { 0 } else { out.get::<u32>(i) - lo as u32 };
            out.set::<u32>(i, index);
        }
        Ok(DictionaryChunk::from_parts(bytes, rebased, out.enable_compression()))
    }

    /// Reads offsets, sizes and the spanned data range of the selected rows.
    fn read_list_slice(
        &self,
        state: &ChunkState<'_>,
        out: &ColumnChunkData,
        offset: u64,
        num_values: u64,
    ) -> Result<ListChunk> {
        let ends = self.child(0)?.read_range(&state.children[0], offset, num_values)?;
        let sizes = self.child(1)?.read_range(&state.children[1], offset, num_values)?;
        let (mut lo, mut hi) = (u64::MAX, 0u64);
        for i in 0..num_values {
            if out.is_null(i) {
                continue;
            }
            let end = ends.get::<u64>(i);
            let start = end - sizes.get::<u32>(i) as u64;
            lo = lo.min(start);
            hi = hi.max(end);
        }
        let data_column = self.child(2)?;
        let data = if lo == u64::MAX || hi == lo {
            ColumnChunkData::new(data_column.data_type.clone(), 0, out.enable_compression())
        } else {
            data_column.read_range(&state.children[2], lo, hi - lo)?
        };
        let mut rebased = ColumnChunkData::without_nulls(LogicalType::UInt64, num_values, out.enable_compression());
        let mut row_sizes = ColumnChunkData::without_nulls(LogicalType::UInt32, num_values, out.enable_compression());
        for i in 0..num_values {
            if out.is_null(i) {
                rebased.set::<u64>(i, 0);
                row_sizes.set::<u32>(i, 0);
            } else {
                rebased.set::<u64>(i, ends.get::<u64>(i) - lo);
                row_sizes.set::<u32>(i, sizes.get::<u32>(i));
            }
        }
        Ok(ListChunk::from_parts(rebased, row_sizes, data))
    }

    /// Reads a whole on-disk chunk back into memory.
    pub fn read_chunk(&self, chunk: &ColumnChunkData) -> Result<ColumnChunkData> {
        let state = self.init_chunk_state(chunk)?;
        self.read_range(&state, 0, chunk.num_values())
    }

    /// Copies `[offset, offset + n)` into `vector` at `pos_in_vector`.
    pub fn scan(
        &self,
        state: &ChunkState<'_>,
        offset: u64,
        num_values: u64,
        vector: &mut ValueVector,
        pos_in_vector: u64,
    ) -> Result<()> {
        let chunk = self.read_range(state, offset, num_values)?;
        chunk.scan(vector, 0, num_values, pos_in_vector)
    }

    pub fn lookup(
        &self,
        state: &ChunkState<'_>,
        offset: u64,
        vector: &mut ValueVector,
        pos_in_vector: u64,
    ) -> Result<()> {
        self.scan(state, offset, 1, vector, pos_in_vector)
    }

    /// Zone-map check: whether the chunk's value range can intersect
    /// `[lo, hi]`. Nested and all-null chunks always may.
    pub fn may_contain(&self, chunk: &ColumnChunkData, lo: StorageValue, hi: StorageValue) -> bool {
        if self.physical.is_nested() || self.physical == PhysicalType::Bool {
            return true;
        }
        let meta = &chunk.metadata().compression;
        meta.max.cmp_total(&lo).is_ge() && meta.min.cmp_total(&hi).is_le()
    }

    // ------------------------------------------------------------------
    // In-place writes
    // ------------------------------------------------------------------

    fn can_write_values(&self, chunk: &ColumnChunkData, rows: &[u64], src: ValuesRef<'_>, nulls: Option<&[u64]>) -> bool {
        let Some(&max_row) = rows.last() else {
            return true;
        };
        let meta = chunk.metadata();
        if !meta.fits_in_pages(self.physical, max_row + 1) {
            return false;
        }
        Codec::for_metadata(self.physical, &meta.compression).can_update_in_place(
            src,
            0,
            rows.len() as u64,
            nulls,
            &meta.compression,
        )
    }

    fn dictionary_append(&self, dict: &DictionaryChunk, values: &ColumnChunkData) -> Result<DictionaryAppend> {
        let src = values
            .dictionary()
            .ok_or_else(|| eyre!("column '{}' given {} updates", self.name, values.data_type()))?;
        let n = values.num_values();
        let ec = values.enable_compression();
        let mut bytes = ColumnChunkData::without_nulls(LogicalType::UInt8, 0, ec);
        let mut offsets = ColumnChunkData::without_nulls(LogicalType::UInt64, n, ec);
        let mut indices = ColumnChunkData::without_nulls(LogicalType::UInt32, n, ec);
        let mut next_byte = dict.string_data().num_values();
        let mut next_index = dict.num_strings();
        let mut appended = 0;
        for i in 0..n {
            if values.is_null(i) {
                indices.set::<u32>(i, 0);
                continue;
            }
            let s = src.get_string(values.get::<u32>(i))?;
            offsets.set::<u64>(appended, next_byte);
            bytes.append_bytes(s.as_bytes());
            indices.set::<u32>(i, next_index as u32);
            next_byte += s.len() as u64;
            next_index += 1;
            appended += 1;
        }
        offsets.set_num_values_unchecked(appended);
        Ok(DictionaryAppend {
            bytes,
            offsets,
            indices,
        })
    }

    fn list_append(&self, list: &ListChunk, values: &ColumnChunkData) -> Result<ListAppend> {
        let src = values
            .list()
            .ok_or_else(|| eyre!("column '{}' given {} updates", self.name, values.data_type()))?;
        let nulls = values.null_data();
        let n = values.num_values();
        let ec = values.enable_compression();
        let mut data = ColumnChunkData::new(self.child(2)?.data_type.clone(), 0, ec);
        let mut offsets = ColumnChunkData::without_nulls(LogicalType::UInt64, n, ec);
        let mut sizes = ColumnChunkData::without_nulls(LogicalType::UInt32, n, ec);
        let mut end = list.data().num_values();
        for i in 0..n {
            let size = src.list_size(i, nulls);
            data.append_chunk(src.data(), src.list_start_offset(i, nulls), size)?;
            end += size;
            offsets.set::<u64>(i, end);
            sizes.set::<u32>(i, size as u32);
        }
        Ok(ListAppend { data, offsets, sizes })
    }

    /// Whether writing `values[i]` to row `rows[i]` (sorted) of an on-disk
    /// chunk can be done inside its existing pages and encodings.
    pub fn can_write_in_place(&self, chunk: &ColumnChunkData, rows: &[u64], values: &ColumnChunkData) -> Result<bool> {
        if rows.is_empty() {
            return Ok(true);
        }
        ensure!(
            values.num_values() == rows.len() as u64,
            "column '{}' given {} values for {} rows",
            self.name,
            values.num_values(),
            rows.len()
        );
        if !extends_contiguously(chunk.num_values(), rows) {
            return Ok(false);
        }
        match chunk.null_data() {
            Some(nulls) => {
                let flags = null_flags_of(values);
                if !self
                    .require_null_column()?
                    .can_write_in_place(nulls.data(), rows, &flags)?
                {
                    return Ok(false);
                }
            }
            None => {
                if values.null_data().is_some_and(|n| n.count_nulls() > 0) {
                    return Ok(false);
                }
            }
        }
        let nulls = values.null_words();
        Ok(match chunk.kind() {
            ChunkKind::Fixed | ChunkKind::Bool => {
                self.can_write_values(chunk, rows, values.buffer().values_ref(), nulls)
            }
            ChunkKind::InternalId { common_table_id } => {
                let src_table = values.common_table_id().unwrap_or(*common_table_id);
                (src_table == *common_table_id || values.null_data().is_some_and(|n| n.count_nulls() == values.num_values()))
                    && self.can_write_values(chunk, rows, values.buffer().values_ref(), nulls)
            }
            ChunkKind::String(dict) => {
                let append = self.dictionary_append(dict, values)?;
                self.child(0)?.can_write_in_place(
                    dict.string_data(),
                    &append_rows(dict.string_data().num_values(), append.bytes.num_values()),
                    &append.bytes,
                )? && self.child(1)?.can_write_in_place(
                    dict.offsets(),
                    &append_rows(dict.num_strings(), append.offsets.num_values()),
                    &append.offsets,
                )? && self.can_write_values(chunk, rows, append.indices.buffer().values_ref(), nulls)
            }
            ChunkKind::List(list) => {
                if self.config.list_checkpoint_policy() == ListCheckpointPolicy::AlwaysOutOfPlace {
                    return Ok(false);
                }
                let append = self.list_append(list, values)?;
                self.child(2)?.can_write_in_place(
                    list.data(),
                    &append_rows(list.data().num_values(), append.data.num_values()),
                    &append.data,
                )? && self.child(0)?.can_write_in_place(list.offsets(), rows, &append.offsets)?
                    && self.child(1)?.can_write_in_place(list.sizes(), rows, &append.sizes)?
            }
            ChunkKind::Struct(fields) => {
                let src_fields = values.struct_children();
                ensure!(
                    src_fields.len() == fields.len(),
                    "column '{}' given {} struct fields for {}",
                    self.name,
                    src_fields.len(),
                    fields.len()
                );
                for ((field, column), src) in fields.iter().zip(&self.children).zip(src_fields) {
                    if !column.can_write_in_place(field, rows, src)? {
                        return Ok(false);
                    }
                }
                true
            }
        })
    }

    /// Writes values into the pages of an on-disk chunk. Callers check
    /// `can_write_in_place` first; the descriptor's counts and ALP state are
    /// updated to match.
    pub fn write_in_place(&self, chunk: &mut ColumnChunkData, rows: &[u64], values: &ColumnChunkData) -> Result<()> {
        let Some(&max_row) = rows.last() else {
            return Ok(());
        };
        if let Some(mut nulls) = chunk.take_null_data() {
            let flags = null_flags_of(values);
            let result = self
                .require_null_column()
                .and_then(|column| column.write_in_place(nulls.data_mut(), rows, &flags));
            let may_have_null = nulls.may_have_null() || values.null_data().is_some_and(|n| n.count_nulls() > 0);
            let data = nulls.data().clone();
            chunk.set_null_data(Some(NullChunkData::from_data(data, may_have_null)));
            result?;
        }
        let nulls = values.null_words();
        match chunk.kind_mut() {
            ChunkKind::Fixed | ChunkKind::Bool | ChunkKind::InternalId { .. } => {}
            ChunkKind::String(dict) => {
                let append = self.dictionary_append(dict, values)?;
                let data_rows = append_rows(dict.string_data().num_values(), append.bytes.num_values());
                let offset_rows = append_rows(dict.num_strings(), append.offsets.num_values());
                self.child(0)?.write_in_place(dict.string_data_mut(), &data_rows, &append.bytes)?;
                self.child(1)?.write_in_place(dict.offsets_mut(), &offset_rows, &append.offsets)?;
                self.write_values(chunk, rows, append.indices.buffer().values_ref(), nulls)?;
                self.extend_to(chunk, max_row + 1);
                return Ok(());
            }
            ChunkKind::List(list) => {
                let append = self.list_append(list, values)?;
                let data_rows = append_rows(list.data().num_values(), append.data.num_values());
                self.child(2)?.write_in_place(list.data_mut(), &data_rows, &append.data)?;
                self.child(0)?.write_in_place(list.offsets_mut(), rows, &append.offsets)?;
                self.child(1)?.write_in_place(list.sizes_mut(), rows, &append.sizes)?;
            }
            ChunkKind::Struct(fields) => {
                for ((field, column), src) in fields.iter_mut().zip(&self.children).zip(values.struct_children()) {
                    column.write_in_place(field, rows, src)?;
                }
            }
        }
        if !self.physical.is_nested() {
            self.write_values(chunk, rows, values.buffer().values_ref(), nulls)?;
        }
        self.extend_to(chunk, max_row + 1);
        Ok(())
    }

    fn extend_to(&self, chunk: &mut ColumnChunkData, num_values: u64) {
        if num_values > chunk.num_values() {
            chunk.set_num_values_unchecked(num_values);
            chunk.metadata_mut().num_values = num_values;
        }
    }

    fn write_values(
        &self,
        chunk: &mut ColumnChunkData,
        rows: &[u64],
        src: ValuesRef<'_>,
        nulls: Option<&[u64]>,
    ) -> Result<()> {
        let meta = chunk.metadata().clone();
        let compression = &meta.compression;
        let codec = Codec::for_metadata(self.physical, compression);
        let per_page = compression.num_values_per_page(self.physical);
        let runs = runs(rows);
        if per_page != u64::MAX {
            for &(first_idx, first_row, len) in &runs {
                let mut done = 0;
                while done < len {
                    let cursor = PageCursor::for_offset(meta.start_page(), first_row + done, per_page);
                    let n = (len - done).min(per_page - cursor.elem_pos_in_page);
                    let src_offset = first_idx as u64 + done;
                    self.file.update_page(cursor.page_idx, |page| {
                        codec.set_values_in_page(page, cursor.elem_pos_in_page, src, src_offset, n, nulls, compression)
                    })??;
                    done += n;
                }
            }
        }
        if let Some(alp) = compression.alp {
            let mut exceptions = self.read_exceptions(chunk)?;
            let bytes = src.bytes()?;
            for &(first_idx, first_row, len) in &runs {
                let replacements = collect_exceptions(
                    self.physical,
                    bytes,
                    first_idx as u64,
                    len,
                    nulls,
                    compression,
                    first_row,
                )?;
                merge_exceptions(&mut exceptions, first_row, len, replacements);
            }
            ensure!(
                exceptions.len() as u64 <= alp.exception_capacity as u64,
                "column '{}' has {} ALP exceptions for {} reserved slots",
                self.name,
                exceptions.len(),
                alp.exception_capacity
            );
            let num_exception_pages = compression.num_exception_pages(self.physical);
            let first_page = meta.start_page() + meta.num_data_pages(self.physical) as u32;
            for (i, page) in exceptions_to_pages(self.physical, &exceptions, num_exception_pages)
                .into_iter()
                .enumerate()
            {
                self.file.write_page(first_page + i as u32, &page)?;
            }
            if let Some(state) = chunk.metadata_mut().compression.alp.as_mut() {
                state.exception_count = exceptions.len() as u32;
            }
        }
        // Keep the zone map covering every value now stored in the pages.
        let stored = &mut chunk.metadata_mut().compression;
        for &(first_idx, _, len) in &runs {
            if let Some((lo, hi)) = compute_min_max(self.physical, src, first_idx as u64, len, nulls) {
                stored.widen(lo);
                stored.widen(hi);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checkpoint
    // ------------------------------------------------------------------

    /// Applies pending updates (`values[i]` for `rows[i]`, rows sorted and
    /// relative to the segment) to an on-disk segment.
    pub fn checkpoint_segment(
        &self,
        segment: &ColumnChunkData,
        rows: &[u64],
        values: &ColumnChunkData,
    ) -> Result<CheckpointOutcome> {
        if rows.is_empty() {
            return Ok(CheckpointOutcome {
                segments: vec![segment.clone()],
                in_place: true,
            });
        }
        if self.can_write_in_place(segment, rows, values)? {
            let mut updated = segment.clone();
            self.write_in_place(&mut updated, rows, values)?;
            debug!(column = %self.name, rows = rows.len(), "checkpointed segment in place");
            return Ok(CheckpointOutcome {
                segments: vec![updated],
                in_place: true,
            });
        }
        debug!(
            column = %self.name,
            rows = rows.len(),
            num_values = segment.num_values(),
            "checkpointing segment out of place"
        );
        let mut chunk = self.read_chunk(segment)?;
        apply_updates(&mut chunk, rows, values)?;
        chunk.finalize()?;
        let segments = self.flush_split(&chunk)?;
        self.free_chunk(segment)?;
        Ok(CheckpointOutcome {
            segments,
            in_place: false,
        })
    }

    /// Applies pending updates to an in-memory segment and flushes it.
    pub fn checkpoint_in_memory(
        &self,
        segment: &ColumnChunkData,
        rows: &[u64],
        values: &ColumnChunkData,
    ) -> Result<Vec<ColumnChunkData>> {
        if !segment.is_in_memory() {
            bail!("column '{}' expected an in-memory segment", self.name);
        }
        let mut chunk = segment.clone();
        apply_updates(&mut chunk, rows, values)?;
        chunk.finalize()?;
        self.flush_split(&chunk)
    }
}

fn apply_updates(chunk: &mut ColumnChunkData, rows: &[u64], values: &ColumnChunkData) -> Result<()> {
    for (i, &row) in rows.iter().enumerate() {
        chunk.write_chunk(values, i as u64, row, 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionType;
    use crate::types::{StructField, Value};
    use crate::vector::SelectionVector;

    fn column(data_type: LogicalType) -> Column {
        column_with(data_type, StorageConfig::default())
    }

    fn column_with(data_type: LogicalType, config: StorageConfig) -> Column {
        Column::new("c", data_type, Arc::new(FileHandle::in_memory()), config)
    }

    fn chunk_of(data_type: LogicalType, values: &[Value]) -> ColumnChunkData {
        let vector = ValueVector::from_values(data_type.clone(), values).unwrap();
        let mut chunk = ColumnChunkData::new(data_type, values.len() as u64, true);
        chunk
            .append(&vector, &SelectionVector::unfiltered(values.len()))
            .unwrap();
        chunk
    }

    fn scan_all(column: &Column, chunk: &ColumnChunkData) -> Vec<Value> {
        let state = column.init_chunk_state(chunk).unwrap();
        let n = chunk.num_values();
        let mut out = ValueVector::new(column.data_type().clone(), n);
        column.scan(&state, 0, n, &mut out, 0).unwrap();
        (0..n).map(|i| out.get_value(i)).collect()
    }

    #[test]
    fn flush_and_scan_integers_with_nulls() {
        let values: Vec<Value> = (0..5000)
            .map(|i| if i % 7 == 0 { Value::Null } else { Value::Int64(1000 + i % 300) })
            .collect();
        let column = column(LogicalType::Int64);
        let disk = column.flush(&chunk_of(LogicalType::Int64, &values)).unwrap();
        assert_eq!(
            disk.metadata().compression.compression,
            CompressionType::IntegerBitpacking
        );
        assert!(!disk.is_in_memory());
        assert_eq!(scan_all(&column, &disk), values);

        let state = column.init_chunk_state(&disk).unwrap();
        let mut out = ValueVector::new(LogicalType::Int64, 4);
        column.scan(&state, 4095, 3, &mut out, 1).unwrap();
        assert_eq!(out.get_value(1), values[4095]);
        assert_eq!(out.get_value(3), values[4097]);
    }

    #[test]
    fn constant_chunks_own_no_pages() {
        let column = column(LogicalType::Int32);
        let values = vec![Value::Int32(9); 3000];
        let disk = column.flush(&chunk_of(LogicalType::Int32, &values)).unwrap();
        assert!(disk.metadata().compression.is_constant());
        assert_eq!(disk.metadata().num_pages(), 0);
        assert_eq!(scan_all(&column, &disk)[2999], Value::Int32(9));
    }

    #[test]
    fn strings_read_only_referenced_dictionary_slice() {
        let values: Vec<Value> = (0..600)
            .map(|i| match i % 4 {
                0 => Value::Null,
                _ => Value::String(format!("name-{}", i % 50)),
            })
            .collect();
        let column = column(LogicalType::String);
        let disk = column.flush(&chunk_of(LogicalType::String, &values)).unwrap();
        assert_eq!(scan_all(&column, &disk), values);

        let state = column.init_chunk_state(&disk).unwrap();
        let slice = column.read_range(&state, 101, 2).unwrap();
        assert_eq!(slice.dictionary().unwrap().num_strings(), 2);
        assert_eq!(slice.get_value(1).unwrap(), values[102]);
    }

    #[test]
    fn lists_and_structs_round_trip_through_pages() {
        let list_type = LogicalType::list(LogicalType::Int32);
        let lists: Vec<Value> = (0..300)
            .map(|i| match i % 5 {
                0 => Value::Null,
                1 => Value::List(vec![]),
                _ => Value::List((0..i % 7).map(Value::Int32).collect()),
            })
            .collect();
        let list_column = column(list_type.clone());
        let disk = list_column.flush(&chunk_of(list_type, &lists)).unwrap();
        assert_eq!(scan_all(&list_column, &disk), lists);

        let struct_type = LogicalType::structure(vec![
            StructField::new("a", LogicalType::Int64),
            StructField::new("b", LogicalType::String),
        ]);
        let rows: Vec<Value> = (0..100)
            .map(|i| {
                if i % 9 == 0 {
                    Value::Null
                } else {
                    Value::Struct(vec![Value::Int64(i), Value::from(format!("s{}", i).as_str())])
                }
            })
            .collect();
        let struct_column = column(struct_type.clone());
        let disk = struct_column.flush(&chunk_of(struct_type, &rows)).unwrap();
        assert_eq!(scan_all(&struct_column, &disk), rows);
    }

    #[test]
    fn in_place_checkpoint_keeps_pages() {
        let values: Vec<Value> = (0..1000).map(|i| Value::Int64(i % 100)).collect();
        let column = column(LogicalType::Int64);
        let disk = column.flush(&chunk_of(LogicalType::Int64, &values)).unwrap();
        let updates = chunk_of(LogicalType::Int64, &[Value::Int64(42), Value::Int64(7)]);
        let outcome = column.checkpoint_segment(&disk, &[10, 20], &updates).unwrap();
        assert!(outcome.in_place);
        let seg = &outcome.segments[0];
        assert_eq!(seg.metadata().page_range, disk.metadata().page_range);
        let read = scan_all(&column, seg);
        assert_eq!(read[10], Value::Int64(42));
        assert_eq!(read[20], Value::Int64(7));
        assert_eq!(read[11], Value::Int64(11));

        let with_null = chunk_of(LogicalType::Int64, &[Value::Null]);
        let outcome = column.checkpoint_segment(seg, &[30], &with_null).unwrap();
        assert!(!outcome.in_place);
        assert_eq!(scan_all(&column, &outcome.segments[0])[30], Value::Null);
    }

    #[test]
    fn out_of_range_update_rewrites_segment() {
        let values: Vec<Value> = (0..1000).map(|i| Value::Int64(i % 100)).collect();
        let column = column(LogicalType::Int64);
        let disk = column.flush(&chunk_of(LogicalType::Int64, &values)).unwrap();
        let updates = chunk_of(LogicalType::Int64, &[Value::Int64(1 << 40)]);
        let outcome = column.checkpoint_segment(&disk, &[500], &updates).unwrap();
        assert!(!outcome.in_place);
        let read = scan_all(&column, &outcome.segments[0]);
        assert_eq!(read[500], Value::Int64(1 << 40));
        assert_eq!(read[999], Value::Int64(99));
        assert!(column.file().num_free_pages() > 0);
    }

    #[test]
    fn alp_exceptions_merge_in_place() {
        let mut values: Vec<Value> = (0..2000).map(|i| Value::Double(i as f64 / 10.0)).collect();
        values[7] = Value::Double(std::f64::consts::PI);
        let column = column(LogicalType::Double);
        let disk = column.flush(&chunk_of(LogicalType::Double, &values)).unwrap();
        assert_eq!(disk.metadata().compression.compression, CompressionType::Alp);
        let updates = chunk_of(
            LogicalType::Double,
            &[Value::Double(0.5), Value::Double(std::f64::consts::E)],
        );
        let outcome = column.checkpoint_segment(&disk, &[7, 8], &updates).unwrap();
        assert!(outcome.in_place);
        let read = scan_all(&column, &outcome.segments[0]);
        assert_eq!(read[7], Value::Double(0.5));
        assert_eq!(read[8], Value::Double(std::f64::consts::E));
        assert_eq!(read[1999], Value::Double(199.9));
    }

    #[test]
    fn string_updates_append_to_dictionary() {
        let values: Vec<Value> = (0..200).map(|i| Value::from(format!("v{}", i % 10).as_str())).collect();
        let column = column(LogicalType::String);
        let mut chunk = chunk_of(LogicalType::String, &values);
        chunk.finalize().unwrap();
        let disk = column.flush(&chunk).unwrap();
        let updates = chunk_of(LogicalType::String, &[Value::from("v3"), Value::from("fresh")]);
        let outcome = column.checkpoint_segment(&disk, &[0, 1], &updates).unwrap();
        let read = scan_all(&column, &outcome.segments[0]);
        assert_eq!(read[0], Value::from("v3"));
        assert_eq!(read[1], Value::from("fresh"));
        assert_eq!(read[2], values[2]);
    }

    #[test]
    fn list_policy_controls_in_place() {
        let list_type = LogicalType::list(LogicalType::Int64);
        let lists: Vec<Value> = (0..64)
            .map(|i| Value::List(vec![Value::Int64(i), Value::Int64(i + 1)]))
            .collect();
        let update = [Value::List(vec![Value::Int64(5)])];

        let strict = column(list_type.clone());
        let disk = strict.flush(&chunk_of(list_type.clone(), &lists)).unwrap();
        let outcome = strict
            .checkpoint_segment(&disk, &[3], &chunk_of(list_type.clone(), &update))
            .unwrap();
        assert!(!outcome.in_place);
        assert_eq!(scan_all(&strict, &outcome.segments[0])[3], update[0]);

        let config = StorageConfig::builder()
            .list_checkpoint_policy(ListCheckpointPolicy::AllowInPlace)
            .build()
            .unwrap();
        let relaxed = column_with(list_type.clone(), config);
        let disk = relaxed.flush(&chunk_of(list_type.clone(), &lists)).unwrap();
        let outcome = relaxed
            .checkpoint_segment(&disk, &[3], &chunk_of(list_type, &update))
            .unwrap();
        let read = scan_all(&relaxed, &outcome.segments[0]);
        assert_eq!(read[3], update[0]);
        assert_eq!(read[4], lists[4]);
    }

    #[test]
    fn large_rewrites_split_into_segments() {
        let n = 50_000u64;
        let values: Vec<Value> = (0..n)
            .map(|i| Value::Int64((i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 1) as i64))
            .collect();
        let column = column(LogicalType::Int64);
        let segments = column
            .flush_split(&chunk_of(LogicalType::Int64, &values))
            .unwrap();
        assert!(segments.len() > 1);
        assert_eq!(segments.iter().map(|s| s.num_values()).sum::<u64>(), n);
        let last = segments.last().unwrap();
        let read = scan_all(&column, last);
        assert_eq!(read.last(), values.last());
    }

    #[test]
    fn zone_map_skips_disjoint_ranges() {
        let values: Vec<Value> = (100..200).map(Value::Int64).collect();
        let column = column(LogicalType::Int64);
        let disk = column.flush(&chunk_of(LogicalType::Int64, &values)).unwrap();
        assert!(column.may_contain(&disk, StorageValue::Signed(150), StorageValue::Signed(300)));
        assert!(!column.may_contain(&disk, StorageValue::Signed(0), StorageValue::Signed(99)));
    }

    #[test]
    fn in_place_write_widens_zone_map() {
        let values: Vec<Value> = (0..1000).map(|i| Value::Int64(i % 100)).collect();
        let column = column(LogicalType::Int64);
        let disk = column.flush(&chunk_of(LogicalType::Int64, &values)).unwrap();
        assert!(!column.may_contain(&disk, StorageValue::Signed(110), StorageValue::Signed(130)));

        let updates = chunk_of(LogicalType::Int64, &[Value::Int64(120)]);
        let outcome = column.checkpoint_segment(&disk, &[10], &updates).unwrap();
        assert!(outcome.in_place);
        let seg = &outcome.segments[0];
        assert_eq!(scan_all(&column, seg)[10], Value::Int64(120));
        assert!(column.may_contain(seg, StorageValue::Signed(110), StorageValue::Signed(130)));
        assert_eq!(seg.metadata().compression.min, StorageValue::Signed(0));
        assert_eq!(seg.metadata().compression.bit_width(), disk.metadata().compression.bit_width());

        let doubles: Vec<Value> = (0..2000).map(|i| Value::Double(i as f64 / 10.0)).collect();
        let column = column_with(LogicalType::Double, StorageConfig::default());
        let disk = column.flush(&chunk_of(LogicalType::Double, &doubles)).unwrap();
        assert_eq!(disk.metadata().compression.compression, CompressionType::Alp);
        assert!(!column.may_contain(&disk, StorageValue::Float(204.0), StorageValue::Float(205.0)));
        let updates = chunk_of(LogicalType::Double, &[Value::Double(204.5)]);
        let outcome = column.checkpoint_segment(&disk, &[4], &updates).unwrap();
        assert!(outcome.in_place);
        let seg = &outcome.segments[0];
        assert_eq!(scan_all(&column, seg)[4], Value::Double(204.5));
        assert!(column.may_contain(seg, StorageValue::Float(204.0), StorageValue::Float(205.0)));
    }
}
