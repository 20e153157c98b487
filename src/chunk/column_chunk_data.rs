//! # Column Chunk Data
//!
//! `ColumnChunkData` is one column's values for a contiguous row range. The
//! shared state (buffer, counts, nulls, residency, on-disk metadata) lives in
//! the struct; what differs per type lives in `ChunkKind`:
//!
//! ```text
//! ColumnChunkData
//! ├── buffer: ChunkBuffer        Bytes (LE values) | Bits (BOOL)
//! ├── null_data: NullChunkData   optional, bit set = null
//! ├── metadata                   meaningful once flushed
//! └── kind
//!     ├── Fixed                  numeric values in `buffer`
//!     ├── Bool                   bitmap in `buffer`
//!     ├── InternalId             u64 offsets in `buffer`, one table id
//!     ├── String(Dictionary)     u32 dictionary indices in `buffer`
//!     ├── List(ListChunk)        offset/size/data child chunks
//!     └── Struct(children)       one child chunk per field
//! ```
//!
//! Chunks grow on demand: appends and writes past `capacity` resize by
//! `CHUNK_RESIZE_RATIO` until the values fit. On-disk chunks have no buffer
//! and `capacity == 0`; every value operation on them is an error, they are
//! read through `Column`.

use eyre::{bail, ensure, Result};

use crate::compression::{compute_min_max, StorageValue, ValuesMut, ValuesRef};
use crate::config::{CHUNK_RESIZE_RATIO, DEFAULT_VECTOR_CAPACITY};
use crate::encoding::{Deserializer, Serializer};
use crate::mvcc::ConstraintError;
use crate::types::{FixedValue, InternalId, LogicalType, PhysicalType, Value};
use crate::vector::null_mask::{copy_null_bits, is_null_in, num_words_for, set_null_in};
use crate::vector::{SelectionVector, ValueVector};

use super::dictionary::DictionaryChunk;
use super::list_chunk::ListChunk;
use super::metadata::{ColumnChunkMetadata, ResidencyState};
use super::null_chunk::NullChunkData;

/// How many values a destination row may receive in a scatter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelMultiplicity {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub enum ChunkBuffer {
    Bytes(Vec<u8>),
    Bits(Vec<u64>),
}

impl ChunkBuffer {
    fn for_type(physical: PhysicalType, capacity: u64) -> Self {
        match physical {
            PhysicalType::Bool => ChunkBuffer::Bits(vec![0; num_words_for(capacity)]),
            other => ChunkBuffer::Bytes(vec![0; other.size_in_chunk() * capacity as usize]),
        }
    }

    fn empty(physical: PhysicalType) -> Self {
        Self::for_type(physical, 0)
    }

    fn resize(&mut self, physical: PhysicalType, capacity: u64) {
        match self {
            ChunkBuffer::Bits(words) => {
                let needed = num_words_for(capacity);
                if needed > words.len() {
                    words.resize(needed, 0);
                }
            }
            ChunkBuffer::Bytes(bytes) => {
                let needed = physical.size_in_chunk() * capacity as usize;
                if needed > bytes.len() {
                    bytes.resize(needed, 0);
                }
            }
        }
    }

    fn clear(&mut self) {
        match self {
            ChunkBuffer::Bits(words) => words.fill(0),
            ChunkBuffer::Bytes(bytes) => bytes.fill(0),
        }
    }

    pub fn values_ref(&self) -> ValuesRef<'_> {
        match self {
            ChunkBuffer::Bits(words) => ValuesRef::Bits(words),
            ChunkBuffer::Bytes(bytes) => ValuesRef::Bytes(bytes),
        }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_> {
        match self {
            ChunkBuffer::Bits(words) => ValuesMut::Bits(words),
            ChunkBuffer::Bytes(bytes) => ValuesMut::Bytes(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            ChunkBuffer::Bytes(bytes) => bytes,
            ChunkBuffer::Bits(_) => &[],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            ChunkBuffer::Bytes(bytes) => bytes,
            ChunkBuffer::Bits(_) => &mut [],
        }
    }

    pub fn words(&self) -> &[u64] {
        match self {
            ChunkBuffer::Bits(words) => words,
            ChunkBuffer::Bytes(_) => &[],
        }
    }

    fn words_mut(&mut self) -> &mut [u64] {
        match self {
            ChunkBuffer::Bits(words) => words,
            ChunkBuffer::Bytes(_) => &mut [],
        }
    }

    fn size_in_bytes(&self) -> u64 {
        match self {
            ChunkBuffer::Bits(words) => words.len() as u64 * 8,
            ChunkBuffer::Bytes(bytes) => bytes.len() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChunkKind {
    Fixed,
    Bool,
    InternalId { common_table_id: u64 },
    String(Box<DictionaryChunk>),
    List(Box<ListChunk>),
    Struct(Vec<ColumnChunkData>),
}

#[derive(Debug, Clone)]
pub struct ColumnChunkData {
    data_type: LogicalType,
    physical: PhysicalType,
    enable_compression: bool,
    capacity: u64,
    num_values: u64,
    residency: ResidencyState,
    buffer: ChunkBuffer,
    null_data: Option<Box<NullChunkData>>,
    metadata: ColumnChunkMetadata,
    kind: ChunkKind,
}

fn copy_fixed(dst: &mut [u8], dst_idx: u64, src: &[u8], src_idx: u64, width: usize, n: u64) {
    let dst_start = dst_idx as usize * width;
    let src_start = src_idx as usize * width;
    let len = n as usize * width;
    dst[dst_start..dst_start + len].copy_from_slice(&src[src_start..src_start + len]);
}

fn check_table_id(common_table_id: &mut u64, table_id: u64) -> Result<()> {
    if *common_table_id == InternalId::INVALID_TABLE_ID {
        *common_table_id = table_id;
    }
    ensure!(
        *common_table_id == table_id,
        "internal id chunk holds table {} but was given table {}",
        common_table_id,
        table_id
    );
    Ok(())
}

impl ColumnChunkData {
    /// In-memory chunk with a null chunk, sized for `capacity` values.
    pub fn new(data_type: LogicalType, capacity: u64, enable_compression: bool) -> Self {
        Self::build(data_type, capacity, enable_compression, true)
    }

    /// In-memory chunk whose values can never be null (offsets, sizes,
    /// dictionary bytes, null bits themselves).
    pub fn without_nulls(data_type: LogicalType, capacity: u64, enable_compression: bool) -> Self {
        Self::build(data_type, capacity, enable_compression, false)
    }

    fn build(data_type: LogicalType, capacity: u64, enable_compression: bool, has_null: bool) -> Self {
        let physical = data_type.physical_type();
        let kind = match physical {
            PhysicalType::Bool => ChunkKind::Bool,
            PhysicalType::InternalId => ChunkKind::InternalId {
                common_table_id: InternalId::INVALID_TABLE_ID,
            },
            PhysicalType::String => {
                ChunkKind::String(Box::new(DictionaryChunk::new(capacity, enable_compression)))
            }
            PhysicalType::List | PhysicalType::Array => ChunkKind::List(Box::new(ListChunk::new(
                &data_type,
                capacity,
                enable_compression,
            ))),
            PhysicalType::Struct => ChunkKind::Struct(
                data_type
                    .fields()
                    .iter()
                    .map(|f| ColumnChunkData::new(f.data_type.clone(), capacity, enable_compression))
                    .collect(),
            ),
            _ => ChunkKind::Fixed,
        };
        let null_data =
            has_null.then(|| Box::new(NullChunkData::new(capacity, enable_compression)));
        Self {
            physical,
            enable_compression,
            capacity,
            num_values: 0,
            residency: ResidencyState::InMemory,
            buffer: ChunkBuffer::for_type(physical, capacity),
            null_data,
            metadata: ColumnChunkMetadata::default(),
            kind,
            data_type,
        }
    }

    /// Descriptor of a flushed chunk. Children (null chunk, dictionary,
    /// list or struct children) are on-disk chunks themselves.
    pub(crate) fn new_on_disk(
        data_type: LogicalType,
        enable_compression: bool,
        metadata: ColumnChunkMetadata,
        null_data: Option<NullChunkData>,
        kind: ChunkKind,
    ) -> Self {
        let physical = data_type.physical_type();
        Self {
            physical,
            enable_compression,
            capacity: 0,
            num_values: metadata.num_values,
            residency: ResidencyState::OnDisk,
            buffer: ChunkBuffer::empty(physical),
            null_data: null_data.map(Box::new),
            metadata,
            kind,
            data_type,
        }
    }

    pub fn data_type(&self) -> &LogicalType {
        &self.data_type
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.physical
    }

    pub fn enable_compression(&self) -> bool {
        self.enable_compression
    }

    pub fn num_values(&self) -> u64 {
        self.num_values
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn residency(&self) -> ResidencyState {
        self.residency
    }

    pub fn is_in_memory(&self) -> bool {
        self.residency == ResidencyState::InMemory
    }

    pub fn metadata(&self) -> &ColumnChunkMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ColumnChunkMetadata {
        &mut self.metadata
    }

    pub fn kind(&self) -> &ChunkKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ChunkKind {
        &mut self.kind
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut ChunkBuffer {
        &mut self.buffer
    }

    pub fn has_null_data(&self) -> bool {
        self.null_data.is_some()
    }

    pub fn null_data(&self) -> Option<&NullChunkData> {
        self.null_data.as_deref()
    }

    pub(crate) fn null_data_mut(&mut self) -> Option<&mut NullChunkData> {
        self.null_data.as_deref_mut()
    }

    pub(crate) fn take_null_data(&mut self) -> Option<NullChunkData> {
        self.null_data.take().map(|b| *b)
    }

    pub(crate) fn set_null_data(&mut self, null_data: Option<NullChunkData>) {
        self.null_data = null_data.map(Box::new);
    }

    /// Null words for codec calls; `None` when the chunk has no nulls.
    pub fn null_words(&self) -> Option<&[u64]> {
        self.null_data.as_deref().and_then(|n| n.words_if_any())
    }

    pub fn dictionary(&self) -> Option<&DictionaryChunk> {
        match &self.kind {
            ChunkKind::String(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&ListChunk> {
        match &self.kind {
            ChunkKind::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn list_mut(&mut self) -> Option<&mut ListChunk> {
        match &mut self.kind {
            ChunkKind::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn struct_children(&self) -> &[ColumnChunkData] {
        match &self.kind {
            ChunkKind::Struct(children) => children,
            _ => &[],
        }
    }

    pub fn common_table_id(&self) -> Option<u64> {
        match self.kind {
            ChunkKind::InternalId { common_table_id } => Some(common_table_id),
            _ => None,
        }
    }

    pub fn set_table_id(&mut self, table_id: u64) {
        if let ChunkKind::InternalId { common_table_id } = &mut self.kind {
            *common_table_id = table_id;
        }
    }

    fn ensure_in_memory(&self) -> Result<()> {
        ensure!(
            self.is_in_memory(),
            "{} chunk is on disk; read it through its column first",
            self.data_type
        );
        Ok(())
    }

    fn ensure_same_type(&self, other: PhysicalType) -> Result<()> {
        ensure!(
            other == self.physical,
            "type mismatch: {:?} values given to a {} chunk",
            other,
            self.data_type
        );
        Ok(())
    }

    #[inline]
    pub fn is_null(&self, pos: u64) -> bool {
        self.null_data.as_deref().is_some_and(|n| n.is_null(pos))
    }

    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.set_null(pos, is_null);
        }
    }

    /// Reads element `pos` of a fixed-width chunk.
    #[inline]
    pub fn get<T: FixedValue>(&self, pos: u64) -> T {
        T::read_at(self.buffer.bytes(), pos as usize)
    }

    /// Sets element `pos`, growing the chunk and `num_values` to cover it.
    pub fn set<T: FixedValue>(&mut self, pos: u64, value: T) {
        self.ensure_capacity(pos + 1);
        value.write_at(self.buffer.bytes_mut(), pos as usize);
        if pos >= self.num_values {
            self.num_values = pos + 1;
        }
    }

    pub fn get_bool(&self, pos: u64) -> bool {
        is_null_in(self.buffer.words(), pos)
    }

    pub fn set_bool(&mut self, pos: u64, value: bool) {
        self.ensure_capacity(pos + 1);
        set_null_in(self.buffer.words_mut(), pos, value);
        if pos >= self.num_values {
            self.num_values = pos + 1;
        }
    }

    pub(crate) fn set_num_values_unchecked(&mut self, num_values: u64) {
        self.num_values = num_values;
    }

    /// Appends raw bytes to a UINT8 chunk.
    pub(crate) fn append_bytes(&mut self, bytes: &[u8]) {
        let start = self.num_values;
        self.ensure_capacity(start + bytes.len() as u64);
        let dst = self.buffer.bytes_mut();
        dst[start as usize..start as usize + bytes.len()].copy_from_slice(bytes);
        self.num_values += bytes.len() as u64;
    }

    /// Grows capacity geometrically until `needed` values fit.
    pub(crate) fn ensure_capacity(&mut self, needed: u64) {
        if needed <= self.capacity {
            return;
        }
        let mut new_capacity = self.capacity.max(1);
        while new_capacity < needed {
            new_capacity = ((new_capacity as f64) * CHUNK_RESIZE_RATIO).ceil() as u64;
        }
        self.resize(new_capacity);
    }

    /// Grows the chunk; never shrinks. List data children keep their own
    /// capacity.
    pub fn resize(&mut self, new_capacity: u64) {
        if new_capacity <= self.capacity {
            return;
        }
        self.buffer.resize(self.physical, new_capacity);
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.resize(new_capacity);
        }
        match &mut self.kind {
            ChunkKind::List(list) => list.resize(new_capacity),
            ChunkKind::Struct(children) => {
                for child in children {
                    child.resize(new_capacity);
                }
            }
            _ => {}
        }
        self.capacity = new_capacity;
    }

    /// Appends the selected positions of `vector`.
    pub fn append(&mut self, vector: &ValueVector, sel: &SelectionVector) -> Result<()> {
        self.ensure_in_memory()?;
        self.ensure_same_type(vector.physical_type())?;
        let n = sel.len() as u64;
        if n == 0 {
            return Ok(());
        }
        let base = self.num_values;
        self.ensure_capacity(base + n);
        if let Some(nulls) = self.null_data.as_deref_mut() {
            for (i, pos) in sel.iter().enumerate() {
                nulls.set_null(base + i as u64, vector.is_null(pos));
            }
        }
        let width = self.physical.size_in_chunk();
        match &mut self.kind {
            ChunkKind::Fixed => {
                let dst = self.buffer.bytes_mut();
                let src = vector.fixed_bytes();
                if sel.is_unfiltered() {
                    copy_fixed(dst, base, src, 0, width, n);
                } else {
                    for (i, pos) in sel.iter().enumerate() {
                        copy_fixed(dst, base + i as u64, src, pos, width, 1);
                    }
                }
            }
            ChunkKind::Bool => {
                let words = self.buffer.words_mut();
                for (i, pos) in sel.iter().enumerate() {
                    set_null_in(words, base + i as u64, vector.get_bool(pos));
                }
            }
            ChunkKind::InternalId { common_table_id } => {
                let dst = self.buffer.bytes_mut();
                for (i, pos) in sel.iter().enumerate() {
                    if vector.is_null(pos) {
                        continue;
                    }
                    let id = vector.get_internal_id(pos);
                    check_table_id(common_table_id, id.table_id)?;
                    id.offset.write_at(dst, (base + i as u64) as usize);
                }
            }
            ChunkKind::String(dict) => {
                for (i, pos) in sel.iter().enumerate() {
                    let index = if vector.is_null(pos) {
                        0
                    } else {
                        dict.append_string(vector.get_string(pos))?
                    };
                    index.write_at(self.buffer.bytes_mut(), (base + i as u64) as usize);
                }
            }
            ChunkKind::List(list) => list.append_vector(vector, sel, base)?,
            ChunkKind::Struct(children) => {
                ensure!(
                    children.len() == vector.struct_children().len(),
                    "struct vector has {} fields, chunk has {}",
                    vector.struct_children().len(),
                    children.len()
                );
                for (child, child_vector) in children.iter_mut().zip(vector.struct_children()) {
                    child.append(child_vector, sel)?;
                }
            }
        }
        self.num_values = base + n;
        Ok(())
    }

    /// Appends `num_values` values of `other` starting at `start`.
    pub fn append_chunk(&mut self, other: &ColumnChunkData, start: u64, num_values: u64) -> Result<()> {
        let dst = self.num_values;
        self.write_chunk_range(other, start, dst, num_values, false)
    }

    /// Overwrites `[dst_offset, dst_offset + num_values)` with values of `src`.
    pub fn write_chunk(
        &mut self,
        src: &ColumnChunkData,
        src_offset: u64,
        dst_offset: u64,
        num_values: u64,
    ) -> Result<()> {
        self.write_chunk_range(src, src_offset, dst_offset, num_values, true)
    }

    fn write_chunk_range(
        &mut self,
        src: &ColumnChunkData,
        src_offset: u64,
        dst_offset: u64,
        num_values: u64,
        random_write: bool,
    ) -> Result<()> {
        self.ensure_in_memory()?;
        src.ensure_in_memory()?;
        self.ensure_same_type(src.physical)?;
        ensure!(
            src_offset + num_values <= src.num_values,
            "source range [{}, {}) exceeds {} values",
            src_offset,
            src_offset + num_values,
            src.num_values
        );
        if num_values == 0 {
            return Ok(());
        }
        self.pad_nulls_to(dst_offset)?;
        self.ensure_capacity(dst_offset + num_values);
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.copy_bits_from(src.null_words(), src_offset, dst_offset, num_values);
        }
        let width = self.physical.size_in_chunk();
        match (&mut self.kind, &src.kind) {
            (ChunkKind::Fixed, ChunkKind::Fixed) => {
                copy_fixed(
                    self.buffer.bytes_mut(),
                    dst_offset,
                    src.buffer.bytes(),
                    src_offset,
                    width,
                    num_values,
                );
            }
            (ChunkKind::Bool, ChunkKind::Bool) => {
                copy_null_bits(
                    src.buffer.words(),
                    src_offset,
                    self.buffer.words_mut(),
                    dst_offset,
                    num_values,
                    false,
                );
            }
            (
                ChunkKind::InternalId { common_table_id },
                ChunkKind::InternalId {
                    common_table_id: src_table_id,
                },
            ) => {
                if *src_table_id != InternalId::INVALID_TABLE_ID {
                    check_table_id(common_table_id, *src_table_id)?;
                }
                copy_fixed(
                    self.buffer.bytes_mut(),
                    dst_offset,
                    src.buffer.bytes(),
                    src_offset,
                    width,
                    num_values,
                );
            }
            (ChunkKind::String(dict), ChunkKind::String(src_dict)) => {
                for i in 0..num_values {
                    let index = if src.is_null(src_offset + i) {
                        0
                    } else {
                        let src_index: u32 = src.get(src_offset + i);
                        dict.append_string(src_dict.get_string(src_index)?)?
                    };
                    index.write_at(self.buffer.bytes_mut(), (dst_offset + i) as usize);
                }
            }
            (ChunkKind::List(list), ChunkKind::List(src_list)) => {
                let src_nulls = src.null_data.as_deref();
                list.write_from(src_list, src_nulls, src_offset, dst_offset, num_values, random_write)?;
            }
            (ChunkKind::Struct(children), ChunkKind::Struct(src_children)) => {
                for (child, src_child) in children.iter_mut().zip(src_children) {
                    child.write_chunk_range(src_child, src_offset, dst_offset, num_values, random_write)?;
                }
            }
            _ => bail!("chunk kind mismatch writing into {} chunk", self.data_type),
        }
        if dst_offset + num_values > self.num_values {
            self.num_values = dst_offset + num_values;
        }
        Ok(())
    }

    /// Writes one value of `vector` at `offset_in_chunk`.
    pub fn write_value(
        &mut self,
        vector: &ValueVector,
        pos_in_vector: u64,
        offset_in_chunk: u64,
    ) -> Result<()> {
        self.ensure_in_memory()?;
        self.ensure_same_type(vector.physical_type())?;
        self.pad_nulls_to(offset_in_chunk)?;
        self.ensure_capacity(offset_in_chunk + 1);
        let is_null = vector.is_null(pos_in_vector);
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.set_null(offset_in_chunk, is_null);
        }
        let width = self.physical.size_in_chunk();
        match &mut self.kind {
            ChunkKind::Fixed => {
                if !is_null {
                    copy_fixed(
                        self.buffer.bytes_mut(),
                        offset_in_chunk,
                        vector.fixed_bytes(),
                        pos_in_vector,
                        width,
                        1,
                    );
                }
            }
            ChunkKind::Bool => {
                let value = !is_null && vector.get_bool(pos_in_vector);
                set_null_in(self.buffer.words_mut(), offset_in_chunk, value);
            }
            ChunkKind::InternalId { common_table_id } => {
                if !is_null {
                    let id = vector.get_internal_id(pos_in_vector);
                    check_table_id(common_table_id, id.table_id)?;
                    id.offset
                        .write_at(self.buffer.bytes_mut(), offset_in_chunk as usize);
                }
            }
            ChunkKind::String(dict) => {
                if !is_null {
                    let index = dict.append_string(vector.get_string(pos_in_vector))?;
                    index.write_at(self.buffer.bytes_mut(), offset_in_chunk as usize);
                }
            }
            ChunkKind::List(list) => {
                list.write_vector_value(vector, pos_in_vector, offset_in_chunk, is_null)?
            }
            ChunkKind::Struct(children) => {
                for (child, child_vector) in children.iter_mut().zip(vector.struct_children()) {
                    child.write_value(child_vector, pos_in_vector, offset_in_chunk)?;
                }
            }
        }
        if offset_in_chunk >= self.num_values {
            self.num_values = offset_in_chunk + 1;
        }
        Ok(())
    }

    /// Scatter write: value `i` of `src` goes to row `dst_offsets[i]`.
    ///
    /// With `RelMultiplicity::One` a destination row that already holds a
    /// non-null value is a constraint violation.
    pub fn write_scatter(
        &mut self,
        src: &ColumnChunkData,
        dst_offsets: &[u64],
        multiplicity: RelMultiplicity,
    ) -> Result<()> {
        ensure!(
            src.num_values == dst_offsets.len() as u64,
            "scatter write of {} values given {} offsets",
            src.num_values,
            dst_offsets.len()
        );
        if multiplicity == RelMultiplicity::One {
            ensure!(
                self.has_null_data(),
                "single-multiplicity writes need a chunk with null data"
            );
        }
        for (i, &dst) in dst_offsets.iter().enumerate() {
            if multiplicity == RelMultiplicity::One && dst < self.num_values && !self.is_null(dst) {
                return Err(ConstraintError::single_multiplicity(dst).into());
            }
            self.write_chunk(src, i as u64, dst, 1)?;
        }
        Ok(())
    }

    /// Appends `src[src_offset..]` at `dst_offset`, filling any gap after
    /// the current end with nulls.
    pub fn copy(
        &mut self,
        src: &ColumnChunkData,
        src_offset: u64,
        dst_offset: u64,
        num_values: u64,
    ) -> Result<()> {
        ensure!(
            dst_offset >= self.num_values,
            "copy destination {} is inside the chunk ({} values)",
            dst_offset,
            self.num_values
        );
        self.pad_nulls_to(dst_offset)?;
        self.append_chunk(src, src_offset, num_values)
    }

    /// Rows between the current end and `offset` become nulls.
    fn pad_nulls_to(&mut self, offset: u64) -> Result<()> {
        if offset <= self.num_values {
            return Ok(());
        }
        let start = self.num_values;
        let gap = offset - start;
        self.ensure_capacity(offset);
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.set_null_range(start, gap, true);
        }
        match &mut self.kind {
            ChunkKind::List(list) => {
                for pos in start..offset {
                    list.append_null_list(pos);
                }
            }
            ChunkKind::Struct(children) => {
                for child in children {
                    child.pad_nulls_to(offset)?;
                }
            }
            _ => {}
        }
        self.num_values = offset;
        Ok(())
    }

    /// Copies `num_values` values starting at `offset` into `vector` at
    /// `pos_in_vector`, nulls included.
    pub fn scan(
        &self,
        vector: &mut ValueVector,
        offset: u64,
        num_values: u64,
        pos_in_vector: u64,
    ) -> Result<()> {
        self.ensure_in_memory()?;
        self.ensure_same_type(vector.physical_type())?;
        ensure!(
            offset + num_values <= self.num_values,
            "scan of [{}, {}) past {} values",
            offset,
            offset + num_values,
            self.num_values
        );
        if num_values == 0 {
            return Ok(());
        }
        vector.resize(pos_in_vector + num_values);
        match self.null_data.as_deref() {
            Some(nulls) => nulls.scan_into(vector.nulls_mut(), offset, pos_in_vector, num_values),
            None => vector
                .nulls_mut()
                .set_null_range(pos_in_vector, num_values, false),
        }
        let width = self.physical.size_in_chunk();
        match &self.kind {
            ChunkKind::Fixed => {
                copy_fixed(
                    vector.fixed_bytes_mut(),
                    pos_in_vector,
                    self.buffer.bytes(),
                    offset,
                    width,
                    num_values,
                );
            }
            ChunkKind::Bool => {
                for i in 0..num_values {
                    vector.set_bool(pos_in_vector + i, self.get_bool(offset + i));
                }
            }
            ChunkKind::InternalId { common_table_id } => {
                for i in 0..num_values {
                    let id = InternalId::new(self.get::<u64>(offset + i), *common_table_id);
                    vector.set_internal_id(pos_in_vector + i, id);
                }
            }
            ChunkKind::String(dict) => {
                for i in 0..num_values {
                    if self.is_null(offset + i) {
                        continue;
                    }
                    let index: u32 = self.get(offset + i);
                    vector.set_string(pos_in_vector + i, dict.get_string(index)?);
                }
            }
            ChunkKind::List(list) => {
                list.scan_into(vector, self.null_data.as_deref(), offset, num_values, pos_in_vector)?
            }
            ChunkKind::Struct(children) => {
                for (child, child_vector) in children.iter().zip(vector.struct_children_mut()) {
                    child.scan(child_vector, offset, num_values, pos_in_vector)?;
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, offset: u64, vector: &mut ValueVector, pos_in_vector: u64) -> Result<()> {
        self.scan(vector, offset, 1, pos_in_vector)
    }

    /// Owned value at `pos`, for lookups outside the vectorized paths.
    pub fn get_value(&self, pos: u64) -> Result<Value> {
        let mut vector = ValueVector::new(self.data_type.clone(), 1);
        self.lookup(pos, &mut vector, 0)?;
        Ok(vector.get_value(0))
    }

    /// Compacts the chunk before it is flushed: string dictionaries drop
    /// unreferenced entries, fragmented list data is rewritten in row order.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_in_memory()?;
        let num_values = self.num_values;
        match &mut self.kind {
            ChunkKind::String(dict) => {
                let mut rebuilt = DictionaryChunk::new(num_values, self.enable_compression);
                for pos in 0..num_values {
                    if self.null_data.as_deref().is_some_and(|n| n.is_null(pos)) {
                        continue;
                    }
                    let old: u32 = u32::read_at(self.buffer.bytes(), pos as usize);
                    let new = rebuilt.append_string(dict.get_string(old)?)?;
                    new.write_at(self.buffer.bytes_mut(), pos as usize);
                }
                **dict = rebuilt;
            }
            ChunkKind::List(list) => list.finalize(self.null_data.as_deref(), num_values)?,
            ChunkKind::Struct(children) => {
                for child in children {
                    child.finalize()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn reset_to_empty(&mut self) {
        self.buffer.clear();
        self.num_values = 0;
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.reset_to_empty();
        }
        match &mut self.kind {
            ChunkKind::InternalId { common_table_id } => {
                *common_table_id = InternalId::INVALID_TABLE_ID;
            }
            ChunkKind::String(dict) => dict.reset_to_empty(),
            ChunkKind::List(list) => list.reset_to_empty(&self.data_type, self.enable_compression),
            ChunkKind::Struct(children) => {
                for child in children {
                    child.reset_to_empty();
                }
            }
            _ => {}
        }
    }

    pub fn reset_to_all_null(&mut self) {
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.reset_to_all_null();
        }
    }

    pub fn set_num_values(&mut self, num_values: u64) -> Result<()> {
        ensure!(
            num_values <= self.capacity,
            "{} values exceed chunk capacity {}",
            num_values,
            self.capacity
        );
        self.num_values = num_values;
        if let Some(nulls) = self.null_data.as_deref_mut() {
            nulls.set_num_values(num_values)?;
        }
        match &mut self.kind {
            ChunkKind::List(list) => list.set_num_values(num_values)?,
            ChunkKind::Struct(children) => {
                for child in children {
                    child.set_num_values(num_values)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Appends `num_values` copies of `value`.
    pub fn populate_with_default(&mut self, value: &Value, num_values: u64) -> Result<()> {
        let batch = num_values.min(DEFAULT_VECTOR_CAPACITY);
        if batch == 0 {
            return Ok(());
        }
        let mut vector = ValueVector::new(self.data_type.clone(), batch);
        for pos in 0..batch {
            vector.set_value(pos, value)?;
        }
        let mut appended = 0;
        while appended < num_values {
            let n = (num_values - appended).min(batch);
            self.append(&vector, &SelectionVector::unfiltered(n as usize))?;
            appended += n;
        }
        Ok(())
    }

    /// Min/max over non-null values of the main buffer; `None` when every
    /// value is null or the type keeps no values of its own.
    pub fn get_min_max(&self) -> Option<(StorageValue, StorageValue)> {
        if self.physical.is_nested() || !self.is_in_memory() {
            return None;
        }
        compute_min_max(
            self.physical,
            self.buffer.values_ref(),
            0,
            self.num_values,
            self.null_words(),
        )
    }

    pub fn estimated_memory_usage(&self) -> u64 {
        let own = self.buffer.size_in_bytes();
        let nulls = self
            .null_data
            .as_deref()
            .map_or(0, |n| n.estimated_memory_usage());
        let children = match &self.kind {
            ChunkKind::String(dict) => dict.estimated_memory_usage(),
            ChunkKind::List(list) => list.estimated_memory_usage(),
            ChunkKind::Struct(children) => {
                children.iter().map(|c| c.estimated_memory_usage()).sum()
            }
            _ => 0,
        };
        own + nulls + children
    }

    /// Structural consistency of counts across the chunk and its children.
    pub fn sanity_check(&self) -> bool {
        if self.is_in_memory() && self.num_values > self.capacity {
            return false;
        }
        if let Some(nulls) = self.null_data.as_deref() {
            if nulls.num_values() != self.num_values {
                return false;
            }
        }
        match &self.kind {
            ChunkKind::String(dict) => dict.sanity_check(),
            ChunkKind::List(list) => list.sanity_check(self.num_values),
            ChunkKind::Struct(children) => children
                .iter()
                .all(|c| c.num_values == self.num_values && c.sanity_check()),
            _ => true,
        }
    }

    /// Persists the descriptor of an on-disk chunk (metadata of the chunk
    /// and of every child chunk).
    pub fn serialize(&self, ser: &mut Serializer) -> Result<()> {
        ensure!(
            !self.is_in_memory(),
            "only flushed chunks have a persistent descriptor"
        );
        ser.write_field("data_type");
        self.data_type.serialize(ser);
        ser.write_field("enable_compression");
        ser.write_bool(self.enable_compression);
        ser.write_field("metadata");
        self.metadata.serialize(ser);
        ser.write_field("null_data");
        match self.null_data.as_deref() {
            Some(nulls) => {
                ser.write_bool(true);
                ser.write_bool(nulls.may_have_null());
                nulls.data().serialize(ser)?;
            }
            None => ser.write_bool(false),
        }
        match &self.kind {
            ChunkKind::InternalId { common_table_id } => {
                ser.write_field("common_table_id");
                ser.write_u64(*common_table_id);
            }
            ChunkKind::String(dict) => {
                ser.write_field("dictionary");
                dict.string_data().serialize(ser)?;
                dict.offsets().serialize(ser)?;
            }
            ChunkKind::List(list) => {
                ser.write_field("list");
                list.sizes().serialize(ser)?;
                list.data().serialize(ser)?;
                list.offsets().serialize(ser)?;
            }
            ChunkKind::Struct(children) => {
                ser.write_field("fields");
                ser.write_varint(children.len() as u64);
                for child in children {
                    child.serialize(ser)?;
                }
            }
            ChunkKind::Fixed | ChunkKind::Bool => {}
        }
        Ok(())
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        de.expect_field("data_type")?;
        let data_type = LogicalType::deserialize(de)?;
        de.expect_field("enable_compression")?;
        let enable_compression = de.read_bool()?;
        de.expect_field("metadata")?;
        let metadata = ColumnChunkMetadata::deserialize(de)?;
        de.expect_field("null_data")?;
        let null_data = if de.read_bool()? {
            let may_have_null = de.read_bool()?;
            Some(NullChunkData::from_data(
                ColumnChunkData::deserialize(de)?,
                may_have_null,
            ))
        } else {
            None
        };
        let kind = match data_type.physical_type() {
            PhysicalType::Bool => ChunkKind::Bool,
            PhysicalType::InternalId => {
                de.expect_field("common_table_id")?;
                ChunkKind::InternalId {
                    common_table_id: de.read_u64()?,
                }
            }
            PhysicalType::String => {
                de.expect_field("dictionary")?;
                let string_data = ColumnChunkData::deserialize(de)?;
                let offsets = ColumnChunkData::deserialize(de)?;
                ChunkKind::String(Box::new(DictionaryChunk::from_parts(
                    string_data,
                    offsets,
                    enable_compression,
                )))
            }
            PhysicalType::List | PhysicalType::Array => {
                de.expect_field("list")?;
                let sizes = ColumnChunkData::deserialize(de)?;
                let data = ColumnChunkData::deserialize(de)?;
                let offsets = ColumnChunkData::deserialize(de)?;
                ChunkKind::List(Box::new(ListChunk::from_parts(offsets, sizes, data)))
            }
            PhysicalType::Struct => {
                de.expect_field("fields")?;
                let count = de.read_varint()? as usize;
                ensure!(
                    count == data_type.fields().len(),
                    "struct descriptor has {} children for {} fields",
                    count,
                    data_type.fields().len()
                );
                let children = (0..count)
                    .map(|_| ColumnChunkData::deserialize(de))
                    .collect::<Result<Vec<_>>>()?;
                ChunkKind::Struct(children)
            }
            _ => ChunkKind::Fixed,
        };
        Ok(Self::new_on_disk(
            data_type,
            enable_compression,
            metadata,
            null_data,
            kind,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructField;

    fn int_vector(values: &[Option<i64>]) -> ValueVector {
        let values: Vec<Value> = values.iter().map(|v| Value::from(*v)).collect();
        ValueVector::from_values(LogicalType::Int64, &values).unwrap()
    }

    #[test]
    fn append_past_capacity_resizes() {
        let mut chunk = ColumnChunkData::new(LogicalType::Int32, 256, true);
        let values: Vec<Value> = (0..300).map(Value::Int32).collect();
        let vector = ValueVector::from_values(LogicalType::Int32, &values).unwrap();
        chunk
            .append(&vector, &SelectionVector::unfiltered(300))
            .unwrap();
        assert_eq!(chunk.num_values(), 300);
        assert!(chunk.capacity() >= 300);
        assert_eq!(chunk.get::<i32>(299), 299);
        assert!(chunk.sanity_check());
    }

    #[test]
    fn selected_append_and_scan_keep_nulls() {
        let vector = int_vector(&[Some(1), None, Some(3), Some(4)]);
        let mut chunk = ColumnChunkData::new(LogicalType::Int64, 4, true);
        chunk
            .append(&vector, &SelectionVector::from_positions([3, 1, 0]))
            .unwrap();
        let mut out = ValueVector::new(LogicalType::Int64, 8);
        chunk.scan(&mut out, 0, 3, 2).unwrap();
        assert_eq!(out.get_value(2), Value::Int64(4));
        assert_eq!(out.get_value(3), Value::Null);
        assert_eq!(out.get_value(4), Value::Int64(1));
        assert!(chunk.scan(&mut out, 2, 2, 0).is_err());
    }

    #[test]
    fn copy_pads_gap_with_nulls() {
        let src = {
            let mut c = ColumnChunkData::new(LogicalType::Int64, 4, true);
            c.append(&int_vector(&[Some(7), Some(8)]), &SelectionVector::unfiltered(2))
                .unwrap();
            c
        };
        let mut dst = ColumnChunkData::new(LogicalType::Int64, 2, true);
        dst.copy(&src, 0, 3, 2).unwrap();
        assert_eq!(dst.num_values(), 5);
        assert!(dst.is_null(0) && dst.is_null(2));
        assert_eq!(dst.get_value(4).unwrap(), Value::Int64(8));
        assert!(dst.copy(&src, 0, 1, 1).is_err());
    }

    #[test]
    fn single_multiplicity_rejects_second_value() {
        let mut chunk = ColumnChunkData::new(LogicalType::Int64, 8, true);
        chunk.set_num_values(8).unwrap();
        chunk.reset_to_all_null();
        let mut src = ColumnChunkData::new(LogicalType::Int64, 2, true);
        src.append(&int_vector(&[Some(1), Some(2)]), &SelectionVector::unfiltered(2))
            .unwrap();
        chunk
            .write_scatter(&src, &[5, 2], RelMultiplicity::One)
            .unwrap();
        assert_eq!(chunk.get_value(5).unwrap(), Value::Int64(1));

        let err = chunk
            .write_scatter(&src, &[3, 5], RelMultiplicity::One)
            .unwrap_err();
        let constraint = err.downcast_ref::<ConstraintError>().unwrap();
        assert_eq!(constraint.offset, 5);

        chunk
            .write_scatter(&src, &[5, 2], RelMultiplicity::Many)
            .unwrap();
    }

    #[test]
    fn bool_chunk_min_max_and_scan() {
        let values = [Value::Bool(true), Value::Null, Value::Bool(true)];
        let vector = ValueVector::from_values(LogicalType::Bool, &values).unwrap();
        let mut chunk = ColumnChunkData::new(LogicalType::Bool, 2, true);
        chunk.append(&vector, &SelectionVector::unfiltered(3)).unwrap();
        let (min, max) = chunk.get_min_max().unwrap();
        assert_eq!(min, StorageValue::from_bool(true));
        assert_eq!(max, StorageValue::from_bool(true));
        assert_eq!(chunk.get_value(1).unwrap(), Value::Null);
        assert_eq!(chunk.get_value(2).unwrap(), Value::Bool(true));
    }

    #[test]
    fn internal_ids_share_one_table() {
        let ids = [
            Value::InternalId(InternalId::new(4, 9)),
            Value::InternalId(InternalId::new(5, 9)),
        ];
        let vector = ValueVector::from_values(LogicalType::InternalId, &ids).unwrap();
        let mut chunk = ColumnChunkData::new(LogicalType::InternalId, 4, true);
        chunk.append(&vector, &SelectionVector::unfiltered(2)).unwrap();
        assert_eq!(chunk.common_table_id(), Some(9));
        assert_eq!(chunk.get_value(1).unwrap(), Value::InternalId(InternalId::new(5, 9)));

        let other = ValueVector::from_values(
            LogicalType::InternalId,
            &[Value::InternalId(InternalId::new(1, 3))],
        )
        .unwrap();
        assert!(chunk.append(&other, &SelectionVector::unfiltered(1)).is_err());
    }

    #[test]
    fn struct_chunks_track_their_own_nulls() {
        let ty = LogicalType::structure(vec![
            StructField::new("a", LogicalType::Int64),
            StructField::new("b", LogicalType::String),
        ]);
        let values = [
            Value::Struct(vec![Value::Int64(1), Value::from("x")]),
            Value::Null,
            Value::Struct(vec![Value::Null, Value::from("y")]),
        ];
        let vector = ValueVector::from_values(ty.clone(), &values).unwrap();
        let mut chunk = ColumnChunkData::new(ty, 2, true);
        chunk.append(&vector, &SelectionVector::unfiltered(3)).unwrap();
        assert!(chunk.sanity_check());
        assert_eq!(chunk.get_value(0).unwrap(), values[0]);
        assert_eq!(chunk.get_value(1).unwrap(), Value::Null);
        assert_eq!(chunk.get_value(2).unwrap(), values[2]);
    }

    #[test]
    fn default_population_and_reset() {
        let mut chunk = ColumnChunkData::new(LogicalType::Double, 16, true);
        chunk
            .populate_with_default(&Value::Double(2.5), 5000)
            .unwrap();
        assert_eq!(chunk.num_values(), 5000);
        assert_eq!(chunk.get::<f64>(4999), 2.5);
        assert!(chunk.estimated_memory_usage() >= 5000 * 8);
        chunk.reset_to_empty();
        assert_eq!(chunk.num_values(), 0);
        assert!(chunk.get_min_max().is_none());
    }

    #[test]
    fn in_memory_chunks_have_no_descriptor() {
        let chunk = ColumnChunkData::new(LogicalType::Int64, 4, true);
        let mut ser = Serializer::new();
        assert!(chunk.serialize(&mut ser).is_err());
    }
}
