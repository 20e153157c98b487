//! On-disk descriptor of one flushed chunk segment.
//!
//! ```text
//! "pages"       PageRange (start_page u32, num_pages u32)
//! "num_values"  u64
//! "compression" CompressionMetadata
//! ```

use eyre::Result;

use crate::compression::{CompressionMetadata, StorageValue};
use crate::encoding::{Deserializer, Serializer};
use crate::storage::PageRange;
use crate::types::PhysicalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidencyState {
    #[default]
    InMemory,
    OnDisk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChunkMetadata {
    pub page_range: PageRange,
    pub num_values: u64,
    pub compression: CompressionMetadata,
}

impl Default for ColumnChunkMetadata {
    fn default() -> Self {
        Self {
            page_range: PageRange::empty(),
            num_values: 0,
            compression: CompressionMetadata::constant(StorageValue::default()),
        }
    }
}

impl ColumnChunkMetadata {
    pub fn new(page_range: PageRange, num_values: u64, compression: CompressionMetadata) -> Self {
        Self {
            page_range,
            num_values,
            compression,
        }
    }

    pub fn start_page(&self) -> u32 {
        self.page_range.start_page
    }

    pub fn num_pages(&self) -> u32 {
        self.page_range.num_pages
    }

    /// Pages holding encoded values; ALP exception pages follow them.
    pub fn num_data_pages(&self, physical: PhysicalType) -> u64 {
        let exception_pages = self.compression.num_exception_pages(physical);
        (self.page_range.num_pages as u64).saturating_sub(exception_pages)
    }

    /// Whether writing up to (excluding) `end_offset` stays inside the pages
    /// this segment already owns.
    pub fn fits_in_pages(&self, physical: PhysicalType, end_offset: u64) -> bool {
        end_offset <= self
            .compression
            .max_capacity(physical, self.num_data_pages(physical))
    }

    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_field("pages");
        self.page_range.serialize(ser);
        ser.write_field("num_values");
        ser.write_u64(self.num_values);
        ser.write_field("compression");
        self.compression.serialize(ser);
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        de.expect_field("pages")?;
        let page_range = PageRange::deserialize(de)?;
        de.expect_field("num_values")?;
        let num_values = de.read_u64()?;
        de.expect_field("compression")?;
        let compression = CompressionMetadata::deserialize(de)?;
        Ok(Self::new(page_range, num_values, compression))
    }
}
