//! # Compression Metadata
//!
//! One `CompressionMetadata` describes how a flushed chunk's values were
//! encoded. It is recomputed from chunk contents on every flush and is the
//! only per-chunk codec state persisted; there is no per-page header.
//!
//! ## Persisted Layout
//!
//! ```text
//! "min" StorageValue | "max" StorageValue | "kind" u8
//!   [ALP only]
//!   "alp" exponent u8, factor u8, exception_count u32, exception_capacity u32
//!   "encoded" CompressionMetadata   (Int64 metadata over the encoded ints,
//!                                    carrying encoded min/max)
//! ```
//!
//! ## In-Place Updates
//!
//! `can_update_in_place` answers whether new values fit the existing
//! encoding; `widen` then stretches min/max to cover them. Widening never
//! changes an integer bit width because acceptance already requires
//! `value - min < 2^bit_width`.

use eyre::{bail, Result};

use crate::config::{BITPACKING_GROUP_SIZE, PAGE_SIZE};
use crate::encoding::{Deserializer, Serializer};
use crate::types::PhysicalType;

use super::alp::ALP_ENCODED_TYPE;
use super::StorageValue;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    Uncompressed = 0,
    IntegerBitpacking = 1,
    BooleanBitpacking = 2,
    Constant = 3,
    Alp = 4,
}

impl TryFrom<u8> for CompressionType {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => CompressionType::Uncompressed,
            1 => CompressionType::IntegerBitpacking,
            2 => CompressionType::BooleanBitpacking,
            3 => CompressionType::Constant,
            4 => CompressionType::Alp,
            _ => bail!("invalid CompressionType discriminant: {}", value),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlpState {
    pub exponent: u8,
    pub factor: u8,
    pub exception_count: u32,
    pub exception_capacity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionMetadata {
    pub min: StorageValue,
    pub max: StorageValue,
    pub compression: CompressionType,
    pub alp: Option<AlpState>,
    /// Metadata of the bitpacked integers behind an ALP chunk.
    pub encoded: Option<Box<CompressionMetadata>>,
}

/// Number of bits needed to represent `range` (0 for a zero range).
#[inline]
pub fn bit_width_of(range: u128) -> u32 {
    128 - range.leading_zeros()
}

impl CompressionMetadata {
    pub fn new(min: StorageValue, max: StorageValue, compression: CompressionType) -> Self {
        Self {
            min,
            max,
            compression,
            alp: None,
            encoded: None,
        }
    }

    pub fn constant(value: StorageValue) -> Self {
        Self::new(value, value, CompressionType::Constant)
    }

    pub fn uncompressed(min: StorageValue, max: StorageValue) -> Self {
        Self::new(min, max, CompressionType::Uncompressed)
    }

    pub fn is_constant(&self) -> bool {
        self.compression == CompressionType::Constant
    }

    /// Frame-of-reference width for integer bitpacking.
    pub fn bit_width(&self) -> u32 {
        let range = self.max.as_i128() - self.min.as_i128();
        bit_width_of(range.max(0) as u128)
    }

    /// Values that fit in one page; `u64::MAX` means the codec stores no
    /// pages at all.
    pub fn num_values_per_page(&self, physical: PhysicalType) -> u64 {
        let page_bits = PAGE_SIZE as u64 * 8;
        match self.compression {
            CompressionType::Constant => u64::MAX,
            CompressionType::BooleanBitpacking => page_bits,
            CompressionType::Uncompressed => match physical.codec_type() {
                PhysicalType::Bool => page_bits,
                other => PAGE_SIZE as u64 / other.size_in_chunk().max(1) as u64,
            },
            CompressionType::IntegerBitpacking => {
                let width = self.bit_width() as u64;
                if width == 0 {
                    return u64::MAX;
                }
                let raw = page_bits / width;
                raw - raw % BITPACKING_GROUP_SIZE
            }
            CompressionType::Alp => match &self.encoded {
                Some(encoded) => encoded.num_values_per_page(ALP_ENCODED_TYPE),
                None => u64::MAX,
            },
        }
    }

    pub fn num_data_pages(&self, physical: PhysicalType, num_values: u64) -> u64 {
        let per_page = self.num_values_per_page(physical);
        if per_page == u64::MAX || num_values == 0 {
            0
        } else {
            num_values.div_ceil(per_page)
        }
    }

    pub fn num_exception_pages(&self, physical: PhysicalType) -> u64 {
        match &self.alp {
            Some(alp) => super::alp::exception_pages_for(physical, alp.exception_capacity as u64),
            None => 0,
        }
    }

    pub fn num_pages(&self, physical: PhysicalType, num_values: u64) -> u64 {
        self.num_data_pages(physical, num_values) + self.num_exception_pages(physical)
    }

    /// Largest value count the existing data pages can hold.
    pub fn max_capacity(&self, physical: PhysicalType, num_data_pages: u64) -> u64 {
        let per_page = self.num_values_per_page(physical);
        if per_page == u64::MAX {
            u64::MAX
        } else {
            per_page.saturating_mul(num_data_pages)
        }
    }

    /// Whether `value` can be written into the existing encoding without
    /// re-compressing. Nulls always fit.
    pub fn value_fits(&self, value: StorageValue) -> bool {
        match self.compression {
            CompressionType::Uncompressed | CompressionType::BooleanBitpacking => true,
            CompressionType::Constant => value == self.min,
            CompressionType::IntegerBitpacking => {
                let width = self.bit_width();
                let delta = value.as_i128() - self.min.as_i128();
                delta >= 0 && (width >= 127 || delta < (1i128 << width))
            }
            // ALP values are checked through the encoded child by the codec.
            CompressionType::Alp => true,
        }
    }

    pub fn widen(&mut self, value: StorageValue) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_field("min");
        self.min.serialize(ser);
        ser.write_field("max");
        self.max.serialize(ser);
        ser.write_field("kind");
        ser.write_u8(self.compression as u8);
        if self.compression == CompressionType::Alp {
            let alp = self.alp.unwrap_or(AlpState {
                exponent: 0,
                factor: 0,
                exception_count: 0,
                exception_capacity: 0,
            });
            ser.write_field("alp");
            ser.write_u8(alp.exponent);
            ser.write_u8(alp.factor);
            ser.write_u32(alp.exception_count);
            ser.write_u32(alp.exception_capacity);
            ser.write_field("encoded");
            match &self.encoded {
                Some(encoded) => encoded.serialize(ser),
                None => CompressionMetadata::constant(StorageValue::Signed(0)).serialize(ser),
            }
        }
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        de.expect_field("min")?;
        let min = StorageValue::deserialize(de)?;
        de.expect_field("max")?;
        let max = StorageValue::deserialize(de)?;
        de.expect_field("kind")?;
        let compression = CompressionType::try_from(de.read_u8()?)?;
        let mut metadata = CompressionMetadata::new(min, max, compression);
        if compression == CompressionType::Alp {
            de.expect_field("alp")?;
            metadata.alp = Some(AlpState {
                exponent: de.read_u8()?,
                factor: de.read_u8()?,
                exception_count: de.read_u32()?,
                exception_capacity: de.read_u32()?,
            });
            de.expect_field("encoded")?;
            metadata.encoded = Some(Box::new(CompressionMetadata::deserialize(de)?));
        }
        Ok(metadata)
    }
}
