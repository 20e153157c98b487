//! # Integer Bitpacking
//!
//! Frame-of-reference bitpacking for integer columns. Each value is stored
//! as `value - min` in `bit_width(max - min)` bits, LSB first:
//!
//! ```text
//! page bit:  0          w          2w         ...  32w (byte aligned)
//!            | v0 - min | v1 - min | v2 - min | ... | next group ...
//! ```
//!
//! Values are addressed in groups of 32 so every group starts on a byte
//! boundary (32 * w bits is always a whole number of bytes); a page holds a
//! whole number of groups. Nulls are stored as the frame minimum so they
//! never widen the range.
//!
//! The signed/unsigned distinction only matters at the edges: values are
//! widened to `i128` before subtracting the frame, which keeps the
//! arithmetic exact for the full `i64` and `u64` domains.

use eyre::Result;

use crate::types::PhysicalType;
use crate::vector::null_mask::is_null_in;

use super::storage_value::write_int;
use super::{CompressionAlg, CompressionMetadata, CompressionType, StorageValue, ValuesMut, ValuesRef};

/// Writes the low `width` bits of `value` at `bit_pos`.
#[inline]
pub fn pack_bits(dst: &mut [u8], bit_pos: u64, width: u32, value: u64) {
    let mut remaining = width;
    let mut value = value;
    let mut pos = bit_pos;
    while remaining > 0 {
        let byte = (pos / 8) as usize;
        let shift = (pos % 8) as u32;
        let take = (8 - shift).min(remaining);
        let mask = ((((1u16 << take) - 1) << shift) & 0xff) as u8;
        dst[byte] = (dst[byte] & !mask) | (((value as u8) << shift) & mask);
        value >>= take;
        remaining -= take;
        pos += take as u64;
    }
}

#[inline]
pub fn unpack_bits(src: &[u8], bit_pos: u64, width: u32) -> u64 {
    let mut result = 0u64;
    let mut filled = 0u32;
    let mut pos = bit_pos;
    while filled < width {
        let byte = (pos / 8) as usize;
        let shift = (pos % 8) as u32;
        let take = (8 - shift).min(width - filled);
        let bits = ((src[byte] >> shift) as u64) & ((1u64 << take) - 1);
        result |= bits << filled;
        filled += take;
        pos += take as u64;
    }
    result
}

#[derive(Debug, Clone, Copy)]
pub struct IntegerBitpacking {
    physical: PhysicalType,
}

impl IntegerBitpacking {
    pub fn new(physical: PhysicalType) -> Self {
        Self {
            physical: physical.codec_type(),
        }
    }

    /// Encoded slot for `value` under the frame in `meta`.
    #[inline]
    fn encode(value: StorageValue, meta: &CompressionMetadata) -> u64 {
        (value.as_i128() - meta.min.as_i128()) as u64
    }

    fn encode_at(
        &self,
        bytes: &[u8],
        idx: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> u64 {
        if nulls.is_some_and(|n| is_null_in(n, idx)) {
            return 0;
        }
        Self::encode(StorageValue::read(self.physical, bytes, idx as usize), meta)
    }
}

impl CompressionAlg for IntegerBitpacking {
    fn compression_type(&self) -> CompressionType {
        CompressionType::IntegerBitpacking
    }

    fn compress_next_page(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
        page: &mut [u8],
    ) -> Result<u64> {
        let bytes = src.bytes()?;
        let per_page = meta.num_values_per_page(self.physical);
        let count = num_values.min(per_page);
        let width = meta.bit_width();
        if width == 0 {
            return Ok(count);
        }
        for i in 0..count {
            let encoded = self.encode_at(bytes, src_offset + i, nulls, meta);
            pack_bits(page, i * width as u64, width, encoded);
        }
        Ok(count)
    }

    fn decompress_from_page(
        &self,
        page: &[u8],
        pos_in_page: u64,
        dst: ValuesMut<'_>,
        dst_offset: u64,
        num_values: u64,
        meta: &CompressionMetadata,
    ) -> Result<()> {
        let bytes = dst.bytes()?;
        let width = meta.bit_width();
        let base = meta.min.as_i128();
        for i in 0..num_values {
            let encoded = if width == 0 {
                0
            } else {
                unpack_bits(page, (pos_in_page + i) * width as u64, width)
            };
            write_int(self.physical, bytes, (dst_offset + i) as usize, base + encoded as i128);
        }
        Ok(())
    }

    fn set_values_in_page(
        &self,
        page: &mut [u8],
        pos_in_page: u64,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> Result<()> {
        let bytes = src.bytes()?;
        let width = meta.bit_width();
        if width == 0 {
            return Ok(());
        }
        for i in 0..num_values {
            let encoded = self.encode_at(bytes, src_offset + i, nulls, meta);
            pack_bits(page, (pos_in_page + i) * width as u64, width, encoded);
        }
        Ok(())
    }

    fn can_update_in_place(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> bool {
        let Ok(bytes) = src.bytes() else {
            return false;
        };
        (src_offset..src_offset + num_values).all(|idx| {
            nulls.is_some_and(|n| is_null_in(n, idx))
                || meta.value_fits(StorageValue::read(self.physical, bytes, idx as usize))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::types::FixedValue;

    fn i32_bytes(values: &[i32]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * 4];
        for (i, v) in values.iter().enumerate() {
            v.write_at(&mut bytes, i);
        }
        bytes
    }

    #[test]
    fn pack_and_unpack_straddle_bytes() {
        let mut buf = vec![0u8; 16];
        pack_bits(&mut buf, 5, 13, 0x1abc);
        pack_bits(&mut buf, 18, 64, u64::MAX - 1);
        assert_eq!(unpack_bits(&buf, 5, 13), 0x1abc);
        assert_eq!(unpack_bits(&buf, 18, 64), u64::MAX - 1);
        assert_eq!(unpack_bits(&buf, 0, 5), 0);
    }

    #[test]
    fn negative_frame_decodes_exactly() {
        let values = [-100, -7, 0, 55, -100, 27];
        let src = i32_bytes(&values);
        let meta = CompressionMetadata::new(
            StorageValue::Signed(-100),
            StorageValue::Signed(55),
            CompressionType::IntegerBitpacking,
        );
        let codec = IntegerBitpacking::new(PhysicalType::Int32);
        let mut page = vec![0u8; PAGE_SIZE];
        let consumed = codec
            .compress_next_page(ValuesRef::Bytes(&src), 0, 6, None, &meta, &mut page)
            .unwrap();
        assert_eq!(consumed, 6);

        let mut out = vec![0u8; src.len()];
        codec
            .decompress_from_page(&page, 1, ValuesMut::Bytes(&mut out), 1, 5, &meta)
            .unwrap();
        for (i, expected) in values.iter().enumerate().skip(1) {
            assert_eq!(i32::read_at(&out, i), *expected);
        }
    }

    #[test]
    fn in_place_update_respects_bit_width() {
        let meta = CompressionMetadata::new(
            StorageValue::Signed(10),
            StorageValue::Signed(13),
            CompressionType::IntegerBitpacking,
        );
        let codec = IntegerBitpacking::new(PhysicalType::Int32);
        let fits = i32_bytes(&[10, 11, 12, 13]);
        let too_big = i32_bytes(&[14]);
        assert!(codec.can_update_in_place(ValuesRef::Bytes(&fits), 0, 4, None, &meta));
        assert!(!codec.can_update_in_place(ValuesRef::Bytes(&too_big), 0, 1, None, &meta));
        let nulls = vec![1u64];
        assert!(codec.can_update_in_place(ValuesRef::Bytes(&too_big), 0, 1, Some(&nulls), &meta));
    }
}
