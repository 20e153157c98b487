//! CONSTANT compression: every non-null value equals `metadata.min`, and the
//! chunk occupies no pages. Decompression materializes the constant; an
//! in-place update is only possible with that same value.

use eyre::Result;

use crate::types::PhysicalType;
use crate::vector::null_mask::{is_null_in, set_null_range_in};

use super::{CompressionAlg, CompressionMetadata, CompressionType, StorageValue, ValuesMut, ValuesRef};

#[derive(Debug, Clone, Copy)]
pub struct ConstantCodec {
    physical: PhysicalType,
}

impl ConstantCodec {
    pub fn new(physical: PhysicalType) -> Self {
        Self {
            physical: physical.codec_type(),
        }
    }
}

impl CompressionAlg for ConstantCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Constant
    }

    fn compress_next_page(
        &self,
        _src: ValuesRef<'_>,
        _src_offset: u64,
        num_values: u64,
        _nulls: Option<&[u64]>,
        _meta: &CompressionMetadata,
        _page: &mut [u8],
    ) -> Result<u64> {
        Ok(num_values)
    }

    fn decompress_from_page(
        &self,
        _page: &[u8],
        _pos_in_page: u64,
        dst: ValuesMut<'_>,
        dst_offset: u64,
        num_values: u64,
        meta: &CompressionMetadata,
    ) -> Result<()> {
        match dst {
            ValuesMut::Bits(words) => {
                let set = meta.min.as_i128() != 0;
                set_null_range_in(words, dst_offset, num_values, set);
            }
            ValuesMut::Bytes(bytes) => {
                for idx in dst_offset..dst_offset + num_values {
                    meta.min.write(self.physical, bytes, idx as usize);
                }
            }
        }
        Ok(())
    }

    fn set_values_in_page(
        &self,
        _page: &mut [u8],
        _pos_in_page: u64,
        _src: ValuesRef<'_>,
        _src_offset: u64,
        _num_values: u64,
        _nulls: Option<&[u64]>,
        _meta: &CompressionMetadata,
    ) -> Result<()> {
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
        (src_offset..src_offset + num_values).all(|idx| {
            if nulls.is_some_and(|n| is_null_in(n, idx)) {
                return true;
            }
            let value = match src {
                ValuesRef::Bits(words) => StorageValue::from_bool(is_null_in(words, idx)),
                ValuesRef::Bytes(bytes) => StorageValue::read(self.physical, bytes, idx as usize),
            };
            meta.value_fits(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixedValue;

    #[test]
    fn materializes_constant() {
        let codec = ConstantCodec::new(PhysicalType::Int64);
        let meta = CompressionMetadata::constant(StorageValue::Signed(-42));
        let mut out = vec![0u8; 8 * 4];
        codec
            .decompress_from_page(&[], 0, ValuesMut::Bytes(&mut out), 1, 3, &meta)
            .unwrap();
        assert_eq!(i64::read_at(&out, 0), 0);
        assert_eq!(i64::read_at(&out, 3), -42);
    }

    #[test]
    fn update_must_match_constant() {
        let codec = ConstantCodec::new(PhysicalType::Bool);
        let meta = CompressionMetadata::constant(StorageValue::from_bool(true));
        let all_true = vec![0b111u64];
        let mixed = vec![0b101u64];
        assert!(codec.can_update_in_place(ValuesRef::Bits(&all_true), 0, 3, None, &meta));
        assert!(!codec.can_update_in_place(ValuesRef::Bits(&mixed), 0, 3, None, &meta));
        let nulls = vec![0b010u64];
        assert!(codec.can_update_in_place(ValuesRef::Bits(&mixed), 0, 3, Some(&nulls), &meta));
    }
}
