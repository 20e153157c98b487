//! Plain little-endian copy of fixed-width values. Used when compression is
//! disabled or when no codec shrinks the data. For BOOL the layout is the
//! native bitmap, one bit per value.

use eyre::Result;

use crate::types::PhysicalType;
use crate::vector::null_mask::copy_null_bits;

use super::boolean::{bits_from_page, bits_into_page};
use super::{CompressionAlg, CompressionMetadata, CompressionType, ValuesMut, ValuesRef};

#[derive(Debug, Clone, Copy)]
pub struct Uncompressed {
    physical: PhysicalType,
}

impl Uncompressed {
    pub fn new(physical: PhysicalType) -> Self {
        Self {
            physical: physical.codec_type(),
        }
    }

    fn width(&self) -> usize {
        self.physical.size_in_chunk()
    }
}

impl CompressionAlg for Uncompressed {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Uncompressed
    }

    fn compress_next_page(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        _nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
        page: &mut [u8],
    ) -> Result<u64> {
        let count = num_values.min(meta.num_values_per_page(self.physical));
        self.set_values_in_page(page, 0, src, src_offset, count, None, meta)?;
        Ok(count)
    }

    fn decompress_from_page(
        &self,
        page: &[u8],
        pos_in_page: u64,
        dst: ValuesMut<'_>,
        dst_offset: u64,
        num_values: u64,
        _meta: &CompressionMetadata,
    ) -> Result<()> {
        match dst {
            ValuesMut::Bits(words) => {
                let page_words = bits_from_page(page, pos_in_page, num_values);
                copy_null_bits(&page_words, pos_in_page % 64, words, dst_offset, num_values, false);
            }
            ValuesMut::Bytes(bytes) => {
                let width = self.width();
                let src = pos_in_page as usize * width;
                let dst = dst_offset as usize * width;
                let len = num_values as usize * width;
                bytes[dst..dst + len].copy_from_slice(&page[src..src + len]);
            }
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
        _nulls: Option<&[u64]>,
        _meta: &CompressionMetadata,
    ) -> Result<()> {
        match src {
            ValuesRef::Bits(words) => bits_into_page(page, pos_in_page, words, src_offset, num_values),
            ValuesRef::Bytes(bytes) => {
                let width = self.width();
                let src = src_offset as usize * width;
                let dst = pos_in_page as usize * width;
                let len = num_values as usize * width;
                page[dst..dst + len].copy_from_slice(&bytes[src..src + len]);
            }
        }
        Ok(())
    }

    fn can_update_in_place(
        &self,
        _src: ValuesRef<'_>,
        _src_offset: u64,
        _num_values: u64,
        _nulls: Option<&[u64]>,
        _meta: &CompressionMetadata,
    ) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::StorageValue;
    use crate::config::PAGE_SIZE;

    #[test]
    fn copies_bytes_verbatim() {
        let codec = Uncompressed::new(PhysicalType::Int16);
        let meta = CompressionMetadata::uncompressed(StorageValue::Signed(0), StorageValue::Signed(0));
        let src: Vec<u8> = (0..20).collect();
        let mut page = vec![0u8; PAGE_SIZE];
        let n = codec
            .compress_next_page(ValuesRef::Bytes(&src), 2, 8, None, &meta, &mut page)
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(&page[..16], &src[4..20]);
        assert_eq!(meta.num_values_per_page(PhysicalType::Int16), PAGE_SIZE as u64 / 2);
    }
}
