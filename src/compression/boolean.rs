//! # Boolean Bitpacking
//!
//! BOOL chunks and null chunks are already bitmaps in memory, so their page
//! encoding is the same bitmap written as little-endian 64-bit words:
//!
//! ```text
//! page byte: 0        8        16
//!            | word 0 | word 1 | ...     bit i of the page = value i
//! ```
//!
//! A page therefore holds `PAGE_SIZE * 8` values. Reads and writes at
//! arbitrary bit positions go through the unaligned null-mask copy.

use eyre::Result;

use crate::vector::null_mask::{copy_null_bits, is_null_in};

use super::{CompressionAlg, CompressionMetadata, CompressionType, ValuesMut, ValuesRef};

const WORD_BYTES: usize = 8;

fn read_word(page: &[u8], word: usize) -> u64 {
    let mut raw = [0u8; WORD_BYTES];
    raw.copy_from_slice(&page[word * WORD_BYTES..(word + 1) * WORD_BYTES]);
    u64::from_le_bytes(raw)
}

fn write_word(page: &mut [u8], word: usize, value: u64) {
    page[word * WORD_BYTES..(word + 1) * WORD_BYTES].copy_from_slice(&value.to_le_bytes());
}

/// Loads the page words covering bits `[pos, pos + num)`. Bit `pos` of the
/// page lands at bit `pos % 64` of the returned words.
pub fn bits_from_page(page: &[u8], pos: u64, num: u64) -> Vec<u64> {
    if num == 0 {
        return Vec::new();
    }
    let first = (pos / 64) as usize;
    let last = ((pos + num - 1) / 64) as usize;
    (first..=last).map(|w| read_word(page, w)).collect()
}

/// Splices `num` bits from `src` (starting at `src_offset`) into the page at
/// bit `pos`, leaving neighbouring bits untouched.
pub fn bits_into_page(page: &mut [u8], pos: u64, src: &[u64], src_offset: u64, num: u64) {
    if num == 0 {
        return;
    }
    let first = (pos / 64) as usize;
    let mut words = bits_from_page(page, pos, num);
    copy_null_bits(src, src_offset, &mut words, pos % 64, num, false);
    for (i, word) in words.into_iter().enumerate() {
        write_word(page, first + i, word);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanBitpacking;

impl CompressionAlg for BooleanBitpacking {
    fn compression_type(&self) -> CompressionType {
        CompressionType::BooleanBitpacking
    }

    fn compress_next_page(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        _nulls: Option<&[u64]>,
        _meta: &CompressionMetadata,
        page: &mut [u8],
    ) -> Result<u64> {
        let words = src.bits()?;
        let count = num_values.min(page.len() as u64 * 8);
        bits_into_page(page, 0, words, src_offset, count);
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
        let words = dst.bits()?;
        let page_words = bits_from_page(page, pos_in_page, num_values);
        copy_null_bits(
            &page_words,
            pos_in_page % 64,
            words,
            dst_offset,
            num_values,
            false,
        );
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
        bits_into_page(page, pos_in_page, src.bits()?, src_offset, num_values);
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

/// Min/max of a bitmap range as 0/1, or `None` for an empty range.
pub fn bool_min_max(words: &[u64], offset: u64, num: u64, nulls: Option<&[u64]>) -> Option<(bool, bool)> {
    let mut seen_true = false;
    let mut seen_false = false;
    for idx in offset..offset + num {
        if nulls.is_some_and(|n| is_null_in(n, idx)) {
            continue;
        }
        if is_null_in(words, idx) {
            seen_true = true;
        } else {
            seen_false = true;
        }
        if seen_true && seen_false {
            break;
        }
    }
    match (seen_false, seen_true) {
        (false, false) => None,
        (min_false, max_true) => Some((!min_false, max_true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::StorageValue;
    use crate::config::PAGE_SIZE;
    use crate::vector::null_mask::set_null_in;

    #[test]
    fn unaligned_round_trip_through_page() {
        let mut src = vec![0u64; 4];
        for i in (0..256).step_by(3) {
            set_null_in(&mut src, i, true);
        }
        let meta = CompressionMetadata::new(
            StorageValue::from_bool(false),
            StorageValue::from_bool(true),
            CompressionType::BooleanBitpacking,
        );
        let mut page = vec![0u8; PAGE_SIZE];
        let n = BooleanBitpacking
            .compress_next_page(ValuesRef::Bits(&src), 5, 200, None, &meta, &mut page)
            .unwrap();
        assert_eq!(n, 200);

        let mut dst = vec![0u64; 4];
        BooleanBitpacking
            .decompress_from_page(&page, 10, ValuesMut::Bits(&mut dst), 70, 100, &meta)
            .unwrap();
        for i in 0..100u64 {
            assert_eq!(is_null_in(&dst, 70 + i), (15 + i) % 3 == 0, "bit {}", i);
        }
    }

    #[test]
    fn min_max_skips_nulls() {
        let values = vec![0b0110u64];
        let nulls = vec![0b0001u64];
        assert_eq!(bool_min_max(&values, 0, 3, Some(&nulls)), Some((true, true)));
        assert_eq!(bool_min_max(&values, 0, 4, None), Some((false, true)));
        assert_eq!(bool_min_max(&values, 0, 1, Some(&nulls)), None);
    }
}
