//! # Compression Codecs
//!
//! Every flushed column chunk is encoded by exactly one codec, chosen from
//! the chunk's contents at flush time and described by a
//! `CompressionMetadata`. The codecs share the `CompressionAlg` interface:
//!
//! | Method                  | Purpose                                        |
//! |-------------------------|------------------------------------------------|
//! | `compress_next_page`    | Encode as many values as fit into one page     |
//! | `decompress_from_page`  | Decode a run of values starting mid-page       |
//! | `set_values_in_page`    | Overwrite values inside an existing page       |
//! | `can_update_in_place`   | Whether new values fit the existing encoding   |
//!
//! Values per page come from `CompressionMetadata::num_values_per_page`,
//! where `u64::MAX` means the chunk stores no pages at all (CONSTANT).
//!
//! ## Selection Policy
//!
//! ```text
//!                 compression disabled? ──yes──> UNCOMPRESSED
//!                          │no
//!                 min == max (or all null)? ──yes──> CONSTANT
//!                          │no
//!      ┌──────────────┬────┴─────────────┬───────────────────┐
//!     BOOL         integers          FLOAT/DOUBLE       anything else
//!      │        bit_width(max-min)       │                   │
//!      │        < type width?           ALP fits?        UNCOMPRESSED
//!  BOOLEAN_      yes │    │ no        yes │   │ no
//!  BITPACKING  INTEGER_  UNCOMPRESSED   ALP  UNCOMPRESSED
//!              BITPACKING
//! ```
//!
//! ## Buffer Shapes
//!
//! BOOL values and null bits live in `u64` word bitmaps; every other type
//! lives in a little-endian byte buffer. `ValuesRef`/`ValuesMut` carry the
//! shape alongside the slice and codecs reject the wrong one with an error
//! instead of reinterpreting memory.

mod alp;
mod bitpacking;
mod boolean;
mod constant;
mod metadata;
mod storage_value;
mod uncompressed;

pub use alp::{
    collect_exceptions, exception_capacity_for, exception_pages_for, exceptions_from_page,
    exceptions_per_page, exceptions_to_pages, merge_exceptions, patch_exceptions, AlpCodec,
    AlpException, ALP_ENCODED_TYPE,
};
pub use bitpacking::{pack_bits, unpack_bits, IntegerBitpacking};
pub use boolean::{bool_min_max, BooleanBitpacking};
pub use constant::ConstantCodec;
pub use metadata::{bit_width_of, AlpState, CompressionMetadata, CompressionType};
pub use storage_value::StorageValue;
pub use uncompressed::Uncompressed;

use eyre::{bail, Result};
use tracing::trace;

use crate::config::PAGE_SIZE;
use crate::types::PhysicalType;
use crate::vector::null_mask::is_null_in;

#[derive(Debug, Clone, Copy)]
pub enum ValuesRef<'a> {
    Bytes(&'a [u8]),
    Bits(&'a [u64]),
}

impl<'a> ValuesRef<'a> {
    pub fn bytes(&self) -> Result<&'a [u8]> {
        match *self {
            ValuesRef::Bytes(bytes) => Ok(bytes),
            ValuesRef::Bits(_) => bail!("codec expected a byte buffer but was given a bitmap"),
        }
    }

    pub fn bits(&self) -> Result<&'a [u64]> {
        match *self {
            ValuesRef::Bits(words) => Ok(words),
            ValuesRef::Bytes(_) => bail!("codec expected a bitmap but was given a byte buffer"),
        }
    }
}

#[derive(Debug)]
pub enum ValuesMut<'a> {
    Bytes(&'a mut [u8]),
    Bits(&'a mut [u64]),
}

impl<'a> ValuesMut<'a> {
    pub fn bytes(self) -> Result<&'a mut [u8]> {
        match self {
            ValuesMut::Bytes(bytes) => Ok(bytes),
            ValuesMut::Bits(_) => bail!("codec expected a byte buffer but was given a bitmap"),
        }
    }

    pub fn bits(self) -> Result<&'a mut [u64]> {
        match self {
            ValuesMut::Bits(words) => Ok(words),
            ValuesMut::Bytes(_) => bail!("codec expected a bitmap but was given a byte buffer"),
        }
    }
}

pub trait CompressionAlg {
    fn compression_type(&self) -> CompressionType;

    /// Encodes up to `num_values` values starting at `src_offset` into one
    /// page and returns how many were consumed.
    fn compress_next_page(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
        page: &mut [u8],
    ) -> Result<u64>;

    fn decompress_from_page(
        &self,
        page: &[u8],
        pos_in_page: u64,
        dst: ValuesMut<'_>,
        dst_offset: u64,
        num_values: u64,
        meta: &CompressionMetadata,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn set_values_in_page(
        &self,
        page: &mut [u8],
        pos_in_page: u64,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> Result<()>;

    fn can_update_in_place(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> bool;
}

/// Codec dispatch by compression type.
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    Constant(ConstantCodec),
    Uncompressed(Uncompressed),
    IntegerBitpacking(IntegerBitpacking),
    BooleanBitpacking(BooleanBitpacking),
    Alp(AlpCodec),
}

macro_rules! delegate {
    ($self:ident, $codec:ident => $call:expr) => {
        match $self {
            Codec::Constant($codec) => $call,
            Codec::Uncompressed($codec) => $call,
            Codec::IntegerBitpacking($codec) => $call,
            Codec::BooleanBitpacking($codec) => $call,
            Codec::Alp($codec) => $call,
        }
    };
}

impl Codec {
    pub fn for_metadata(physical: PhysicalType, meta: &CompressionMetadata) -> Self {
        match meta.compression {
            CompressionType::Constant => Codec::Constant(ConstantCodec::new(physical)),
            CompressionType::Uncompressed => Codec::Uncompressed(Uncompressed::new(physical)),
            CompressionType::IntegerBitpacking => {
                Codec::IntegerBitpacking(IntegerBitpacking::new(physical))
            }
            CompressionType::BooleanBitpacking => Codec::BooleanBitpacking(BooleanBitpacking),
            CompressionType::Alp => Codec::Alp(AlpCodec::new(physical)),
        }
    }
}

impl CompressionAlg for Codec {
    fn compression_type(&self) -> CompressionType {
        delegate!(self, c => c.compression_type())
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
        delegate!(self, c => c.compress_next_page(src, src_offset, num_values, nulls, meta, page))
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
        delegate!(self, c => c.decompress_from_page(page, pos_in_page, dst, dst_offset, num_values, meta))
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
        delegate!(self, c => c.set_values_in_page(page, pos_in_page, src, src_offset, num_values, nulls, meta))
    }

    fn can_update_in_place(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> bool {
        delegate!(self, c => c.can_update_in_place(src, src_offset, num_values, nulls, meta))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionPolicy {
    pub enable_compression: bool,
    pub alp_max_exception_ratio: f64,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            enable_compression: true,
            alp_max_exception_ratio: crate::config::ALP_MAX_EXCEPTION_RATIO,
        }
    }
}

/// Min/max over the non-null values of `[offset, offset + num_values)`.
pub fn compute_min_max(
    physical: PhysicalType,
    src: ValuesRef<'_>,
    offset: u64,
    num_values: u64,
    nulls: Option<&[u64]>,
) -> Option<(StorageValue, StorageValue)> {
    match src {
        ValuesRef::Bits(words) => bool_min_max(words, offset, num_values, nulls)
            .map(|(lo, hi)| (StorageValue::from_bool(lo), StorageValue::from_bool(hi))),
        ValuesRef::Bytes(bytes) => {
            let physical = physical.codec_type();
            let mut stats: Option<(StorageValue, StorageValue)> = None;
            for idx in offset..offset + num_values {
                if nulls.is_some_and(|n| is_null_in(n, idx)) {
                    continue;
                }
                let value = StorageValue::read(physical, bytes, idx as usize);
                stats = Some(match stats {
                    Some((lo, hi)) => (lo.min(value), hi.max(value)),
                    None => (value, value),
                });
            }
            stats
        }
    }
}

/// Picks the codec for a chunk's first `num_values` values.
pub fn choose_metadata(
    physical: PhysicalType,
    src: ValuesRef<'_>,
    num_values: u64,
    nulls: Option<&[u64]>,
    stats: Option<(StorageValue, StorageValue)>,
    policy: &CompressionPolicy,
) -> CompressionMetadata {
    let zero = StorageValue::zero(physical);
    let (min, max) = stats.unwrap_or((zero, zero));
    if !policy.enable_compression {
        return CompressionMetadata::uncompressed(min, max);
    }
    if min == max {
        return CompressionMetadata::constant(min);
    }
    let codec_type = physical.codec_type();
    let metadata = if codec_type == PhysicalType::Bool {
        CompressionMetadata::new(min, max, CompressionType::BooleanBitpacking)
    } else if codec_type.is_integer() {
        let candidate = CompressionMetadata::new(min, max, CompressionType::IntegerBitpacking);
        if candidate.bit_width() < codec_type.bit_width() {
            candidate
        } else {
            CompressionMetadata::uncompressed(min, max)
        }
    } else if codec_type.is_floating_point() {
        let analyzed = src.bytes().ok().and_then(|bytes| {
            alp::analyze(
                codec_type,
                bytes,
                num_values,
                nulls,
                policy.alp_max_exception_ratio,
                min,
                max,
            )
        });
        analyzed.unwrap_or_else(|| CompressionMetadata::uncompressed(min, max))
    } else {
        CompressionMetadata::uncompressed(min, max)
    };
    trace!(?physical, compression = ?metadata.compression, num_values, "chose codec");
    metadata
}

/// Pages produced by compressing a whole chunk, ready to be written to a
/// contiguous page range: data pages first, then ALP exception pages.
#[derive(Debug)]
pub struct CompressedPages {
    pub data_pages: Vec<Vec<u8>>,
    pub exception_pages: Vec<Vec<u8>>,
}

impl CompressedPages {
    pub fn num_pages(&self) -> u64 {
        (self.data_pages.len() + self.exception_pages.len()) as u64
    }

    pub fn into_pages(self) -> impl Iterator<Item = Vec<u8>> {
        self.data_pages.into_iter().chain(self.exception_pages)
    }
}

pub fn compress_pages(
    physical: PhysicalType,
    src: ValuesRef<'_>,
    num_values: u64,
    nulls: Option<&[u64]>,
    meta: &CompressionMetadata,
) -> Result<CompressedPages> {
    let codec = Codec::for_metadata(physical, meta);
    let num_data_pages = meta.num_data_pages(physical, num_values);
    let mut data_pages = Vec::with_capacity(num_data_pages as usize);
    let mut offset = 0u64;
    for _ in 0..num_data_pages {
        let mut page = vec![0u8; PAGE_SIZE];
        let consumed =
            codec.compress_next_page(src, offset, num_values - offset, nulls, meta, &mut page)?;
        offset += consumed;
        data_pages.push(page);
    }

    let exception_pages = match meta.alp {
        Some(state) if state.exception_capacity > 0 => {
            let exceptions =
                collect_exceptions(physical, src.bytes()?, 0, num_values, nulls, meta, 0)?;
            exceptions_to_pages(
                physical,
                &exceptions,
                exception_pages_for(physical, state.exception_capacity as u64),
            )
        }
        _ => Vec::new(),
    };
    Ok(CompressedPages {
        data_pages,
        exception_pages,
    })
}

/// Decodes `num_values` values starting at chunk offset `offset` from
/// in-memory pages, patching ALP exceptions.
pub fn decompress_pages(
    physical: PhysicalType,
    pages: &CompressedPages,
    meta: &CompressionMetadata,
    offset: u64,
    num_values: u64,
    mut dst: ValuesMut<'_>,
    dst_offset: u64,
) -> Result<()> {
    let codec = Codec::for_metadata(physical, meta);
    let per_page = meta.num_values_per_page(physical);
    let empty = [0u8; 0];
    let mut done = 0u64;
    while done < num_values {
        let chunk_pos = offset + done;
        let (page_idx, pos_in_page) = if per_page == u64::MAX {
            (0, chunk_pos)
        } else {
            (chunk_pos / per_page, chunk_pos % per_page)
        };
        let n = (num_values - done).min(per_page.saturating_sub(pos_in_page));
        let page: &[u8] = pages
            .data_pages
            .get(page_idx as usize)
            .map(|p| p.as_slice())
            .unwrap_or(&empty);
        let view = match &mut dst {
            ValuesMut::Bytes(bytes) => ValuesMut::Bytes(&mut **bytes),
            ValuesMut::Bits(words) => ValuesMut::Bits(&mut **words),
        };
        codec.decompress_from_page(page, pos_in_page, view, dst_offset + done, n, meta)?;
        done += n;
    }

    if let (Some(state), ValuesMut::Bytes(bytes)) = (meta.alp, dst) {
        let per_exception_page = exceptions_per_page(physical) as usize;
        let mut exceptions = Vec::with_capacity(state.exception_count as usize);
        let mut remaining = state.exception_count as usize;
        for page in &pages.exception_pages {
            let count = remaining.min(per_exception_page);
            exceptions.extend(exceptions_from_page(physical, page, count)?);
            remaining -= count;
        }
        patch_exceptions(physical, &exceptions, offset, num_values, bytes, dst_offset);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixedValue;

    fn encode<T: FixedValue>(values: &[T]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * T::SIZE];
        for (i, v) in values.iter().enumerate() {
            v.write_at(&mut bytes, i);
        }
        bytes
    }

    fn round_trip(physical: PhysicalType, bytes: &[u8], n: u64) -> (CompressionMetadata, Vec<u8>) {
        let src = ValuesRef::Bytes(bytes);
        let stats = compute_min_max(physical, src, 0, n, None);
        let meta = choose_metadata(physical, src, n, None, stats, &CompressionPolicy::default());
        let pages = compress_pages(physical, src, n, None, &meta).unwrap();
        let mut out = vec![0u8; bytes.len()];
        decompress_pages(physical, &pages, &meta, 0, n, ValuesMut::Bytes(&mut out), 0).unwrap();
        (meta, out)
    }

    #[test]
    fn alp_single_exception_example() {
        let mut values = vec![5.6f64; 256];
        values[2] = 54387589437957.834;
        let bytes = encode(&values);
        let (meta, out) = round_trip(PhysicalType::Double, &bytes, 256);
        assert_eq!(meta.compression, CompressionType::Alp);
        assert_eq!(meta.alp.unwrap().exception_count, 1);
        assert_eq!(out, bytes);
    }

    #[test]
    fn alp_exceptions_at_scattered_positions() {
        let mut values: Vec<f64> = (0..5000).map(|i| (i % 97) as f64 / 4.0).collect();
        for pos in [0usize, 17, 1999, 2048, 4999] {
            values[pos] = std::f64::consts::E * pos as f64 + 0.1;
        }
        values[3000] = -0.0;
        let bytes = encode(&values);
        let (meta, out) = round_trip(PhysicalType::Double, &bytes, values.len() as u64);
        assert_eq!(meta.compression, CompressionType::Alp);
        assert!(meta.alp.unwrap().exception_count >= 5);
        assert_eq!(out, bytes);

        let src = ValuesRef::Bytes(&bytes);
        let pages = compress_pages(PhysicalType::Double, src, 5000, None, &meta).unwrap();
        let mut window = vec![0u8; 100 * 8];
        decompress_pages(PhysicalType::Double, &pages, &meta, 1990, 100, ValuesMut::Bytes(&mut window), 0)
            .unwrap();
        assert_eq!(window, bytes[1990 * 8..2090 * 8]);
    }

    #[test]
    fn integers_choose_bitpacking_or_constant() {
        let narrow: Vec<i64> = (0..3000).map(|i| 1_000_000 + (i % 50)).collect();
        let bytes = encode(&narrow);
        let (meta, out) = round_trip(PhysicalType::Int64, &bytes, 3000);
        assert_eq!(meta.compression, CompressionType::IntegerBitpacking);
        assert_eq!(meta.bit_width(), 6);
        assert_eq!(out, bytes);

        let same = encode(&[7u16; 100]);
        let (meta, out) = round_trip(PhysicalType::UInt16, &same, 100);
        assert!(meta.is_constant());
        assert_eq!(out, same);

        let wide = encode(&[i8::MIN, i8::MAX, 0]);
        let (meta, out) = round_trip(PhysicalType::Int8, &wide, 3);
        assert_eq!(meta.compression, CompressionType::Uncompressed);
        assert_eq!(out, wide);
    }

    #[test]
    fn disabled_compression_stores_plain_values() {
        let values = encode(&[3i32; 10]);
        let src = ValuesRef::Bytes(&values);
        let policy = CompressionPolicy {
            enable_compression: false,
            ..Default::default()
        };
        let stats = compute_min_max(PhysicalType::Int32, src, 0, 10, None);
        let meta = choose_metadata(PhysicalType::Int32, src, 10, None, stats, &policy);
        assert_eq!(meta.compression, CompressionType::Uncompressed);
    }

    #[test]
    fn bool_bitmaps_round_trip() {
        let mut words = vec![0u64; 2];
        words[0] = 0xdead_beef_0bad_f00d;
        words[1] = 0x1234;
        let src = ValuesRef::Bits(&words);
        let stats = compute_min_max(PhysicalType::Bool, src, 0, 77, None);
        let meta = choose_metadata(PhysicalType::Bool, src, 77, None, stats, &CompressionPolicy::default());
        assert_eq!(meta.compression, CompressionType::BooleanBitpacking);
        let pages = compress_pages(PhysicalType::Bool, src, 77, None, &meta).unwrap();
        assert_eq!(pages.num_pages(), 1);
        let mut out = vec![0u64; 2];
        decompress_pages(PhysicalType::Bool, &pages, &meta, 0, 77, ValuesMut::Bits(&mut out), 0).unwrap();
        assert_eq!(out[0], words[0]);
        assert_eq!(out[1] & ((1 << 13) - 1), words[1] & ((1 << 13) - 1));
    }
}
