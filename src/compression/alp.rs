//! # ALP Floating-Point Compression
//!
//! Adaptive Lossless floating-Point compression turns decimal-looking floats
//! into integers, bitpacks those, and keeps every value that does not
//! survive the trip in a side list of exceptions.
//!
//! ## Encoding
//!
//! For an exponent `e` and factor `f <= e`:
//!
//! ```text
//!   encode(v) = round(v * 10^e * 10^-f)          (as i64)
//!   decode(n) = n * 10^f * 10^-e
//! ```
//!
//! A value is encodable when `decode(encode(v))` has exactly the bits of
//! `v`; `-0.0`, NaN, infinities and values that would exceed 2^62 after
//! scaling are always exceptions. `(e, f)` is chosen per chunk by minimising
//! `len * bit_width(encoded range) + exceptions * exception_bits`: every pair
//! is ranked on a strided sample, and the best few pairs of distinct scale
//! `e - f` are measured again over the whole chunk.
//!
//! ## Chunk Layout On Disk
//!
//! ```text
//! +---------------------------+-------------------------------+
//! | data pages                | exception pages               |
//! | bitpacked encoded i64s    | [value | pos u32] records     |
//! | (exceptions hold a        | sorted by pos, never split    |
//! |  placeholder slot)        | across pages                  |
//! +---------------------------+-------------------------------+
//! ```
//!
//! The data pages use the child `encoded` metadata (integer bitpacking or
//! constant). Exception records are stored little-endian through zerocopy
//! structs: 12 bytes for DOUBLE, 8 bytes for FLOAT. Values are kept as raw
//! bit patterns so NaN payloads survive.
//!
//! Reads decode the bitpacked integers first and then patch exceptions that
//! fall in the scanned range, found by binary search on position.
//!
//! ## Exception Capacity
//!
//! A flush reserves room for `ceil(count * 1.5)` exceptions rounded up to a
//! whole page, so in-place updates that introduce a few new exceptions do
//! not force a rewrite. `can_update_in_place` rejects updates that would
//! exceed the reservation.

use eyre::{eyre, Result};
use smallvec::SmallVec;
use tracing::debug;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    ALP_EXCEPTION_GROWTH_DENOMINATOR, ALP_EXCEPTION_GROWTH_NUMERATOR, ALP_MAX_CANDIDATES,
    ALP_SAMPLE_SIZE, PAGE_SIZE,
};
use crate::types::{FixedValue, PhysicalType};
use crate::vector::null_mask::is_null_in;

use super::metadata::bit_width_of;
use super::{
    AlpState, Codec, CompressionAlg, CompressionMetadata, CompressionType, StorageValue,
    ValuesMut, ValuesRef,
};

/// Physical type of the integers ALP bitpacks.
pub const ALP_ENCODED_TYPE: PhysicalType = PhysicalType::Int64;

const ENCODING_LIMIT: f64 = (1u64 << 62) as f64;

const EXP10_F64: [f64; 19] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16,
    1e17, 1e18,
];
const FRAC10_F64: [f64; 19] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10, 1e-11, 1e-12, 1e-13, 1e-14,
    1e-15, 1e-16, 1e-17, 1e-18,
];
const EXP10_F32: [f32; 11] = [1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10];
const FRAC10_F32: [f32; 11] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10,
];

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct DoubleExceptionRecord {
    value: U64,
    pos_in_chunk: U32,
}

impl DoubleExceptionRecord {
    zerocopy_accessors! {
        value: u64,
        pos_in_chunk: u32,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct FloatExceptionRecord {
    value: U32,
    pos_in_chunk: U32,
}

impl FloatExceptionRecord {
    zerocopy_accessors! {
        value: u32,
        pos_in_chunk: u32,
    }
}

const _: () = assert!(std::mem::size_of::<DoubleExceptionRecord>() == 12);
const _: () = assert!(std::mem::size_of::<FloatExceptionRecord>() == 8);

/// A value that ALP could not encode, as raw bits plus its chunk position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlpException {
    pub bits: u64,
    pub pos: u32,
}

pub trait AlpFloat: FixedValue {
    const MAX_EXPONENT: u8;
    const EXCEPTION_SIZE: usize;

    fn alp_encode(self, exponent: u8, factor: u8) -> Option<i64>;
    fn alp_decode(encoded: i64, exponent: u8, factor: u8) -> Self;
    fn raw_bits(self) -> u64;
    fn from_raw_bits(bits: u64) -> Self;
}

macro_rules! impl_alp_float {
    ($ty:ty, $exp:ident, $frac:ident, $record:ty) => {
        impl AlpFloat for $ty {
            const MAX_EXPONENT: u8 = ($exp.len() - 1) as u8;
            const EXCEPTION_SIZE: usize = std::mem::size_of::<$record>();

            #[inline]
            fn alp_encode(self, exponent: u8, factor: u8) -> Option<i64> {
                let scaled = self * $exp[exponent as usize] * $frac[factor as usize];
                if !scaled.is_finite() || (scaled as f64).abs() > ENCODING_LIMIT {
                    return None;
                }
                let encoded = scaled.round() as i64;
                let decoded = Self::alp_decode(encoded, exponent, factor);
                (decoded.to_bits() == self.to_bits()).then_some(encoded)
            }

            #[inline]
            fn alp_decode(encoded: i64, exponent: u8, factor: u8) -> Self {
                encoded as $ty * $exp[factor as usize] * $frac[exponent as usize]
            }

            #[inline]
            fn raw_bits(self) -> u64 {
                self.to_bits() as u64
            }

            #[inline]
            fn from_raw_bits(bits: u64) -> Self {
                <$ty>::from_bits(bits as _)
            }
        }
    };
}

impl_alp_float!(f64, EXP10_F64, FRAC10_F64, DoubleExceptionRecord);
impl_alp_float!(f32, EXP10_F32, FRAC10_F32, FloatExceptionRecord);

fn exception_size(physical: PhysicalType) -> usize {
    match physical {
        PhysicalType::Float => f32::EXCEPTION_SIZE,
        _ => f64::EXCEPTION_SIZE,
    }
}

pub fn exceptions_per_page(physical: PhysicalType) -> u64 {
    (PAGE_SIZE / exception_size(physical)) as u64
}

pub fn exception_pages_for(physical: PhysicalType, capacity: u64) -> u64 {
    capacity.div_ceil(exceptions_per_page(physical))
}

/// Reserved capacity for `count` exceptions: 1.5x growth, whole pages.
pub fn exception_capacity_for(physical: PhysicalType, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let grown = (count * ALP_EXCEPTION_GROWTH_NUMERATOR).div_ceil(ALP_EXCEPTION_GROWTH_DENOMINATOR);
    let per_page = exceptions_per_page(physical);
    grown.max(count).div_ceil(per_page) * per_page
}

fn sample_positions(num_values: u64) -> impl Iterator<Item = u64> {
    let step = (num_values / ALP_SAMPLE_SIZE as u64).max(1);
    (0..num_values).step_by(step as usize)
}

fn non_null_values<'a, T: AlpFloat>(
    bytes: &'a [u8],
    positions: impl Iterator<Item = u64> + 'a,
    nulls: Option<&'a [u64]>,
) -> impl Iterator<Item = T> + 'a {
    positions
        .filter(move |&idx| !nulls.is_some_and(|n| is_null_in(n, idx)))
        .map(move |idx| T::read_at(bytes, idx as usize))
}

/// Outcome of encoding a set of values with one `(exponent, factor)` pair.
#[derive(Debug, Clone, Copy)]
struct AlpFit {
    exponent: u8,
    factor: u8,
    exceptions: u64,
    encoded_min: i64,
    encoded_max: i64,
}

impl AlpFit {
    fn measure<T: AlpFloat>(values: impl Iterator<Item = T>, exponent: u8, factor: u8) -> Self {
        let mut fit = AlpFit {
            exponent,
            factor,
            exceptions: 0,
            encoded_min: i64::MAX,
            encoded_max: i64::MIN,
        };
        for v in values {
            match v.alp_encode(exponent, factor) {
                Some(encoded) => {
                    fit.encoded_min = fit.encoded_min.min(encoded);
                    fit.encoded_max = fit.encoded_max.max(encoded);
                }
                None => fit.exceptions += 1,
            }
        }
        fit
    }

    fn bit_width(&self) -> u64 {
        if self.encoded_min <= self.encoded_max {
            bit_width_of((self.encoded_max as i128 - self.encoded_min as i128) as u128) as u64
        } else {
            0
        }
    }

    /// Estimated bits for `num_values` slots plus the exception records.
    fn cost<T: AlpFloat>(&self, num_values: u64) -> u64 {
        num_values * self.bit_width() + self.exceptions * (T::EXCEPTION_SIZE * 8) as u64
    }

    /// Pairs with equal `exponent - factor` scale values by the same power of ten.
    fn scale(&self) -> u8 {
        self.exponent - self.factor
    }
}

/// Picks `(exponent, factor)` in two passes: every pair is ranked on a
/// strided sample, then the cheapest pairs of distinct scale are measured
/// over the whole chunk. The stride can line up with a period in the data,
/// so the sample's favourite may miss values the sample skipped.
fn choose_fit<T: AlpFloat>(bytes: &[u8], num_values: u64, nulls: Option<&[u64]>) -> Option<AlpFit> {
    let sample: Vec<T> = non_null_values(bytes, sample_positions(num_values), nulls).collect();
    let sample_len = sample.len() as u64;

    let mut ranked: Vec<(u64, AlpFit)> = Vec::new();
    for exponent in 0..=T::MAX_EXPONENT {
        for factor in 0..=exponent {
            let fit = AlpFit::measure(sample.iter().copied(), exponent, factor);
            ranked.push((fit.cost::<T>(sample_len), fit));
        }
    }
    ranked.sort_by_key(|(cost, _)| *cost);

    let mut candidates: SmallVec<[AlpFit; ALP_MAX_CANDIDATES]> = SmallVec::new();
    for (_, fit) in &ranked {
        if candidates.len() == ALP_MAX_CANDIDATES {
            break;
        }
        if candidates.iter().all(|c| c.scale() != fit.scale()) {
            candidates.push(*fit);
        }
    }

    candidates
        .into_iter()
        .map(|fit| AlpFit::measure(non_null_values::<T>(bytes, 0..num_values, nulls), fit.exponent, fit.factor))
        .min_by_key(|fit| fit.cost::<T>(num_values))
}

fn analyze_typed<T: AlpFloat>(
    bytes: &[u8],
    num_values: u64,
    nulls: Option<&[u64]>,
    max_exception_ratio: f64,
    min: StorageValue,
    max: StorageValue,
) -> Option<CompressionMetadata> {
    let AlpFit {
        exponent,
        factor,
        exceptions,
        encoded_min,
        encoded_max,
    } = choose_fit::<T>(bytes, num_values, nulls)?;

    if exceptions as f64 > max_exception_ratio * num_values as f64 || encoded_min > encoded_max {
        debug!(
            exceptions,
            num_values, exponent, factor, "ALP abandoned: too many exceptions"
        );
        return None;
    }

    let encoded = if encoded_min == encoded_max {
        CompressionMetadata::constant(StorageValue::Signed(encoded_min))
    } else {
        let child = CompressionMetadata::new(
            StorageValue::Signed(encoded_min),
            StorageValue::Signed(encoded_max),
            CompressionType::IntegerBitpacking,
        );
        if child.bit_width() >= (T::SIZE * 8) as u32 {
            debug!(bit_width = child.bit_width(), "ALP abandoned: encoded range too wide");
            return None;
        }
        child
    };

    let capacity = exception_capacity_for(T::PHYSICAL, exceptions);
    let mut metadata = CompressionMetadata::new(min, max, CompressionType::Alp);
    metadata.alp = Some(AlpState {
        exponent,
        factor,
        exception_count: exceptions as u32,
        exception_capacity: capacity as u32,
    });
    metadata.encoded = Some(Box::new(encoded));
    Some(metadata)
}

/// Fits ALP to a whole chunk. Returns `None` when the chunk should be stored
/// uncompressed instead.
pub fn analyze(
    physical: PhysicalType,
    bytes: &[u8],
    num_values: u64,
    nulls: Option<&[u64]>,
    max_exception_ratio: f64,
    min: StorageValue,
    max: StorageValue,
) -> Option<CompressionMetadata> {
    match physical {
        PhysicalType::Double => {
            analyze_typed::<f64>(bytes, num_values, nulls, max_exception_ratio, min, max)
        }
        PhysicalType::Float => {
            analyze_typed::<f32>(bytes, num_values, nulls, max_exception_ratio, min, max)
        }
        _ => None,
    }
}

fn state_of(meta: &CompressionMetadata) -> Result<(AlpState, &CompressionMetadata)> {
    let state = meta.alp.ok_or_else(|| eyre!("ALP metadata without ALP state"))?;
    let encoded = meta
        .encoded
        .as_deref()
        .ok_or_else(|| eyre!("ALP metadata without encoded child"))?;
    Ok((state, encoded))
}

fn collect_typed<T: AlpFloat>(
    bytes: &[u8],
    offset: u64,
    num_values: u64,
    nulls: Option<&[u64]>,
    state: AlpState,
    pos_base: u64,
) -> Vec<AlpException> {
    (0..num_values)
        .filter_map(|i| {
            let idx = offset + i;
            if nulls.is_some_and(|n| is_null_in(n, idx)) {
                return None;
            }
            let v = T::read_at(bytes, idx as usize);
            match v.alp_encode(state.exponent, state.factor) {
                Some(_) => None,
                None => Some(AlpException {
                    bits: v.raw_bits(),
                    pos: (pos_base + i) as u32,
                }),
            }
        })
        .collect()
}

/// Exceptions among `num_values` values starting at `offset`, with positions
/// rebased so that `offset` maps to `pos_base`.
pub fn collect_exceptions(
    physical: PhysicalType,
    bytes: &[u8],
    offset: u64,
    num_values: u64,
    nulls: Option<&[u64]>,
    meta: &CompressionMetadata,
    pos_base: u64,
) -> Result<Vec<AlpException>> {
    let (state, _) = state_of(meta)?;
    Ok(match physical {
        PhysicalType::Float => collect_typed::<f32>(bytes, offset, num_values, nulls, state, pos_base),
        _ => collect_typed::<f64>(bytes, offset, num_values, nulls, state, pos_base),
    })
}

/// Overwrites decoded values with the exceptions whose position lies in
/// `[chunk_offset, chunk_offset + num_values)`. `exceptions` must be sorted.
pub fn patch_exceptions(
    physical: PhysicalType,
    exceptions: &[AlpException],
    chunk_offset: u64,
    num_values: u64,
    dst: &mut [u8],
    dst_offset: u64,
) {
    let start = exceptions.partition_point(|e| (e.pos as u64) < chunk_offset);
    for exception in &exceptions[start..] {
        let pos = exception.pos as u64;
        if pos >= chunk_offset + num_values {
            break;
        }
        let idx = (dst_offset + pos - chunk_offset) as usize;
        match physical {
            PhysicalType::Float => f32::from_raw_bits(exception.bits).write_at(dst, idx),
            _ => f64::from_raw_bits(exception.bits).write_at(dst, idx),
        }
    }
}

/// Serializes sorted exceptions into `num_pages` zero-padded pages.
pub fn exceptions_to_pages(
    physical: PhysicalType,
    exceptions: &[AlpException],
    num_pages: u64,
) -> Vec<Vec<u8>> {
    let per_page = exceptions_per_page(physical) as usize;
    let size = exception_size(physical);
    let mut pages = vec![vec![0u8; PAGE_SIZE]; num_pages as usize];
    for (i, exception) in exceptions.iter().enumerate() {
        let page = &mut pages[i / per_page];
        let at = (i % per_page) * size;
        match physical {
            PhysicalType::Float => {
                let mut record = FloatExceptionRecord::new_zeroed();
                record.set_value(exception.bits as u32);
                record.set_pos_in_chunk(exception.pos);
                page[at..at + size].copy_from_slice(record.as_bytes());
            }
            _ => {
                let mut record = DoubleExceptionRecord::new_zeroed();
                record.set_value(exception.bits);
                record.set_pos_in_chunk(exception.pos);
                page[at..at + size].copy_from_slice(record.as_bytes());
            }
        }
    }
    pages
}

/// Reads the first `count` exception records of a page.
pub fn exceptions_from_page(physical: PhysicalType, page: &[u8], count: usize) -> Result<Vec<AlpException>> {
    let size = exception_size(physical);
    (0..count)
        .map(|i| {
            let bytes = &page[i * size..(i + 1) * size];
            Ok(match physical {
                PhysicalType::Float => {
                    let record = FloatExceptionRecord::read_from_bytes(bytes)
                        .map_err(|_| eyre!("malformed FLOAT exception record {}", i))?;
                    AlpException {
                        bits: record.value() as u64,
                        pos: record.pos_in_chunk(),
                    }
                }
                _ => {
                    let record = DoubleExceptionRecord::read_from_bytes(bytes)
                        .map_err(|_| eyre!("malformed DOUBLE exception record {}", i))?;
                    AlpException {
                        bits: record.value(),
                        pos: record.pos_in_chunk(),
                    }
                }
            })
        })
        .collect()
}

/// Replaces exceptions in `[start, start + len)` with `replacements` and
/// keeps the list sorted by position.
pub fn merge_exceptions(
    existing: &mut Vec<AlpException>,
    start: u64,
    len: u64,
    replacements: Vec<AlpException>,
) {
    existing.retain(|e| (e.pos as u64) < start || (e.pos as u64) >= start + len);
    existing.extend(replacements);
    existing.sort_unstable_by_key(|e| e.pos);
}

#[derive(Debug, Clone, Copy)]
pub struct AlpCodec {
    physical: PhysicalType,
}

impl AlpCodec {
    pub fn new(physical: PhysicalType) -> Self {
        Self { physical }
    }

    /// Encoded integers for `num_values` floats, with nulls and exceptions
    /// replaced by the child frame minimum.
    fn encode_range(
        &self,
        bytes: &[u8],
        offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        state: AlpState,
        encoded: &CompressionMetadata,
    ) -> Vec<u8> {
        let placeholder = encoded.min.as_i128() as i64;
        let mut out = vec![0u8; num_values as usize * 8];
        for i in 0..num_values {
            let idx = offset + i;
            let value = if nulls.is_some_and(|n| is_null_in(n, idx)) {
                placeholder
            } else {
                let encoded = match self.physical {
                    PhysicalType::Float => f32::read_at(bytes, idx as usize).alp_encode(state.exponent, state.factor),
                    _ => f64::read_at(bytes, idx as usize).alp_encode(state.exponent, state.factor),
                };
                encoded.unwrap_or(placeholder)
            };
            value.write_at(&mut out, i as usize);
        }
        out
    }
}

impl CompressionAlg for AlpCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Alp
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
        let (state, encoded) = state_of(meta)?;
        let count = num_values.min(encoded.num_values_per_page(ALP_ENCODED_TYPE));
        let ints = self.encode_range(bytes, src_offset, count, nulls, state, encoded);
        Codec::for_metadata(ALP_ENCODED_TYPE, encoded).compress_next_page(
            ValuesRef::Bytes(&ints),
            0,
            count,
            None,
            encoded,
            page,
        )
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
        let (state, encoded) = state_of(meta)?;
        let mut ints = vec![0u8; num_values as usize * 8];
        Codec::for_metadata(ALP_ENCODED_TYPE, encoded).decompress_from_page(
            page,
            pos_in_page,
            ValuesMut::Bytes(&mut ints),
            0,
            num_values,
            encoded,
        )?;
        for i in 0..num_values as usize {
            let n = i64::read_at(&ints, i);
            let idx = dst_offset as usize + i;
            match self.physical {
                PhysicalType::Float => f32::alp_decode(n, state.exponent, state.factor).write_at(bytes, idx),
                _ => f64::alp_decode(n, state.exponent, state.factor).write_at(bytes, idx),
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
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> Result<()> {
        let bytes = src.bytes()?;
        let (state, encoded) = state_of(meta)?;
        let ints = self.encode_range(bytes, src_offset, num_values, nulls, state, encoded);
        Codec::for_metadata(ALP_ENCODED_TYPE, encoded).set_values_in_page(
            page,
            pos_in_page,
            ValuesRef::Bytes(&ints),
            0,
            num_values,
            None,
            encoded,
        )
    }

    fn can_update_in_place(
        &self,
        src: ValuesRef<'_>,
        src_offset: u64,
        num_values: u64,
        nulls: Option<&[u64]>,
        meta: &CompressionMetadata,
    ) -> bool {
        let (Ok(bytes), Ok((state, encoded))) = (src.bytes(), state_of(meta)) else {
            return false;
        };
        let mut new_exceptions = 0u64;
        for idx in src_offset..src_offset + num_values {
            if nulls.is_some_and(|n| is_null_in(n, idx)) {
                continue;
            }
            let encoded_value = match self.physical {
                PhysicalType::Float => f32::read_at(bytes, idx as usize).alp_encode(state.exponent, state.factor),
                _ => f64::read_at(bytes, idx as usize).alp_encode(state.exponent, state.factor),
            };
            match encoded_value {
                Some(v) if encoded.value_fits(StorageValue::Signed(v)) => {}
                Some(_) => return false,
                None => new_exceptions += 1,
            }
        }
        state.exception_count as u64 + new_exceptions <= state.exception_capacity as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubles(values: &[f64]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * 8];
        for (i, v) in values.iter().enumerate() {
            v.write_at(&mut bytes, i);
        }
        bytes
    }

    fn min_max(values: &[f64]) -> (StorageValue, StorageValue) {
        values.iter().fold(
            (StorageValue::Float(values[0]), StorageValue::Float(values[0])),
            |(lo, hi), v| (lo.min(StorageValue::Float(*v)), hi.max(StorageValue::Float(*v))),
        )
    }

    #[test]
    fn decimals_encode_without_exceptions() {
        let values: Vec<f64> = (0..512).map(|i| i as f64 * 0.25 + 1.5).collect();
        let bytes = doubles(&values);
        let (min, max) = min_max(&values);
        let meta = analyze(PhysicalType::Double, &bytes, 512, None, 0.05, min, max).unwrap();
        let state = meta.alp.unwrap();
        assert_eq!(state.exception_count, 0);
        assert_eq!(state.exception_capacity, 0);
        assert_eq!(meta.num_exception_pages(PhysicalType::Double), 0);
    }

    #[test]
    fn strided_sample_does_not_hide_finer_decimals() {
        // Every sampled position holds a whole number; the rest need three decimals.
        let values: Vec<f64> = (0..2048).map(|i| i as f64 * 0.125).collect();
        let bytes = doubles(&values);
        let mut nulls = vec![0u64; crate::vector::null_mask::num_words_for(2048)];
        for pos in (3..2048).step_by(5) {
            crate::vector::null_mask::set_null_in(&mut nulls, pos, true);
        }
        let (min, max) = min_max(&values);
        let meta = analyze(PhysicalType::Double, &bytes, 2048, Some(&nulls), 0.05, min, max).unwrap();
        let state = meta.alp.unwrap();
        assert_eq!((state.exponent, state.factor), (3, 0));
        assert_eq!(state.exception_count, 0);
        assert_eq!(
            meta.encoded.as_deref().map(|e| e.max),
            Some(StorageValue::Signed(2047 * 125))
        );
    }

    #[test]
    fn special_values_are_exceptions() {
        assert!((-0.0f64).alp_encode(2, 0).is_none());
        assert!(f64::NAN.alp_encode(0, 0).is_none());
        assert!(f64::INFINITY.alp_encode(0, 0).is_none());
        assert_eq!(1.5f64.alp_encode(1, 0), Some(15));
    }

    #[test]
    fn huge_magnitudes_abandon_alp() {
        let values: Vec<f64> = (1..300).map(|i| (i as f64 + 0.5) * 1e300).collect();
        let bytes = doubles(&values);
        let (min, max) = min_max(&values);
        assert!(analyze(PhysicalType::Double, &bytes, values.len() as u64, None, 0.05, min, max).is_none());
    }

    #[test]
    fn exception_capacity_grows_by_half_and_fills_pages() {
        let per_page = exceptions_per_page(PhysicalType::Double);
        assert_eq!(per_page, 341);
        assert_eq!(exception_capacity_for(PhysicalType::Double, 1), per_page);
        assert_eq!(exception_capacity_for(PhysicalType::Double, 300), per_page * 2);
        assert_eq!(exception_capacity_for(PhysicalType::Float, 0), 0);
    }

    #[test]
    fn exception_pages_round_trip_and_patch() {
        let exceptions = vec![
            AlpException { bits: 1.25f64.to_bits(), pos: 3 },
            AlpException { bits: f64::NAN.to_bits(), pos: 9 },
        ];
        let pages = exceptions_to_pages(PhysicalType::Double, &exceptions, 1);
        let restored = exceptions_from_page(PhysicalType::Double, &pages[0], 2).unwrap();
        assert_eq!(restored, exceptions);

        let mut out = doubles(&[0.0; 6]);
        patch_exceptions(PhysicalType::Double, &restored, 4, 6, &mut out, 0);
        assert!(f64::read_at(&out, 5).is_nan());
        assert_eq!(f64::read_at(&out, 0), 0.0);
    }

    #[test]
    fn merge_replaces_range() {
        let mut existing = vec![
            AlpException { bits: 1, pos: 2 },
            AlpException { bits: 2, pos: 5 },
            AlpException { bits: 3, pos: 9 },
        ];
        merge_exceptions(&mut existing, 4, 3, vec![AlpException { bits: 7, pos: 4 }]);
        let positions: Vec<u32> = existing.iter().map(|e| e.pos).collect();
        assert_eq!(positions, vec![2, 4, 9]);
    }
}
