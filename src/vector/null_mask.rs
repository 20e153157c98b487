//! # Null Bitmaps
//!
//! A `NullMask` is a packed bitmap over 64-bit words: bit `i` set means row
//! `i` is NULL. The same word layout backs value vectors, null chunks and
//! boolean chunks, so the free functions here operate on plain `&[u64]`
//! slices and `NullMask` is a thin owner around them.
//!
//! ## Bit Addressing
//!
//! ```text
//!   row:     0 1 2 ... 63 | 64 65 ... 127 | ...
//!   word:    words[0]     | words[1]      | ...
//!   bit:     LSB ... MSB  | LSB ... MSB   |
//! ```
//!
//! ## Unaligned Copies
//!
//! `copy_null_bits` moves `n` bits from an arbitrary source bit offset to an
//! arbitrary destination bit offset. It works one destination word at a
//! time: gather up to 64 source bits (possibly straddling two source words),
//! optionally invert them, then splice them into the destination word under
//! a mask so neighbouring bits are untouched.
//!
//! The `may_contain_nulls` flag is a conservative hint. It is set whenever a
//! null is written and cleared only by `set_all_non_null`; a `false` value
//! guarantees the mask is all zeros.

pub const NULL_BITS_PER_WORD: u64 = 64;

#[inline]
pub fn num_words_for(num_bits: u64) -> usize {
    num_bits.div_ceil(NULL_BITS_PER_WORD) as usize
}

#[inline]
pub fn is_null_in(words: &[u64], pos: u64) -> bool {
    let word = (pos / NULL_BITS_PER_WORD) as usize;
    (words[word] >> (pos % NULL_BITS_PER_WORD)) & 1 == 1
}

#[inline]
pub fn set_null_in(words: &mut [u64], pos: u64, is_null: bool) {
    let word = (pos / NULL_BITS_PER_WORD) as usize;
    let bit = 1u64 << (pos % NULL_BITS_PER_WORD);
    if is_null {
        words[word] |= bit;
    } else {
        words[word] &= !bit;
    }
}

#[inline]
fn low_mask(len: u32) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// Reads `len <= 64` bits starting at `pos`, returned LSB-aligned.
#[inline]
pub fn read_bits(words: &[u64], pos: u64, len: u32) -> u64 {
    debug_assert!(len <= 64);
    if len == 0 {
        return 0;
    }
    let word = (pos / NULL_BITS_PER_WORD) as usize;
    let shift = (pos % NULL_BITS_PER_WORD) as u32;
    let mut bits = words[word] >> shift;
    if shift != 0 && shift + len > 64 {
        bits |= words[word + 1] << (64 - shift);
    }
    bits & low_mask(len)
}

/// Writes `len` bits into a single word starting at `pos`. The range must not
/// cross a word boundary.
#[inline]
fn write_bits_in_word(words: &mut [u64], pos: u64, len: u32, bits: u64) {
    let word = (pos / NULL_BITS_PER_WORD) as usize;
    let shift = (pos % NULL_BITS_PER_WORD) as u32;
    debug_assert!(shift + len <= 64);
    let mask = low_mask(len) << shift;
    words[word] = (words[word] & !mask) | ((bits << shift) & mask);
}

pub fn set_null_range_in(words: &mut [u64], offset: u64, num_bits: u64, is_null: bool) {
    let fill = if is_null { u64::MAX } else { 0 };
    let mut pos = offset;
    let end = offset + num_bits;
    while pos < end {
        let in_word = (pos % NULL_BITS_PER_WORD) as u32;
        let len = ((64 - in_word) as u64).min(end - pos) as u32;
        if len == 64 {
            words[(pos / NULL_BITS_PER_WORD) as usize] = fill;
        } else {
            write_bits_in_word(words, pos, len, fill);
        }
        pos += len as u64;
    }
}

/// Copies `num_bits` bits from `src` at `src_offset` into `dst` at
/// `dst_offset`, inverting them if requested. Returns whether any copied bit
/// (after inversion) is set.
pub fn copy_null_bits(
    src: &[u64],
    src_offset: u64,
    dst: &mut [u64],
    dst_offset: u64,
    num_bits: u64,
    invert: bool,
) -> bool {
    let mut has_null = false;
    let mut copied = 0u64;
    while copied < num_bits {
        let dst_pos = dst_offset + copied;
        let in_word = (dst_pos % NULL_BITS_PER_WORD) as u32;
        let len = ((64 - in_word) as u64).min(num_bits - copied) as u32;
        let mut bits = read_bits(src, src_offset + copied, len);
        if invert {
            bits = !bits & low_mask(len);
        }
        has_null |= bits != 0;
        write_bits_in_word(dst, dst_pos, len, bits);
        copied += len as u64;
    }
    has_null
}

pub fn count_nulls_in(words: &[u64], offset: u64, num_bits: u64) -> u64 {
    let mut count = 0u64;
    let mut pos = offset;
    let end = offset + num_bits;
    while pos < end {
        let len = (end - pos).min(64) as u32;
        count += read_bits(words, pos, len).count_ones() as u64;
        pos += len as u64;
    }
    count
}

#[derive(Debug, Clone, Default)]
pub struct NullMask {
    words: Vec<u64>,
    may_contain_nulls: bool,
}

impl NullMask {
    pub fn new(capacity: u64) -> Self {
        Self {
            words: vec![0; num_words_for(capacity)],
            may_contain_nulls: false,
        }
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        let may_contain_nulls = words.iter().any(|w| *w != 0);
        Self {
            words,
            may_contain_nulls,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.words.len() as u64 * NULL_BITS_PER_WORD
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u64] {
        self.may_contain_nulls = true;
        &mut self.words
    }

    /// Grows the mask to hold at least `capacity` bits; new bits are non-null.
    pub fn resize(&mut self, capacity: u64) {
        let words = num_words_for(capacity);
        if words > self.words.len() {
            self.words.resize(words, 0);
        }
    }

    #[inline]
    pub fn is_null(&self, pos: u64) -> bool {
        self.may_contain_nulls && is_null_in(&self.words, pos)
    }

    #[inline]
    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        set_null_in(&mut self.words, pos, is_null);
        if is_null {
            self.may_contain_nulls = true;
        }
    }

    pub fn set_null_range(&mut self, offset: u64, num_bits: u64, is_null: bool) {
        set_null_range_in(&mut self.words, offset, num_bits, is_null);
        if is_null && num_bits > 0 {
            self.may_contain_nulls = true;
        }
    }

    pub fn set_all_null(&mut self) {
        self.words.fill(u64::MAX);
        self.may_contain_nulls = true;
    }

    pub fn set_all_non_null(&mut self) {
        if self.may_contain_nulls {
            self.words.fill(0);
            self.may_contain_nulls = false;
        }
    }

    /// True only when the mask is known to be all zeros.
    pub fn has_no_nulls_guarantee(&self) -> bool {
        !self.may_contain_nulls
    }

    pub fn copy_from(
        &mut self,
        src: &[u64],
        src_offset: u64,
        dst_offset: u64,
        num_bits: u64,
        invert: bool,
    ) -> bool {
        let copied_null = copy_null_bits(
            src,
            src_offset,
            &mut self.words,
            dst_offset,
            num_bits,
            invert,
        );
        if copied_null {
            self.may_contain_nulls = true;
        }
        copied_null
    }

    pub fn count_nulls(&self, offset: u64, num_bits: u64) -> u64 {
        if !self.may_contain_nulls {
            return 0;
        }
        count_nulls_in(&self.words, offset, num_bits)
    }
}
