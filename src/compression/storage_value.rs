//! Statistics holder used for chunk min/max and codec parameters.
//!
//! Integers keep their signedness so that frame-of-reference arithmetic can
//! widen to `i128` without loss. Floats compare with `total_cmp`, which makes
//! `min == max` mean "identical bit patterns" and keeps CONSTANT compression
//! bit-exact for `-0.0` and NaN payloads.

use std::cmp::Ordering;

use eyre::{bail, Result};

use crate::dispatch_fixed;
use crate::encoding::{Deserializer, Serializer};
use crate::types::{FixedValue, PhysicalType};

#[derive(Debug, Clone, Copy)]
pub enum StorageValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Default for StorageValue {
    fn default() -> Self {
        StorageValue::Unsigned(0)
    }
}

impl PartialEq for StorageValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_total(other) == Ordering::Equal
    }
}

impl StorageValue {
    pub fn from_bool(v: bool) -> Self {
        StorageValue::Unsigned(v as u64)
    }

    /// Zero of the given physical type's statistics domain.
    pub fn zero(physical: PhysicalType) -> Self {
        let physical = physical.codec_type();
        if physical.is_signed_integer() {
            StorageValue::Signed(0)
        } else if physical.is_floating_point() {
            StorageValue::Float(0.0)
        } else {
            StorageValue::Unsigned(0)
        }
    }

    pub fn cmp_total(&self, other: &Self) -> Ordering {
        match (self, other) {
            (StorageValue::Signed(a), StorageValue::Signed(b)) => a.cmp(b),
            (StorageValue::Unsigned(a), StorageValue::Unsigned(b)) => a.cmp(b),
            (StorageValue::Float(a), StorageValue::Float(b)) => a.total_cmp(b),
            (a, b) => a.as_i128().cmp(&b.as_i128()),
        }
    }

    /// Integer view for frame-of-reference arithmetic. Floats truncate.
    pub fn as_i128(&self) -> i128 {
        match *self {
            StorageValue::Signed(v) => v as i128,
            StorageValue::Unsigned(v) => v as i128,
            StorageValue::Float(v) => v as i128,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            StorageValue::Signed(v) => v as f64,
            StorageValue::Unsigned(v) => v as f64,
            StorageValue::Float(v) => v,
        }
    }

    pub fn min(self, other: Self) -> Self {
        if other.cmp_total(&self) == Ordering::Less {
            other
        } else {
            self
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.cmp_total(&self) == Ordering::Greater {
            other
        } else {
            self
        }
    }

    /// Reads element `idx` of a little-endian buffer of `physical` values.
    pub fn read(physical: PhysicalType, bytes: &[u8], idx: usize) -> Self {
        dispatch_fixed!(physical, T => T::read_at(bytes, idx).to_storage_value(), _ => StorageValue::default())
    }

    /// Writes this value into element `idx` using `physical`'s width.
    pub fn write(&self, physical: PhysicalType, bytes: &mut [u8], idx: usize) {
        match *self {
            StorageValue::Float(v) => {
                dispatch_fixed!(physical, T => (v as T).write_at(bytes, idx), _ => ())
            }
            StorageValue::Signed(v) => {
                dispatch_fixed!(physical, T => (v as T).write_at(bytes, idx), _ => ())
            }
            StorageValue::Unsigned(v) => {
                dispatch_fixed!(physical, T => (v as T).write_at(bytes, idx), _ => ())
            }
        }
    }

    pub fn serialize(&self, ser: &mut Serializer) {
        match *self {
            StorageValue::Signed(v) => {
                ser.write_u8(0);
                ser.write_i64(v);
            }
            StorageValue::Unsigned(v) => {
                ser.write_u8(1);
                ser.write_u64(v);
            }
            StorageValue::Float(v) => {
                ser.write_u8(2);
                ser.write_f64(v);
            }
        }
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        Ok(match de.read_u8()? {
            0 => StorageValue::Signed(de.read_i64()?),
            1 => StorageValue::Unsigned(de.read_u64()?),
            2 => StorageValue::Float(de.read_f64()?),
            tag => bail!("invalid StorageValue tag: {}", tag),
        })
    }
}

/// Writes an `i128` frame-of-reference result back as `physical`.
pub(crate) fn write_int(physical: PhysicalType, bytes: &mut [u8], idx: usize, v: i128) {
    dispatch_fixed!(physical, T => (v as T).write_at(bytes, idx), _ => ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_ne!(StorageValue::Float(0.0), StorageValue::Float(-0.0));
        assert_eq!(StorageValue::Float(f64::NAN), StorageValue::Float(f64::NAN));
        assert_eq!(
            StorageValue::Float(-0.0).min(StorageValue::Float(0.0)).as_f64().to_bits(),
            (-0.0f64).to_bits()
        );
    }

    #[test]
    fn buffer_access_respects_width() {
        let mut bytes = vec![0u8; 8];
        StorageValue::Signed(-3).write(PhysicalType::Int16, &mut bytes, 2);
        assert_eq!(StorageValue::read(PhysicalType::Int16, &bytes, 2), StorageValue::Signed(-3));
        assert_eq!(StorageValue::read(PhysicalType::Int16, &bytes, 0), StorageValue::Signed(0));
    }
}
