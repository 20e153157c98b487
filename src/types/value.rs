//! # Owned Values and Fixed-Width Element Access
//!
//! `Value` is the row-at-a-time representation used at the edges of the
//! storage layer: tests, lookups, and default-value population. Bulk paths
//! never materialize `Value`s; they move bytes between vectors and chunks.
//!
//! `FixedValue` is the bridge between typed Rust numbers and the little
//! endian byte buffers that chunks, vectors and pages hold. Every read and
//! write of a fixed-width element goes through `read_le`/`write_le`, so the
//! byte layout is identical in memory and on disk regardless of host order.

use crate::compression::StorageValue;

use super::PhysicalType;

/// Globally unique node identifier: row offset within a table plus the
/// owning table's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InternalId {
    pub offset: u64,
    pub table_id: u64,
}

impl InternalId {
    pub const INVALID_TABLE_ID: u64 = u64::MAX;

    pub fn new(offset: u64, table_id: u64) -> Self {
        Self { offset, table_id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    InternalId(InternalId),
    String(String),
    List(Vec<Value>),
    Struct(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt8(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A fixed-width element stored little-endian in byte buffers.
pub trait FixedValue: Copy + PartialOrd + Default + Send + Sync + 'static {
    const SIZE: usize;
    const PHYSICAL: PhysicalType;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
    fn to_storage_value(self) -> StorageValue;

    #[inline]
    fn read_at(buf: &[u8], idx: usize) -> Self {
        Self::read_le(&buf[idx * Self::SIZE..(idx + 1) * Self::SIZE])
    }

    #[inline]
    fn write_at(self, buf: &mut [u8], idx: usize) {
        self.write_le(&mut buf[idx * Self::SIZE..(idx + 1) * Self::SIZE])
    }
}

macro_rules! impl_fixed_value {
    ($ty:ty, $physical:ident, $storage:ident) => {
        impl FixedValue for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            const PHYSICAL: PhysicalType = PhysicalType::$physical;

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn write_le(self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn to_storage_value(self) -> StorageValue {
                StorageValue::$storage(self.into())
            }
        }
    };
}

impl_fixed_value!(i8, Int8, Signed);
impl_fixed_value!(i16, Int16, Signed);
impl_fixed_value!(i32, Int32, Signed);
impl_fixed_value!(i64, Int64, Signed);
impl_fixed_value!(u8, UInt8, Unsigned);
impl_fixed_value!(u16, UInt16, Unsigned);
impl_fixed_value!(u32, UInt32, Unsigned);
impl_fixed_value!(u64, UInt64, Unsigned);
impl_fixed_value!(f32, Float, Float);
impl_fixed_value!(f64, Double, Float);

/// Expands `$body` once with `$T` bound to the Rust type behind a fixed
/// numeric physical type. Non-numeric types hit the `$other` arm.
#[macro_export]
macro_rules! dispatch_fixed {
    ($physical:expr, $T:ident => $body:expr, _ => $other:expr) => {
        match $physical {
            $crate::types::PhysicalType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::types::PhysicalType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::types::PhysicalType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::types::PhysicalType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::types::PhysicalType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::types::PhysicalType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::types::PhysicalType::UInt32 | $crate::types::PhysicalType::String => {
                type $T = u32;
                $body
            }
            $crate::types::PhysicalType::UInt64 | $crate::types::PhysicalType::InternalId => {
                type $T = u64;
                $body
            }
            $crate::types::PhysicalType::Float => {
                type $T = f32;
                $body
            }
            $crate::types::PhysicalType::Double => {
                type $T = f64;
                $body
            }
            _ => $other,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_values_are_little_endian() {
        let mut buf = [0u8; 8];
        0x0102_0304u32.write_at(&mut buf, 1);
        assert_eq!(buf[4..8], [4, 3, 2, 1]);
        assert_eq!(u32::read_at(&buf, 1), 0x0102_0304);
    }

    #[test]
    fn dispatch_fixed_selects_width() {
        let width = dispatch_fixed!(PhysicalType::Int16, T => T::SIZE, _ => 0);
        assert_eq!(width, 2);
        let none = dispatch_fixed!(PhysicalType::Struct, T => T::SIZE, _ => 0);
        assert_eq!(none, 0);
    }

    #[test]
    fn option_converts_to_null() {
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some(3i64)), Value::Int64(3));
    }
}
