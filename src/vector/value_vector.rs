//! # Value Vectors
//!
//! A `ValueVector` is the in-flight columnar batch that chunks append from
//! and scan into. It owns a null mask plus a type-shaped payload:
//!
//! ```text
//! Fixed    : [ v0 | v1 | ... ]   little-endian, `value_width()` bytes each
//!            (BOOL uses one byte, INTERNAL_ID 16 bytes: offset, table id)
//! String   : [ String; capacity ]
//! List     : [ (offset, size); capacity ] + child vector with `child_len`
//!            elements in use
//! Struct   : one child vector per field, same capacity as the parent
//! ```
//!
//! Positions are absolute; which positions participate in an operation is
//! decided by a `SelectionVector` passed alongside. Vectors grow with
//! `resize`, and list children grow automatically as lists are reserved.

use eyre::{bail, ensure, Result};

use crate::types::{FixedValue, InternalId, LogicalType, PhysicalType, Value};

use super::NullMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEntry {
    pub offset: u64,
    pub size: u32,
}

impl ListEntry {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }
}

#[derive(Debug, Clone)]
enum VectorData {
    Fixed(Vec<u8>),
    String(Vec<String>),
    List {
        entries: Vec<ListEntry>,
        child: Box<ValueVector>,
        child_len: u64,
    },
    Struct(Vec<ValueVector>),
}

#[derive(Debug, Clone)]
pub struct ValueVector {
    data_type: LogicalType,
    capacity: u64,
    nulls: NullMask,
    data: VectorData,
}

fn vector_value_width(physical: PhysicalType) -> usize {
    match physical {
        PhysicalType::Bool => 1,
        PhysicalType::InternalId => 16,
        other => other.size_in_chunk(),
    }
}

impl ValueVector {
    pub fn new(data_type: LogicalType, capacity: u64) -> Self {
        let physical = data_type.physical_type();
        let data = match physical {
            PhysicalType::String => VectorData::String(vec![String::new(); capacity as usize]),
            PhysicalType::List | PhysicalType::Array => {
                let child_type = data_type
                    .child_type()
                    .cloned()
                    .unwrap_or(LogicalType::Int64);
                VectorData::List {
                    entries: vec![ListEntry::default(); capacity as usize],
                    child: Box::new(ValueVector::new(child_type, capacity)),
                    child_len: 0,
                }
            }
            PhysicalType::Struct => VectorData::Struct(
                data_type
                    .fields()
                    .iter()
                    .map(|f| ValueVector::new(f.data_type.clone(), capacity))
                    .collect(),
            ),
            _ => VectorData::Fixed(vec![0; vector_value_width(physical) * capacity as usize]),
        };
        Self {
            data_type,
            capacity,
            nulls: NullMask::new(capacity),
            data,
        }
    }

    /// Builds a vector holding `values` at positions `0..values.len()`.
    pub fn from_values(data_type: LogicalType, values: &[Value]) -> Result<Self> {
        let mut vector = Self::new(data_type, values.len().max(1) as u64);
        for (pos, value) in values.iter().enumerate() {
            vector.set_value(pos as u64, value)?;
        }
        Ok(vector)
    }

    pub fn data_type(&self) -> &LogicalType {
        &self.data_type
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.data_type.physical_type()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn value_width(&self) -> usize {
        vector_value_width(self.physical_type())
    }

    /// Grows every buffer (children included) to hold `capacity` positions.
    pub fn resize(&mut self, capacity: u64) {
        if capacity <= self.capacity {
            return;
        }
        let width = self.value_width();
        self.nulls.resize(capacity);
        match &mut self.data {
            VectorData::Fixed(bytes) => bytes.resize(width * capacity as usize, 0),
            VectorData::String(strings) => strings.resize(capacity as usize, String::new()),
            VectorData::List { entries, .. } => {
                entries.resize(capacity as usize, ListEntry::default())
            }
            VectorData::Struct(children) => {
                for child in children {
                    child.resize(capacity);
                }
            }
        }
        self.capacity = capacity;
    }

    #[inline]
    pub fn is_null(&self, pos: u64) -> bool {
        self.nulls.is_null(pos)
    }

    #[inline]
    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        self.nulls.set_null(pos, is_null);
    }

    pub fn nulls(&self) -> &NullMask {
        &self.nulls
    }

    pub fn nulls_mut(&mut self) -> &mut NullMask {
        &mut self.nulls
    }

    pub fn has_no_nulls_guarantee(&self) -> bool {
        self.nulls.has_no_nulls_guarantee()
    }

    pub fn fixed_bytes(&self) -> &[u8] {
        match &self.data {
            VectorData::Fixed(bytes) => bytes,
            _ => &[],
        }
    }

    pub fn fixed_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            VectorData::Fixed(bytes) => bytes,
            _ => &mut [],
        }
    }

    #[inline]
    pub fn get<T: FixedValue>(&self, pos: u64) -> T {
        T::read_at(self.fixed_bytes(), pos as usize)
    }

    #[inline]
    pub fn set<T: FixedValue>(&mut self, pos: u64, value: T) {
        value.write_at(self.fixed_bytes_mut(), pos as usize);
    }

    pub fn get_bool(&self, pos: u64) -> bool {
        self.fixed_bytes()[pos as usize] != 0
    }

    pub fn set_bool(&mut self, pos: u64, value: bool) {
        self.fixed_bytes_mut()[pos as usize] = value as u8;
    }

    pub fn get_internal_id(&self, pos: u64) -> InternalId {
        let bytes = self.fixed_bytes();
        let base = pos as usize * 2;
        InternalId::new(u64::read_at(bytes, base), u64::read_at(bytes, base + 1))
    }

    pub fn set_internal_id(&mut self, pos: u64, id: InternalId) {
        let bytes = self.fixed_bytes_mut();
        let base = pos as usize * 2;
        id.offset.write_at(bytes, base);
        id.table_id.write_at(bytes, base + 1);
    }

    pub fn get_string(&self, pos: u64) -> &str {
        match &self.data {
            VectorData::String(strings) => &strings[pos as usize],
            _ => "",
        }
    }

    pub fn set_string(&mut self, pos: u64, value: &str) {
        if let VectorData::String(strings) = &mut self.data {
            let slot = &mut strings[pos as usize];
            slot.clear();
            slot.push_str(value);
        }
    }

    pub fn list_entry(&self, pos: u64) -> ListEntry {
        match &self.data {
            VectorData::List { entries, .. } => entries[pos as usize],
            _ => ListEntry::default(),
        }
    }

    pub fn set_list_entry(&mut self, pos: u64, entry: ListEntry) {
        if let VectorData::List { entries, .. } = &mut self.data {
            entries[pos as usize] = entry;
        }
    }

    /// Reserves `size` fresh child positions for the list at `pos` and
    /// returns the first of them.
    pub fn reserve_list(&mut self, pos: u64, size: u32) -> u64 {
        match &mut self.data {
            VectorData::List {
                entries,
                child,
                child_len,
            } => {
                let start = *child_len;
                let needed = start + size as u64;
                if needed > child.capacity() {
                    child.resize(needed.max(child.capacity() * 2));
                }
                *child_len = needed;
                entries[pos as usize] = ListEntry::new(start, size);
                start
            }
            _ => 0,
        }
    }

    pub fn list_child(&self) -> Option<&ValueVector> {
        match &self.data {
            VectorData::List { child, .. } => Some(child),
            _ => None,
        }
    }

    pub fn list_child_mut(&mut self) -> Option<&mut ValueVector> {
        match &mut self.data {
            VectorData::List { child, .. } => Some(child),
            _ => None,
        }
    }

    pub fn struct_children(&self) -> &[ValueVector] {
        match &self.data {
            VectorData::Struct(children) => children,
            _ => &[],
        }
    }

    pub fn struct_children_mut(&mut self) -> &mut [ValueVector] {
        match &mut self.data {
            VectorData::Struct(children) => children,
            _ => &mut [],
        }
    }

    /// Drops all list child elements and clears nulls, keeping capacity.
    pub fn reset(&mut self) {
        self.nulls.set_all_non_null();
        match &mut self.data {
            VectorData::List {
                child, child_len, ..
            } => {
                *child_len = 0;
                child.reset();
            }
            VectorData::Struct(children) => {
                for child in children {
                    child.reset();
                }
            }
            _ => {}
        }
    }

    pub fn get_value(&self, pos: u64) -> Value {
        if self.is_null(pos) {
            return Value::Null;
        }
        match &self.data_type {
            LogicalType::Bool => Value::Bool(self.get_bool(pos)),
            LogicalType::Int8 => Value::Int8(self.get(pos)),
            LogicalType::Int16 => Value::Int16(self.get(pos)),
            LogicalType::Int32 => Value::Int32(self.get(pos)),
            LogicalType::Int64 => Value::Int64(self.get(pos)),
            LogicalType::UInt8 => Value::UInt8(self.get(pos)),
            LogicalType::UInt16 => Value::UInt16(self.get(pos)),
            LogicalType::UInt32 => Value::UInt32(self.get(pos)),
            LogicalType::UInt64 => Value::UInt64(self.get(pos)),
            LogicalType::Float => Value::Float(self.get(pos)),
            LogicalType::Double => Value::Double(self.get(pos)),
            LogicalType::InternalId => Value::InternalId(self.get_internal_id(pos)),
            LogicalType::String => Value::String(self.get_string(pos).to_string()),
            LogicalType::List(_) | LogicalType::Array(_, _) => {
                let entry = self.list_entry(pos);
                match self.list_child() {
                    Some(child) => Value::List(
                        (entry.offset..entry.offset + entry.size as u64)
                            .map(|p| child.get_value(p))
                            .collect(),
                    ),
                    None => Value::List(Vec::new()),
                }
            }
            LogicalType::Struct(_) => Value::Struct(
                self.struct_children()
                    .iter()
                    .map(|child| child.get_value(pos))
                    .collect(),
            ),
        }
    }

    pub fn set_value(&mut self, pos: u64, value: &Value) -> Result<()> {
        ensure!(
            pos < self.capacity,
            "position {} out of vector capacity {}",
            pos,
            self.capacity
        );
        if value.is_null() {
            self.set_null(pos, true);
            return Ok(());
        }
        self.set_null(pos, false);
        let data_type = self.data_type.clone();
        match (&data_type, value) {
            (LogicalType::Bool, Value::Bool(v)) => self.set_bool(pos, *v),
            (LogicalType::Int8, Value::Int8(v)) => self.set(pos, *v),
            (LogicalType::Int16, Value::Int16(v)) => self.set(pos, *v),
            (LogicalType::Int32, Value::Int32(v)) => self.set(pos, *v),
            (LogicalType::Int64, Value::Int64(v)) => self.set(pos, *v),
            (LogicalType::UInt8, Value::UInt8(v)) => self.set(pos, *v),
            (LogicalType::UInt16, Value::UInt16(v)) => self.set(pos, *v),
            (LogicalType::UInt32, Value::UInt32(v)) => self.set(pos, *v),
            (LogicalType::UInt64, Value::UInt64(v)) => self.set(pos, *v),
            (LogicalType::Float, Value::Float(v)) => self.set(pos, *v),
            (LogicalType::Double, Value::Double(v)) => self.set(pos, *v),
            (LogicalType::InternalId, Value::InternalId(id)) => self.set_internal_id(pos, *id),
            (LogicalType::String, Value::String(s)) => self.set_string(pos, s),
            (LogicalType::Array(_, size), Value::List(items)) if items.len() != *size as usize => {
                bail!(
                    "array of size {} cannot hold {} elements",
                    size,
                    items.len()
                )
            }
            (LogicalType::List(_) | LogicalType::Array(_, _), Value::List(items)) => {
                let start = self.reserve_list(pos, items.len() as u32);
                if let Some(child) = self.list_child_mut() {
                    for (i, item) in items.iter().enumerate() {
                        child.set_value(start + i as u64, item)?;
                    }
                }
            }
            (LogicalType::Struct(fields), Value::Struct(items)) => {
                ensure!(
                    fields.len() == items.len(),
                    "struct with {} fields given {} values",
                    fields.len(),
                    items.len()
                );
                for (child, item) in self.struct_children_mut().iter_mut().zip(items) {
                    child.set_value(pos, item)?;
                }
            }
            (ty, v) => bail!("cannot store {:?} in a {} vector", v, ty),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructField;

    #[test]
    fn fixed_values_and_nulls() {
        let mut vector = ValueVector::new(LogicalType::Int32, 4);
        vector.set_value(0, &Value::Int32(-5)).unwrap();
        vector.set_value(1, &Value::Null).unwrap();
        assert_eq!(vector.get_value(0), Value::Int32(-5));
        assert_eq!(vector.get_value(1), Value::Null);
        assert!(vector.set_value(9, &Value::Int32(1)).is_err());
        assert!(vector.set_value(2, &Value::Int64(1)).is_err());
    }

    #[test]
    fn lists_grow_child_vector() {
        let values = vec![
            Value::List((0..5).map(Value::Int64).collect()),
            Value::Null,
            Value::List(vec![Value::Int64(9)]),
        ];
        let vector = ValueVector::from_values(LogicalType::list(LogicalType::Int64), &values).unwrap();
        assert_eq!(vector.list_entry(2), ListEntry::new(5, 1));
        for (pos, value) in values.iter().enumerate() {
            assert_eq!(&vector.get_value(pos as u64), value);
        }
    }

    #[test]
    fn array_size_is_enforced() {
        let mut vector = ValueVector::new(LogicalType::array(LogicalType::Int32, 2), 2);
        let bad = Value::List(vec![Value::Int32(1)]);
        assert!(vector.set_value(0, &bad).is_err());
    }

    #[test]
    fn struct_fields_round_out() {
        let ty = LogicalType::structure(vec![
            StructField::new("id", LogicalType::InternalId),
            StructField::new("name", LogicalType::String),
        ]);
        let value = Value::Struct(vec![
            Value::InternalId(InternalId::new(4, 2)),
            Value::String("ada".into()),
        ]);
        let vector = ValueVector::from_values(ty, std::slice::from_ref(&value)).unwrap();
        assert_eq!(vector.get_value(0), value);
    }
}
