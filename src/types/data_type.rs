//! # Logical and Physical Column Types
//!
//! Every column carries a `LogicalType` describing what the user stored, and
//! a `PhysicalType` describing how the storage layer lays the values out.
//! Several logical types can share one physical layout; nested logical types
//! (LIST, ARRAY, STRUCT) are stored as a parent chunk plus child chunks.
//!
//! ## Physical Layout Per Type
//!
//! | PhysicalType | Bytes in chunk | Children                         |
//! |--------------|----------------|----------------------------------|
//! | Bool         | 1 bit          | -                                |
//! | Int8..Int64  | 1/2/4/8        | -                                |
//! | UInt8..UInt64| 1/2/4/8        | -                                |
//! | Float/Double | 4/8            | -                                |
//! | InternalId   | 8 (offset)     | -                                |
//! | String       | 4 (dict index) | dictionary data, dictionary offs |
//! | List/Array   | 0              | offsets, sizes, data             |
//! | Struct       | 0              | one per field                    |
//!
//! The internal-id table id is not stored per row; a chunk keeps a single
//! common table id for all of its rows.
//!
//! ## Serialization
//!
//! `LogicalType` is persisted inside node-group metadata as a tag byte
//! followed by type-specific payload:
//!
//! ```text
//! +-----+---------------------------------------------+
//! | tag | LIST/ARRAY: child type [+ u32 array size]   |
//! |     | STRUCT: varint field count, (name, type)*   |
//! +-----+---------------------------------------------+
//! ```

use eyre::{bail, Result};

use crate::encoding::{Deserializer, Serializer};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    InternalId = 11,
    String = 12,
    List = 13,
    Array = 14,
    Struct = 15,
}

impl PhysicalType {
    /// Number of bytes one value occupies in a column chunk's main buffer.
    /// Bool returns 0 because it is bit-addressed.
    pub fn size_in_chunk(self) -> usize {
        match self {
            PhysicalType::Bool => 0,
            PhysicalType::Int8 | PhysicalType::UInt8 => 1,
            PhysicalType::Int16 | PhysicalType::UInt16 => 2,
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float => 4,
            PhysicalType::Int64
            | PhysicalType::UInt64
            | PhysicalType::Double
            | PhysicalType::InternalId => 8,
            PhysicalType::String => 4,
            PhysicalType::List | PhysicalType::Array | PhysicalType::Struct => 0,
        }
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            PhysicalType::Int8 | PhysicalType::Int16 | PhysicalType::Int32 | PhysicalType::Int64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            PhysicalType::UInt8
                | PhysicalType::UInt16
                | PhysicalType::UInt32
                | PhysicalType::UInt64
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, PhysicalType::Float | PhysicalType::Double)
    }

    /// Nested types keep no values in their own buffer.
    pub fn is_nested(self) -> bool {
        matches!(
            self,
            PhysicalType::List | PhysicalType::Array | PhysicalType::Struct
        )
    }

    /// Types whose main buffer holds fixed-width numbers that the integer,
    /// float and constant codecs understand.
    pub fn is_fixed_numeric(self) -> bool {
        self.is_integer() || self.is_floating_point()
    }

    /// Layout the codecs see for this type's main buffer. String chunks
    /// hold u32 dictionary indices and internal-id chunks hold u64 offsets.
    pub fn codec_type(self) -> PhysicalType {
        match self {
            PhysicalType::String => PhysicalType::UInt32,
            PhysicalType::InternalId => PhysicalType::UInt64,
            other => other,
        }
    }

    pub fn bit_width(self) -> u32 {
        (self.size_in_chunk() * 8) as u32
    }
}

impl TryFrom<u8> for PhysicalType {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => PhysicalType::Bool,
            1 => PhysicalType::Int8,
            2 => PhysicalType::Int16,
            3 => PhysicalType::Int32,
            4 => PhysicalType::Int64,
            5 => PhysicalType::UInt8,
            6 => PhysicalType::UInt16,
            7 => PhysicalType::UInt32,
            8 => PhysicalType::UInt64,
            9 => PhysicalType::Float,
            10 => PhysicalType::Double,
            11 => PhysicalType::InternalId,
            12 => PhysicalType::String,
            13 => PhysicalType::List,
            14 => PhysicalType::Array,
            15 => PhysicalType::Struct,
            _ => bail!("invalid PhysicalType discriminant: {}", value),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub data_type: LogicalType,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    InternalId,
    String,
    List(Box<LogicalType>),
    Array(Box<LogicalType>, u32),
    Struct(Vec<StructField>),
}

impl LogicalType {
    pub fn list(child: LogicalType) -> Self {
        LogicalType::List(Box::new(child))
    }

    pub fn array(child: LogicalType, size: u32) -> Self {
        LogicalType::Array(Box::new(child), size)
    }

    pub fn structure(fields: Vec<StructField>) -> Self {
        LogicalType::Struct(fields)
    }

    pub fn physical_type(&self) -> PhysicalType {
        match self {
            LogicalType::Bool => PhysicalType::Bool,
            LogicalType::Int8 => PhysicalType::Int8,
            LogicalType::Int16 => PhysicalType::Int16,
            LogicalType::Int32 => PhysicalType::Int32,
            LogicalType::Int64 => PhysicalType::Int64,
            LogicalType::UInt8 => PhysicalType::UInt8,
            LogicalType::UInt16 => PhysicalType::UInt16,
            LogicalType::UInt32 => PhysicalType::UInt32,
            LogicalType::UInt64 => PhysicalType::UInt64,
            LogicalType::Float => PhysicalType::Float,
            LogicalType::Double => PhysicalType::Double,
            LogicalType::InternalId => PhysicalType::InternalId,
            LogicalType::String => PhysicalType::String,
            LogicalType::List(_) => PhysicalType::List,
            LogicalType::Array(_, _) => PhysicalType::Array,
            LogicalType::Struct(_) => PhysicalType::Struct,
        }
    }

    /// Element type of a LIST or ARRAY.
    pub fn child_type(&self) -> Option<&LogicalType> {
        match self {
            LogicalType::List(child) | LogicalType::Array(child, _) => Some(child),
            _ => None,
        }
    }

    pub fn array_size(&self) -> Option<u32> {
        match self {
            LogicalType::Array(_, size) => Some(*size),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[StructField] {
        match self {
            LogicalType::Struct(fields) => fields,
            _ => &[],
        }
    }

    fn tag(&self) -> u8 {
        self.physical_type() as u8
    }

    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_u8(self.tag());
        match self {
            LogicalType::List(child) => child.serialize(ser),
            LogicalType::Array(child, size) => {
                child.serialize(ser);
                ser.write_u32(*size);
            }
            LogicalType::Struct(fields) => {
                ser.write_varint(fields.len() as u64);
                for field in fields {
                    ser.write_str(&field.name);
                    field.data_type.serialize(ser);
                }
            }
            _ => {}
        }
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        let physical = PhysicalType::try_from(de.read_u8()?)?;
        Ok(match physical {
            PhysicalType::Bool => LogicalType::Bool,
            PhysicalType::Int8 => LogicalType::Int8,
            PhysicalType::Int16 => LogicalType::Int16,
            PhysicalType::Int32 => LogicalType::Int32,
            PhysicalType::Int64 => LogicalType::Int64,
            PhysicalType::UInt8 => LogicalType::UInt8,
            PhysicalType::UInt16 => LogicalType::UInt16,
            PhysicalType::UInt32 => LogicalType::UInt32,
            PhysicalType::UInt64 => LogicalType::UInt64,
            PhysicalType::Float => LogicalType::Float,
            PhysicalType::Double => LogicalType::Double,
            PhysicalType::InternalId => LogicalType::InternalId,
            PhysicalType::String => LogicalType::String,
            PhysicalType::List => LogicalType::list(LogicalType::deserialize(de)?),
            PhysicalType::Array => {
                let child = LogicalType::deserialize(de)?;
                let size = de.read_u32()?;
                LogicalType::array(child, size)
            }
            PhysicalType::Struct => {
                let count = de.read_varint()? as usize;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = de.read_string()?;
                    let data_type = LogicalType::deserialize(de)?;
                    fields.push(StructField { name, data_type });
                }
                LogicalType::Struct(fields)
            }
        })
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalType::Bool => write!(f, "BOOL"),
            LogicalType::Int8 => write!(f, "INT8"),
            LogicalType::Int16 => write!(f, "INT16"),
            LogicalType::Int32 => write!(f, "INT32"),
            LogicalType::Int64 => write!(f, "INT64"),
            LogicalType::UInt8 => write!(f, "UINT8"),
            LogicalType::UInt16 => write!(f, "UINT16"),
            LogicalType::UInt32 => write!(f, "UINT32"),
            LogicalType::UInt64 => write!(f, "UINT64"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::InternalId => write!(f, "INTERNAL_ID"),
            LogicalType::String => write!(f, "STRING"),
            LogicalType::List(child) => write!(f, "{}[]", child),
            LogicalType::Array(child, size) => write!(f, "{}[{}]", child, size),
            LogicalType::Struct(fields) => {
                write!(f, "STRUCT(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.data_type)?;
                }
                write!(f, ")")
            }
        }
    }
}
