use super::error::{GgufError, Result};
use super::reader::ByteReader;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::io::Read;

/// Nesting depth at which an array-of-arrays is rejected.
const MAX_ARRAY_DEPTH: u64 = 64;

/// Metadata value type codes as they appear on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Float32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    Uint64 = 10,
    Int64 = 11,
    Float64 = 12,
}

impl TryFrom<u32> for ValueType {
    type Error = GgufError;

    fn try_from(v: u32) -> Result<Self> {
        Ok(match v {
            0 => ValueType::Uint8,
            1 => ValueType::Int8,
            2 => ValueType::Uint16,
            3 => ValueType::Int16,
            4 => ValueType::Uint32,
            5 => ValueType::Int32,
            6 => ValueType::Float32,
            7 => ValueType::Bool,
            8 => ValueType::String,
            9 => ValueType::Array,
            10 => ValueType::Uint64,
            11 => ValueType::Int64,
            12 => ValueType::Float64,
            _ => return Err(GgufError::UnsupportedValueType(v)),
        })
    }
}

impl ValueType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Uint8 => "u8",
            ValueType::Int8 => "i8",
            ValueType::Uint16 => "u16",
            ValueType::Int16 => "i16",
            ValueType::Uint32 => "u32",
            ValueType::Int32 => "i32",
            ValueType::Float32 => "f32",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Uint64 => "u64",
            ValueType::Int64 => "i64",
            ValueType::Float64 => "f64",
        }
    }
}

/// One decoded metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Uint8(u8),
    Int8(i8),
    Uint16(u16),
    Int16(i16),
    Uint32(u32),
    Int32(i32),
    Uint64(u64),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Array {
        element_type: ValueType,
        values: Vec<TaggedValue>,
    },
}

impl TaggedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TaggedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TaggedValue::Uint8(v) => Some(*v as i64),
            TaggedValue::Int8(v) => Some(*v as i64),
            TaggedValue::Uint16(v) => Some(*v as i64),
            TaggedValue::Int16(v) => Some(*v as i64),
            TaggedValue::Uint32(v) => Some(*v as i64),
            TaggedValue::Int32(v) => Some(*v as i64),
            TaggedValue::Uint64(v) => i64::try_from(*v).ok(),
            TaggedValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value as u64; negative integers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TaggedValue::Uint64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TaggedValue::Float32(v) => Some(*v as f64),
            TaggedValue::Float64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TaggedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[TaggedValue]> {
        match self {
            TaggedValue::Array { values, .. } => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Uint8(v) => write!(f, "{}", v),
            TaggedValue::Int8(v) => write!(f, "{}", v),
            TaggedValue::Uint16(v) => write!(f, "{}", v),
            TaggedValue::Int16(v) => write!(f, "{}", v),
            TaggedValue::Uint32(v) => write!(f, "{}", v),
            TaggedValue::Int32(v) => write!(f, "{}", v),
            TaggedValue::Uint64(v) => write!(f, "{}", v),
            TaggedValue::Int64(v) => write!(f, "{}", v),
            TaggedValue::Float32(v) => write!(f, "{}", v),
            TaggedValue::Float64(v) => write!(f, "{}", v),
            TaggedValue::Bool(v) => write!(f, "{}", v),
            TaggedValue::String(s) => write!(f, "{}", s),
            TaggedValue::Array { values, .. } => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match v {
                        TaggedValue::String(s) => write!(f, "{:?}", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}

impl Serialize for TaggedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TaggedValue::Uint8(v) => serializer.serialize_u8(*v),
            TaggedValue::Int8(v) => serializer.serialize_i8(*v),
            TaggedValue::Uint16(v) => serializer.serialize_u16(*v),
            TaggedValue::Int16(v) => serializer.serialize_i16(*v),
            TaggedValue::Uint32(v) => serializer.serialize_u32(*v),
            TaggedValue::Int32(v) => serializer.serialize_i32(*v),
            TaggedValue::Uint64(v) => serializer.serialize_u64(*v),
            TaggedValue::Int64(v) => serializer.serialize_i64(*v),
            TaggedValue::Float32(v) => serializer.serialize_f32(*v),
            TaggedValue::Float64(v) => serializer.serialize_f64(*v),
            TaggedValue::Bool(v) => serializer.serialize_bool(*v),
            TaggedValue::String(s) => serializer.serialize_str(s),
            TaggedValue::Array { values, .. } => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

pub(crate) fn read_value_type<R: Read>(reader: &mut ByteReader<'_, R>) -> Result<ValueType> {
    ValueType::try_from(reader.read_u32()?)
}

/// Decodes one value of type `ty`, recursing into arrays.
pub(crate) fn read_value<R: Read>(reader: &mut ByteReader<'_, R>, ty: ValueType) -> Result<TaggedValue> {
    read_value_at_depth(reader, ty, 0)
}

fn read_value_at_depth<R: Read>(
    reader: &mut ByteReader<'_, R>,
    ty: ValueType,
    depth: u64,
) -> Result<TaggedValue> {
    Ok(match ty {
        ValueType::Uint8 => TaggedValue::Uint8(reader.read_u8()?),
        ValueType::Int8 => TaggedValue::Int8(reader.read_i8()?),
        ValueType::Uint16 => TaggedValue::Uint16(reader.read_u16()?),
        ValueType::Int16 => TaggedValue::Int16(reader.read_i16()?),
        ValueType::Uint32 => TaggedValue::Uint32(reader.read_u32()?),
        ValueType::Int32 => TaggedValue::Int32(reader.read_i32()?),
        ValueType::Float32 => TaggedValue::Float32(reader.read_f32()?),
        ValueType::Bool => TaggedValue::Bool(reader.read_bool()?),
        ValueType::String => TaggedValue::String(reader.read_string()?),
        ValueType::Uint64 => TaggedValue::Uint64(reader.read_u64()?),
        ValueType::Int64 => TaggedValue::Int64(reader.read_i64()?),
        ValueType::Float64 => TaggedValue::Float64(reader.read_f64()?),
        ValueType::Array => {
            if depth >= MAX_ARRAY_DEPTH {
                return Err(GgufError::LimitExceeded {
                    what: "array nesting depth",
                    value: depth + 1,
                    limit: MAX_ARRAY_DEPTH,
                });
            }
            let element_type = read_value_type(reader)?;
            let limit = reader.config().max_array_len;
            let len = reader.read_count("array length", limit)?;
            // Capacity is bounded so a lying length cannot force a huge allocation.
            let mut values = Vec::with_capacity(len.min(4096) as usize);
            for _ in 0..len {
                values.push(read_value_at_depth(reader, element_type, depth + 1)?);
            }
            TaggedValue::Array {
                element_type,
                values,
            }
        }
    })
}
