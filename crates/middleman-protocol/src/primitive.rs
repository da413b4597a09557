//! Primitive field types a packet schema can name.

use std::fmt;

/// Closed set of field types the rule engine understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint8`
    UInt8,
    /// `uint16`
    UInt16,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `float`, IEEE 754 single precision
    Float,
    /// `double`, IEEE 754 double precision
    Double,
    /// Opaque byte span declared by bit size only. Never compared or written.
    Array,
}

impl PrimitiveType {
    /// Resolves a schema type name. Returns `None` for unknown names.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let ty = match name {
            "int8" => PrimitiveType::Int8,
            "int16" => PrimitiveType::Int16,
            "int32" => PrimitiveType::Int32,
            "int64" => PrimitiveType::Int64,
            "uint8" => PrimitiveType::UInt8,
            "uint16" => PrimitiveType::UInt16,
            "uint32" => PrimitiveType::UInt32,
            "uint64" => PrimitiveType::UInt64,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            _ => return None,
        };
        Some(ty)
    }

    /// Byte size of the type on the wire. `None` for [`PrimitiveType::Array`], whose
    /// size comes from the schema node.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            PrimitiveType::Int8 | PrimitiveType::UInt8 => Some(1),
            PrimitiveType::Int16 | PrimitiveType::UInt16 => Some(2),
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float => Some(4),
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Double => Some(8),
            PrimitiveType::Array => None,
        }
    }

    /// Schema spelling of the type.
    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Array => "array",
        }
    }

    /// True for the signed integer types.
    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8 | PrimitiveType::Int16 | PrimitiveType::Int32 | PrimitiveType::Int64
        )
    }

    /// True for `float` and `double`.
    pub fn is_floating_point(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
