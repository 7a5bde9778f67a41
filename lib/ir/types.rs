//! IR value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a named opaque struct type registered on a `Module`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct StructId(pub(crate) u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The type of an IR value.
///
/// Pointers are opaque: loads and stores carry the accessed type
/// themselves, so no pointee type is tracked here.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Type {
    Void,
    Int { bits: u32 },
    Float { bits: u32 },
    Vector { elem_bits: u32, lanes: u32, float: bool },
    Ptr,
    Struct(StructId),
}

impl Type {
    pub fn int(bits: u32) -> Type {
        Type::Int { bits }
    }

    pub fn float(bits: u32) -> Type {
        Type::Float { bits }
    }

    pub fn vector(elem_bits: u32, lanes: u32, float: bool) -> Type {
        Type::Vector {
            elem_bits,
            lanes,
            float,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector { .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    /// True for types on which floating-point arithmetic is legal.
    pub fn is_float_or_float_vector(&self) -> bool {
        match self {
            Type::Float { .. } => true,
            Type::Vector { float, .. } => *float,
            _ => false,
        }
    }

    /// The primitive size of this type in bits. Pointers count as the
    /// pointer width; structs and void have no primitive size.
    pub fn bits(&self) -> u32 {
        match self {
            Type::Void | Type::Struct(_) => 0,
            Type::Int { bits } | Type::Float { bits } => *bits,
            Type::Vector { elem_bits, lanes, .. } => elem_bits * lanes,
            Type::Ptr => 64,
        }
    }

    /// The element type of a vector type.
    pub fn elem(&self) -> Option<Type> {
        match self {
            Type::Vector {
                elem_bits, float, ..
            } => Some(if *float {
                Type::float(*elem_bits)
            } else {
                Type::int(*elem_bits)
            }),
            _ => None,
        }
    }

    pub fn lanes(&self) -> Option<u32> {
        match self {
            Type::Vector { lanes, .. } => Some(*lanes),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int { bits } => write!(f, "i{}", bits),
            Type::Float { bits } => write!(f, "f{}", bits),
            Type::Vector {
                elem_bits,
                lanes,
                float,
            } => {
                let tag = if *float { 'f' } else { 'i' };
                write!(f, "<{} x {}{}>", lanes, tag, elem_bits)
            }
            Type::Ptr => write!(f, "ptr"),
            Type::Struct(id) => write!(f, "%struct.{}", id.0),
        }
    }
}
