//! The slice of the Icarus type system the IR and interpreter need to know
//! about: primitive kinds, compound type shapes, and (in [`layout`]) the
//! size/alignment rules the builder and interpreter consult on every
//! register reservation and memory access.

pub mod layout;

use serde::{Deserialize, Serialize};

/// Primitive scalar kinds. One arithmetic/comparison opcode family exists
/// per member of this enum; the control byte of an encoded `Cmd` carries
/// one of these to select behavior at interpret time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Char,
}

impl PrimType {
    pub fn is_integer(self) -> bool {
        !matches!(self, PrimType::F32 | PrimType::F64 | PrimType::Bool | PrimType::Char)
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimType::F32 | PrimType::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, PrimType::I8 | PrimType::I16 | PrimType::I32 | PrimType::I64)
    }
}

impl std::fmt::Display for PrimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrimType::I8 => "i8",
            PrimType::I16 => "i16",
            PrimType::I32 => "i32",
            PrimType::I64 => "i64",
            PrimType::U8 => "u8",
            PrimType::U16 => "u16",
            PrimType::U32 => "u32",
            PrimType::U64 => "u64",
            PrimType::F32 => "f32",
            PrimType::F64 => "f64",
            PrimType::Bool => "bool",
            PrimType::Char => "char",
        };
        write!(f, "{name}")
    }
}

/// A named struct field, carried inline on [`Type::Struct`] so layout can be
/// precomputed without a separate type registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

/// A struct type: an ordered list of fields. Two structs are the same type
/// only if `name` matches; `fields` is carried for layout purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

/// A function type: ordered parameter types and ordered output types.
/// Outputs are always a flat list (possibly empty); there is no separate
/// single-output representation (see the Design Notes' resolution of the
/// tuple-vs-split-outputs question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub outputs: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Primitive(PrimType),
    /// An owning pointer to a single value of the pointee type.
    Pointer(Box<Type>),
    /// A pointer into a buffer of the pointee type (`PtrIncr` strides by
    /// this type's aligned size).
    BufferPointer(Box<Type>),
    /// Fixed-length array (`length = Some(n)`) or a dynamically-sized
    /// array whose length is stored as a leading `i32` (`length = None`).
    Array { element: Box<Type>, length: Option<u32> },
    /// Anonymous product type. The empty tuple is `Unit`.
    Tuple(Vec<Type>),
    /// Tagged union over the listed alternatives; laid out as a type-tag
    /// handle followed by the widest alternative's payload.
    Variant(Vec<Type>),
    Struct(StructType),
    Function(FunctionType),
    /// A named set of bit flags, laid out as a `u64`.
    Flags(String),
    /// An opaque handle to a sequence of basic blocks (used for "scope"
    /// literals); pointer-sized, never dereferenced by the interpreter
    /// itself.
    BlockSequence,
}

impl Type {
    pub const UNIT: Type = Type::Tuple(Vec::new());

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn as_prim(&self) -> Option<PrimType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tuple(fields) if fields.is_empty())
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{p}"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::BufferPointer(inner) => write!(f, "[*]{inner}"),
            Type::Array { element, length: Some(n) } => write!(f, "[{n}]{element}"),
            Type::Array { element, length: None } => write!(f, "[]{element}"),
            Type::Tuple(fields) if fields.is_empty() => write!(f, "()"),
            Type::Tuple(fields) => {
                let parts: Vec<String> = fields.iter().map(Type::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Type::Variant(alts) => {
                let parts: Vec<String> = alts.iter().map(Type::to_string).collect();
                write!(f, "{}", parts.join(" | "))
            }
            Type::Struct(s) => write!(f, "{}", s.name),
            Type::Function(ft) => {
                let params: Vec<String> = ft.params.iter().map(Type::to_string).collect();
                let outputs: Vec<String> = ft.outputs.iter().map(Type::to_string).collect();
                write!(f, "({}) -> ({})", params.join(", "), outputs.join(", "))
            }
            Type::Flags(name) => write!(f, "flags {name}"),
            Type::BlockSequence => write!(f, "block-seq"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_the_empty_tuple() {
        assert!(Type::UNIT.is_unit());
        assert_eq!(Type::UNIT.to_string(), "()");
    }

    #[test]
    fn prim_type_classification() {
        assert!(PrimType::I32.is_integer());
        assert!(PrimType::I32.is_signed());
        assert!(!PrimType::U32.is_signed());
        assert!(PrimType::F64.is_float());
        assert!(!PrimType::Bool.is_integer());
    }
}
