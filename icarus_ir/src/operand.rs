//! Operands: either a register reference or a compile-time-known
//! immediate. This is the non-generic `Operand` alternative the Design
//! Notes sanction in place of the source's `RegisterOr<T>` template — one
//! dynamic sum type instead of one monomorphization per `T`.

use crate::address::Address;
use crate::register::Register;
use icarus_types::PrimType;
use serde::{Deserialize, Serialize};

/// The dynamic-typing escape hatch for compile-time-known operand values:
/// every immediate kind the IR needs to carry inline, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Immediate {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    Addr(Address),
    /// An interned string constant, by index into the module's string table.
    StringRef(u32),
    /// A direct reference to a function, by index into the module's
    /// function table. Used for `CallTarget::Direct` and for function
    /// values passed as data.
    FuncRef(u32),
    /// Opaque handle produced by a type-constructor opcode (`Ptr`, `Array`,
    /// `Struct*`, ...); see `opcode::TypeCtorKind`. The core only needs to
    /// carry these around, never interpret their structure itself.
    TypeHandle(u32),
}

impl Immediate {
    pub fn prim_type(self) -> Option<PrimType> {
        match self {
            Immediate::Bool(_) => Some(PrimType::Bool),
            Immediate::I8(_) => Some(PrimType::I8),
            Immediate::I16(_) => Some(PrimType::I16),
            Immediate::I32(_) => Some(PrimType::I32),
            Immediate::I64(_) => Some(PrimType::I64),
            Immediate::U8(_) => Some(PrimType::U8),
            Immediate::U16(_) => Some(PrimType::U16),
            Immediate::U32(_) => Some(PrimType::U32),
            Immediate::U64(_) => Some(PrimType::U64),
            Immediate::F32(_) => Some(PrimType::F32),
            Immediate::F64(_) => Some(PrimType::F64),
            Immediate::Char(_) => Some(PrimType::Char),
            Immediate::Addr(_)
            | Immediate::StringRef(_)
            | Immediate::FuncRef(_)
            | Immediate::TypeHandle(_) => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Immediate::I8(v) => Some(v as i64),
            Immediate::I16(v) => Some(v as i64),
            Immediate::I32(v) => Some(v as i64),
            Immediate::I64(v) => Some(v),
            Immediate::U8(v) => Some(v as i64),
            Immediate::U16(v) => Some(v as i64),
            Immediate::U32(v) => Some(v as i64),
            Immediate::U64(v) => Some(v as i64),
            Immediate::Bool(v) => Some(v as i64),
            Immediate::Char(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Immediate::F32(v) => Some(v as f64),
            Immediate::F64(v) => Some(v),
            _ => self.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Immediate::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_addr(self) -> Option<Address> {
        match self {
            Immediate::Addr(a) => Some(a),
            _ => None,
        }
    }
}

impl std::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Immediate::Bool(v) => write!(f, "{v}"),
            Immediate::I8(v) => write!(f, "{v}i8"),
            Immediate::I16(v) => write!(f, "{v}i16"),
            Immediate::I32(v) => write!(f, "{v}i32"),
            Immediate::I64(v) => write!(f, "{v}i64"),
            Immediate::U8(v) => write!(f, "{v}u8"),
            Immediate::U16(v) => write!(f, "{v}u16"),
            Immediate::U32(v) => write!(f, "{v}u32"),
            Immediate::U64(v) => write!(f, "{v}u64"),
            Immediate::F32(v) => write!(f, "{v}f32"),
            Immediate::F64(v) => write!(f, "{v}f64"),
            Immediate::Char(v) => write!(f, "{v:?}"),
            Immediate::Addr(a) => write!(f, "{a}"),
            Immediate::StringRef(i) => write!(f, "str#{i}"),
            Immediate::FuncRef(i) => write!(f, "fn#{i}"),
            Immediate::TypeHandle(i) => write!(f, "type#{i}"),
        }
    }
}

/// A register-or-immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Reg(Register),
    Imm(Immediate),
}

impl Operand {
    pub fn is_immediate(self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn as_immediate(self) -> Option<Immediate> {
        match self {
            Operand::Imm(v) => Some(v),
            Operand::Reg(_) => None,
        }
    }
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Reg(r)
    }
}

impl From<Immediate> for Operand {
    fn from(v: Immediate) -> Self {
        Operand::Imm(v)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Imm(v) => write!(f, "{v}"),
        }
    }
}
