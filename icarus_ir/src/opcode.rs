//! Opcode family tags. Each family is one opcode carrying a primitive-type
//! tag in its control byte (the control-byte-tagged alternative the Design
//! Notes sanction), rather than one opcode per `(operation, type)` pair.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

/// Type-constructor opcode families (`Ptr`, `BufPtr`, `Arrow`, `Array`,
/// `Tup*`, `Var*`, `Struct*`, `Enum*`, `Flags*`, `BlockSeq*`). These build
/// `Type`/block-sequence values at compile time; the interpreter only needs
/// to produce a stable opaque handle for them (see `interp::exec_type_ctor`
/// in `icarus_interpreter`), never to act on their structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCtorKind {
    Ptr,
    BufPtr,
    Arrow,
    Array,
    Tuple,
    Variant,
    Struct,
    Enum,
    Flags,
    BlockSeq,
}

/// Numeric opcode index for each `Cmd` discriminant, used as the `u16`
/// `cmd_index` prefix of the packed encoding. Kept in one place so the
/// encoder and decoder can never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum OpIndex {
    Arith = 0,
    Cmp = 1,
    Not = 2,
    Bit = 3,
    Alloca = 4,
    Load = 5,
    Store = 6,
    PtrIncr = 7,
    Field = 8,
    VariantType = 9,
    VariantValue = 10,
    ArrayLength = 11,
    ArrayData = 12,
    TypeCtor = 13,
    UncondJump = 14,
    CondJump = 15,
    ReturnJump = 16,
    Phi = 17,
    Call = 18,
    SetReturn = 19,
    Print = 20,
    Bytes = 21,
    Align = 22,
    Cast = 23,
    Trunc = 24,
    Extend = 25,
    DebugIr = 26,
    /// Not part of the opcode families enumerated in the spec's data model;
    /// added so the inliner has something to target when a `Call`'s
    /// register-valued out-param must receive a value that is already fully
    /// computed by the translated callee body (see `inliner::translate_set_return`).
    /// Plain register-to-register (or immediate-to-register) assignment,
    /// with no computation.
    Move = 27,
}

impl OpIndex {
    pub const COUNT: u16 = 28;

    pub fn from_u16(v: u16) -> Option<Self> {
        use OpIndex::*;
        let table = [
            Arith, Cmp, Not, Bit, Alloca, Load, Store, PtrIncr, Field, VariantType, VariantValue,
            ArrayLength, ArrayData, TypeCtor, UncondJump, CondJump, ReturnJump, Phi, Call,
            SetReturn, Print, Bytes, Align, Cast, Trunc, Extend, DebugIr, Move,
        ];
        table.get(v as usize).copied()
    }
}
