//! The instruction set (`Cmd`), its structured form, and the packed
//! `CmdBuffer` encoding the interpreter executes directly.
//!
//! Every instruction exists in two simultaneous forms (spec ref: IR Model
//! and Encoding): a structured `Cmd` in `BasicBlock::instructions`, used
//! for inspection and inlining-time rewrites, and a packed byte sequence in
//! `BasicBlock::buffer`, used for execution. `CmdBuffer::append` and
//! `Cursor::read_next` are written so that reading is always the exact
//! inverse of appending; `tests/encoding_roundtrip.rs` exercises this for
//! every variant.

use crate::address::Address;
use crate::block::BlockId;
use crate::function::FuncId;
use crate::operand::{Immediate, Operand};
use crate::opcode::{ArithOp, BitOp, CmpOp, OpIndex, TypeCtorKind};
use crate::register::Register;
use icarus_support::Span;
use icarus_types::PrimType;
use serde::{Deserialize, Serialize};

/// How a `Call`'s callee is identified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    /// A statically known function in the owning module.
    Direct(FuncId),
    /// A function value computed at runtime (register or immediate
    /// function reference).
    Indirect(Operand),
    /// One of a small fixed table of foreign intrinsics the interpreter
    /// itself implements (see `icarus_interpreter::interp::call_foreign`).
    /// Any other name is the "unresolved function called at compile time"
    /// fatal error.
    Foreign(String),
}

/// Where a `Call`'s out-parameter result lands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OutDest {
    Reg(Register),
    Ptr(Operand),
}

/// One IR instruction. Destination registers are plain fields (absent
/// entirely for void ops), matching "at most one destination register".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cmd {
    Arith { op: ArithOp, prim: PrimType, lhs: Operand, rhs: Operand, dst: Register, span: Span },
    Cmp { op: CmpOp, prim: PrimType, lhs: Operand, rhs: Operand, dst: Register, span: Span },
    Not { value: Operand, dst: Register, span: Span },
    Bit { op: BitOp, lhs: Operand, rhs: Operand, dst: Register, span: Span },

    Alloca { type_index: u32, dst: Register, span: Span },
    Load { prim: PrimType, addr: Operand, dst: Register, span: Span },
    Store { prim: PrimType, addr: Operand, value: Operand, span: Span },
    PtrIncr { ptr: Operand, count: Operand, stride: u32, dst: Register, span: Span },
    Field { base: Operand, offset: u32, dst: Register, span: Span },
    VariantType { ptr: Operand, dst: Register, span: Span },
    VariantValue { ptr: Operand, payload_offset: u32, dst: Register, span: Span },
    ArrayLength { ptr: Operand, dst: Register, span: Span },
    ArrayData { ptr: Operand, dst: Register, span: Span },

    /// A type-constructor opcode; see `opcode::TypeCtorKind`. `args` names
    /// the index of this block's type-constructor operand pack.
    TypeCtor { kind: TypeCtorKind, args: u32, dst: Register, span: Span },

    UncondJump { target: BlockId },
    CondJump { cond: Operand, if_true: BlockId, if_false: BlockId },
    ReturnJump,
    /// `table` names the index of this block's phi-argument-table pack.
    Phi { table: u32, dst: Register, span: Span },

    Call { target: CallTarget, args: u32, out_params: Option<u32>, span: Span },
    SetReturn { index: u32, value: Operand, span: Span },

    Print { prim: PrimType, value: Operand, span: Span },
    Bytes { type_index: u32, dst: Register },
    Align { type_index: u32, dst: Register },
    Cast { from: PrimType, to: PrimType, value: Operand, dst: Register, span: Span },
    Trunc { from: PrimType, to: PrimType, value: Operand, dst: Register, span: Span },
    Extend { from: PrimType, to: PrimType, value: Operand, dst: Register, span: Span },
    DebugIr,
    /// Assigns `value` to `dst` verbatim. Not part of the spec's opcode
    /// enumeration; used by the inliner to bind a translated callee's
    /// return value into a caller-provided destination register (see
    /// `inliner::translate_set_return`).
    Move { value: Operand, dst: Register, span: Span },
}

impl Cmd {
    /// The register this instruction writes, if any.
    pub fn dst(&self) -> Option<Register> {
        use Cmd::*;
        match self {
            Arith { dst, .. }
            | Cmp { dst, .. }
            | Not { dst, .. }
            | Bit { dst, .. }
            | Alloca { dst, .. }
            | Load { dst, .. }
            | PtrIncr { dst, .. }
            | Field { dst, .. }
            | VariantType { dst, .. }
            | VariantValue { dst, .. }
            | ArrayLength { dst, .. }
            | ArrayData { dst, .. }
            | TypeCtor { dst, .. }
            | Phi { dst, .. }
            | Bytes { dst, .. }
            | Align { dst, .. }
            | Cast { dst, .. }
            | Trunc { dst, .. }
            | Extend { dst, .. }
            | Move { dst, .. } => Some(*dst),
            Store { .. }
            | UncondJump { .. }
            | CondJump { .. }
            | ReturnJump
            | Call { .. }
            | SetReturn { .. }
            | Print { .. }
            | DebugIr => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Cmd::UncondJump { .. } | Cmd::CondJump { .. } | Cmd::ReturnJump)
    }

    /// The source span this instruction was emitted from, or a synthetic
    /// one for opcodes that don't carry one (jumps, `DebugIr`, `Bytes`,
    /// `Align`). Used by `icarus_interpreter` to attach a real span to a
    /// runtime fault even though the packed form it executes from doesn't
    /// round-trip spans (see `Cursor::read_next`).
    pub fn span(&self) -> Span {
        use Cmd::*;
        match self {
            Arith { span, .. }
            | Cmp { span, .. }
            | Not { span, .. }
            | Bit { span, .. }
            | Alloca { span, .. }
            | Load { span, .. }
            | Store { span, .. }
            | PtrIncr { span, .. }
            | Field { span, .. }
            | VariantType { span, .. }
            | VariantValue { span, .. }
            | ArrayLength { span, .. }
            | ArrayData { span, .. }
            | TypeCtor { span, .. }
            | Phi { span, .. }
            | Call { span, .. }
            | SetReturn { span, .. }
            | Print { span, .. }
            | Cast { span, .. }
            | Trunc { span, .. }
            | Extend { span, .. }
            | Move { span, .. } => *span,
            UncondJump { .. } | CondJump { .. } | ReturnJump | Bytes { .. } | Align { .. } | DebugIr => {
                Span::synthetic()
            }
        }
    }

    /// Rebase this instruction's embedded register and block references in
    /// place, preserving its span. Used by the inliner on the structured
    /// form; `CmdBuffer::rebase` does the equivalent on the packed form.
    pub fn rebase(&mut self, register_base: u64, block_base: u32) {
        rebase_cmd(self, register_base, block_base)
    }
}

/// Packed byte encoding of a block's instructions, consumed directly by
/// the interpreter's dispatch loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdBuffer(Vec<u8>);

impl CmdBuffer {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { bytes: &self.0, pos: 0 }
    }

    fn write_u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn write_u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn write_i8(&mut self, v: i8) {
        self.0.push(v as u8);
    }
    fn write_f32(&mut self, v: f32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn write_f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn write_reg(&mut self, r: Register) {
        self.write_u64(r.raw());
    }
    fn write_prim(&mut self, p: PrimType) {
        self.write_u8(prim_tag(p));
    }

    fn write_immediate_payload(&mut self, v: Immediate) {
        match v {
            Immediate::Bool(b) => self.write_u8(b as u8),
            Immediate::I8(x) => self.write_i8(x),
            Immediate::I16(x) => self.0.extend_from_slice(&x.to_le_bytes()),
            Immediate::I32(x) => self.0.extend_from_slice(&x.to_le_bytes()),
            Immediate::I64(x) => self.0.extend_from_slice(&x.to_le_bytes()),
            Immediate::U8(x) => self.write_u8(x),
            Immediate::U16(x) => self.0.extend_from_slice(&x.to_le_bytes()),
            Immediate::U32(x) => self.write_u32(x),
            Immediate::U64(x) => self.write_u64(x),
            Immediate::F32(x) => self.write_f32(x),
            Immediate::F64(x) => self.write_f64(x),
            Immediate::Char(c) => self.write_u32(c as u32),
            Immediate::Addr(a) => self.write_addr(a),
            Immediate::StringRef(i) => self.write_u32(i),
            Immediate::FuncRef(i) => self.write_u32(i),
            Immediate::TypeHandle(i) => self.write_u32(i),
        }
    }

    fn write_addr(&mut self, a: Address) {
        match a {
            Address::Null => self.write_u8(0),
            Address::Stack(o) => {
                self.write_u8(1);
                self.write_u32(o);
            }
            Address::Heap(o) => {
                self.write_u8(2);
                self.write_u32(o);
            }
            Address::Global(o) => {
                self.write_u8(3);
                self.write_u32(o);
            }
        }
    }

    /// Self-describing operand encoding: a sentinel tag (`0xFF` = register,
    /// followed by its raw 64-bit identity) or an immediate's own type tag
    /// followed by its payload. Used everywhere an operand isn't already
    /// covered by a family-level primitive-type tag.
    fn write_operand(&mut self, op: Operand) {
        match op {
            Operand::Reg(r) => {
                self.write_u8(0xFF);
                self.write_reg(r);
            }
            Operand::Imm(v) => {
                self.write_u8(immediate_tag(v));
                self.write_immediate_payload(v);
            }
        }
    }

    fn append_header(&mut self, idx: OpIndex) {
        self.write_u16(idx as u16);
    }

    /// Append the packed encoding for `cmd`. This is the sole producer of
    /// bytes in a block's buffer; `Cursor::read_next` must decode exactly
    /// what this writes.
    pub fn append(&mut self, cmd: &Cmd) {
        match cmd {
            Cmd::Arith { op, prim, lhs, rhs, dst, .. } => {
                self.append_header(OpIndex::Arith);
                self.write_u8(*op as u8);
                self.write_prim(*prim);
                self.write_operand(*lhs);
                self.write_operand(*rhs);
                self.write_reg(*dst);
            }
            Cmd::Cmp { op, prim, lhs, rhs, dst, .. } => {
                self.append_header(OpIndex::Cmp);
                self.write_u8(*op as u8);
                self.write_prim(*prim);
                self.write_operand(*lhs);
                self.write_operand(*rhs);
                self.write_reg(*dst);
            }
            Cmd::Not { value, dst, .. } => {
                self.append_header(OpIndex::Not);
                self.write_operand(*value);
                self.write_reg(*dst);
            }
            Cmd::Bit { op, lhs, rhs, dst, .. } => {
                self.append_header(OpIndex::Bit);
                self.write_u8(*op as u8);
                self.write_operand(*lhs);
                self.write_operand(*rhs);
                self.write_reg(*dst);
            }
            Cmd::Alloca { type_index, dst, .. } => {
                self.append_header(OpIndex::Alloca);
                self.write_u32(*type_index);
                self.write_reg(*dst);
            }
            Cmd::Load { prim, addr, dst, .. } => {
                self.append_header(OpIndex::Load);
                self.write_prim(*prim);
                self.write_operand(*addr);
                self.write_reg(*dst);
            }
            Cmd::Store { prim, addr, value, .. } => {
                self.append_header(OpIndex::Store);
                self.write_prim(*prim);
                self.write_operand(*addr);
                self.write_operand(*value);
            }
            Cmd::PtrIncr { ptr, count, stride, dst, .. } => {
                self.append_header(OpIndex::PtrIncr);
                self.write_operand(*ptr);
                self.write_operand(*count);
                self.write_u32(*stride);
                self.write_reg(*dst);
            }
            Cmd::Field { base, offset, dst, .. } => {
                self.append_header(OpIndex::Field);
                self.write_operand(*base);
                self.write_u32(*offset);
                self.write_reg(*dst);
            }
            Cmd::VariantType { ptr, dst, .. } => {
                self.append_header(OpIndex::VariantType);
                self.write_operand(*ptr);
                self.write_reg(*dst);
            }
            Cmd::VariantValue { ptr, payload_offset, dst, .. } => {
                self.append_header(OpIndex::VariantValue);
                self.write_operand(*ptr);
                self.write_u32(*payload_offset);
                self.write_reg(*dst);
            }
            Cmd::ArrayLength { ptr, dst, .. } => {
                self.append_header(OpIndex::ArrayLength);
                self.write_operand(*ptr);
                self.write_reg(*dst);
            }
            Cmd::ArrayData { ptr, dst, .. } => {
                self.append_header(OpIndex::ArrayData);
                self.write_operand(*ptr);
                self.write_reg(*dst);
            }
            Cmd::TypeCtor { kind, args, dst, .. } => {
                self.append_header(OpIndex::TypeCtor);
                self.write_u8(*kind as u8);
                self.write_u32(*args);
                self.write_reg(*dst);
            }
            Cmd::UncondJump { target } => {
                self.append_header(OpIndex::UncondJump);
                self.write_u32(target.0);
            }
            Cmd::CondJump { cond, if_true, if_false } => {
                self.append_header(OpIndex::CondJump);
                self.write_operand(*cond);
                self.write_u32(if_true.0);
                self.write_u32(if_false.0);
            }
            Cmd::ReturnJump => {
                self.append_header(OpIndex::ReturnJump);
            }
            Cmd::Phi { table, dst, .. } => {
                self.append_header(OpIndex::Phi);
                self.write_u32(*table);
                self.write_reg(*dst);
            }
            Cmd::Call { target, args, out_params, .. } => {
                self.append_header(OpIndex::Call);
                match target {
                    CallTarget::Direct(id) => {
                        self.write_u8(0);
                        self.write_u32(id.0);
                    }
                    CallTarget::Indirect(op) => {
                        self.write_u8(1);
                        self.write_operand(*op);
                    }
                    CallTarget::Foreign(name) => {
                        self.write_u8(2);
                        let bytes = name.as_bytes();
                        self.write_u32(bytes.len() as u32);
                        self.0.extend_from_slice(bytes);
                    }
                }
                self.write_u32(*args);
                match out_params {
                    Some(i) => {
                        self.write_u8(1);
                        self.write_u32(*i);
                    }
                    None => self.write_u8(0),
                }
            }
            Cmd::SetReturn { index, value, .. } => {
                self.append_header(OpIndex::SetReturn);
                self.write_u32(*index);
                self.write_operand(*value);
            }
            Cmd::Print { prim, value, .. } => {
                self.append_header(OpIndex::Print);
                self.write_prim(*prim);
                self.write_operand(*value);
            }
            Cmd::Bytes { type_index, dst } => {
                self.append_header(OpIndex::Bytes);
                self.write_u32(*type_index);
                self.write_reg(*dst);
            }
            Cmd::Align { type_index, dst } => {
                self.append_header(OpIndex::Align);
                self.write_u32(*type_index);
                self.write_reg(*dst);
            }
            Cmd::Cast { from, to, value, dst, .. } => {
                self.append_header(OpIndex::Cast);
                self.write_prim(*from);
                self.write_prim(*to);
                self.write_operand(*value);
                self.write_reg(*dst);
            }
            Cmd::Trunc { from, to, value, dst, .. } => {
                self.append_header(OpIndex::Trunc);
                self.write_prim(*from);
                self.write_prim(*to);
                self.write_operand(*value);
                self.write_reg(*dst);
            }
            Cmd::Extend { from, to, value, dst, .. } => {
                self.append_header(OpIndex::Extend);
                self.write_prim(*from);
                self.write_prim(*to);
                self.write_operand(*value);
                self.write_reg(*dst);
            }
            Cmd::DebugIr => {
                self.append_header(OpIndex::DebugIr);
            }
            Cmd::Move { value, dst, .. } => {
                self.append_header(OpIndex::Move);
                self.write_operand(*value);
                self.write_reg(*dst);
            }
        }
    }

    /// Rebase every embedded register and block reference by the given
    /// amounts, in place. Used by the inliner when splicing a copied
    /// buffer into the caller (spec ref: Inliner).
    pub fn rebase(&mut self, register_base: u64, block_base: u32) {
        let mut out = CmdBuffer::new();
        let mut cur = self.cursor();
        while let Some(decoded) = cur.read_next() {
            let mut cmd = decoded;
            rebase_cmd(&mut cmd, register_base, block_base);
            out.append(&cmd);
        }
        *self = out;
    }
}

/// Decodes the packed form and renders it one `Cmd` per line, the way
/// `log::trace!` wants it for a single-step dump. Round-trips through
/// `Cursor::read_next`, so a buffer that can't decode can't print either.
impl std::fmt::Display for CmdBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut cur = self.cursor();
        let mut first = true;
        while let Some(cmd) = cur.read_next() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{cmd:?}")?;
            first = false;
        }
        Ok(())
    }
}

fn rebase_cmd(cmd: &mut Cmd, register_base: u64, block_base: u32) {
    fn rebase_reg(r: &mut Register, base: u64) {
        *r = r.rebase_ordinary(base);
    }
    fn rebase_operand(op: &mut Operand, base: u64) {
        if let Operand::Reg(r) = op {
            rebase_reg(r, base);
        }
    }
    fn rebase_block(b: &mut BlockId, base: u32) {
        b.0 += base;
    }

    match cmd {
        Cmd::Arith { lhs, rhs, dst, .. } | Cmd::Cmp { lhs, rhs, dst, .. } => {
            rebase_operand(lhs, register_base);
            rebase_operand(rhs, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::Bit { lhs, rhs, dst, .. } => {
            rebase_operand(lhs, register_base);
            rebase_operand(rhs, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::Not { value, dst, .. } => {
            rebase_operand(value, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::Alloca { dst, .. } => rebase_reg(dst, register_base),
        Cmd::Load { addr, dst, .. } => {
            rebase_operand(addr, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::Store { addr, value, .. } => {
            rebase_operand(addr, register_base);
            rebase_operand(value, register_base);
        }
        Cmd::PtrIncr { ptr, count, dst, .. } => {
            rebase_operand(ptr, register_base);
            rebase_operand(count, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::Field { base, dst, .. } => {
            rebase_operand(base, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::VariantType { ptr, dst, .. }
        | Cmd::VariantValue { ptr, dst, .. }
        | Cmd::ArrayLength { ptr, dst, .. }
        | Cmd::ArrayData { ptr, dst, .. } => {
            rebase_operand(ptr, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::TypeCtor { dst, .. } => rebase_reg(dst, register_base),
        Cmd::UncondJump { target } => rebase_block(target, block_base),
        Cmd::CondJump { cond, if_true, if_false } => {
            rebase_operand(cond, register_base);
            rebase_block(if_true, block_base);
            rebase_block(if_false, block_base);
        }
        Cmd::ReturnJump => {}
        Cmd::Phi { dst, .. } => rebase_reg(dst, register_base),
        Cmd::Call { target, .. } => {
            if let CallTarget::Indirect(op) = target {
                rebase_operand(op, register_base);
            }
        }
        Cmd::SetReturn { value, .. } => rebase_operand(value, register_base),
        Cmd::Print { value, .. } => rebase_operand(value, register_base),
        Cmd::Bytes { dst, .. } | Cmd::Align { dst, .. } => rebase_reg(dst, register_base),
        Cmd::Cast { value, dst, .. } | Cmd::Trunc { value, dst, .. } | Cmd::Extend { value, dst, .. } => {
            rebase_operand(value, register_base);
            rebase_reg(dst, register_base);
        }
        Cmd::DebugIr => {}
        Cmd::Move { value, dst, .. } => {
            rebase_operand(value, register_base);
            rebase_reg(dst, register_base);
        }
    }
}

fn immediate_tag(v: Immediate) -> u8 {
    match v {
        Immediate::Bool(_) => 0,
        Immediate::I8(_) => 1,
        Immediate::I16(_) => 2,
        Immediate::I32(_) => 3,
        Immediate::I64(_) => 4,
        Immediate::U8(_) => 5,
        Immediate::U16(_) => 6,
        Immediate::U32(_) => 7,
        Immediate::U64(_) => 8,
        Immediate::F32(_) => 9,
        Immediate::F64(_) => 10,
        Immediate::Char(_) => 11,
        Immediate::Addr(_) => 12,
        Immediate::StringRef(_) => 13,
        Immediate::FuncRef(_) => 14,
        Immediate::TypeHandle(_) => 15,
    }
}

fn prim_tag(p: PrimType) -> u8 {
    match p {
        PrimType::I8 => 0,
        PrimType::I16 => 1,
        PrimType::I32 => 2,
        PrimType::I64 => 3,
        PrimType::U8 => 4,
        PrimType::U16 => 5,
        PrimType::U32 => 6,
        PrimType::U64 => 7,
        PrimType::F32 => 8,
        PrimType::F64 => 9,
        PrimType::Bool => 10,
        PrimType::Char => 11,
    }
}

fn prim_from_tag(tag: u8) -> PrimType {
    match tag {
        0 => PrimType::I8,
        1 => PrimType::I16,
        2 => PrimType::I32,
        3 => PrimType::I64,
        4 => PrimType::U8,
        5 => PrimType::U16,
        6 => PrimType::U32,
        7 => PrimType::U64,
        8 => PrimType::F32,
        9 => PrimType::F64,
        10 => PrimType::Bool,
        11 => PrimType::Char,
        other => panic!("corrupt packed buffer: unknown primitive type tag {other}"),
    }
}

fn arith_from_tag(tag: u8) -> ArithOp {
    match tag {
        0 => ArithOp::Add,
        1 => ArithOp::Sub,
        2 => ArithOp::Mul,
        3 => ArithOp::Div,
        4 => ArithOp::Mod,
        other => panic!("corrupt packed buffer: unknown arith op tag {other}"),
    }
}

fn cmp_from_tag(tag: u8) -> CmpOp {
    match tag {
        0 => CmpOp::Eq,
        1 => CmpOp::Ne,
        2 => CmpOp::Lt,
        3 => CmpOp::Le,
        4 => CmpOp::Gt,
        5 => CmpOp::Ge,
        other => panic!("corrupt packed buffer: unknown cmp op tag {other}"),
    }
}

fn bit_from_tag(tag: u8) -> BitOp {
    match tag {
        0 => BitOp::And,
        1 => BitOp::Or,
        2 => BitOp::Xor,
        other => panic!("corrupt packed buffer: unknown bit op tag {other}"),
    }
}

fn type_ctor_from_tag(tag: u8) -> TypeCtorKind {
    match tag {
        0 => TypeCtorKind::Ptr,
        1 => TypeCtorKind::BufPtr,
        2 => TypeCtorKind::Arrow,
        3 => TypeCtorKind::Array,
        4 => TypeCtorKind::Tuple,
        5 => TypeCtorKind::Variant,
        6 => TypeCtorKind::Struct,
        7 => TypeCtorKind::Enum,
        8 => TypeCtorKind::Flags,
        9 => TypeCtorKind::BlockSeq,
        other => panic!("corrupt packed buffer: unknown type constructor tag {other}"),
    }
}

/// A read cursor over a `CmdBuffer`, advancing by exactly the types that
/// `CmdBuffer::append` wrote.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn read_u8(&mut self) -> u8 {
        let v = self.bytes[self.pos];
        self.pos += 1;
        v
    }
    fn read_u16(&mut self) -> u16 {
        let v = u16::from_le_bytes(self.bytes[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }
    fn read_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
    fn read_u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }
    fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }
    fn read_i16(&mut self) -> i16 {
        let v = i16::from_le_bytes(self.bytes[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }
    fn read_i32(&mut self) -> i32 {
        let v = i32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
    fn read_i64(&mut self) -> i64 {
        let v = i64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }
    fn read_f32(&mut self) -> f32 {
        let v = f32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
    fn read_f64(&mut self) -> f64 {
        let v = f64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }
    fn read_reg(&mut self) -> Register {
        Register::from_raw(self.read_u64())
    }
    fn read_prim(&mut self) -> PrimType {
        prim_from_tag(self.read_u8())
    }

    fn read_addr(&mut self) -> Address {
        match self.read_u8() {
            0 => Address::Null,
            1 => Address::Stack(self.read_u32()),
            2 => Address::Heap(self.read_u32()),
            3 => Address::Global(self.read_u32()),
            other => panic!("corrupt packed buffer: unknown address tag {other}"),
        }
    }

    fn read_immediate_payload(&mut self, tag: u8) -> Immediate {
        match tag {
            0 => Immediate::Bool(self.read_u8() != 0),
            1 => Immediate::I8(self.read_i8()),
            2 => Immediate::I16(self.read_i16()),
            3 => Immediate::I32(self.read_i32()),
            4 => Immediate::I64(self.read_i64()),
            5 => Immediate::U8(self.read_u8()),
            6 => Immediate::U16(self.read_u16()),
            7 => Immediate::U32(self.read_u32()),
            8 => Immediate::U64(self.read_u64()),
            9 => Immediate::F32(self.read_f32()),
            10 => Immediate::F64(self.read_f64()),
            11 => {
                let raw = self.read_u32();
                Immediate::Char(char::from_u32(raw).unwrap_or('\u{FFFD}'))
            }
            12 => Immediate::Addr(self.read_addr()),
            13 => Immediate::StringRef(self.read_u32()),
            14 => Immediate::FuncRef(self.read_u32()),
            15 => Immediate::TypeHandle(self.read_u32()),
            other => panic!("corrupt packed buffer: unknown immediate tag {other}"),
        }
    }

    fn read_operand(&mut self) -> Operand {
        let tag = self.read_u8();
        if tag == 0xFF {
            Operand::Reg(self.read_reg())
        } else {
            Operand::Imm(self.read_immediate_payload(tag))
        }
    }

    /// Decode the next instruction, advancing the cursor past it. Returns
    /// `None` at end of buffer. Spans are not round-tripped through the
    /// packed form (they exist only for diagnostics, which only ever run
    /// against the structured form); decoded commands carry a synthetic
    /// span.
    pub fn read_next(&mut self) -> Option<Cmd> {
        if self.at_end() {
            return None;
        }
        let idx = OpIndex::from_u16(self.read_u16())
            .unwrap_or_else(|| panic!("corrupt packed buffer at byte {}", self.pos));
        let span = Span::synthetic();
        let cmd = match idx {
            OpIndex::Arith => {
                let op = arith_from_tag(self.read_u8());
                let prim = self.read_prim();
                let lhs = self.read_operand();
                let rhs = self.read_operand();
                let dst = self.read_reg();
                Cmd::Arith { op, prim, lhs, rhs, dst, span }
            }
            OpIndex::Cmp => {
                let op = cmp_from_tag(self.read_u8());
                let prim = self.read_prim();
                let lhs = self.read_operand();
                let rhs = self.read_operand();
                let dst = self.read_reg();
                Cmd::Cmp { op, prim, lhs, rhs, dst, span }
            }
            OpIndex::Not => {
                let value = self.read_operand();
                let dst = self.read_reg();
                Cmd::Not { value, dst, span }
            }
            OpIndex::Bit => {
                let op = bit_from_tag(self.read_u8());
                let lhs = self.read_operand();
                let rhs = self.read_operand();
                let dst = self.read_reg();
                Cmd::Bit { op, lhs, rhs, dst, span }
            }
            OpIndex::Alloca => {
                let type_index = self.read_u32();
                let dst = self.read_reg();
                Cmd::Alloca { type_index, dst, span }
            }
            OpIndex::Load => {
                let prim = self.read_prim();
                let addr = self.read_operand();
                let dst = self.read_reg();
                Cmd::Load { prim, addr, dst, span }
            }
            OpIndex::Store => {
                let prim = self.read_prim();
                let addr = self.read_operand();
                let value = self.read_operand();
                Cmd::Store { prim, addr, value, span }
            }
            OpIndex::PtrIncr => {
                let ptr = self.read_operand();
                let count = self.read_operand();
                let stride = self.read_u32();
                let dst = self.read_reg();
                Cmd::PtrIncr { ptr, count, stride, dst, span }
            }
            OpIndex::Field => {
                let base = self.read_operand();
                let offset = self.read_u32();
                let dst = self.read_reg();
                Cmd::Field { base, offset, dst, span }
            }
            OpIndex::VariantType => {
                let ptr = self.read_operand();
                let dst = self.read_reg();
                Cmd::VariantType { ptr, dst, span }
            }
            OpIndex::VariantValue => {
                let ptr = self.read_operand();
                let payload_offset = self.read_u32();
                let dst = self.read_reg();
                Cmd::VariantValue { ptr, payload_offset, dst, span }
            }
            OpIndex::ArrayLength => {
                let ptr = self.read_operand();
                let dst = self.read_reg();
                Cmd::ArrayLength { ptr, dst, span }
            }
            OpIndex::ArrayData => {
                let ptr = self.read_operand();
                let dst = self.read_reg();
                Cmd::ArrayData { ptr, dst, span }
            }
            OpIndex::TypeCtor => {
                let kind = type_ctor_from_tag(self.read_u8());
                let args = self.read_u32();
                let dst = self.read_reg();
                Cmd::TypeCtor { kind, args, dst, span }
            }
            OpIndex::UncondJump => {
                let target = BlockId(self.read_u32());
                Cmd::UncondJump { target }
            }
            OpIndex::CondJump => {
                let cond = self.read_operand();
                let if_true = BlockId(self.read_u32());
                let if_false = BlockId(self.read_u32());
                Cmd::CondJump { cond, if_true, if_false }
            }
            OpIndex::ReturnJump => Cmd::ReturnJump,
            OpIndex::Phi => {
                let table = self.read_u32();
                let dst = self.read_reg();
                Cmd::Phi { table, dst, span }
            }
            OpIndex::Call => {
                let target = match self.read_u8() {
                    0 => CallTarget::Direct(FuncId(self.read_u32())),
                    1 => CallTarget::Indirect(self.read_operand()),
                    2 => {
                        let len = self.read_u32() as usize;
                        let bytes = &self.bytes[self.pos..self.pos + len];
                        self.pos += len;
                        CallTarget::Foreign(String::from_utf8_lossy(bytes).into_owned())
                    }
                    other => panic!("corrupt packed buffer: unknown call target tag {other}"),
                };
                let args = self.read_u32();
                let out_params = match self.read_u8() {
                    0 => None,
                    1 => Some(self.read_u32()),
                    other => panic!("corrupt packed buffer: unknown out-param presence tag {other}"),
                };
                Cmd::Call { target, args, out_params, span }
            }
            OpIndex::SetReturn => {
                let index = self.read_u32();
                let value = self.read_operand();
                Cmd::SetReturn { index, value, span }
            }
            OpIndex::Print => {
                let prim = self.read_prim();
                let value = self.read_operand();
                Cmd::Print { prim, value, span }
            }
            OpIndex::Bytes => {
                let type_index = self.read_u32();
                let dst = self.read_reg();
                Cmd::Bytes { type_index, dst }
            }
            OpIndex::Align => {
                let type_index = self.read_u32();
                let dst = self.read_reg();
                Cmd::Align { type_index, dst }
            }
            OpIndex::Cast => {
                let from = self.read_prim();
                let to = self.read_prim();
                let value = self.read_operand();
                let dst = self.read_reg();
                Cmd::Cast { from, to, value, dst, span }
            }
            OpIndex::Trunc => {
                let from = self.read_prim();
                let to = self.read_prim();
                let value = self.read_operand();
                let dst = self.read_reg();
                Cmd::Trunc { from, to, value, dst, span }
            }
            OpIndex::Extend => {
                let from = self.read_prim();
                let to = self.read_prim();
                let value = self.read_operand();
                let dst = self.read_reg();
                Cmd::Extend { from, to, value, dst, span }
            }
            OpIndex::DebugIr => Cmd::DebugIr,
            OpIndex::Move => {
                let value = self.read_operand();
                let dst = self.read_reg();
                Cmd::Move { value, dst, span }
            }
        };
        Some(cmd)
    }
}
