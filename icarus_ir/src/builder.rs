//! The emission API the elaborator drives to produce IR (spec §4.2).
//!
//! `Builder<'f>` carries the "current function" / "current block" cursor
//! explicitly as owned fields rather than as process-wide statics (see
//! DESIGN.md and the spec's Design Notes on global mutable state): every
//! nested compile-time evaluation constructs its own `Builder` over its own
//! ad-hoc `Func` and never shares state with an enclosing invocation.

use crate::block::{BlockId, PhiTable};
use crate::cmd::{CallTarget, Cmd, OutDest};
use crate::function::Func;
use crate::operand::{Immediate, Operand};
use crate::opcode::{ArithOp, BitOp, CmpOp, TypeCtorKind};
use crate::register::Register;
use icarus_support::Span;
use icarus_types::layout::Arch;
use icarus_types::{PrimType, Type};

/// Emission context: the function currently being built and a cursor over
/// one of its blocks. Dropping a `Builder` leaves the underlying `Func` in
/// whatever state it was last left — callers are expected to always close
/// every block with a terminator before the builder goes out of scope.
pub struct Builder<'f> {
    func: &'f mut Func,
    current: BlockId,
    arch: Arch,
}

impl<'f> Builder<'f> {
    pub fn new(func: &'f mut Func, arch: Arch) -> Self {
        let current = func.entry_block();
        Builder { func, current, arch }
    }

    pub fn func(&self) -> &Func {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Func {
        self.func
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn set_current(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn add_block(&mut self) -> BlockId {
        self.func.add_block()
    }

    /// Advances the frame, aligning to `ty`'s alignment, and returns the
    /// freshly reserved register. Does not append any instruction.
    pub fn reserve(&mut self, ty: &Type) -> Register {
        self.func.reserve(ty, self.arch)
    }

    fn push(&mut self, block: BlockId, cmd: Cmd) {
        if let Some(dst) = cmd.dst() {
            let index = self.func.block(block).instructions.len();
            self.func.record_definition(dst, block, index);
        }
        self.func.block_mut(block).push(cmd);
    }

    fn push_current(&mut self, cmd: Cmd) {
        let block = self.current;
        self.push(block, cmd);
    }

    /// Reserves a stack slot of `ty` and records it in the function's
    /// allocation table. Always lands in the entry block, grouping every
    /// `Alloca` there regardless of the current cursor, per spec.
    pub fn alloca(&mut self, ty: Type, span: Span) -> Register {
        let dst = self.reserve(&ty);
        let type_index = self.func.types.intern(ty.clone());
        let entry = self.func.entry_block();
        self.push(entry, Cmd::Alloca { type_index, dst, span });
        self.func.allocations.push((dst, ty));
        dst
    }

    // --- Arithmetic / comparison / bitwise, with immediate folding -----

    /// Emits (or folds) a binary arithmetic op. If both operands are
    /// compile-time-known immediates of matching type, folds to an
    /// immediate and appends nothing (spec §4.1 contract). Division and
    /// modulo by a literal zero are deliberately NOT folded, so the fault
    /// surfaces uniformly through the interpreter's runtime division-by-zero
    /// path (§4.4 failure modes) whether or not the divisor happened to be
    /// known at build time.
    pub fn arith(&mut self, op: ArithOp, prim: PrimType, lhs: Operand, rhs: Operand, span: Span) -> Operand {
        if let (Operand::Imm(l), Operand::Imm(r)) = (lhs, rhs) {
            if let Some(folded) = fold::arith(op, prim, l, r) {
                return Operand::Imm(folded);
            }
        }
        let dst = self.reserve(&Type::Primitive(prim));
        self.push_current(Cmd::Arith { op, prim, lhs, rhs, dst, span });
        Operand::Reg(dst)
    }

    pub fn cmp(&mut self, op: CmpOp, prim: PrimType, lhs: Operand, rhs: Operand, span: Span) -> Operand {
        if let (Operand::Imm(l), Operand::Imm(r)) = (lhs, rhs) {
            if let Some(folded) = fold::cmp(op, prim, l, r) {
                return Operand::Imm(Immediate::Bool(folded));
            }
        }
        let dst = self.reserve(&Type::Primitive(PrimType::Bool));
        self.push_current(Cmd::Cmp { op, prim, lhs, rhs, dst, span });
        Operand::Reg(dst)
    }

    pub fn not(&mut self, value: Operand, span: Span) -> Operand {
        if let Operand::Imm(Immediate::Bool(b)) = value {
            return Operand::Imm(Immediate::Bool(!b));
        }
        let dst = self.reserve(&Type::Primitive(PrimType::Bool));
        self.push_current(Cmd::Not { value, dst, span });
        Operand::Reg(dst)
    }

    pub fn bit(&mut self, op: BitOp, lhs: Operand, rhs: Operand, span: Span) -> Operand {
        if let (Operand::Imm(l), Operand::Imm(r)) = (lhs, rhs) {
            if let (Some(lb), Some(rb)) = (l.as_bool(), r.as_bool()) {
                let folded = match op {
                    BitOp::And => lb && rb,
                    BitOp::Or => lb || rb,
                    BitOp::Xor => lb ^ rb,
                };
                return Operand::Imm(Immediate::Bool(folded));
            }
            if let (Some(li), Some(ri)) = (l.as_i64(), r.as_i64()) {
                let folded = match op {
                    BitOp::And => li & ri,
                    BitOp::Or => li | ri,
                    BitOp::Xor => li ^ ri,
                };
                return Operand::Imm(Immediate::U64(folded as u64));
            }
        }
        let dst = self.reserve(&Type::Primitive(PrimType::Bool));
        self.push_current(Cmd::Bit { op, lhs, rhs, dst, span });
        Operand::Reg(dst)
    }

    // --- Memory ----------------------------------------------------------

    pub fn load(&mut self, prim: PrimType, addr: Operand, span: Span) -> Register {
        let dst = self.reserve(&Type::Primitive(prim));
        self.push_current(Cmd::Load { prim, addr, dst, span });
        dst
    }

    pub fn store(&mut self, prim: PrimType, addr: Operand, value: Operand, span: Span) {
        self.push_current(Cmd::Store { prim, addr, value, span });
    }

    pub fn ptr_incr(&mut self, ptr: Operand, count: Operand, stride: u32, pointee: &Type, span: Span) -> Register {
        let dst = self.reserve(&Type::BufferPointer(Box::new(pointee.clone())));
        self.push_current(Cmd::PtrIncr { ptr, count, stride, dst, span });
        dst
    }

    pub fn field(&mut self, base: Operand, offset: u32, field_ty: &Type, span: Span) -> Register {
        let dst = self.reserve(&Type::Pointer(Box::new(field_ty.clone())));
        self.push_current(Cmd::Field { base, offset, dst, span });
        dst
    }

    pub fn variant_type(&mut self, ptr: Operand, span: Span) -> Register {
        let dst = self.reserve(&Type::Primitive(PrimType::U64));
        self.push_current(Cmd::VariantType { ptr, dst, span });
        dst
    }

    pub fn variant_value(&mut self, ptr: Operand, payload_offset: u32, result_ty: &Type, span: Span) -> Register {
        let dst = self.reserve(&Type::Pointer(Box::new(result_ty.clone())));
        self.push_current(Cmd::VariantValue { ptr, payload_offset, dst, span });
        dst
    }

    pub fn array_length(&mut self, ptr: Operand, span: Span) -> Register {
        let dst = self.reserve(&Type::Primitive(PrimType::U32));
        self.push_current(Cmd::ArrayLength { ptr, dst, span });
        dst
    }

    pub fn array_data(&mut self, ptr: Operand, element_ty: &Type, span: Span) -> Register {
        let dst = self.reserve(&Type::BufferPointer(Box::new(element_ty.clone())));
        self.push_current(Cmd::ArrayData { ptr, dst, span });
        dst
    }

    // --- Type constructors -------------------------------------------------

    /// Appends a type-constructor op, whose operand pack is a separately
    /// stored side list (the packed buffer carries only its index). The
    /// interpreter's only obligation is to hand back a stable `TypeHandle`;
    /// it never inspects the pack's contents itself.
    pub fn type_ctor(&mut self, kind: TypeCtorKind, args: Vec<Operand>, span: Span) -> Register {
        let dst = self.reserve(&Type::Primitive(PrimType::U32));
        let block = self.current;
        let pack = self.func.block_mut(block).push_type_ctor_args(args);
        self.push_current(Cmd::TypeCtor { kind, args: pack, dst, span });
        dst
    }

    // --- Control flow -------------------------------------------------------

    pub fn jump(&mut self, target: BlockId) {
        self.push_current(Cmd::UncondJump { target });
    }

    pub fn cond_jump(&mut self, cond: Operand, if_true: BlockId, if_false: BlockId) {
        self.push_current(Cmd::CondJump { cond, if_true, if_false });
    }

    pub fn return_jump(&mut self) {
        self.push_current(Cmd::ReturnJump);
    }

    /// Emits a placeholder phi whose argument table is empty; the caller
    /// must follow up with `make_phi` once every incoming value is known
    /// (typically once every predecessor block has been emitted).
    pub fn phi(&mut self, ty: Type) -> (Register, usize) {
        let block = self.current;
        let table_index = self.func.block_mut(block).push_phi_table(Vec::new());
        let dst = self.reserve(&ty);
        let cmd_index = self.func.block(block).instructions.len();
        self.push(block, Cmd::Phi { table: table_index, dst, span: Span::synthetic() });
        (dst, cmd_index)
    }

    /// Fills in a phi's incoming-value table. `cmd_index` is the index
    /// returned by `phi`; `block` is the block the phi lives in (normally
    /// the one current when `phi` was called).
    pub fn make_phi(&mut self, block: BlockId, cmd_index: usize, entries: PhiTable) {
        let table_index = match &self.func.block(block).instructions[cmd_index] {
            Cmd::Phi { table, .. } => *table,
            other => panic!("make_phi targeted a non-phi instruction: {other:?}"),
        };
        self.func.block_mut(block).phi_tables[table_index as usize] = entries;
    }

    pub fn call(&mut self, target: CallTarget, args: Vec<Operand>, out_params: Vec<OutDest>, span: Span) {
        let block = self.current;
        let args_index = self.func.block_mut(block).push_call_args(args);
        let out_index = if out_params.is_empty() {
            None
        } else {
            Some(self.func.block_mut(block).push_out_params(out_params))
        };
        self.push_current(Cmd::Call { target, args: args_index, out_params: out_index, span });
    }

    pub fn set_return(&mut self, index: u32, value: Operand, span: Span) {
        self.push_current(Cmd::SetReturn { index, value, span });
    }

    pub fn mov(&mut self, value: Operand, dst: Register, span: Span) {
        self.push_current(Cmd::Move { value, dst, span });
    }

    // --- I/O and misc --------------------------------------------------------

    pub fn print(&mut self, prim: PrimType, value: Operand, span: Span) {
        self.push_current(Cmd::Print { prim, value, span });
    }

    pub fn bytes_of(&mut self, ty: Type, span: Span) -> Register {
        let type_index = self.func.types.intern(ty);
        let dst = self.reserve(&Type::Primitive(PrimType::U32));
        self.push(self.current, Cmd::Bytes { type_index, dst });
        let _ = span;
        dst
    }

    pub fn align_of(&mut self, ty: Type, span: Span) -> Register {
        let type_index = self.func.types.intern(ty);
        let dst = self.reserve(&Type::Primitive(PrimType::U32));
        self.push(self.current, Cmd::Align { type_index, dst });
        let _ = span;
        dst
    }

    pub fn cast(&mut self, from: PrimType, to: PrimType, value: Operand, span: Span) -> Operand {
        if let Operand::Imm(v) = value {
            if let Some(folded) = fold::cast(to, v) {
                return Operand::Imm(folded);
            }
        }
        let dst = self.reserve(&Type::Primitive(to));
        self.push_current(Cmd::Cast { from, to, value, dst, span });
        Operand::Reg(dst)
    }

    pub fn trunc(&mut self, from: PrimType, to: PrimType, value: Operand, span: Span) -> Operand {
        let dst = self.reserve(&Type::Primitive(to));
        self.push_current(Cmd::Trunc { from, to, value, dst, span });
        Operand::Reg(dst)
    }

    pub fn extend(&mut self, from: PrimType, to: PrimType, value: Operand, span: Span) -> Operand {
        let dst = self.reserve(&Type::Primitive(to));
        self.push_current(Cmd::Extend { from, to, value, dst, span });
        Operand::Reg(dst)
    }

    pub fn debug_ir(&mut self) {
        self.push_current(Cmd::DebugIr);
    }
}

/// Compile-time constant folding for immediate-only operands, shared by
/// `Builder::arith`/`cmp`/`cast`. Kept separate from dispatch so the
/// per-primitive-type match stays in one place instead of spread across
/// every call site.
mod fold {
    use crate::opcode::{ArithOp, CmpOp};
    use crate::operand::Immediate;
    use icarus_types::PrimType;

    pub fn arith(op: ArithOp, prim: PrimType, lhs: Immediate, rhs: Immediate) -> Option<Immediate> {
        if prim.is_float() {
            let l = lhs.as_f64()?;
            let r = rhs.as_f64()?;
            let v = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div | ArithOp::Mod if r == 0.0 => return None,
                ArithOp::Div => l / r,
                ArithOp::Mod => l % r,
            };
            return Some(reconstruct_float(prim, v));
        }
        let l = lhs.as_i64()?;
        let r = rhs.as_i64()?;
        if matches!(op, ArithOp::Div | ArithOp::Mod) && r == 0 {
            return None;
        }
        let v = match op {
            ArithOp::Add => l.wrapping_add(r),
            ArithOp::Sub => l.wrapping_sub(r),
            ArithOp::Mul => l.wrapping_mul(r),
            ArithOp::Div => l.wrapping_div(r),
            ArithOp::Mod => l.wrapping_rem(r),
        };
        Some(reconstruct_int(prim, v))
    }

    pub fn cmp(op: CmpOp, prim: PrimType, lhs: Immediate, rhs: Immediate) -> Option<bool> {
        if prim.is_float() {
            let l = lhs.as_f64()?;
            let r = rhs.as_f64()?;
            return Some(match op {
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
            });
        }
        let l = lhs.as_i64()?;
        let r = rhs.as_i64()?;
        Some(match op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
        })
    }

    pub fn cast(to: PrimType, value: Immediate) -> Option<Immediate> {
        if to.is_float() {
            let v = value.as_f64()?;
            return Some(reconstruct_float(to, v));
        }
        let v = value.as_i64()?;
        Some(reconstruct_int(to, v))
    }

    fn reconstruct_int(prim: PrimType, v: i64) -> Immediate {
        match prim {
            PrimType::I8 => Immediate::I8(v as i8),
            PrimType::I16 => Immediate::I16(v as i16),
            PrimType::I32 => Immediate::I32(v as i32),
            PrimType::I64 => Immediate::I64(v),
            PrimType::U8 => Immediate::U8(v as u8),
            PrimType::U16 => Immediate::U16(v as u16),
            PrimType::U32 => Immediate::U32(v as u32),
            PrimType::U64 => Immediate::U64(v as u64),
            PrimType::Bool => Immediate::Bool(v != 0),
            PrimType::Char => Immediate::Char(char::from_u32(v as u32).unwrap_or('\u{FFFD}')),
            PrimType::F32 | PrimType::F64 => unreachable!("reconstruct_int called with a float prim"),
        }
    }

    fn reconstruct_float(prim: PrimType, v: f64) -> Immediate {
        match prim {
            PrimType::F32 => Immediate::F32(v as f32),
            PrimType::F64 => Immediate::F64(v),
            _ => unreachable!("reconstruct_float called with a non-float prim"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Func;

    fn new_func() -> Func {
        Func::new("f", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64)
    }

    #[test]
    fn arithmetic_fold_through_leaves_no_instructions() {
        let mut func = new_func();
        let mut b = Builder::new(&mut func, Arch::X86_64);
        let two = Operand::Imm(Immediate::I32(2));
        let three = Operand::Imm(Immediate::I32(3));
        let four = Operand::Imm(Immediate::I32(4));
        let span = Span::synthetic();
        let product = b.arith(ArithOp::Mul, PrimType::I32, three, four, span);
        let sum = b.arith(ArithOp::Add, PrimType::I32, two, product, span);
        assert_eq!(sum, Operand::Imm(Immediate::I32(14)));
        b.set_return(0, sum, span);
        b.return_jump();
        assert!(func.block(BlockId(0)).instructions.iter().all(|c| !matches!(c, Cmd::Arith { .. })));
    }

    #[test]
    fn division_by_literal_zero_is_not_folded() {
        let mut func = new_func();
        let mut b = Builder::new(&mut func, Arch::X86_64);
        let one = Operand::Imm(Immediate::I32(1));
        let zero = Operand::Imm(Immediate::I32(0));
        let result = b.arith(ArithOp::Div, PrimType::I32, one, zero, Span::synthetic());
        assert!(matches!(result, Operand::Reg(_)));
        assert!(func.block(BlockId(0)).instructions.iter().any(|c| matches!(c, Cmd::Arith { op: ArithOp::Div, .. })));
    }

    #[test]
    fn alloca_always_lands_in_the_entry_block_regardless_of_cursor() {
        let mut func = new_func();
        let other = func.add_block();
        let mut b = Builder::new(&mut func, Arch::X86_64);
        b.set_current(other);
        b.alloca(Type::Primitive(PrimType::I32), Span::synthetic());
        assert!(matches!(func.block(BlockId(0)).instructions[0], Cmd::Alloca { .. }));
        assert!(func.block(other).instructions.is_empty());
    }

    #[test]
    fn phi_table_is_filled_in_after_both_branches_are_known() {
        let mut func = new_func();
        let then_block = func.add_block();
        let else_block = func.add_block();
        let join_block = func.add_block();
        let mut b = Builder::new(&mut func, Arch::X86_64);
        b.set_current(join_block);
        let (phi_reg, phi_idx) = b.phi(Type::Primitive(PrimType::I32));
        b.make_phi(
            join_block,
            phi_idx,
            vec![
                (then_block, Operand::Imm(Immediate::I32(1))),
                (else_block, Operand::Imm(Immediate::I32(2))),
            ],
        );
        b.set_return(0, Operand::Reg(phi_reg), Span::synthetic());
        b.return_jump();
        match &func.block(join_block).instructions[0] {
            Cmd::Phi { table, .. } => assert_eq!(func.block(join_block).phi_tables[*table as usize].len(), 2),
            other => panic!("expected a phi, found {other:?}"),
        }
    }
}
