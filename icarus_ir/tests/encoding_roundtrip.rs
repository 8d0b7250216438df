//! Every `Cmd` variant, once appended to a `CmdBuffer`, must decode back to
//! an equal `Cmd` (spans aside: the packed form never round-trips them, so
//! every sample here uses `Span::synthetic()`, which decodes the same way).

use icarus_ir::{
    Address, ArithOp, BitOp, CallTarget, Cmd, CmdBuffer, CmpOp, FuncId, Immediate, OpIndex,
    Operand, OutDest, Register, TypeCtorKind,
};
use icarus_support::Span;
use icarus_types::PrimType;
use proptest::prelude::*;

fn roundtrip(cmd: Cmd) {
    let mut buf = CmdBuffer::new();
    buf.append(&cmd);
    let mut cursor = buf.cursor();
    let decoded = cursor.read_next().expect("buffer produced no instruction");
    assert_eq!(decoded, cmd);
    assert!(cursor.at_end(), "buffer contained trailing bytes after one instruction");
}

#[test]
fn arith_roundtrips() {
    roundtrip(Cmd::Arith {
        op: ArithOp::Mul,
        prim: PrimType::I32,
        lhs: Operand::Reg(Register::ordinary(3)),
        rhs: Operand::Imm(Immediate::I32(-7)),
        dst: Register::ordinary(4),
        span: Span::synthetic(),
    });
}

#[test]
fn cmp_roundtrips() {
    roundtrip(Cmd::Cmp {
        op: CmpOp::Le,
        prim: PrimType::F64,
        lhs: Operand::Reg(Register::parameter(0)),
        rhs: Operand::Imm(Immediate::F64(2.5)),
        dst: Register::ordinary(0),
        span: Span::synthetic(),
    });
}

#[test]
fn not_roundtrips() {
    roundtrip(Cmd::Not { value: Operand::Imm(Immediate::Bool(true)), dst: Register::ordinary(0), span: Span::synthetic() });
}

#[test]
fn bit_roundtrips() {
    roundtrip(Cmd::Bit {
        op: BitOp::Xor,
        lhs: Operand::Reg(Register::ordinary(1)),
        rhs: Operand::Reg(Register::ordinary(2)),
        dst: Register::ordinary(3),
        span: Span::synthetic(),
    });
}

#[test]
fn alloca_roundtrips() {
    roundtrip(Cmd::Alloca { type_index: 5, dst: Register::ordinary(0), span: Span::synthetic() });
}

#[test]
fn load_and_store_roundtrip() {
    roundtrip(Cmd::Load {
        prim: PrimType::U64,
        addr: Operand::Imm(Immediate::Addr(Address::Stack(16))),
        dst: Register::ordinary(0),
        span: Span::synthetic(),
    });
    roundtrip(Cmd::Store {
        prim: PrimType::U64,
        addr: Operand::Imm(Immediate::Addr(Address::Heap(32))),
        value: Operand::Reg(Register::ordinary(1)),
        span: Span::synthetic(),
    });
}

#[test]
fn ptr_incr_roundtrips() {
    roundtrip(Cmd::PtrIncr {
        ptr: Operand::Reg(Register::ordinary(0)),
        count: Operand::Imm(Immediate::U32(3)),
        stride: 8,
        dst: Register::ordinary(1),
        span: Span::synthetic(),
    });
}

#[test]
fn field_roundtrips() {
    roundtrip(Cmd::Field { base: Operand::Reg(Register::ordinary(0)), offset: 12, dst: Register::ordinary(1), span: Span::synthetic() });
}

#[test]
fn variant_ops_roundtrip() {
    roundtrip(Cmd::VariantType { ptr: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
    roundtrip(Cmd::VariantValue {
        ptr: Operand::Reg(Register::ordinary(0)),
        payload_offset: 8,
        dst: Register::ordinary(1),
        span: Span::synthetic(),
    });
}

#[test]
fn array_ops_roundtrip() {
    roundtrip(Cmd::ArrayLength { ptr: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
    roundtrip(Cmd::ArrayData { ptr: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
}

#[test]
fn type_ctor_roundtrips() {
    roundtrip(Cmd::TypeCtor { kind: TypeCtorKind::Struct, args: 2, dst: Register::ordinary(0), span: Span::synthetic() });
}

#[test]
fn jumps_roundtrip() {
    roundtrip(Cmd::UncondJump { target: icarus_ir::BlockId(7) });
    roundtrip(Cmd::CondJump {
        cond: Operand::Imm(Immediate::Bool(false)),
        if_true: icarus_ir::BlockId(1),
        if_false: icarus_ir::BlockId(2),
    });
    roundtrip(Cmd::ReturnJump);
}

#[test]
fn phi_roundtrips() {
    roundtrip(Cmd::Phi { table: 4, dst: Register::ordinary(0), span: Span::synthetic() });
}

#[test]
fn call_roundtrips_every_target_kind() {
    roundtrip(Cmd::Call { target: CallTarget::Direct(FuncId(9)), args: 0, out_params: None, span: Span::synthetic() });
    roundtrip(Cmd::Call {
        target: CallTarget::Indirect(Operand::Reg(Register::ordinary(0))),
        args: 1,
        out_params: Some(2),
        span: Span::synthetic(),
    });
    roundtrip(Cmd::Call {
        target: CallTarget::Foreign("memcpy".to_string()),
        args: 3,
        out_params: None,
        span: Span::synthetic(),
    });
}

#[test]
fn set_return_roundtrips() {
    roundtrip(Cmd::SetReturn { index: 0, value: Operand::Imm(Immediate::I64(-1)), span: Span::synthetic() });
}

#[test]
fn print_roundtrips() {
    roundtrip(Cmd::Print { prim: PrimType::Char, value: Operand::Imm(Immediate::Char('x')), span: Span::synthetic() });
}

#[test]
fn bytes_and_align_roundtrip() {
    roundtrip(Cmd::Bytes { type_index: 0, dst: Register::ordinary(0) });
    roundtrip(Cmd::Align { type_index: 1, dst: Register::ordinary(1) });
}

#[test]
fn cast_trunc_extend_roundtrip() {
    roundtrip(Cmd::Cast { from: PrimType::I64, to: PrimType::I32, value: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
    roundtrip(Cmd::Trunc { from: PrimType::U64, to: PrimType::U8, value: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
    roundtrip(Cmd::Extend { from: PrimType::I8, to: PrimType::I64, value: Operand::Reg(Register::ordinary(0)), dst: Register::ordinary(1), span: Span::synthetic() });
}

#[test]
fn debug_ir_roundtrips() {
    roundtrip(Cmd::DebugIr);
}

#[test]
fn move_roundtrips() {
    roundtrip(Cmd::Move { value: Operand::Imm(Immediate::U8(9)), dst: Register::ordinary(0), span: Span::synthetic() });
}

#[test]
fn op_index_from_u16_covers_every_discriminant_and_rejects_overflow() {
    for i in 0..OpIndex::COUNT {
        assert!(OpIndex::from_u16(i).is_some(), "missing OpIndex mapping for {i}");
    }
    assert!(OpIndex::from_u16(OpIndex::COUNT).is_none());
    assert!(OpIndex::from_u16(u16::MAX).is_none());
}

proptest! {
    /// Arithmetic on every primitive width and both register/immediate
    /// operand shapes round-trips byte-for-byte.
    #[test]
    fn arith_roundtrips_across_immediate_values(lhs in any::<i32>(), rhs in any::<i32>(), use_reg in any::<bool>()) {
        let lhs_op = Operand::Imm(Immediate::I32(lhs));
        let rhs_op = if use_reg { Operand::Reg(Register::ordinary(1)) } else { Operand::Imm(Immediate::I32(rhs)) };
        roundtrip(Cmd::Arith { op: ArithOp::Add, prim: PrimType::I32, lhs: lhs_op, rhs: rhs_op, dst: Register::ordinary(0), span: Span::synthetic() });
    }

    /// Stack/Heap/Global addresses at arbitrary offsets round-trip through
    /// both the `Address` wire tag and the surrounding `Load` instruction.
    #[test]
    fn load_roundtrips_across_every_address_kind(offset in any::<u32>(), kind in 0u8..3) {
        let addr = match kind {
            0 => Address::Stack(offset),
            1 => Address::Heap(offset),
            _ => Address::Global(offset),
        };
        roundtrip(Cmd::Load { prim: PrimType::I64, addr: Operand::Imm(Immediate::Addr(addr)), dst: Register::ordinary(0), span: Span::synthetic() });
    }

    /// Ordinary register identities of arbitrary index round-trip as both
    /// destination and operand.
    #[test]
    fn register_identities_roundtrip(index in 0u64..(1u64 << 61)) {
        let reg = Register::ordinary(index);
        roundtrip(Cmd::Not { value: Operand::Reg(reg), dst: Register::ordinary(index.wrapping_add(1) % (1u64 << 61)), span: Span::synthetic() });
    }
}
