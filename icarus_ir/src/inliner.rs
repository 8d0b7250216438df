//! Splices one function's blocks into another (spec §4.3): used to realize
//! compile-time calls and "scope" bodies without a runtime call instruction.
//!
//! This implementation walks the callee's *structured* instruction form
//! (rather than patching the packed `CmdBuffer` bytes in place) because
//! inlining needs more than a register/block rebase: a callee's parameter
//! registers must be replaced by the operands the call site actually
//! supplied, and its `SetReturn`s must be translated into either a register
//! write or a pointer store depending on how the caller asked to receive
//! each output. Both of those are substitutions, not pure rebases, so the
//! translated `Cmd`s are re-appended to build a fresh `CmdBuffer` rather
//! than rebasing the old bytes directly (see DESIGN.md).

use std::collections::HashMap;

use crate::block::BlockId;
use crate::cmd::{CallTarget, Cmd, OutDest};
use crate::function::Func;
use crate::operand::Operand;
use crate::register::{Register, RegisterKind};
use icarus_support::Span;
use icarus_types::layout::Arch;
use icarus_types::{PrimType, Type};

/// Per-call translation tables built once at the start of `inline_into` and
/// consulted by every instruction it rewrites.
struct Rebase {
    /// Callee parameter index -> the operand the call site actually supplied.
    params: HashMap<u32, Operand>,
    /// Callee ordinary register -> freshly reserved caller register.
    ordinary: HashMap<Register, Register>,
    /// Callee block -> freshly appended caller block (the callee's own
    /// entry block has no entry here; its instructions are merged directly
    /// into the caller's entry block instead).
    blocks: HashMap<BlockId, BlockId>,
}

impl Rebase {
    fn operand(&self, op: Operand) -> Operand {
        match op {
            Operand::Imm(_) => op,
            Operand::Reg(r) => match r.kind() {
                RegisterKind::Parameter(i) => *self
                    .params
                    .get(&i)
                    .unwrap_or_else(|| panic!("callee parameter {i} has no supplied argument")),
                RegisterKind::Ordinary(_) => Operand::Reg(self.register(r)),
                RegisterKind::Output(_) => {
                    unreachable!("a callee's own instructions never reference Output registers directly")
                }
            },
        }
    }

    fn register(&self, r: Register) -> Register {
        *self.ordinary.get(&r).unwrap_or_else(|| panic!("register {r} has no caller-side translation"))
    }

    fn block(&self, b: BlockId) -> BlockId {
        *self.blocks.get(&b).unwrap_or_else(|| panic!("block {b} has no caller-side translation"))
    }
}

/// The `PrimType` an `OutDest::Ptr` store should carry: primitive outputs
/// store directly, everything else (pointers, aggregates) goes through this
/// crate's fixed pointer-word convention and so stores as a `U64` (see
/// DESIGN.md's pointer-word note).
fn store_prim_for(ty: &Type) -> PrimType {
    match ty {
        Type::Primitive(p) => *p,
        _ => PrimType::U64,
    }
}

/// Splices `callee` into `caller` at `pre_call_block`: merges its stack
/// allocations into `caller`'s entry block, appends translated copies of
/// every other block, rewrites `SetReturn`s per `out_dests`, and leaves a
/// fresh "landing" block as the jump target for every translated
/// `ReturnJump`. Returns that landing block; the caller is responsible for
/// making it the new current block.
///
/// `args` must have the same length as `callee.input_types`; `out_dests`
/// must have the same length as `callee.output_types`.
pub fn inline_into(
    caller: &mut Func,
    pre_call_block: BlockId,
    callee: &Func,
    args: &[Operand],
    out_dests: &[OutDest],
    arch: Arch,
) -> BlockId {
    assert_eq!(args.len(), callee.input_types.len(), "argument count must match callee input arity");
    assert_eq!(out_dests.len(), callee.output_types.len(), "out-param count must match callee output arity");

    let params: HashMap<u32, Operand> = args.iter().copied().enumerate().map(|(i, op)| (i as u32, op)).collect();

    // Reserve a fresh caller register for every ordinary register the
    // callee uses, in allocation order, so the caller's frame offsets come
    // out the same as if this code had been emitted directly into it.
    let mut ordinary = HashMap::new();
    for i in 0..callee.ordinary_register_count() {
        let old = Register::ordinary(i);
        let ty = callee.type_of(old).expect("every reserved ordinary register has a recorded type").clone();
        let new = caller.reserve(&ty, arch);
        ordinary.insert(old, new);
    }

    let mut blocks = HashMap::new();
    for i in 1..callee.blocks.len() as u32 {
        blocks.insert(BlockId(i), caller.add_block());
    }
    let landing = caller.add_block();

    let rebase = Rebase { params, ordinary, blocks };

    // The callee's entry block holds only its Allocas (the builder
    // guarantees this); splice them into the caller's own entry block,
    // which stays open until the function that owns it is done being
    // built.
    let callee_entry = callee.entry_block();
    let caller_entry = caller.entry_block();
    for cmd in &callee.block(callee_entry).instructions {
        match cmd {
            Cmd::Alloca { type_index, dst, span } => {
                let ty = callee.types.get(*type_index).clone();
                let new_type_index = caller.types.intern(ty.clone());
                let new_dst = rebase.register(*dst);
                caller.allocations.push((new_dst, ty));
                push_translated(caller, caller_entry, Cmd::Alloca { type_index: new_type_index, dst: new_dst, span: *span });
            }
            other if other.is_terminator() => {}
            other => panic!("callee entry block contains a non-alloca instruction: {other:?}"),
        }
    }

    // Translate every non-entry block's body, including its side tables.
    for i in 1..callee.blocks.len() as u32 {
        let old_id = BlockId(i);
        let new_id = rebase.block(old_id);
        for cmd in &callee.block(old_id).instructions {
            translate_and_push(caller, new_id, callee, old_id, cmd, &rebase, out_dests, landing);
        }
    }

    // The caller's pre-call block jumps straight to the translated form of
    // the callee's first real block (the entry block's sole successor).
    push_translated(caller, pre_call_block, Cmd::UncondJump { target: rebase.block(BlockId(1)) });

    landing
}

fn push_translated(func: &mut Func, block: BlockId, cmd: Cmd) {
    if let Some(dst) = cmd.dst() {
        let index = func.block(block).instructions.len();
        func.record_definition(dst, block, index);
    }
    func.block_mut(block).push(cmd);
}

/// Binds a translated callee output to wherever the call site asked for
/// it: a direct register write (`Cmd::Move`) or a store through a supplied
/// pointer.
fn translate_set_return(caller: &mut Func, block: BlockId, callee: &Func, index: u32, value: Operand, span: Span, out_dests: &[OutDest]) {
    match out_dests[index as usize] {
        OutDest::Reg(dst) => {
            push_translated(caller, block, Cmd::Move { value, dst, span });
        }
        OutDest::Ptr(ptr) => {
            let ty = &callee.output_types[index as usize];
            let prim = store_prim_for(ty);
            push_translated(caller, block, Cmd::Store { prim, addr: ptr, value, span });
        }
    }
}

/// Translates one callee instruction into the caller, handling the two
/// shapes that aren't plain operand/register/block substitution
/// (`ReturnJump` becomes a jump to the landing block, `SetReturn` becomes a
/// `Move` or `Store` depending on the call site's `OutDest`) and otherwise
/// rewriting operands, destination registers, block targets, and side-table
/// references in place.
fn translate_and_push(
    caller: &mut Func,
    new_block: BlockId,
    callee: &Func,
    old_block: BlockId,
    cmd: &Cmd,
    rebase: &Rebase,
    out_dests: &[OutDest],
    landing: BlockId,
) {
    match cmd {
        Cmd::ReturnJump => {
            push_translated(caller, new_block, Cmd::UncondJump { target: landing });
            return;
        }
        Cmd::SetReturn { index, value, span } => {
            translate_set_return(caller, new_block, callee, *index, rebase.operand(*value), *span, out_dests);
            return;
        }
        _ => {}
    }

    let translated = match cmd.clone() {
        Cmd::Arith { op, prim, lhs, rhs, dst, span } => {
            Cmd::Arith { op, prim, lhs: rebase.operand(lhs), rhs: rebase.operand(rhs), dst: rebase.register(dst), span }
        }
        Cmd::Cmp { op, prim, lhs, rhs, dst, span } => {
            Cmd::Cmp { op, prim, lhs: rebase.operand(lhs), rhs: rebase.operand(rhs), dst: rebase.register(dst), span }
        }
        Cmd::Not { value, dst, span } => Cmd::Not { value: rebase.operand(value), dst: rebase.register(dst), span },
        Cmd::Bit { op, lhs, rhs, dst, span } => {
            Cmd::Bit { op, lhs: rebase.operand(lhs), rhs: rebase.operand(rhs), dst: rebase.register(dst), span }
        }
        Cmd::Alloca { type_index, dst, span } => {
            let ty = callee.types.get(type_index).clone();
            let new_type_index = caller.types.intern(ty);
            Cmd::Alloca { type_index: new_type_index, dst: rebase.register(dst), span }
        }
        Cmd::Load { prim, addr, dst, span } => Cmd::Load { prim, addr: rebase.operand(addr), dst: rebase.register(dst), span },
        Cmd::Store { prim, addr, value, span } => {
            Cmd::Store { prim, addr: rebase.operand(addr), value: rebase.operand(value), span }
        }
        Cmd::PtrIncr { ptr, count, stride, dst, span } => Cmd::PtrIncr {
            ptr: rebase.operand(ptr),
            count: rebase.operand(count),
            stride,
            dst: rebase.register(dst),
            span,
        },
        Cmd::Field { base, offset, dst, span } => Cmd::Field { base: rebase.operand(base), offset, dst: rebase.register(dst), span },
        Cmd::VariantType { ptr, dst, span } => Cmd::VariantType { ptr: rebase.operand(ptr), dst: rebase.register(dst), span },
        Cmd::VariantValue { ptr, payload_offset, dst, span } => {
            Cmd::VariantValue { ptr: rebase.operand(ptr), payload_offset, dst: rebase.register(dst), span }
        }
        Cmd::ArrayLength { ptr, dst, span } => Cmd::ArrayLength { ptr: rebase.operand(ptr), dst: rebase.register(dst), span },
        Cmd::ArrayData { ptr, dst, span } => Cmd::ArrayData { ptr: rebase.operand(ptr), dst: rebase.register(dst), span },
        Cmd::TypeCtor { kind, args, dst, span } => {
            let pack: Vec<Operand> = callee.block(old_block).type_ctor_packs[args as usize]
                .iter()
                .map(|op| rebase.operand(*op))
                .collect();
            let new_args = caller.block_mut(new_block).push_type_ctor_args(pack);
            Cmd::TypeCtor { kind, args: new_args, dst: rebase.register(dst), span }
        }
        Cmd::UncondJump { target } => Cmd::UncondJump { target: rebase.block(target) },
        Cmd::CondJump { cond, if_true, if_false } => Cmd::CondJump {
            cond: rebase.operand(cond),
            if_true: rebase.block(if_true),
            if_false: rebase.block(if_false),
        },
        Cmd::Phi { table, dst, span } => {
            let translated_table = callee.block(old_block).phi_tables[table as usize]
                .iter()
                .map(|(b, op)| (rebase.block(*b), rebase.operand(*op)))
                .collect();
            let new_table = caller.block_mut(new_block).push_phi_table(translated_table);
            Cmd::Phi { table: new_table, dst: rebase.register(dst), span }
        }
        Cmd::Call { target, args, out_params, span } => {
            let new_target = match target {
                CallTarget::Indirect(op) => CallTarget::Indirect(rebase.operand(op)),
                other => other,
            };
            let arg_pack: Vec<Operand> = callee.block(old_block).call_arg_packs[args as usize]
                .iter()
                .map(|op| rebase.operand(*op))
                .collect();
            let new_args = caller.block_mut(new_block).push_call_args(arg_pack);
            let new_out_params = out_params.map(|idx| {
                let pack: Vec<OutDest> = callee.block(old_block).out_param_packs[idx as usize]
                    .iter()
                    .map(|dest| match dest {
                        OutDest::Reg(r) => OutDest::Reg(rebase.register(*r)),
                        OutDest::Ptr(op) => OutDest::Ptr(rebase.operand(*op)),
                    })
                    .collect();
                caller.block_mut(new_block).push_out_params(pack)
            });
            Cmd::Call { target: new_target, args: new_args, out_params: new_out_params, span }
        }
        Cmd::Print { prim, value, span } => Cmd::Print { prim, value: rebase.operand(value), span },
        Cmd::Bytes { type_index, dst } => {
            let ty = callee.types.get(type_index).clone();
            let new_type_index = caller.types.intern(ty);
            Cmd::Bytes { type_index: new_type_index, dst: rebase.register(dst) }
        }
        Cmd::Align { type_index, dst } => {
            let ty = callee.types.get(type_index).clone();
            let new_type_index = caller.types.intern(ty);
            Cmd::Align { type_index: new_type_index, dst: rebase.register(dst) }
        }
        Cmd::Cast { from, to, value, dst, span } => Cmd::Cast { from, to, value: rebase.operand(value), dst: rebase.register(dst), span },
        Cmd::Trunc { from, to, value, dst, span } => Cmd::Trunc { from, to, value: rebase.operand(value), dst: rebase.register(dst), span },
        Cmd::Extend { from, to, value, dst, span } => {
            Cmd::Extend { from, to, value: rebase.operand(value), dst: rebase.register(dst), span }
        }
        Cmd::Move { value, dst, span } => Cmd::Move { value: rebase.operand(value), dst: rebase.register(dst), span },
        Cmd::DebugIr => Cmd::DebugIr,
        Cmd::ReturnJump | Cmd::SetReturn { .. } => unreachable!("handled above before the match below is reached"),
    };

    push_translated(caller, new_block, translated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::opcode::ArithOp;
    use crate::operand::Immediate;
    use pretty_assertions::assert_eq;

    /// Builds a callee `Func(x: i32) -> i32` computing `x + 1` through a
    /// stack alloca, exercising both parameter substitution and allocation
    /// merging.
    fn make_callee() -> Func {
        let mut callee = Func::new("add_one", vec![Type::Primitive(PrimType::I32)], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let start = callee.add_block();
        let mut b = Builder::new(&mut callee, Arch::X86_64);
        let slot = b.alloca(Type::Primitive(PrimType::I32), Span::synthetic());
        b.jump(start);
        b.set_current(start);
        b.store(PrimType::I32, Operand::Reg(slot), Operand::Reg(Register::parameter(0)), Span::synthetic());
        let loaded = b.load(PrimType::I32, Operand::Reg(slot), Span::synthetic());
        let sum = b.arith(ArithOp::Add, PrimType::I32, Operand::Reg(loaded), Operand::Imm(Immediate::I32(1)), Span::synthetic());
        b.set_return(0, sum, Span::synthetic());
        b.return_jump();
        callee
    }

    #[test]
    fn inlining_merges_allocations_and_translates_parameters() {
        let mut caller = Func::new("caller", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let callee = make_callee();
        let pre_allocations = caller.allocations.len();

        let result_reg = {
            let mut b = Builder::new(&mut caller, Arch::X86_64);
            b.reserve(&Type::Primitive(PrimType::I32))
        };
        let pre_call_block = caller.entry_block();
        let landing = inline_into(
            &mut caller,
            pre_call_block,
            &callee,
            &[Operand::Imm(Immediate::I32(41))],
            &[OutDest::Reg(result_reg)],
            Arch::X86_64,
        );

        assert_eq!(caller.allocations.len(), pre_allocations + 1);
        assert!(caller.blocks.len() > 1);
        assert!(!caller.block(landing).is_terminated());
        assert!(caller.block(caller.entry_block()).instructions.iter().any(|c| matches!(c, Cmd::Alloca { .. })));

        let found_literal_argument = caller.blocks.iter().any(|blk| {
            blk.instructions
                .iter()
                .any(|c| matches!(c, Cmd::Store { value: Operand::Imm(Immediate::I32(41)), .. }))
        });
        assert!(found_literal_argument, "expected the literal argument to replace the callee's parameter reference");

        let found_move_into_result = caller.blocks.iter().any(|blk| {
            blk.instructions.iter().any(|c| matches!(c, Cmd::Move { dst, .. } if *dst == result_reg))
        });
        assert!(found_move_into_result, "expected the callee's SetReturn to translate into a Move targeting the caller's result register");
    }
}
