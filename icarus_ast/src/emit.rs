//! `EmitIr`: the interface an expression gives the IR builder (spec's
//! "external interfaces" — `expression.emit_ir(context) -> List<Value>`
//! and `expression.type_in(context) -> Type*`, realized here as
//! `result_type`). `icarus_interpreter`'s compile-time evaluator drives
//! this trait to turn an `Expr` into the body of the throwaway `Func` it
//! interprets.

use crate::env::{Binding, Env, FunctionSignature};
use crate::expr::{BinOpFamily, Expr};
use icarus_ir::{Builder, CallTarget, Immediate, Operand, OutDest};
use icarus_support::{Diagnostic, EvalContext, Span};
use icarus_types::Type;
use std::collections::HashMap;

/// Emission context threaded through a single `emit_ir` traversal: the
/// builder's function/block cursor, the diagnostic sink shared with the
/// rest of elaboration, the table of functions a `Call` can name, and the
/// lexical scope `Let`/`Var` read and write.
pub struct EmitContext<'b, 'f> {
    pub builder: &'b mut Builder<'f>,
    pub diagnostics: &'b mut EvalContext,
    pub functions: &'b HashMap<String, FunctionSignature>,
    env: Env,
}

impl<'b, 'f> EmitContext<'b, 'f> {
    pub fn new(
        builder: &'b mut Builder<'f>,
        diagnostics: &'b mut EvalContext,
        functions: &'b HashMap<String, FunctionSignature>,
    ) -> Self {
        EmitContext { builder, diagnostics, functions, env: Env::new() }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.record(Diagnostic::error(message, span));
    }
}

pub trait EmitIr {
    /// Emits this expression's IR into `ctx.builder`'s current block,
    /// returning its value(s) (plural only for the top-level expression a
    /// CTE invocation wraps; every node in this AST produces exactly one).
    fn emit_ir(&self, ctx: &mut EmitContext<'_, '_>) -> Vec<Operand>;

    /// This expression's static type. Does not touch the builder; reads
    /// only `ctx.functions` and whatever scope is live at the call site.
    fn result_type(&self, ctx: &EmitContext<'_, '_>) -> Type;
}

impl EmitIr for Expr {
    fn emit_ir(&self, ctx: &mut EmitContext<'_, '_>) -> Vec<Operand> {
        match self {
            Expr::Int { value, prim, .. } => vec![Operand::Imm(int_immediate(*prim, *value))],
            Expr::Float { value, prim, .. } => vec![Operand::Imm(float_immediate(*prim, *value))],
            Expr::Bool { value, .. } => vec![Operand::Imm(Immediate::Bool(*value))],

            Expr::Var { name, span } => match ctx.env.lookup(name).cloned() {
                Some(Binding { addr, ty }) => match ty.as_prim() {
                    Some(prim) => {
                        let loaded = ctx.builder.load(prim, Operand::Reg(addr), *span);
                        vec![Operand::Reg(loaded)]
                    }
                    None => vec![Operand::Reg(addr)],
                },
                None => {
                    ctx.error(format!("reference to undefined name `{name}`"), *span);
                    vec![Operand::Imm(Immediate::I32(0))]
                }
            },

            Expr::Let { name, ty, value, body, span } => {
                let value_ops = value.emit_ir(ctx);
                let value_op = value_ops.first().copied().unwrap_or(Operand::Imm(Immediate::I32(0)));
                let addr = ctx.builder.alloca(ty.clone(), *span);
                let prim = ty.as_prim().unwrap_or(icarus_types::PrimType::U64);
                ctx.builder.store(prim, Operand::Reg(addr), value_op, *span);
                ctx.env.push_scope();
                ctx.env.bind(name.clone(), Binding { addr, ty: ty.clone() });
                let result = body.emit_ir(ctx);
                ctx.env.pop_scope();
                result
            }

            Expr::Binary { op, prim, lhs, rhs, span } => {
                let lhs_op = first_operand(lhs.emit_ir(ctx));
                let rhs_op = first_operand(rhs.emit_ir(ctx));
                let result = match op.family() {
                    BinOpFamily::Arith(arith_op) => ctx.builder.arith(arith_op, *prim, lhs_op, rhs_op, *span),
                    BinOpFamily::Cmp(cmp_op) => ctx.builder.cmp(cmp_op, *prim, lhs_op, rhs_op, *span),
                    BinOpFamily::Bit(bit_op) => ctx.builder.bit(bit_op, lhs_op, rhs_op, *span),
                };
                vec![result]
            }

            Expr::Not { value, span } => {
                let value_op = first_operand(value.emit_ir(ctx));
                vec![ctx.builder.not(value_op, *span)]
            }

            Expr::If { cond, then_branch, else_branch, result_ty, span } => {
                let cond_op = first_operand(cond.emit_ir(ctx));

                let then_block = ctx.builder.add_block();
                let else_block = ctx.builder.add_block();
                let join_block = ctx.builder.add_block();
                ctx.builder.cond_jump(cond_op, then_block, else_block);

                ctx.builder.set_current(then_block);
                let then_op = first_operand(then_branch.emit_ir(ctx));
                let then_end = ctx.builder.current_block();
                ctx.builder.jump(join_block);

                ctx.builder.set_current(else_block);
                let else_op = first_operand(else_branch.emit_ir(ctx));
                let else_end = ctx.builder.current_block();
                ctx.builder.jump(join_block);

                ctx.builder.set_current(join_block);
                if result_ty.is_unit() {
                    return vec![];
                }
                let (phi_reg, phi_idx) = ctx.builder.phi(result_ty.clone());
                ctx.builder.make_phi(join_block, phi_idx, vec![(then_end, then_op), (else_end, else_op)]);
                let _ = span;
                vec![Operand::Reg(phi_reg)]
            }

            Expr::Call { name, args, span } => {
                let signature = match ctx.functions.get(name).cloned() {
                    Some(sig) => sig,
                    None => {
                        ctx.error(format!("call to undefined function `{name}`"), *span);
                        return vec![Operand::Imm(Immediate::I32(0))];
                    }
                };
                let arg_ops: Vec<Operand> = args.iter().map(|a| first_operand(a.emit_ir(ctx))).collect();
                let out_regs: Vec<_> = signature.outputs.iter().map(|ty| ctx.builder.reserve(ty)).collect();
                let out_params: Vec<OutDest> = out_regs.iter().map(|r| OutDest::Reg(*r)).collect();
                ctx.builder.call(CallTarget::Direct(signature.id), arg_ops, out_params, *span);
                out_regs.into_iter().map(Operand::Reg).collect()
            }
        }
    }

    fn result_type(&self, ctx: &EmitContext<'_, '_>) -> Type {
        match self {
            Expr::Int { prim, .. } | Expr::Float { prim, .. } => Type::Primitive(*prim),
            Expr::Bool { .. } => Type::Primitive(icarus_types::PrimType::Bool),
            Expr::Var { name, .. } => ctx
                .env
                .lookup(name)
                .map(|b| b.ty.clone())
                .unwrap_or(Type::Primitive(icarus_types::PrimType::I32)),
            Expr::Let { body, .. } => body.result_type(ctx),
            Expr::Binary { op, prim, .. } => {
                if op.is_comparison() {
                    Type::Primitive(icarus_types::PrimType::Bool)
                } else {
                    Type::Primitive(*prim)
                }
            }
            Expr::Not { .. } => Type::Primitive(icarus_types::PrimType::Bool),
            Expr::If { result_ty, .. } => result_ty.clone(),
            Expr::Call { name, .. } => ctx
                .functions
                .get(name)
                .and_then(|sig| sig.outputs.first().cloned())
                .unwrap_or(Type::UNIT),
        }
    }
}

fn first_operand(values: Vec<Operand>) -> Operand {
    values.into_iter().next().unwrap_or(Operand::Imm(Immediate::I32(0)))
}

fn int_immediate(prim: icarus_types::PrimType, value: i64) -> Immediate {
    use icarus_types::PrimType;
    match prim {
        PrimType::I8 => Immediate::I8(value as i8),
        PrimType::I16 => Immediate::I16(value as i16),
        PrimType::I32 => Immediate::I32(value as i32),
        PrimType::I64 => Immediate::I64(value),
        PrimType::U8 => Immediate::U8(value as u8),
        PrimType::U16 => Immediate::U16(value as u16),
        PrimType::U32 => Immediate::U32(value as u32),
        PrimType::U64 => Immediate::U64(value as u64),
        PrimType::Bool => Immediate::Bool(value != 0),
        PrimType::Char => Immediate::Char(char::from_u32(value as u32).unwrap_or('\u{FFFD}')),
        PrimType::F32 | PrimType::F64 => unreachable!("int_immediate called with a float prim"),
    }
}

fn float_immediate(prim: icarus_types::PrimType, value: f64) -> Immediate {
    use icarus_types::PrimType;
    match prim {
        PrimType::F32 => Immediate::F32(value as f32),
        PrimType::F64 => Immediate::F64(value),
        _ => unreachable!("float_immediate called with a non-float prim"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinOp;
    use icarus_ir::{BlockId, Cmd, Func, FuncId};
    use icarus_types::{layout::Arch, PrimType};
    use pretty_assertions::assert_eq;

    fn int(value: i64) -> Expr {
        Expr::Int { value, prim: PrimType::I32, span: Span::synthetic() }
    }

    fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary { op, prim: PrimType::I32, lhs: Box::new(lhs), rhs: Box::new(rhs), span: Span::synthetic() }
    }

    /// `2 + 3 * 4` should fold all the way through the builder's constant
    /// folding, leaving exactly one `SetReturn` of the immediate `14` and no
    /// `Arith` commands at all.
    #[test]
    fn integer_arithmetic_folds_through_to_a_single_immediate() {
        let mut func = Func::new("k", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let mut builder = Builder::new(&mut func, Arch::X86_64);
        let mut diagnostics = EvalContext::new();
        let functions = HashMap::new();
        let mut ctx = EmitContext::new(&mut builder, &mut diagnostics, &functions);

        let expr = binop(BinOp::Add, int(2), binop(BinOp::Mul, int(3), int(4)));
        let result = expr.emit_ir(&mut ctx);
        assert_eq!(result, vec![Operand::Imm(Immediate::I32(14))]);

        ctx.builder.set_return(0, result[0], Span::synthetic());
        ctx.builder.return_jump();
        assert!(func.block(BlockId(0)).instructions.iter().all(|c| !matches!(c, Cmd::Arith { .. })));
        assert!(!diagnostics.has_errors());
    }

    /// `let x = 5; if x > 3 { x + 1 } else { x - 1 }` exercises `Let`'s
    /// stack slot, `Var`'s load, and `If`'s three-block phi join together.
    #[test]
    fn let_and_if_share_the_bound_stack_slot_across_both_branches() {
        let mut func = Func::new("k", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let mut builder = Builder::new(&mut func, Arch::X86_64);
        let mut diagnostics = EvalContext::new();
        let functions = HashMap::new();
        let mut ctx = EmitContext::new(&mut builder, &mut diagnostics, &functions);

        let var = || Expr::Var { name: "x".to_string(), span: Span::synthetic() };
        let cond = binop(BinOp::Gt, var(), int(3));
        let then_branch = binop(BinOp::Add, var(), int(1));
        let else_branch = binop(BinOp::Sub, var(), int(1));
        let if_expr = Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            result_ty: Type::Primitive(PrimType::I32),
            span: Span::synthetic(),
        };
        let let_expr = Expr::Let {
            name: "x".to_string(),
            ty: Type::Primitive(PrimType::I32),
            value: Box::new(int(5)),
            body: Box::new(if_expr),
            span: Span::synthetic(),
        };

        let result = let_expr.emit_ir(&mut ctx);
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Operand::Reg(_)));
        assert!(!diagnostics.has_errors());
        // entry (alloca+store), then/else/join blocks = 4 total.
        assert_eq!(func.blocks.len(), 4);
        assert_eq!(func.allocations.len(), 1);
    }

    #[test]
    fn call_to_an_unknown_function_records_a_diagnostic() {
        let mut func = Func::new("k", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let mut builder = Builder::new(&mut func, Arch::X86_64);
        let mut diagnostics = EvalContext::new();
        let functions = HashMap::new();
        let mut ctx = EmitContext::new(&mut builder, &mut diagnostics, &functions);

        let call = Expr::Call { name: "missing".to_string(), args: vec![], span: Span::synthetic() };
        call.emit_ir(&mut ctx);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn call_to_a_known_function_marshals_arguments_and_out_params() {
        let mut func = Func::new("k", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        let mut builder = Builder::new(&mut func, Arch::X86_64);
        let mut diagnostics = EvalContext::new();
        let mut functions = HashMap::new();
        functions.insert(
            "double".to_string(),
            FunctionSignature {
                id: FuncId(3),
                params: vec![Type::Primitive(PrimType::I32)],
                outputs: vec![Type::Primitive(PrimType::I32)],
            },
        );
        let mut ctx = EmitContext::new(&mut builder, &mut diagnostics, &functions);

        let call = Expr::Call { name: "double".to_string(), args: vec![int(21)], span: Span::synthetic() };
        let result = call.emit_ir(&mut ctx);
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Operand::Reg(_)));
        assert!(func.block(BlockId(0)).instructions.iter().any(|c| matches!(c, Cmd::Call { .. })));
    }
}
