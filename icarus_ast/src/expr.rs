//! A deliberately small expression AST: just enough surface for an
//! elaborator to hand the IR something real to build from, and for this
//! workspace's own tests to drive the builder and interpreter end to end.
//! There is no statement/item layer, no parser, and no name resolution;
//! `Var` and `Call` are resolved directly against the `Env`/function table
//! carried on `EmitContext`.

use icarus_support::Span;
use icarus_types::{PrimType, Type};
use serde::{Deserialize, Serialize};

/// Binary operators, grouped by which `Builder` method realizes them.
/// Unlike a fully elaborated IR, this AST is untyped between its own nodes:
/// every arithmetic or comparison node carries the `PrimType` its operands
/// were already elaborated to, rather than inferring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

/// Which family of `Builder` emission method a `BinOp` maps onto.
pub enum BinOpFamily {
    Arith(icarus_ir::ArithOp),
    Cmp(icarus_ir::CmpOp),
    Bit(icarus_ir::BitOp),
}

impl BinOp {
    pub fn family(self) -> BinOpFamily {
        use icarus_ir::{ArithOp, BitOp, CmpOp};
        match self {
            BinOp::Add => BinOpFamily::Arith(ArithOp::Add),
            BinOp::Sub => BinOpFamily::Arith(ArithOp::Sub),
            BinOp::Mul => BinOpFamily::Arith(ArithOp::Mul),
            BinOp::Div => BinOpFamily::Arith(ArithOp::Div),
            BinOp::Mod => BinOpFamily::Arith(ArithOp::Mod),
            BinOp::Eq => BinOpFamily::Cmp(CmpOp::Eq),
            BinOp::Ne => BinOpFamily::Cmp(CmpOp::Ne),
            BinOp::Lt => BinOpFamily::Cmp(CmpOp::Lt),
            BinOp::Le => BinOpFamily::Cmp(CmpOp::Le),
            BinOp::Gt => BinOpFamily::Cmp(CmpOp::Gt),
            BinOp::Ge => BinOpFamily::Cmp(CmpOp::Ge),
            BinOp::And => BinOpFamily::Bit(BitOp::And),
            BinOp::Or => BinOpFamily::Bit(BitOp::Or),
            BinOp::Xor => BinOpFamily::Bit(BitOp::Xor),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self.family(), BinOpFamily::Cmp(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int {
        value: i64,
        prim: PrimType,
        span: Span,
    },
    Float {
        value: f64,
        prim: PrimType,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    /// A reference to a `Let`-bound name in an enclosing scope.
    Var {
        name: String,
        span: Span,
    },
    /// `let name: ty = value; body` — `value` is stored to a fresh stack
    /// slot (spec's Alloca+Store pattern) rather than bound directly to a
    /// register, so repeated loads of the same binding observe later
    /// `Store`s the way a mutable local would.
    Let {
        name: String,
        ty: Type,
        value: Box<Expr>,
        body: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        prim: PrimType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Not {
        value: Box<Expr>,
        span: Span,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        result_ty: Type,
        span: Span,
    },
    /// A direct call to a function named in the `EmitContext`'s function
    /// table. There is no indirect- or foreign-call surface at the AST
    /// level; those `CallTarget` variants exist for IR produced by other
    /// means (see `icarus_ir::CallTarget`).
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Var { span, .. }
            | Expr::Let { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Not { span, .. }
            | Expr::If { span, .. }
            | Expr::Call { span, .. } => *span,
        }
    }
}
