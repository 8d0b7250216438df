//! A deliberately small stand-in AST plus the `EmitIr` trait that lets the
//! IR and interpreter crates have something real to drive in their own
//! tests. This is not a parser or an elaborator: there is no lexer, no
//! surface syntax, and no type checking. Every node already carries the
//! type information a real elaborator would have computed; `EmitIr` only
//! has to turn that into `icarus_ir::Builder` calls.

pub mod emit;
pub mod env;
pub mod expr;

pub use emit::{EmitContext, EmitIr};
pub use env::{Binding, Env, FunctionSignature};
pub use expr::{BinOp, BinOpFamily, Expr};
