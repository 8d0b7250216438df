//! Typed intermediate representation for the Icarus compiler: a
//! register-based, block-structured instruction set with a dual
//! structured/packed encoding, a builder API for emitting it, and an
//! inliner for splicing one function's body into another.
//!
//! Every instruction exists in two forms at once (see `cmd`): a structured
//! `Cmd` used for inspection and inlining-time rewrites, and a packed byte
//! sequence the interpreter executes directly. `Builder` (see `builder`) is
//! the only sanctioned way to construct a `Func`'s blocks; direct
//! `BasicBlock::push` calls bypass its constant folding and register
//! bookkeeping and should only appear in this crate's own tests.

pub mod address;
pub mod block;
pub mod builder;
pub mod cmd;
pub mod error;
pub mod function;
pub mod inliner;
pub mod module;
pub mod opcode;
pub mod operand;
pub mod register;

pub use address::Address;
pub use block::{BasicBlock, BlockId, PhiTable};
pub use builder::Builder;
pub use cmd::{CallTarget, Cmd, CmdBuffer, Cursor, OutDest};
pub use error::{IrError, Result};
pub use function::{Func, FuncId, FuncState, TypeTable};
pub use inliner::inline_into;
pub use module::{GlobalConstant, GlobalTable, Module, StringTable};
pub use opcode::{ArithOp, BitOp, CmpOp, OpIndex, TypeCtorKind};
pub use operand::{Immediate, Operand};
pub use register::{Register, RegisterKind};
