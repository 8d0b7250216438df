//! IR-construction errors. Most invariant violations in this layer are
//! programmer errors in the core itself (a malformed builder call) and are
//! asserted against directly; `IrError` covers the subset that can
//! plausibly arise from caller-supplied data crossing an API boundary
//! (inlining a foreign `Func`, deserializing a snapshot) and so deserves a
//! typed `Result` instead of a panic.

use crate::register::Register;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("block does not end with exactly one terminator")]
    MissingTerminator,

    #[error("register {0} is referenced but has no defining instruction")]
    OrphanRegister(Register),

    #[error("block index {0} is out of range for this function")]
    BlockOutOfRange(u32),

    #[error("function {0:?} has no block at the expected entry position")]
    EmptyFunction(String),

    #[error("attempted to inline a function with a mismatched output arity: expected {expected}, found {found}")]
    OutputArityMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, IrError>;
