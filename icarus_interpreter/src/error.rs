//! The interpreter's own error taxonomy, one variant per runtime fault
//! listed in the core's failure-mode table. Every variant carries the span
//! of the `Cmd` that faulted, pulled from the block's structured form
//! rather than the packed one actually executed (see `Cmd::span`), so a
//! diagnostic can point back at real source text even though the packed
//! buffer itself doesn't carry spans.

use icarus_ir::Address;
use icarus_support::Span;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum InterpreterError {
    #[error("null pointer dereferenced at {span}")]
    NullDereference { span: Span },

    #[error("division by zero at {span}")]
    DivisionByZero { span: Span },

    #[error("wrote through a read-only global constant at {span}")]
    GlobalWriteForbidden { span: Span },

    #[error("called an unresolved function value at {span}")]
    UnresolvedFunction { span: Span },

    #[error("argument count mismatch calling a function: expected {expected}, got {actual}, at {span}")]
    ArgumentCountMismatch { expected: usize, actual: usize, span: Span },

    #[error("step limit exceeded")]
    StepLimitExceeded,

    #[error("stack overflow: requested {requested} bytes with only {available} available")]
    StackOverflow { requested: u32, available: u32 },

    #[error("read address {address} out of range for its arena")]
    OutOfRangeAddress { address: Address },

    #[error("malformed instruction stream: {reason}")]
    Malformed { reason: String },
}

impl InterpreterError {
    /// The span to attach to a diagnostic, or a synthetic one for faults
    /// (step limit, stack overflow) that have no single originating
    /// instruction.
    pub fn span(&self) -> Span {
        match self {
            InterpreterError::NullDereference { span }
            | InterpreterError::DivisionByZero { span }
            | InterpreterError::GlobalWriteForbidden { span }
            | InterpreterError::UnresolvedFunction { span }
            | InterpreterError::ArgumentCountMismatch { span, .. } => *span,
            InterpreterError::StepLimitExceeded
            | InterpreterError::StackOverflow { .. }
            | InterpreterError::OutOfRangeAddress { .. }
            | InterpreterError::Malformed { .. } => Span::synthetic(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InterpreterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(InterpreterError::NullDereference { span: Span::synthetic() } ; "null dereference")]
    #[test_case(InterpreterError::DivisionByZero { span: Span::synthetic() } ; "division by zero")]
    #[test_case(InterpreterError::GlobalWriteForbidden { span: Span::synthetic() } ; "global write forbidden")]
    #[test_case(InterpreterError::UnresolvedFunction { span: Span::synthetic() } ; "unresolved function")]
    #[test_case(InterpreterError::ArgumentCountMismatch { expected: 2, actual: 1, span: Span::synthetic() } ; "argument count mismatch")]
    #[test_case(InterpreterError::StepLimitExceeded ; "step limit exceeded")]
    #[test_case(InterpreterError::StackOverflow { requested: 64, available: 32 } ; "stack overflow")]
    #[test_case(InterpreterError::OutOfRangeAddress { address: Address::Heap(4) } ; "out of range address")]
    #[test_case(InterpreterError::Malformed { reason: "bad tag".to_string() } ; "malformed")]
    fn every_variant_renders_without_panicking(err: InterpreterError) {
        let rendered = err.to_string();
        assert!(!rendered.is_empty());
        let _ = err.span();
    }
}
