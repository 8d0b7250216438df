//! Cross-cutting types shared by the Icarus IR, interpreter, and their
//! external collaborators: source spans and a small diagnostic sink.

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticLevel, EvalContext};
pub use span::{Position, Span};
