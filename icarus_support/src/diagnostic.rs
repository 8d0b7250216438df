//! Diagnostic accumulation for elaboration and compile-time evaluation errors.

use crate::span::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self { level: DiagnosticLevel::Error, message: message.into(), span }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self { level: DiagnosticLevel::Warning, message: message.into(), span }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        };
        write!(f, "{}: {} at {}", level, self.message, self.span)
    }
}

/// Accumulates diagnostics across elaboration and nested compile-time
/// evaluation. The CTE driver refuses to run once `has_errors()` is true.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    diagnostics: Vec<Diagnostic>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        if diagnostic.level == DiagnosticLevel::Error {
            log::error!("{diagnostic}");
        } else {
            log::warn!("{diagnostic}");
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_short_circuits_once_an_error_is_recorded() {
        let mut ctx = EvalContext::new();
        assert!(!ctx.has_errors());
        ctx.record(Diagnostic::warning("unused value", Span::synthetic()));
        assert!(!ctx.has_errors());
        ctx.record(Diagnostic::error("type mismatch", Span::synthetic()));
        assert!(ctx.has_errors());
        assert_eq!(
            ctx.diagnostics(),
            &[
                Diagnostic::warning("unused value", Span::synthetic()),
                Diagnostic::error("type mismatch", Span::synthetic()),
            ]
        );
    }
}
