//! Runtime errors for the evaluator

use crate::ast::Span;
use std::fmt;

/// Result type for the evaluator
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Runtime error: kind, human-readable message, source location
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No dispatch case for the operand kinds
    TypeMismatch,
    /// Name resolution failed everywhere
    UndefinedIdentifier,
    /// Operator unknown to the dispatcher
    InvalidOperator,
    /// Operation defined but not performable (division by zero, array
    /// underflow on `-=`, writing through a stale reference, ...)
    InvalidOperation,
    /// Assignment to a constant value
    ConstantAssignment,
    /// Call with the wrong number of arguments
    InvalidArgumentCount,
    /// Index outside a container's bounds
    OutOfBounds,
    /// `break` outside a loop
    InvalidBreak,
    /// `continue` outside a loop
    InvalidContinue,
    /// `return` outside a function body
    InvalidReturn,
    /// Name already declared in the same scope
    DuplicateDeclaration,
    /// Malformed declaration modifier combination
    InvalidDeclaration,
    /// Raised by native library code
    Builtin,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UndefinedIdentifier => "UndefinedIdentifier",
            ErrorKind::InvalidOperator => "InvalidOperator",
            ErrorKind::InvalidOperation => "InvalidOperation",
            ErrorKind::ConstantAssignment => "ConstantAssignment",
            ErrorKind::InvalidArgumentCount => "InvalidArgumentCount",
            ErrorKind::OutOfBounds => "OutOfBounds",
            ErrorKind::InvalidBreak => "InvalidBreak",
            ErrorKind::InvalidContinue => "InvalidContinue",
            ErrorKind::InvalidReturn => "InvalidReturn",
            ErrorKind::DuplicateDeclaration => "DuplicateDeclaration",
            ErrorKind::InvalidDeclaration => "InvalidDeclaration",
            ErrorKind::Builtin => "Builtin",
        }
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::TypeMismatch, message, span)
    }

    pub fn undefined_identifier(name: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::UndefinedIdentifier,
            format!("undefined identifier: {name}"),
            span,
        )
    }

    pub fn invalid_operator(op: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::InvalidOperator,
            format!("invalid operator: {op}"),
            span,
        )
    }

    pub fn invalid_operation(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::InvalidOperation, message, span)
    }

    pub fn constant_assignment(name: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::ConstantAssignment,
            format!("cannot assign to constant: {name}"),
            span,
        )
    }

    pub fn argument_count(name: &str, expected: usize, got: usize, span: Span) -> Self {
        Self::new(
            ErrorKind::InvalidArgumentCount,
            format!("function {name} expects {expected} argument(s), got {got}"),
            span,
        )
    }

    pub fn out_of_bounds(index: i64, len: usize, span: Span) -> Self {
        Self::new(
            ErrorKind::OutOfBounds,
            format!("index {index} out of bounds (length {len})"),
            span,
        )
    }

    pub fn invalid_break(span: Span) -> Self {
        Self::new(ErrorKind::InvalidBreak, "break outside of a loop", span)
    }

    pub fn invalid_continue(span: Span) -> Self {
        Self::new(
            ErrorKind::InvalidContinue,
            "continue outside of a loop",
            span,
        )
    }

    pub fn invalid_return(span: Span) -> Self {
        Self::new(
            ErrorKind::InvalidReturn,
            "return outside of a function body",
            span,
        )
    }

    pub fn duplicate_declaration(name: &str, span: Span) -> Self {
        Self::new(
            ErrorKind::DuplicateDeclaration,
            format!("duplicate declaration: {name}"),
            span,
        )
    }

    pub fn invalid_declaration(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::InvalidDeclaration, message, span)
    }

    pub fn builtin(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Builtin, message, span)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at {}: {}",
            self.kind.name(),
            self.span,
            self.message
        )
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::undefined_identifier("x", Span::new(4, 5));
        assert_eq!(
            format!("{err}"),
            "UndefinedIdentifier error at 4..5: undefined identifier: x"
        );
    }

    #[test]
    fn test_constructors_set_kind() {
        let span = Span::new(0, 1);
        assert_eq!(
            RuntimeError::invalid_break(span).kind,
            ErrorKind::InvalidBreak
        );
        assert_eq!(
            RuntimeError::argument_count("f", 2, 3, span).kind,
            ErrorKind::InvalidArgumentCount
        );
        assert_eq!(
            RuntimeError::out_of_bounds(7, 3, span).message,
            "index 7 out of bounds (length 3)"
        );
    }
}
