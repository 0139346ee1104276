//! Compile-side error types and reporting
//!
//! Lexer and parser failures share the span-carrying shape of runtime
//! errors but use distinct kinds; runtime errors live in `interp::error`.

use crate::ast::Span;
use thiserror::Error;

/// Result type alias for the compile pipeline
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compile error
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Syntax error at {span}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Unexpected token at {span}: {message}")]
    Parser { message: String, span: Span },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            span,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer { span, .. } => Some(*span),
            Self::Parser { span, .. } => Some(*span),
            Self::Io { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer { message, .. } => message,
            Self::Parser { message, .. } => message,
            Self::Io { message, .. } => message,
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::io_error(e.to_string())
    }
}

/// Report a compile error with ariadne
pub fn report(filename: &str, source: &str, error: &CompileError) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = match error {
        CompileError::Lexer { .. } => "Syntax",
        CompileError::Parser { .. } => "Parse",
        CompileError::Io { .. } => "IO",
    };

    if let Some(span) = error.span() {
        let _ = Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(format!("{kind} error"))
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(error.message())
                    .with_color(Color::Red),
            )
            .finish()
            .print((filename, Source::from(source)));
    } else {
        let _ = Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error: {}", error.message()))
            .finish()
            .print((filename, Source::from(source)));
    }
}

/// Report a runtime error with ariadne
pub fn report_runtime(filename: &str, source: &str, error: &crate::interp::RuntimeError) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let span = error.span;
    let _ = Report::build(ReportKind::Error, (filename, span.start..span.end))
        .with_message(format!("{} error", error.kind.name()))
        .with_label(
            Label::new((filename, span.start..span.end))
                .with_message(&error.message)
                .with_color(Color::Red),
        )
        .finish()
        .print((filename, Source::from(source)));
}
