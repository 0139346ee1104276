//! Sable Interpreter Library
//!
//! A dynamically typed scripting language: lexer, recursive-descent
//! parser, and a tree-walking evaluator with by-reference parameters,
//! function overloading, and a module system.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;

pub use ast::Span;
pub use error::{CompileError, Result};
pub use interp::Interpreter;
