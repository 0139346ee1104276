//! Statement AST nodes

use super::{Expr, Span, Spanned};
use serde::{Deserialize, Serialize};

/// A parsed module: a sequence of top-level statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Spanned<Stmt>>,
}

/// Declaration modifiers collected by the parser.
///
/// The parser accepts any combination; the evaluator rejects malformed
/// combinations (e.g. `global local`) with InvalidDeclaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclFlags {
    pub is_global: bool,
    pub is_local: bool,
    pub is_const: bool,
}

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression statement
    Expr(Spanned<Expr>),

    /// Variable declaration: [global|local] [const] var name [= init];
    VarDecl {
        flags: DeclFlags,
        name: Spanned<String>,
        init: Option<Spanned<Expr>>,
    },

    /// Function declaration; `body` is None for a forward definition
    FuncDecl(FuncDecl),

    /// Bare block: { ... }
    Block(Vec<Spanned<Stmt>>),

    /// If statement; `else_branch` is a Block or another If
    If {
        cond: Spanned<Expr>,
        then_blk: Vec<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },

    /// While loop
    While {
        cond: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },

    /// C-style for loop
    For {
        init: Option<Box<Spanned<Stmt>>>,
        cond: Option<Spanned<Expr>>,
        step: Option<Spanned<Expr>>,
        body: Vec<Spanned<Stmt>>,
    },

    /// foreach (name in iterable) { ... }
    Foreach {
        var: Spanned<String>,
        iter: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },

    Break,
    Continue,

    /// Return with optional value
    Return(Option<Spanned<Expr>>),

    /// Import a module by path
    Import(Spanned<String>),
}

/// Function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncDecl {
    pub flags: DeclFlags,
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub ret: TypeSpec,
    /// None for a forward definition (signature only)
    pub body: Option<Vec<Spanned<Stmt>>>,
    pub span: Span,
}

/// Function parameter: [ref] [type] name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: TypeSpec,
    pub by_ref: bool,
}

/// Declared parameter/return type; `Any` matches every dynamic kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSpec {
    Any,
    Int,
    Float,
    Str,
    Char,
    Bool,
    Array,
    Dict,
    Vec2,
    Vec3,
    Pair,
    File,
    Function,
}

impl TypeSpec {
    /// Parse a type name as written in source; None if unknown
    pub fn from_name(name: &str) -> Option<TypeSpec> {
        Some(match name {
            "any" => TypeSpec::Any,
            "int" => TypeSpec::Int,
            "float" => TypeSpec::Float,
            "string" => TypeSpec::Str,
            "char" => TypeSpec::Char,
            "bool" => TypeSpec::Bool,
            "array" => TypeSpec::Array,
            "dict" => TypeSpec::Dict,
            "vec2" => TypeSpec::Vec2,
            "vec3" => TypeSpec::Vec3,
            "pair" => TypeSpec::Pair,
            "file" => TypeSpec::File,
            "function" => TypeSpec::Function,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeSpec::Any => "any",
            TypeSpec::Int => "int",
            TypeSpec::Float => "float",
            TypeSpec::Str => "string",
            TypeSpec::Char => "char",
            TypeSpec::Bool => "bool",
            TypeSpec::Array => "array",
            TypeSpec::Dict => "dict",
            TypeSpec::Vec2 => "vec2",
            TypeSpec::Vec3 => "vec3",
            TypeSpec::Pair => "pair",
            TypeSpec::File => "file",
            TypeSpec::Function => "function",
        }
    }
}

impl FuncDecl {
    /// Two declarations overload each other iff their parameter-type
    /// signatures differ.
    pub fn same_signature(&self, other: &FuncDecl) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty)
    }
}
