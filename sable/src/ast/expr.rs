//! Expression AST nodes

use super::Spanned;
use serde::{Deserialize, Serialize};

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Null literal
    Null,
    /// Integer literal
    IntLit(i64),
    /// Float literal
    FloatLit(f64),
    /// Boolean literal
    BoolLit(bool),
    /// String literal
    StringLit(String),
    /// Character literal
    CharLit(char),

    /// Identifier reference
    Ident(String),

    /// Array literal: [a, b, c]
    Array(Vec<Spanned<Expr>>),

    /// Dictionary literal: {"key": value, ...}
    Dict(Vec<(Spanned<String>, Spanned<Expr>)>),

    /// Binary operation
    Binary {
        left: Box<Spanned<Expr>>,
        op: BinOp,
        right: Box<Spanned<Expr>>,
    },

    /// Unary operation
    Unary {
        op: UnOp,
        expr: Box<Spanned<Expr>>,
    },

    /// Assignment or compound assignment: target op value
    Assign {
        target: Box<Spanned<Expr>>,
        op: AssignOp,
        value: Box<Spanned<Expr>>,
    },

    /// Prefix or postfix increment/decrement
    Step {
        target: Box<Spanned<Expr>>,
        decrement: bool,
        prefix: bool,
    },

    /// Function call by identifier
    Call {
        name: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },

    /// Method call: receiver.name(args)
    MethodCall {
        recv: Box<Spanned<Expr>>,
        name: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },

    /// Member access: receiver.name
    Member {
        recv: Box<Spanned<Expr>>,
        name: Spanned<String>,
    },

    /// Index access: receiver[index]
    Index {
        recv: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// Operator spelling for error messages
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Xor => "^^",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Pos => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        }
    }
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::ModAssign => "%=",
        }
    }

    /// The binary operator a compound assignment applies, if any
    pub fn bin_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinOp::Add),
            AssignOp::SubAssign => Some(BinOp::Sub),
            AssignOp::MulAssign => Some(BinOp::Mul),
            AssignOp::DivAssign => Some(BinOp::Div),
            AssignOp::ModAssign => Some(BinOp::Mod),
        }
    }
}

impl Expr {
    /// True if the expression names a storage location usable as an
    /// assignment target or a by-reference argument.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            Expr::Ident(_) | Expr::Index { .. } | Expr::Member { .. }
        )
    }
}
