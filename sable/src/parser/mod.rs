//! Recursive-descent parser
//!
//! Consumes the token vector from the lexer and produces the spanned
//! AST. Precedence, low to high: assignment, `||`, `^^`, `&&`, `|`,
//! `^`, `&`, equality, comparison, shifts, additive, multiplicative,
//! unary, postfix. Assignment is right-associative; everything else is
//! left-associative.

use crate::ast::{
    AssignOp, BinOp, DeclFlags, Expr, FuncDecl, Param, Program, Span, Spanned, Stmt, TypeSpec,
    UnOp,
};
use crate::error::{CompileError, Result};
use crate::lexer::Token;

/// Parse a token stream into a program
pub fn parse(tokens: &[(Token, Span)]) -> Result<Program> {
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at_end() {
        stmts.push(parser.statement()?);
    }
    Ok(Program { stmts })
}

struct Parser<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    /// Span of the current token, or of the last token at end of input
    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| self.prev_span())
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].1
        } else {
            Span::new(0, 0)
        }
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let out = self.tokens.get(self.pos).cloned();
        if out.is_some() {
            self.pos += 1;
        }
        out
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<Span> {
        if self.peek() == Some(token) {
            let span = self.span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(CompileError::parser(format!("expected {what}"), self.span()))
        }
    }

    fn ident(&mut self, what: &str) -> Result<Spanned<String>> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let (token, span) = self.advance().unwrap();
                let Token::Ident(name) = token else {
                    unreachable!()
                };
                Ok(Spanned::new(name, span))
            }
            _ => Err(CompileError::parser(format!("expected {what}"), self.span())),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        match self.peek() {
            Some(Token::Global | Token::Local | Token::Const | Token::Var | Token::Func) => {
                self.declaration()
            }
            Some(Token::If) => self.if_stmt(),
            Some(Token::While) => self.while_stmt(),
            Some(Token::For) => self.for_stmt(),
            Some(Token::Foreach) => self.foreach_stmt(),
            Some(Token::Break) => {
                self.pos += 1;
                self.expect(&Token::Semi, "; after break")?;
                Ok(Spanned::new(Stmt::Break, start.merge(self.prev_span())))
            }
            Some(Token::Continue) => {
                self.pos += 1;
                self.expect(&Token::Semi, "; after continue")?;
                Ok(Spanned::new(Stmt::Continue, start.merge(self.prev_span())))
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.peek() == Some(&Token::Semi) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(&Token::Semi, "; after return")?;
                Ok(Spanned::new(
                    Stmt::Return(value),
                    start.merge(self.prev_span()),
                ))
            }
            Some(Token::Import) => {
                self.pos += 1;
                let path = match self.advance() {
                    Some((Token::StringLit(s), span)) => Spanned::new(s, span),
                    _ => {
                        return Err(CompileError::parser(
                            "expected a string path after import",
                            self.prev_span(),
                        ))
                    }
                };
                self.expect(&Token::Semi, "; after import")?;
                Ok(Spanned::new(
                    Stmt::Import(path),
                    start.merge(self.prev_span()),
                ))
            }
            Some(Token::LBrace) => {
                let stmts = self.block()?;
                Ok(Spanned::new(
                    Stmt::Block(stmts),
                    start.merge(self.prev_span()),
                ))
            }
            Some(_) => {
                let expr = self.expression()?;
                self.expect(&Token::Semi, "; after expression")?;
                Ok(Spanned::new(
                    Stmt::Expr(expr),
                    start.merge(self.prev_span()),
                ))
            }
            None => Err(CompileError::parser(
                "unexpected end of input",
                self.prev_span(),
            )),
        }
    }

    /// `[global|local] [const] (var ... | func ...)`. Any modifier
    /// combination parses; the evaluator rejects malformed ones.
    fn declaration(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        let mut flags = DeclFlags::default();
        loop {
            match self.peek() {
                Some(Token::Global) => flags.is_global = true,
                Some(Token::Local) => flags.is_local = true,
                Some(Token::Const) => flags.is_const = true,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            Some(Token::Var) => self.var_decl(flags, start),
            Some(Token::Func) => self.func_decl(flags, start),
            _ => Err(CompileError::parser(
                "expected var or func after declaration modifiers",
                self.span(),
            )),
        }
    }

    fn var_decl(&mut self, flags: DeclFlags, start: Span) -> Result<Spanned<Stmt>> {
        self.expect(&Token::Var, "var")?;
        let name = self.ident("variable name")?;
        let init = if self.eat(&Token::Eq) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(&Token::Semi, "; after declaration")?;
        Ok(Spanned::new(
            Stmt::VarDecl { flags, name, init },
            start.merge(self.prev_span()),
        ))
    }

    fn func_decl(&mut self, flags: DeclFlags, start: Span) -> Result<Spanned<Stmt>> {
        self.expect(&Token::Func, "func")?;
        let name = self.ident("function name")?;
        self.expect(&Token::LParen, "( after function name")?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.param()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, ") after parameters")?;
                break;
            }
        }
        let ret = if self.eat(&Token::Arrow) {
            let ty = self.ident("return type")?;
            TypeSpec::from_name(&ty.node).ok_or_else(|| {
                CompileError::parser(format!("unknown type {}", ty.node), ty.span)
            })?
        } else {
            TypeSpec::Any
        };
        // a bare semicolon makes this a forward definition
        let body = if self.eat(&Token::Semi) {
            None
        } else {
            Some(self.block()?)
        };
        let span = start.merge(self.prev_span());
        Ok(Spanned::new(
            Stmt::FuncDecl(FuncDecl {
                flags,
                name,
                params,
                ret,
                body,
                span,
            }),
            span,
        ))
    }

    /// `[ref] [type] name`; a lone identifier is an `any` parameter
    fn param(&mut self) -> Result<Param> {
        let by_ref = self.eat(&Token::Ref);
        let first = self.ident("parameter name")?;
        if matches!(self.peek(), Some(Token::Ident(_))) {
            let ty = TypeSpec::from_name(&first.node).ok_or_else(|| {
                CompileError::parser(format!("unknown type {}", first.node), first.span)
            })?;
            let name = self.ident("parameter name")?;
            Ok(Param { name, ty, by_ref })
        } else {
            Ok(Param {
                name: first,
                ty: TypeSpec::Any,
                by_ref,
            })
        }
    }

    fn if_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        self.expect(&Token::If, "if")?;
        self.expect(&Token::LParen, "( after if")?;
        let cond = self.expression()?;
        self.expect(&Token::RParen, ") after condition")?;
        let then_blk = self.block()?;
        let else_branch = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                Some(Box::new(self.if_stmt()?))
            } else {
                let else_start = self.span();
                let stmts = self.block()?;
                Some(Box::new(Spanned::new(
                    Stmt::Block(stmts),
                    else_start.merge(self.prev_span()),
                )))
            }
        } else {
            None
        };
        Ok(Spanned::new(
            Stmt::If {
                cond,
                then_blk,
                else_branch,
            },
            start.merge(self.prev_span()),
        ))
    }

    fn while_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        self.expect(&Token::While, "while")?;
        self.expect(&Token::LParen, "( after while")?;
        let cond = self.expression()?;
        self.expect(&Token::RParen, ") after condition")?;
        let body = self.block()?;
        Ok(Spanned::new(
            Stmt::While { cond, body },
            start.merge(self.prev_span()),
        ))
    }

    fn for_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        self.expect(&Token::For, "for")?;
        self.expect(&Token::LParen, "( after for")?;
        let init = if self.eat(&Token::Semi) {
            None
        } else {
            Some(Box::new(self.simple_stmt()?))
        };
        let cond = if self.eat(&Token::Semi) {
            None
        } else {
            let e = self.expression()?;
            self.expect(&Token::Semi, "; after loop condition")?;
            Some(e)
        };
        let step = if self.peek() == Some(&Token::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::RParen, ") after for clauses")?;
        let body = self.block()?;
        Ok(Spanned::new(
            Stmt::For {
                init,
                cond,
                step,
                body,
            },
            start.merge(self.prev_span()),
        ))
    }

    /// Declaration or expression statement, for the for-loop initializer
    fn simple_stmt(&mut self) -> Result<Spanned<Stmt>> {
        match self.peek() {
            Some(Token::Global | Token::Local | Token::Const | Token::Var) => self.declaration(),
            _ => {
                let start = self.span();
                let expr = self.expression()?;
                self.expect(&Token::Semi, "; after expression")?;
                Ok(Spanned::new(
                    Stmt::Expr(expr),
                    start.merge(self.prev_span()),
                ))
            }
        }
    }

    fn foreach_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        self.expect(&Token::Foreach, "foreach")?;
        self.expect(&Token::LParen, "( after foreach")?;
        let var = self.ident("loop variable")?;
        self.expect(&Token::In, "in")?;
        let iter = self.expression()?;
        self.expect(&Token::RParen, ") after iterable")?;
        let body = self.block()?;
        Ok(Spanned::new(
            Stmt::Foreach { var, iter, body },
            start.merge(self.prev_span()),
        ))
    }

    fn block(&mut self) -> Result<Vec<Spanned<Stmt>>> {
        self.expect(&Token::LBrace, "{")?;
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(stmts);
                }
                Some(_) => stmts.push(self.statement()?),
                None => {
                    return Err(CompileError::parser(
                        "expected } before end of input",
                        self.prev_span(),
                    ))
                }
            }
        }
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Spanned<Expr>> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Spanned<Expr>> {
        let target = self.logical_or()?;
        let op = match self.peek() {
            Some(Token::Eq) => AssignOp::Assign,
            Some(Token::PlusEq) => AssignOp::AddAssign,
            Some(Token::MinusEq) => AssignOp::SubAssign,
            Some(Token::StarEq) => AssignOp::MulAssign,
            Some(Token::SlashEq) => AssignOp::DivAssign,
            Some(Token::PercentEq) => AssignOp::ModAssign,
            _ => return Ok(target),
        };
        if !target.node.is_lvalue() {
            return Err(CompileError::parser(
                "invalid assignment target",
                target.span,
            ));
        }
        self.pos += 1;
        let value = self.assignment()?;
        let span = target.span.merge(value.span);
        Ok(Spanned::new(
            Expr::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Spanned<Expr>>,
    ) -> Result<Spanned<Expr>> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    let span = left.span.merge(right.span);
                    left = Spanned::new(
                        Expr::Binary {
                            left: Box::new(left),
                            op: *op,
                            right: Box::new(right),
                        },
                        span,
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::OrOr, BinOp::Or)], Self::logical_xor)
    }

    fn logical_xor(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::XorXor, BinOp::Xor)], Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::AndAnd, BinOp::And)], Self::bit_or)
    }

    fn bit_or(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::Pipe, BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::Caret, BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(&[(Token::Amp, BinOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(
            &[(Token::EqEq, BinOp::Eq), (Token::NotEq, BinOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(
            &[
                (Token::LtEq, BinOp::Le),
                (Token::GtEq, BinOp::Ge),
                (Token::Lt, BinOp::Lt),
                (Token::Gt, BinOp::Gt),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(
            &[(Token::Shl, BinOp::Shl), (Token::Shr, BinOp::Shr)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Spanned<Expr>> {
        self.binary_level(
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::Percent, BinOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Spanned<Expr>> {
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnOp::Not),
            Some(Token::Tilde) => Some(UnOp::BitNot),
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Plus) => Some(UnOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.span();
            self.pos += 1;
            let operand = self.unary()?;
            let span = start.merge(operand.span);
            return Ok(Spanned::new(
                Expr::Unary {
                    op,
                    expr: Box::new(operand),
                },
                span,
            ));
        }
        if matches!(self.peek(), Some(Token::PlusPlus | Token::MinusMinus)) {
            let start = self.span();
            let decrement = self.peek() == Some(&Token::MinusMinus);
            self.pos += 1;
            let target = self.unary()?;
            if !target.node.is_lvalue() {
                return Err(CompileError::parser(
                    "++/-- requires an assignable target",
                    target.span,
                ));
            }
            let span = start.merge(target.span);
            return Ok(Spanned::new(
                Expr::Step {
                    target: Box::new(target),
                    decrement,
                    prefix: true,
                },
                span,
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Spanned<Expr>> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.call_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = match expr.node {
                        Expr::Ident(name) => Spanned::new(
                            Expr::Call {
                                name: Spanned::new(name, expr.span),
                                args,
                            },
                            span,
                        ),
                        Expr::Member { recv, name } => {
                            Spanned::new(Expr::MethodCall { recv, name, args }, span)
                        }
                        _ => {
                            return Err(CompileError::parser(
                                "only named functions and methods are callable",
                                expr.span,
                            ))
                        }
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "] after index")?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Index {
                            recv: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.ident("member name")?;
                    let span = expr.span.merge(name.span);
                    expr = Spanned::new(
                        Expr::Member {
                            recv: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                Some(Token::PlusPlus | Token::MinusMinus) => {
                    if !expr.node.is_lvalue() {
                        return Err(CompileError::parser(
                            "++/-- requires an assignable target",
                            expr.span,
                        ));
                    }
                    let decrement = self.peek() == Some(&Token::MinusMinus);
                    self.pos += 1;
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Step {
                            target: Box::new(expr),
                            decrement,
                            prefix: false,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Spanned<Expr>>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen, ") after arguments")?;
            return Ok(args);
        }
    }

    fn primary(&mut self) -> Result<Spanned<Expr>> {
        let Some((token, span)) = self.advance() else {
            return Err(CompileError::parser(
                "unexpected end of input",
                self.prev_span(),
            ));
        };
        let expr = match token {
            Token::Null => Expr::Null,
            Token::True => Expr::BoolLit(true),
            Token::False => Expr::BoolLit(false),
            Token::IntLit(n) => Expr::IntLit(n),
            Token::FloatLit(f) => Expr::FloatLit(f),
            Token::StringLit(s) => Expr::StringLit(s),
            Token::CharLit(c) => Expr::CharLit(c),
            Token::Ident(name) => Expr::Ident(name),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, ") after expression")?;
                return Ok(inner);
            }
            Token::LBracket => {
                let mut elems = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        elems.push(self.expression()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RBracket, "] after array elements")?;
                        break;
                    }
                }
                return Ok(Spanned::new(
                    Expr::Array(elems),
                    span.merge(self.prev_span()),
                ));
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = match self.advance() {
                            Some((Token::StringLit(s), key_span)) => Spanned::new(s, key_span),
                            _ => {
                                return Err(CompileError::parser(
                                    "expected a string key",
                                    self.prev_span(),
                                ))
                            }
                        };
                        self.expect(&Token::Colon, ": after key")?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RBrace, "} after dictionary entries")?;
                        break;
                    }
                }
                return Ok(Spanned::new(
                    Expr::Dict(entries),
                    span.merge(self.prev_span()),
                ));
            }
            other => {
                return Err(CompileError::parser(
                    format!("unexpected token {other:?}"),
                    span,
                ))
            }
        };
        Ok(Spanned::new(expr, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        parse(&tokenize(src).unwrap()).unwrap()
    }

    fn parse_err(src: &str) -> CompileError {
        parse(&tokenize(src).unwrap()).unwrap_err()
    }

    #[test]
    fn test_var_declaration_forms() {
        let p = parse_src("var x; global const var y = 1; local var z = null;");
        assert_eq!(p.stmts.len(), 3);
        match &p.stmts[1].node {
            Stmt::VarDecl { flags, name, init } => {
                assert!(flags.is_global && flags.is_const && !flags.is_local);
                assert_eq!(name.node, "y");
                assert!(init.is_some());
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let p = parse_src("var x = 1 + 2 * 3;");
        let Stmt::VarDecl { init: Some(e), .. } = &p.stmts[0].node else {
            panic!("expected var decl");
        };
        // multiplication binds tighter: 1 + (2 * 3)
        let Expr::Binary { op, right, .. } = &e.node else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            right.node,
            Expr::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn test_assignment_right_associative() {
        let p = parse_src("a = b = 1;");
        let Stmt::Expr(e) = &p.stmts[0].node else {
            panic!("expected expr stmt");
        };
        let Expr::Assign { value, .. } = &e.node else {
            panic!("expected assignment");
        };
        assert!(matches!(value.node, Expr::Assign { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_err("1 + 2 = 3;");
        assert!(matches!(err, CompileError::Parser { .. }));
    }

    #[test]
    fn test_function_declaration() {
        let p = parse_src("func add(int a, ref float b, c) -> int { return a; }");
        let Stmt::FuncDecl(d) = &p.stmts[0].node else {
            panic!("expected func decl");
        };
        assert_eq!(d.name.node, "add");
        assert_eq!(d.params.len(), 3);
        assert_eq!(d.params[0].ty, TypeSpec::Int);
        assert!(d.params[1].by_ref);
        assert_eq!(d.params[1].ty, TypeSpec::Float);
        assert_eq!(d.params[2].ty, TypeSpec::Any);
        assert_eq!(d.ret, TypeSpec::Int);
        assert!(d.body.is_some());
    }

    #[test]
    fn test_forward_definition() {
        let p = parse_src("func later(int n);");
        let Stmt::FuncDecl(d) = &p.stmts[0].node else {
            panic!("expected func decl");
        };
        assert!(d.body.is_none());
    }

    #[test]
    fn test_unknown_param_type() {
        let err = parse_err("func f(quaternion q) {}");
        assert!(matches!(err, CompileError::Parser { .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let p = parse_src("if (a) { } else if (b) { } else { }");
        let Stmt::If { else_branch, .. } = &p.stmts[0].node else {
            panic!("expected if");
        };
        let inner = else_branch.as_ref().unwrap();
        assert!(matches!(inner.node, Stmt::If { .. }));
    }

    #[test]
    fn test_for_loop_clauses() {
        let p = parse_src("for (var i = 0; i < 10; i++) { }");
        let Stmt::For {
            init, cond, step, ..
        } = &p.stmts[0].node
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(cond.is_some());
        assert!(matches!(
            step.as_ref().unwrap().node,
            Expr::Step { prefix: false, .. }
        ));

        let p = parse_src("for (;;) { break; }");
        let Stmt::For {
            init, cond, step, ..
        } = &p.stmts[0].node
        else {
            panic!("expected for");
        };
        assert!(init.is_none() && cond.is_none() && step.is_none());
    }

    #[test]
    fn test_foreach() {
        let p = parse_src("foreach (item in list) { item; }");
        let Stmt::Foreach { var, .. } = &p.stmts[0].node else {
            panic!("expected foreach");
        };
        assert_eq!(var.node, "item");
    }

    #[test]
    fn test_array_and_dict_literals() {
        let p = parse_src(r#"var a = [1, 2, 3]; var d = {"k": 1, "j": 2};"#);
        let Stmt::VarDecl { init: Some(e), .. } = &p.stmts[0].node else {
            panic!("expected var decl");
        };
        assert!(matches!(&e.node, Expr::Array(elems) if elems.len() == 3));
        let Stmt::VarDecl { init: Some(e), .. } = &p.stmts[1].node else {
            panic!("expected var decl");
        };
        assert!(matches!(&e.node, Expr::Dict(entries) if entries.len() == 2));
    }

    #[test]
    fn test_postfix_chain() {
        let p = parse_src("a[0].name.size();");
        let Stmt::Expr(e) = &p.stmts[0].node else {
            panic!("expected expr stmt");
        };
        let Expr::MethodCall { recv, name, .. } = &e.node else {
            panic!("expected method call");
        };
        assert_eq!(name.node, "size");
        assert!(matches!(recv.node, Expr::Member { .. }));
    }

    #[test]
    fn test_short_circuit_operators_parse() {
        let p = parse_src("var x = a && b || c ^^ d;");
        let Stmt::VarDecl { init: Some(e), .. } = &p.stmts[0].node else {
            panic!("expected var decl");
        };
        // || binds loosest of the three... ^^ sits between || and &&
        let Expr::Binary { op, .. } = &e.node else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Or);
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_err("var x = 1");
        assert!(matches!(err, CompileError::Parser { .. }));
    }

    #[test]
    fn test_import_statement() {
        let p = parse_src(r#"import "lib.sbl";"#);
        let Stmt::Import(path) = &p.stmts[0].node else {
            panic!("expected import");
        };
        assert_eq!(path.node, "lib.sbl");
    }
}
