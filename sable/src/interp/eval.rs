//! Tree-walking evaluator
//!
//! Control flow is tracked with sticky flags rather than unwinding:
//! `break`, `continue`, and `return` set a flag that makes every
//! enclosing statement list stop early until the construct responsible
//! for the flag consumes it. Loops clear break/continue at their own
//! boundary and never touch `return_set`, which propagates to the
//! nearest function body.
//!
//! Every statement list is executed in two passes: a restricted pass
//! that evaluates only `global`-flagged declarations (installing them
//! as hoisted symbols), then the full pass, which completes the hoisted
//! symbols in place. This gives observable order-independence of global
//! declarations without a static pre-scan.

use super::builtins;
use super::dispatch;
use super::error::{RuntimeError, RuntimeResult};
use super::module::{ModuleId, ModuleRegistry};
use super::scope::{self, Scope, ScopeKind, ScopeRef, Symbol};
use super::value::{
    CharSlot, FloatSlot, FuncBody, Function, Overloads, Payload, Value, ValueRef,
};
use crate::ast::{AssignOp, BinOp, DeclFlags, Expr, FuncDecl, Program, Span, Spanned, Stmt};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The interpreter: one per embedding, reusable across programs
pub struct Interpreter {
    registry: ModuleRegistry,
    /// Innermost scope of the current evaluation
    scope: ScopeRef,
    /// Module whose program is being run; fixed for the run's duration
    current_module: ModuleId,
    /// Pass-through id: the defining module of the currently executing
    /// function body, granting it its home module's visibility
    pass_module: ModuleId,

    break_set: bool,
    continue_set: bool,
    return_set: bool,
    declare_globals_only: bool,
    loop_depth: usize,
    function_body_depth: usize,
    return_value: Option<ValueRef>,

    /// Value of the most recent expression statement (REPL echo)
    last_value: Option<ValueRef>,
    /// Directory import paths resolve against
    base_dir: PathBuf,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut registry = ModuleRegistry::new();
        builtins::install(&mut registry);
        let main = registry.register("<main>");
        let scope = Rc::clone(&registry.module(main).global);
        Interpreter {
            registry,
            scope,
            current_module: main,
            pass_module: main,
            break_set: false,
            continue_set: false,
            return_set: false,
            declare_globals_only: false,
            loop_depth: 0,
            function_body_depth: 0,
            return_value: None,
            last_value: None,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
    }

    /// Run a whole program in the main module
    pub fn run_program(&mut self, program: &Program) -> RuntimeResult<()> {
        self.last_value = None;
        self.prescan_definitions(&program.stmts);
        self.exec_stmts(&program.stmts)
    }

    /// Value of the most recent expression statement, if any
    pub fn take_last_value(&mut self) -> Option<ValueRef> {
        self.last_value.take()
    }

    /// Clear sticky control-flow state so the interpreter can be reused
    /// after a failed evaluation (REPL sessions).
    pub fn reset_control_flags(&mut self) {
        self.break_set = false;
        self.continue_set = false;
        self.return_set = false;
        self.declare_globals_only = false;
        self.return_value = None;
    }

    /// Record every top-level function declaration so a call can resolve
    /// a function, with all of its overloads, before the declaration
    /// statements have executed. Forward definitions carry no body and
    /// are skipped; a repeated signature is recorded once (the duplicate
    /// raises its error when its declaration statement runs).
    fn prescan_definitions(&mut self, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            if let Stmt::FuncDecl(d) = &stmt.node {
                if d.body.is_none() {
                    continue;
                }
                let defs = &mut self.registry.module_mut(self.current_module).definitions;
                let decls = defs.entry(d.name.node.clone()).or_default();
                if decls.iter().all(|prev| !prev.same_signature(d)) {
                    decls.push(Rc::new(d.clone()));
                }
            }
        }
    }

    fn control_flag_set(&self) -> bool {
        self.break_set || self.continue_set || self.return_set
    }

    /// Execute a statement list with the two-pass protocol
    fn exec_stmts(&mut self, stmts: &[Spanned<Stmt>]) -> RuntimeResult<()> {
        self.declare_globals_only = true;
        for stmt in stmts {
            if self.control_flag_set() {
                break;
            }
            let result = self.exec_stmt(stmt);
            if result.is_err() {
                self.declare_globals_only = false;
                return result;
            }
        }
        self.declare_globals_only = false;
        for stmt in stmts {
            if self.control_flag_set() {
                break;
            }
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Spanned<Stmt>) -> RuntimeResult<()> {
        if self.declare_globals_only {
            // restricted pass: only global-flagged declarations, and only
            // at this nesting level
            match &stmt.node {
                Stmt::VarDecl { flags, name, init } if flags.is_global => {
                    self.exec_var_decl(*flags, name, init.as_ref(), stmt.span)
                }
                Stmt::FuncDecl(d) if d.flags.is_global => self.declare_function(d),
                _ => Ok(()),
            }
        } else {
            match &stmt.node {
                Stmt::Expr(e) => {
                    let v = self.eval_expr(e)?;
                    self.last_value = Some(v);
                    Ok(())
                }
                Stmt::VarDecl { flags, name, init } => {
                    self.exec_var_decl(*flags, name, init.as_ref(), stmt.span)
                }
                Stmt::FuncDecl(d) if d.flags.is_global => {
                    // already handled by the restricted pass of this list
                    Ok(())
                }
                Stmt::FuncDecl(d) => self.declare_function(d),
                Stmt::Block(stmts) => {
                    self.with_scope(ScopeKind::Block, |s| s.exec_stmts(stmts))
                }
                Stmt::If {
                    cond,
                    then_blk,
                    else_branch,
                } => {
                    if self.condition(cond)? {
                        self.with_scope(ScopeKind::Block, |s| s.exec_stmts(then_blk))
                    } else if let Some(else_stmt) = else_branch {
                        self.exec_stmt(else_stmt)
                    } else {
                        Ok(())
                    }
                }
                Stmt::While { cond, body } => self.exec_while(cond, body),
                Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                } => self.exec_for(init.as_deref(), cond.as_ref(), step.as_ref(), body),
                Stmt::Foreach { var, iter, body } => self.exec_foreach(var, iter, body),
                Stmt::Break => {
                    if self.loop_depth == 0 {
                        return Err(RuntimeError::invalid_break(stmt.span));
                    }
                    self.break_set = true;
                    Ok(())
                }
                Stmt::Continue => {
                    if self.loop_depth == 0 {
                        return Err(RuntimeError::invalid_continue(stmt.span));
                    }
                    self.continue_set = true;
                    Ok(())
                }
                Stmt::Return(value) => {
                    if self.function_body_depth == 0 {
                        return Err(RuntimeError::invalid_return(stmt.span));
                    }
                    let v = match value {
                        Some(e) => self.eval_expr(e)?,
                        None => Value::null().into_ref(),
                    };
                    self.return_value = Some(v);
                    self.return_set = true;
                    Ok(())
                }
                Stmt::Import(path) => self.exec_import(&path.node, path.span),
            }
        }
    }

    fn exec_var_decl(
        &mut self,
        flags: DeclFlags,
        name: &Spanned<String>,
        init: Option<&Spanned<Expr>>,
        span: Span,
    ) -> RuntimeResult<()> {
        if flags.is_global && flags.is_local {
            return Err(RuntimeError::invalid_declaration(
                "a declaration cannot be both global and local",
                span,
            ));
        }
        let value = match init {
            Some(e) => self.eval_expr(e)?.borrow().deep_clone().into_ref(),
            None => Value::null().into_ref(),
        };
        if flags.is_const {
            value.borrow_mut().constant = true;
        }
        let mut sym = Symbol::new(name.node.clone(), value);
        sym.is_global = flags.is_global;
        sym.is_local = flags.is_local;
        sym.hoisted = self.declare_globals_only;
        if flags.is_global {
            scope::declare_global(&self.scope, sym, name.span)
        } else {
            self.scope.borrow_mut().declare(sym, name.span)
        }
    }

    fn declare_function(&mut self, d: &FuncDecl) -> RuntimeResult<()> {
        if d.flags.is_global && d.flags.is_local {
            return Err(RuntimeError::invalid_declaration(
                "a declaration cannot be both global and local",
                d.span,
            ));
        }
        let Some(body) = &d.body else {
            // forward definition: signature only, resolved lazily
            return Ok(());
        };
        let func = Rc::new(Function {
            name: d.name.node.clone(),
            params: d.params.clone(),
            ret: d.ret,
            body: FuncBody::Script {
                body: Rc::new(body.clone()),
                module: self.pass_module,
            },
        });
        let target = if d.flags.is_global {
            scope::global_ancestor(&self.scope)
        } else {
            Rc::clone(&self.scope)
        };
        bind_function(&target, d.flags, func, d.span)
    }

    fn exec_while(&mut self, cond: &Spanned<Expr>, body: &[Spanned<Stmt>]) -> RuntimeResult<()> {
        self.with_loop(|s| {
            while s.condition(cond)? {
                s.with_scope(ScopeKind::Local, |s| s.exec_stmts(body))?;
                s.continue_set = false;
                if s.break_set {
                    s.break_set = false;
                    break;
                }
                if s.return_set {
                    break;
                }
            }
            Ok(())
        })
    }

    fn exec_for(
        &mut self,
        init: Option<&Spanned<Stmt>>,
        cond: Option<&Spanned<Expr>>,
        step: Option<&Spanned<Expr>>,
        body: &[Spanned<Stmt>],
    ) -> RuntimeResult<()> {
        self.with_scope(ScopeKind::Local, |s| {
            if let Some(init) = init {
                s.exec_stmt(init)?;
            }
            s.with_loop(|s| {
                loop {
                    if let Some(cond) = cond {
                        if !s.condition(cond)? {
                            break;
                        }
                    }
                    s.with_scope(ScopeKind::Block, |s| s.exec_stmts(body))?;
                    // a continued iteration still runs the step expression
                    s.continue_set = false;
                    if s.break_set {
                        s.break_set = false;
                        break;
                    }
                    if s.return_set {
                        break;
                    }
                    if let Some(step) = step {
                        s.eval_expr(step)?;
                    }
                }
                Ok(())
            })
        })
    }

    fn exec_foreach(
        &mut self,
        var: &Spanned<String>,
        iter: &Spanned<Expr>,
        body: &[Spanned<Stmt>],
    ) -> RuntimeResult<()> {
        let source = self.eval_expr(iter)?;
        // element handles, not copies: mutation through the loop variable
        // reaches the container
        let elements: Vec<ValueRef> = {
            let v = source.borrow();
            match &v.payload {
                Payload::Array(elems) => elems.iter().map(Rc::clone).collect(),
                Payload::Dict(map) => {
                    let mut keys: Vec<_> = map.keys().cloned().collect();
                    keys.sort();
                    keys.iter().map(|k| Rc::clone(&map[k])).collect()
                }
                Payload::Str(s) => (0..s.chars().count())
                    .map(|index| {
                        Value::new(Payload::CharRef(CharSlot {
                            owner: Rc::clone(&source),
                            index,
                        }))
                        .into_ref()
                    })
                    .collect(),
                _ => {
                    return Err(RuntimeError::type_mismatch(
                        format!("cannot iterate over {}", v.kind_name()),
                        iter.span,
                    ))
                }
            }
        };
        self.with_loop(|s| {
            for element in elements {
                s.with_scope(ScopeKind::Local, |s| {
                    let sym = Symbol::new(var.node.clone(), element);
                    s.scope.borrow_mut().declare(sym, var.span)?;
                    s.exec_stmts(body)
                })?;
                s.continue_set = false;
                if s.break_set {
                    s.break_set = false;
                    break;
                }
                if s.return_set {
                    break;
                }
            }
            Ok(())
        })
    }

    fn exec_import(&mut self, path: &str, span: Span) -> RuntimeResult<()> {
        let full = self.base_dir.join(path);
        let key = full.to_string_lossy().to_string();
        let id = match self.registry.find_by_name(&key) {
            Some(id) => id,
            None => self.load_module(&full, &key, span)?,
        };
        if id == self.current_module {
            return Ok(());
        }
        self.registry.mark_imported(self.current_module, id);

        // merge the module's non-local top-level symbols into the current
        // scope; collisions follow the duplicate-declaration rule
        let exported: Vec<Symbol> = self
            .registry
            .module(id)
            .global
            .borrow()
            .symbols()
            .filter(|s| !s.is_local)
            .cloned()
            .collect();
        for mut sym in exported {
            sym.hoisted = false;
            // the same binding arriving along two import paths is fine;
            // a genuinely different one collides
            if let Some(prev) = self.scope.borrow().get(&sym.name) {
                if Rc::ptr_eq(&prev.value, &sym.value) {
                    continue;
                }
            }
            self.scope.borrow_mut().declare(sym, span)?;
        }

        // merge exported function definitions for lazy resolution
        let defs: Vec<(String, Vec<Rc<FuncDecl>>)> = self
            .registry
            .module(id)
            .definitions
            .iter()
            .map(|(k, decls)| {
                let exported: Vec<Rc<FuncDecl>> = decls
                    .iter()
                    .filter(|d| !d.flags.is_local)
                    .cloned()
                    .collect();
                (k.clone(), exported)
            })
            .filter(|(_, decls)| !decls.is_empty())
            .collect();
        let own = &mut self.registry.module_mut(self.current_module).definitions;
        for (name, decls) in defs {
            own.entry(name).or_insert(decls);
        }
        Ok(())
    }

    /// Load, register, and run a module file to completion
    fn load_module(&mut self, full: &Path, key: &str, span: Span) -> RuntimeResult<ModuleId> {
        let source = std::fs::read_to_string(full).map_err(|e| {
            RuntimeError::builtin(format!("cannot read module {}: {e}", full.display()), span)
        })?;
        let tokens = crate::lexer::tokenize(&source).map_err(|e| {
            RuntimeError::builtin(format!("error in module {}: {e}", full.display()), span)
        })?;
        let program = crate::parser::parse(&tokens).map_err(|e| {
            RuntimeError::builtin(format!("error in module {}: {e}", full.display()), span)
        })?;

        let id = self.registry.register(key);
        let module_scope = Rc::clone(&self.registry.module(id).global);
        let module_dir = full
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let saved_scope = std::mem::replace(&mut self.scope, module_scope);
        let saved_module = std::mem::replace(&mut self.current_module, id);
        let saved_pass = std::mem::replace(&mut self.pass_module, id);
        let saved_dir = std::mem::replace(&mut self.base_dir, module_dir);
        // a module's top level is neither a loop body nor a function
        // body, no matter where the import statement sits; break /
        // continue / return there must be judged against the module's
        // own nesting
        let saved_loop = std::mem::replace(&mut self.loop_depth, 0);
        let saved_body = std::mem::replace(&mut self.function_body_depth, 0);

        self.prescan_definitions(&program.stmts);
        let result = self.exec_stmts(&program.stmts);

        self.scope = saved_scope;
        self.current_module = saved_module;
        self.pass_module = saved_pass;
        self.base_dir = saved_dir;
        self.loop_depth = saved_loop;
        self.function_body_depth = saved_body;
        result?;
        Ok(id)
    }

    /// Run a closure in a fresh child scope; the pop is unconditional,
    /// including the error path.
    fn with_scope<T>(
        &mut self,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let child = Scope::with_parent(kind, Rc::clone(&self.scope)).into_ref();
        let saved = std::mem::replace(&mut self.scope, child);
        let result = f(self);
        self.scope = saved;
        result
    }

    fn with_loop<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        self.loop_depth += 1;
        let result = f(self);
        self.loop_depth -= 1;
        result
    }

    /// Evaluate a condition; anything but a bool is a TypeMismatch
    fn condition(&mut self, e: &Spanned<Expr>) -> RuntimeResult<bool> {
        let v = self.eval_expr(e)?;
        let b = v.borrow().as_bool();
        b.ok_or_else(|| {
            RuntimeError::type_mismatch(
                format!("condition must be a bool, got {}", v.borrow().kind_name()),
                e.span,
            )
        })
    }

    /// Evaluate an expression to a value handle
    pub fn eval_expr(&mut self, e: &Spanned<Expr>) -> RuntimeResult<ValueRef> {
        // deep expression trees recurse heavily; grow the stack as needed
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.eval_expr_inner(e))
    }

    fn eval_expr_inner(&mut self, e: &Spanned<Expr>) -> RuntimeResult<ValueRef> {
        let span = e.span;
        match &e.node {
            Expr::Null => Ok(Value::null().into_ref()),
            Expr::IntLit(n) => Ok(Value::int(*n).into_ref()),
            Expr::FloatLit(f) => Ok(Value::float(*f).into_ref()),
            Expr::BoolLit(b) => Ok(Value::bool(*b).into_ref()),
            Expr::StringLit(s) => Ok(Value::str(s.clone()).into_ref()),
            Expr::CharLit(c) => Ok(Value::char(*c).into_ref()),
            Expr::Ident(name) => self.resolve(name, span),
            Expr::Array(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for elem in elems {
                    out.push(self.eval_expr(elem)?);
                }
                Ok(Value::array(out).into_ref())
            }
            Expr::Dict(entries) => {
                let mut map = std::collections::HashMap::new();
                for (key, value) in entries {
                    let v = self.eval_expr(value)?;
                    map.insert(key.node.clone(), v);
                }
                Ok(Value::dict(map).into_ref())
            }
            Expr::Binary { left, op, right } => match op {
                // && and || short-circuit; both demand bool operands
                BinOp::And => {
                    if !self.bool_operand(left)? {
                        return Ok(Value::bool(false).into_ref());
                    }
                    Ok(Value::bool(self.bool_operand(right)?).into_ref())
                }
                BinOp::Or => {
                    if self.bool_operand(left)? {
                        return Ok(Value::bool(true).into_ref());
                    }
                    Ok(Value::bool(self.bool_operand(right)?).into_ref())
                }
                _ => {
                    let l = self.eval_expr(left)?;
                    let r = self.eval_expr(right)?;
                    dispatch::binary(*op, &l, &r, span)
                }
            },
            Expr::Unary { op, expr } => {
                let v = self.eval_expr(expr)?;
                dispatch::unary(*op, &v, span)
            }
            Expr::Assign { target, op, value } => {
                let slot = self.eval_lvalue(target)?;
                let v = self.eval_expr(value)?;
                match op {
                    AssignOp::Assign => dispatch::assign(&slot, &v, span),
                    _ => dispatch::compound(*op, &slot, &v, span),
                }
            }
            Expr::Step {
                target,
                decrement,
                prefix,
            } => {
                let slot = self.eval_lvalue(target)?;
                dispatch::step(&slot, *decrement, *prefix, span)
            }
            Expr::Call { name, args } => {
                let callee = self.resolve_callable(&name.node, name.span)?;
                self.call_value(&callee, &name.node, args, span)
            }
            Expr::MethodCall { recv, name, args } => self.eval_method_call(recv, name, args, span),
            Expr::Member { recv, name } => {
                let receiver = self.eval_expr(recv)?;
                self.eval_member(&receiver, &name.node, name.span, false)
            }
            Expr::Index { recv, index } => {
                let receiver = self.eval_expr(recv)?;
                let idx = self.eval_expr(index)?;
                self.eval_index(&receiver, &idx, index.span, false)
            }
        }
    }

    fn bool_operand(&mut self, e: &Spanned<Expr>) -> RuntimeResult<bool> {
        let v = self.eval_expr(e)?;
        let b = v.borrow().as_bool();
        b.ok_or_else(|| {
            RuntimeError::type_mismatch(
                format!(
                    "logical operand must be a bool, got {}",
                    v.borrow().kind_name()
                ),
                e.span,
            )
        })
    }

    /// Resolve an identifier: scope chain, then cross-module search, then
    /// lazy materialization from recorded function definitions.
    fn resolve(&mut self, name: &str, span: Span) -> RuntimeResult<ValueRef> {
        if let Some(sym) = scope::lookup(&self.scope, name) {
            return Ok(sym.value);
        }
        if let Some(sym) = self
            .registry
            .search(self.current_module, name, self.pass_module)
        {
            return Ok(sym.value);
        }
        if let Some(value) = self.materialize_definition(name)? {
            return Ok(value);
        }
        Err(RuntimeError::undefined_identifier(name, span))
    }

    fn resolve_callable(&mut self, name: &str, span: Span) -> RuntimeResult<ValueRef> {
        self.resolve(name, span)
    }

    /// Bind the recorded top-level declarations of a function into its
    /// module's global scope so a call can reach it before the
    /// declaration statements have executed. Every overload is bound at
    /// once, in declaration order, so early calls resolve against the
    /// same set a late call would. The symbol is marked hoisted so the
    /// declaration statements later complete it without duplicate errors.
    fn materialize_definition(&mut self, name: &str) -> RuntimeResult<Option<ValueRef>> {
        let found = [self.pass_module, self.current_module]
            .iter()
            .find_map(|&m| {
                self.registry
                    .module(m)
                    .definitions
                    .get(name)
                    .filter(|decls| !decls.is_empty())
                    .map(|decls| (m, decls.clone()))
            });
        let Some((module, decls)) = found else {
            return Ok(None);
        };
        let variants: Vec<Rc<Function>> = decls
            .iter()
            .filter_map(|decl| {
                let body = decl.body.as_ref()?;
                Some(Rc::new(Function {
                    name: decl.name.node.clone(),
                    params: decl.params.clone(),
                    ret: decl.ret,
                    body: FuncBody::Script {
                        body: Rc::new(body.clone()),
                        module,
                    },
                }))
            })
            .collect();
        let payload = match variants.len() {
            0 => return Ok(None),
            1 => Payload::Func(Rc::clone(&variants[0])),
            n => Payload::Overloads(Overloads {
                name: name.to_string(),
                variants,
                hoisted_pending: n,
            }),
        };
        let value = Value::new(payload).into_ref();
        let mut sym = Symbol::new(name, Rc::clone(&value));
        sym.is_global = decls[0].flags.is_global;
        sym.is_local = decls[0].flags.is_local;
        sym.hoisted = true;
        let global = Rc::clone(&self.registry.module(module).global);
        global.borrow_mut().declare(sym, decls[0].span)?;
        Ok(Some(value))
    }

    /// Evaluate an expression as a storage location
    fn eval_lvalue(&mut self, e: &Spanned<Expr>) -> RuntimeResult<ValueRef> {
        match &e.node {
            Expr::Ident(name) => self.resolve(name, e.span),
            Expr::Index { recv, index } => {
                let receiver = self.eval_expr(recv)?;
                let idx = self.eval_expr(index)?;
                self.eval_index(&receiver, &idx, index.span, true)
            }
            Expr::Member { recv, name } => {
                let receiver = self.eval_expr(recv)?;
                self.eval_member(&receiver, &name.node, name.span, true)
            }
            _ => Err(RuntimeError::invalid_operation(
                "expression is not an assignable location",
                e.span,
            )),
        }
    }

    /// Index access. `create` is set for lvalue position: a missing
    /// dictionary key is inserted as null instead of erroring.
    fn eval_index(
        &mut self,
        receiver: &ValueRef,
        index: &ValueRef,
        span: Span,
        create: bool,
    ) -> RuntimeResult<ValueRef> {
        let handle = {
            let r = receiver.borrow();
            match &r.payload {
                Payload::Array(elems) => {
                    let i = index.borrow().as_int().ok_or_else(|| {
                        RuntimeError::type_mismatch(
                            format!("array index must be an int, got {}", index.borrow().kind_name()),
                            span,
                        )
                    })?;
                    if i < 0 || i as usize >= elems.len() {
                        return Err(RuntimeError::out_of_bounds(i, elems.len(), span));
                    }
                    Some(Rc::clone(&elems[i as usize]))
                }
                Payload::Dict(map) => {
                    let key = match &index.borrow().payload {
                        Payload::Str(s) => s.clone(),
                        other => {
                            return Err(RuntimeError::type_mismatch(
                                format!(
                                    "dictionary key must be a string, got {}",
                                    Value::new(other.clone()).kind_name()
                                ),
                                span,
                            ))
                        }
                    };
                    match map.get(&key) {
                        Some(v) => Some(Rc::clone(v)),
                        None if create => None,
                        None => {
                            return Err(RuntimeError::new(
                                super::ErrorKind::OutOfBounds,
                                format!("key not found: {key}"),
                                span,
                            ))
                        }
                    }
                }
                Payload::Str(s) => {
                    let i = index.borrow().as_int().ok_or_else(|| {
                        RuntimeError::type_mismatch("string index must be an int", span)
                    })?;
                    let len = s.chars().count();
                    if i < 0 || i as usize >= len {
                        return Err(RuntimeError::out_of_bounds(i, len, span));
                    }
                    Some(
                        Value::new(Payload::CharRef(CharSlot {
                            owner: Rc::clone(receiver),
                            index: i as usize,
                        }))
                        .into_ref(),
                    )
                }
                Payload::Vec2(_) | Payload::Vec3(_) => {
                    let len = if matches!(r.payload, Payload::Vec2(_)) { 2 } else { 3 };
                    let i = index.borrow().as_int().ok_or_else(|| {
                        RuntimeError::type_mismatch("vector index must be an int", span)
                    })?;
                    if i < 0 || i as usize >= len {
                        return Err(RuntimeError::out_of_bounds(i, len, span));
                    }
                    Some(
                        Value::new(Payload::FloatRef(FloatSlot {
                            owner: Rc::clone(receiver),
                            index: i as usize,
                        }))
                        .into_ref(),
                    )
                }
                other => {
                    return Err(RuntimeError::type_mismatch(
                        format!("cannot index {}", Value::new(other.clone()).kind_name()),
                        span,
                    ))
                }
            }
        };
        match handle {
            Some(h) => Ok(h),
            None => {
                // lvalue on a missing dictionary key: insert a null slot
                let slot = Value::null().into_ref();
                let key = match &index.borrow().payload {
                    Payload::Str(s) => s.clone(),
                    _ => unreachable!("checked above"),
                };
                if let Payload::Dict(map) = &mut receiver.borrow_mut().payload {
                    map.insert(key, Rc::clone(&slot));
                }
                Ok(slot)
            }
        }
    }

    /// Member access. Vector components are float references into the
    /// receiver, pair halves are the aliased handles, comparator members
    /// are fresh values. Instance members come last; `create` installs a
    /// missing one as a null slot (ad hoc fields).
    fn eval_member(
        &mut self,
        receiver: &ValueRef,
        name: &str,
        span: Span,
        create: bool,
    ) -> RuntimeResult<ValueRef> {
        {
            let r = receiver.borrow();
            match &r.payload {
                Payload::Vec2(_) => {
                    if let Some(index) = component_index(name, 2) {
                        return Ok(Value::new(Payload::FloatRef(FloatSlot {
                            owner: Rc::clone(receiver),
                            index,
                        }))
                        .into_ref());
                    }
                }
                Payload::Vec3(_) => {
                    if let Some(index) = component_index(name, 3) {
                        return Ok(Value::new(Payload::FloatRef(FloatSlot {
                            owner: Rc::clone(receiver),
                            index,
                        }))
                        .into_ref());
                    }
                }
                Payload::Pair(first, second) => match name {
                    "first" => return Ok(Rc::clone(first)),
                    "second" => return Ok(Rc::clone(second)),
                    _ => {}
                },
                Payload::Cmp(cmp) => {
                    if name == "same_type" {
                        return Ok(Value::bool(cmp.same_type).into_ref());
                    }
                    if let Some(relation) = cmp.relation(name) {
                        return Ok(match relation {
                            Some(b) => Value::bool(b).into_ref(),
                            None => Value::null().into_ref(),
                        });
                    }
                }
                _ => {}
            }
            if let Some(member) = r.member(name) {
                return Ok(member);
            }
        }
        if create {
            let slot = Value::null().into_ref();
            receiver.borrow_mut().set_member(name, Rc::clone(&slot));
            return Ok(slot);
        }
        Err(RuntimeError::undefined_identifier(
            &format!("{name} (no such member on {})", receiver.borrow().kind_name()),
            span,
        ))
    }

    fn eval_method_call(
        &mut self,
        recv: &Spanned<Expr>,
        name: &Spanned<String>,
        args: &[Spanned<Expr>],
        span: Span,
    ) -> RuntimeResult<ValueRef> {
        let receiver = self.eval_expr(recv)?;
        let tag = receiver.borrow().type_tag();
        // constant per-kind method tables first; user fields can never
        // shadow builtin behavior
        if let Some(method) = builtins::find_method(tag, &name.node) {
            let mut handles = Vec::with_capacity(args.len());
            for arg in args {
                handles.push(self.eval_expr(arg)?);
            }
            return method(&receiver, &handles, span);
        }
        let member = receiver.borrow().member(&name.node);
        match member {
            Some(value)
                if matches!(
                    value.borrow().payload,
                    Payload::Func(_) | Payload::Overloads(_)
                ) =>
            {
                self.call_value(&value, &name.node, args, span)
            }
            Some(_) => Err(RuntimeError::type_mismatch(
                format!("member {} is not callable", name.node),
                name.span,
            )),
            None => Err(RuntimeError::undefined_identifier(
                &format!("{} (no such method on {})", name.node, tag.name()),
                name.span,
            )),
        }
    }

    /// Call a function value: evaluate arguments once, select an overload
    /// variant if needed, bind parameters, run the body.
    fn call_value(
        &mut self,
        callee: &ValueRef,
        name: &str,
        arg_exprs: &[Spanned<Expr>],
        span: Span,
    ) -> RuntimeResult<ValueRef> {
        let mut handles = Vec::with_capacity(arg_exprs.len());
        for arg in arg_exprs {
            handles.push(self.eval_expr(arg)?);
        }
        let func = {
            let v = callee.borrow();
            match &v.payload {
                Payload::Func(f) => Rc::clone(f),
                Payload::Overloads(o) => select_overload(o, &handles, name, span)?,
                other => {
                    return Err(RuntimeError::type_mismatch(
                        format!("{name} is not callable (it is {})", Value::new(other.clone()).kind_name()),
                        span,
                    ))
                }
            }
        };
        self.invoke(&func, arg_exprs, handles, span)
    }

    fn invoke(
        &mut self,
        func: &Rc<Function>,
        arg_exprs: &[Spanned<Expr>],
        handles: Vec<ValueRef>,
        span: Span,
    ) -> RuntimeResult<ValueRef> {
        let (body, module) = match &func.body {
            FuncBody::Native(native) => return native(&handles, span),
            FuncBody::Script { body, module } => (Rc::clone(body), *module),
        };
        if func.params.len() != handles.len() {
            return Err(RuntimeError::argument_count(
                &func.name,
                func.params.len(),
                handles.len(),
                span,
            ));
        }

        // bind parameters: ref params alias the caller's storage and
        // require an lvalue argument; value params deep-clone
        let defining_global = Rc::clone(&self.registry.module(module).global);
        let body_scope =
            Scope::with_parent(ScopeKind::FunctionBody, defining_global).into_ref();
        for ((param, handle), arg) in func.params.iter().zip(handles).zip(arg_exprs) {
            if !handle.borrow().matches_spec(param.ty) {
                return Err(RuntimeError::type_mismatch(
                    format!(
                        "argument for parameter {} must be {}, got {}",
                        param.name.node,
                        param.ty.name(),
                        handle.borrow().kind_name()
                    ),
                    arg.span,
                ));
            }
            let bound = if param.by_ref {
                if !arg.node.is_lvalue() {
                    return Err(RuntimeError::invalid_operation(
                        format!(
                            "argument for ref parameter {} must be an identifier, index, or member",
                            param.name.node
                        ),
                        arg.span,
                    ));
                }
                handle
            } else {
                handle.borrow().deep_clone().into_ref()
            };
            let sym = Symbol::new(param.name.node.clone(), bound);
            body_scope.borrow_mut().declare(sym, param.name.span)?;
        }

        // run the body with fresh loop state and the defining module's
        // pass-through visibility
        let saved_scope = std::mem::replace(&mut self.scope, body_scope);
        let saved_pass = std::mem::replace(&mut self.pass_module, module);
        let saved_loop = std::mem::replace(&mut self.loop_depth, 0);
        let saved_restricted = std::mem::replace(&mut self.declare_globals_only, false);
        self.function_body_depth += 1;

        let result = self.exec_stmts(&body);

        self.scope = saved_scope;
        self.pass_module = saved_pass;
        self.loop_depth = saved_loop;
        self.declare_globals_only = saved_restricted;
        self.function_body_depth -= 1;
        result?;

        if self.return_set {
            self.return_set = false;
            Ok(self
                .return_value
                .take()
                .unwrap_or_else(|| Value::null().into_ref()))
        } else {
            Ok(Value::null().into_ref())
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn component_index(name: &str, len: usize) -> Option<usize> {
    let index = match name {
        "x" => 0,
        "y" => 1,
        "z" => 2,
        _ => return None,
    };
    (index < len).then_some(index)
}

fn params_match(a: &Function, b: &Function) -> bool {
    a.params.len() == b.params.len()
        && a.params.iter().zip(&b.params).all(|(x, y)| x.ty == y.ty)
}

/// Declare a function symbol, extending an existing binding of the same
/// name into an overload bundle when the signature is new. A hoisted
/// symbol (materialized ahead of its declaration statement) is completed
/// in place by a matching declaration.
fn bind_function(
    target: &ScopeRef,
    flags: DeclFlags,
    func: Rc<Function>,
    span: Span,
) -> RuntimeResult<()> {
    let existing = target.borrow().get(&func.name);
    if let Some(sym) = existing {
        let mut v = sym.value.borrow_mut();
        match &mut v.payload {
            Payload::Func(f) => {
                if params_match(f, &func) {
                    if sym.hoisted {
                        *f = func;
                        drop(v);
                        target.borrow_mut().mark_completed(&sym.name);
                        return Ok(());
                    }
                    return Err(RuntimeError::duplicate_declaration(&func.name, span));
                }
                let first = Rc::clone(f);
                let name = func.name.clone();
                v.payload = Payload::Overloads(Overloads {
                    name,
                    variants: vec![first, func],
                    hoisted_pending: 0,
                });
                Ok(())
            }
            Payload::Overloads(o) => {
                if let Some(i) = o.variants.iter().position(|v| params_match(v, &func)) {
                    // a materialized variant is completed by its own
                    // declaration statement; the symbol stays hoisted
                    // until every variant has been
                    if sym.hoisted && o.hoisted_pending > 0 {
                        o.variants[i] = func;
                        o.hoisted_pending -= 1;
                        if o.hoisted_pending == 0 {
                            drop(v);
                            target.borrow_mut().mark_completed(&sym.name);
                        }
                        return Ok(());
                    }
                    return Err(RuntimeError::duplicate_declaration(&func.name, span));
                }
                o.variants.push(func);
                Ok(())
            }
            _ => Err(RuntimeError::duplicate_declaration(&func.name, span)),
        }
    } else {
        let mut sym = Symbol::new(
            func.name.clone(),
            Value::new(Payload::Func(func)).into_ref(),
        );
        sym.is_global = flags.is_global;
        sym.is_local = flags.is_local;
        target.borrow_mut().declare(sym, span)
    }
}

/// Scan an overload bundle in declaration order; first accepting variant
/// wins.
fn select_overload(
    overloads: &Overloads,
    args: &[ValueRef],
    name: &str,
    span: Span,
) -> RuntimeResult<Rc<Function>> {
    for variant in &overloads.variants {
        if variant.accepts(args) {
            return Ok(Rc::clone(variant));
        }
    }
    let count_matches = overloads
        .variants
        .iter()
        .any(|v| v.params.len() == args.len());
    if count_matches {
        Err(RuntimeError::type_mismatch(
            format!("no overload of {name} matches the argument types"),
            span,
        ))
    } else {
        Err(RuntimeError::new(
            super::ErrorKind::InvalidArgumentCount,
            format!("no overload of {name} takes {} argument(s)", args.len()),
            span,
        ))
    }
}

// Unit tests for the evaluator live in tests/language.rs, which drives
// whole programs through the lexer and parser; the pieces are too
// interdependent to test meaningfully in isolation.
