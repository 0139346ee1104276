//! Scope tree and symbol resolution
//!
//! Scopes nest per module: the global scope lives for the module's
//! lifetime, transient scopes (blocks, loops, function bodies) are pushed
//! and popped by the evaluator. A function-body scope is constructed with
//! its parent set directly to the defining module's global scope, so
//! lookups from inside a call never see the caller's locals.

use super::error::{RuntimeError, RuntimeResult};
use super::value::ValueRef;
use crate::ast::Span;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope
pub type ScopeRef = Rc<RefCell<Scope>>;

/// Kind of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Module 0: host-registered symbols, always searchable
    Builtin,
    /// A module's top-level scope
    Global,
    /// Loop body
    Local,
    /// Function declaration scope (holds nothing today; kept distinct so
    /// lookups can tell call frames from plain blocks)
    Function,
    /// Function body: parameters plus body-local declarations
    FunctionBody,
    /// Bare block or if/else arm
    Block,
}

/// A named binding of an identifier to a value handle
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: ValueRef,
    /// Never visible across module boundaries
    pub is_local: bool,
    /// Declared with the `global` modifier
    pub is_global: bool,
    /// Installed by the restricted forward-declaration pass; the full pass
    /// completes it in place
    pub hoisted: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: ValueRef) -> Self {
        Symbol {
            name: name.into(),
            value,
            is_local: false,
            is_global: false,
            hoisted: false,
        }
    }
}

/// A lexical namespace mapping names to symbols
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    symbols: HashMap<String, Symbol>,
    /// Back-reference toward the module global scope; never an ownership
    /// edge in the logical tree, but the global chain is kept alive by
    /// captured closures
    pub parent: Option<ScopeRef>,
}

impl Scope {
    pub fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            symbols: HashMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(kind: ScopeKind, parent: ScopeRef) -> Self {
        Scope {
            kind,
            symbols: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn into_ref(self) -> ScopeRef {
        Rc::new(RefCell::new(self))
    }

    /// Declare a symbol in this scope.
    ///
    /// Fails with DuplicateDeclaration if the name exists, unless the
    /// existing symbol is a hoisted global being completed by a matching
    /// declaration, which is updated in place.
    pub fn declare(&mut self, sym: Symbol, span: Span) -> RuntimeResult<()> {
        if let Some(existing) = self.symbols.get_mut(&sym.name) {
            if existing.hoisted && existing.is_global && sym.is_global {
                existing.value = sym.value;
                existing.is_local = sym.is_local;
                existing.hoisted = false;
                return Ok(());
            }
            return Err(RuntimeError::duplicate_declaration(&sym.name, span));
        }
        self.symbols.insert(sym.name.clone(), sym);
        Ok(())
    }

    /// Clear the hoisted flag once a declaration statement has completed
    /// the symbol it was installed for
    pub fn mark_completed(&mut self, name: &str) {
        if let Some(sym) = self.symbols.get_mut(name) {
            sym.hoisted = false;
        }
    }

    /// Look up in this scope only
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Iterate symbols (used by the import merge)
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Walk the parent chain looking for a name; module-registry delegation
/// happens in the evaluator when this returns None.
pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Symbol> {
    let mut current = Rc::clone(scope);
    loop {
        if let Some(sym) = current.borrow().get(name) {
            return Some(sym);
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return None,
        }
    }
}

/// Find the nearest ancestor scope of kind Global (or Builtin for the
/// builtin module's own declarations).
pub fn global_ancestor(scope: &ScopeRef) -> ScopeRef {
    let mut current = Rc::clone(scope);
    loop {
        let kind = current.borrow().kind;
        if matches!(kind, ScopeKind::Global | ScopeKind::Builtin) {
            return current;
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return current,
        }
    }
}

/// Declare into the nearest global ancestor instead of the current scope
pub fn declare_global(scope: &ScopeRef, sym: Symbol, span: Span) -> RuntimeResult<()> {
    global_ancestor(scope).borrow_mut().declare(sym, span)
}
