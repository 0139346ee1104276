//! Module registry
//!
//! Owns every loaded module's scope tree, resolves cross-module identifier
//! lookup, and tracks which modules are imported into which. Module 0 is
//! the builtin module: host-registered symbols, always searchable.

use super::scope::{Scope, ScopeKind, ScopeRef, Symbol};
use crate::ast::FuncDecl;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Identifier of a loaded module
pub type ModuleId = usize;

/// The builtin module id
pub const BUILTIN_MODULE: ModuleId = 0;

/// An independently loaded unit of script source
#[derive(Debug)]
pub struct Module {
    pub id: ModuleId,
    /// Source path, or a synthetic name for the builtin/repl modules
    pub name: String,
    /// Root of the module's scope tree
    pub global: ScopeRef,
    /// Every top-level function declaration of the module, one entry per
    /// distinct signature in declaration order, so a call can lazily
    /// materialize a function (and all of its overloads) declared later
    /// in the file
    pub definitions: HashMap<String, Vec<Rc<FuncDecl>>>,
    /// Modules this module has imported
    imports: HashSet<ModuleId>,
}

impl Module {
    pub fn has_imported(&self, id: ModuleId) -> bool {
        self.imports.contains(&id)
    }
}

/// Registry of all loaded modules
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl ModuleRegistry {
    /// Create a registry with the builtin module already registered
    pub fn new() -> Self {
        let builtin = Module {
            id: BUILTIN_MODULE,
            name: "<builtins>".to_string(),
            global: Scope::new(ScopeKind::Builtin).into_ref(),
            definitions: HashMap::new(),
            imports: HashSet::new(),
        };
        ModuleRegistry {
            modules: vec![builtin],
        }
    }

    /// Register a new module and return its id
    pub fn register(&mut self, name: impl Into<String>) -> ModuleId {
        let id = self.modules.len();
        self.modules.push(Module {
            id,
            name: name.into(),
            global: Scope::new(ScopeKind::Global).into_ref(),
            definitions: HashMap::new(),
            imports: HashSet::new(),
        });
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }

    /// Find an already-registered module by name
    pub fn find_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().find(|m| m.name == name).map(|m| m.id)
    }

    pub fn mark_imported(&mut self, importer: ModuleId, imported: ModuleId) {
        self.modules[importer].imports.insert(imported);
    }

    /// Cross-module symbol search.
    ///
    /// Checks the requesting module's own global scope first, then every
    /// other module. A foreign symbol is visible when its module is the
    /// builtin module, or the symbol is not `local` and its module was
    /// imported by the requester, or its module is `pass_id` — the
    /// pass-through id granted to the currently executing function body so
    /// it resolves names with its defining module's permissions.
    pub fn search(&self, requester: ModuleId, name: &str, pass_id: ModuleId) -> Option<Symbol> {
        if let Some(sym) = self.modules[requester].global.borrow().get(name) {
            return Some(sym);
        }
        for module in &self.modules {
            if module.id == requester {
                continue;
            }
            if let Some(sym) = module.global.borrow().get(name) {
                let visible = module.id == BUILTIN_MODULE
                    || module.id == pass_id
                    || (!sym.is_local && self.modules[requester].has_imported(module.id));
                if visible {
                    return Some(sym);
                }
            }
        }
        None
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
