//! The evaluation engine: values, scopes, modules, operator dispatch,
//! the tree-walking evaluator, and the builtin library.

pub mod builtins;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod module;
pub mod scope;
pub mod value;

pub use error::{ErrorKind, RuntimeError, RuntimeResult};
pub use eval::Interpreter;
pub use module::{ModuleId, ModuleRegistry, BUILTIN_MODULE};
pub use value::{Payload, TypeTag, Value, ValueRef};
