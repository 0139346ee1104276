//! Runtime values for the evaluator
//!
//! Values are handled through `Rc<RefCell<_>>` so that array elements,
//! dictionary entries, foreach loop variables, and by-reference parameters
//! can all alias the same storage within one synchronous call stack.

use super::error::RuntimeResult;
use super::module::ModuleId;
use crate::ast::{Param, Span, Spanned, Stmt, TypeSpec};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::BufReader;
use std::rc::Rc;

/// Shared handle to a value
pub type ValueRef = Rc<RefCell<Value>>;

/// Native (host-registered) function
pub type NativeFn = fn(&[ValueRef], Span) -> RuntimeResult<ValueRef>;

/// A dynamic value: payload plus per-instance state
#[derive(Debug, Clone)]
pub struct Value {
    pub payload: Payload,
    /// Constant values reject assignment and compound assignment
    pub constant: bool,
    /// Ad hoc per-instance fields, allocated lazily
    pub members: Option<HashMap<String, ValueRef>>,
}

/// The payload of a value
#[derive(Debug, Clone)]
pub enum Payload {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Bool(bool),
    /// Type tag, e.g. the value of the builtin constant `int`
    Type(TypeTag),
    /// Open file handle; shared, explicitly closed by script code
    File(Rc<RefCell<FileState>>),
    Vec2([f64; 2]),
    Vec3([f64; 3]),
    /// Pair of shared handles
    Pair(ValueRef, ValueRef),
    /// Comparator bundle produced by compare_all
    Cmp(Comparator),
    /// Aliases a float slot inside a vector
    FloatRef(FloatSlot),
    /// Aliases a character slot inside a string
    CharRef(CharSlot),
    Array(Vec<ValueRef>),
    Dict(HashMap<String, ValueRef>),
    Func(Rc<Function>),
    /// Named bundle of overloaded function variants
    Overloads(Overloads),
}

/// Dynamic kind of a value, also the payload of type-tag values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Null,
    Int,
    Float,
    Str,
    Char,
    Bool,
    Type,
    File,
    Vec2,
    Vec3,
    Pair,
    Cmp,
    Array,
    Dict,
    Function,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "string",
            TypeTag::Char => "char",
            TypeTag::Bool => "bool",
            TypeTag::Type => "type",
            TypeTag::File => "file",
            TypeTag::Vec2 => "vec2",
            TypeTag::Vec3 => "vec3",
            TypeTag::Pair => "pair",
            TypeTag::Cmp => "comparator",
            TypeTag::Array => "array",
            TypeTag::Dict => "dict",
            TypeTag::Function => "function",
        }
    }
}

/// Base kind used by the assignment re-typing rule: scalar slots may
/// re-type freely, container and function slots are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Scalar,
    Array,
    Dict,
    Function,
}

/// A float slot inside a vector value
#[derive(Debug, Clone)]
pub struct FloatSlot {
    /// The vector that owns the slot; the alias keeps it alive
    pub owner: ValueRef,
    pub index: usize,
}

impl FloatSlot {
    /// Read through the alias; None if the owner no longer has the slot
    pub fn get(&self) -> Option<f64> {
        match &self.owner.borrow().payload {
            Payload::Vec2(c) => c.get(self.index).copied(),
            Payload::Vec3(c) => c.get(self.index).copied(),
            _ => None,
        }
    }

    /// Write through the alias; false if the slot is gone
    pub fn set(&self, v: f64) -> bool {
        match &mut self.owner.borrow_mut().payload {
            Payload::Vec2(c) => {
                if let Some(slot) = c.get_mut(self.index) {
                    *slot = v;
                    return true;
                }
                false
            }
            Payload::Vec3(c) => {
                if let Some(slot) = c.get_mut(self.index) {
                    *slot = v;
                    return true;
                }
                false
            }
            _ => false,
        }
    }
}

/// A character slot inside a string value
#[derive(Debug, Clone)]
pub struct CharSlot {
    pub owner: ValueRef,
    /// Character index, not byte index
    pub index: usize,
}

impl CharSlot {
    pub fn get(&self) -> Option<char> {
        match &self.owner.borrow().payload {
            Payload::Str(s) => s.chars().nth(self.index),
            _ => None,
        }
    }

    pub fn set(&self, c: char) -> bool {
        match &mut self.owner.borrow_mut().payload {
            Payload::Str(s) => {
                if let Some((byte_idx, old)) = s.char_indices().nth(self.index) {
                    s.replace_range(byte_idx..byte_idx + old.len_utf8(), &c.to_string());
                    return true;
                }
                false
            }
            _ => false,
        }
    }
}

/// All six relational results plus a type-equality flag; None marks a
/// relation whose dispatch raised TypeMismatch (rendered as null)
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    pub lt: Option<bool>,
    pub gt: Option<bool>,
    pub le: Option<bool>,
    pub ge: Option<bool>,
    pub eq: Option<bool>,
    pub ne: Option<bool>,
    pub same_type: bool,
}

impl Comparator {
    pub fn relation(&self, name: &str) -> Option<Option<bool>> {
        match name {
            "lt" => Some(self.lt),
            "gt" => Some(self.gt),
            "le" => Some(self.le),
            "ge" => Some(self.ge),
            "eq" => Some(self.eq),
            "ne" => Some(self.ne),
            _ => None,
        }
    }
}

/// State behind a file-handle value
#[derive(Debug)]
pub struct FileState {
    pub path: String,
    pub reader: Option<BufReader<fs::File>>,
    pub writer: Option<fs::File>,
    pub closed: bool,
}

/// A callable function: native or script
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// Declared return type; informational only
    pub ret: TypeSpec,
    pub body: FuncBody,
}

#[derive(Debug)]
pub enum FuncBody {
    /// Host-registered; validates its own arguments
    Native(NativeFn),
    /// AST closure over its defining module's global scope
    Script {
        body: Rc<Vec<Spanned<Stmt>>>,
        module: ModuleId,
    },
}

impl Function {
    /// Arguments match when counts agree and each argument's dynamic kind
    /// equals the declared parameter kind (or the parameter is `any`).
    pub fn accepts(&self, args: &[ValueRef]) -> bool {
        if let FuncBody::Native(_) = self.body {
            // natives validate their own arguments
            return true;
        }
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(p, a)| a.borrow().matches_spec(p.ty))
    }
}

/// Overload bundle; scanned in declaration order, first match wins
#[derive(Debug, Clone)]
pub struct Overloads {
    pub name: String,
    pub variants: Vec<Rc<Function>>,
    /// Variants bound ahead of their declaration statements and not yet
    /// re-declared; the symbol stays hoisted until this reaches zero
    pub hoisted_pending: usize,
}

impl Value {
    pub fn new(payload: Payload) -> Self {
        Value {
            payload,
            constant: false,
            members: None,
        }
    }

    pub fn null() -> Self {
        Value::new(Payload::Null)
    }

    pub fn int(n: i64) -> Self {
        Value::new(Payload::Int(n))
    }

    pub fn float(f: f64) -> Self {
        Value::new(Payload::Float(f))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::new(Payload::Str(s.into()))
    }

    pub fn char(c: char) -> Self {
        Value::new(Payload::Char(c))
    }

    pub fn bool(b: bool) -> Self {
        Value::new(Payload::Bool(b))
    }

    pub fn array(elems: Vec<ValueRef>) -> Self {
        Value::new(Payload::Array(elems))
    }

    pub fn dict(map: HashMap<String, ValueRef>) -> Self {
        Value::new(Payload::Dict(map))
    }

    pub fn vec2(x: f64, y: f64) -> Self {
        Value::new(Payload::Vec2([x, y]))
    }

    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        Value::new(Payload::Vec3([x, y, z]))
    }

    pub fn as_const(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn into_ref(self) -> ValueRef {
        Rc::new(RefCell::new(self))
    }

    /// Dynamic kind; scalar references report the kind they alias
    pub fn type_tag(&self) -> TypeTag {
        match &self.payload {
            Payload::Null => TypeTag::Null,
            Payload::Int(_) => TypeTag::Int,
            Payload::Float(_) | Payload::FloatRef(_) => TypeTag::Float,
            Payload::Str(_) => TypeTag::Str,
            Payload::Char(_) | Payload::CharRef(_) => TypeTag::Char,
            Payload::Bool(_) => TypeTag::Bool,
            Payload::Type(_) => TypeTag::Type,
            Payload::File(_) => TypeTag::File,
            Payload::Vec2(_) => TypeTag::Vec2,
            Payload::Vec3(_) => TypeTag::Vec3,
            Payload::Pair(_, _) => TypeTag::Pair,
            Payload::Cmp(_) => TypeTag::Cmp,
            Payload::Array(_) => TypeTag::Array,
            Payload::Dict(_) => TypeTag::Dict,
            Payload::Func(_) | Payload::Overloads(_) => TypeTag::Function,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// Base kind for the assignment re-typing rule; None for null slots
    pub fn base_kind(&self) -> Option<BaseKind> {
        match &self.payload {
            Payload::Null => None,
            Payload::Array(_) => Some(BaseKind::Array),
            Payload::Dict(_) => Some(BaseKind::Dict),
            Payload::Func(_) | Payload::Overloads(_) => Some(BaseKind::Function),
            _ => Some(BaseKind::Scalar),
        }
    }

    /// Does this value's dynamic kind satisfy a declared parameter type?
    pub fn matches_spec(&self, spec: TypeSpec) -> bool {
        match spec {
            TypeSpec::Any => true,
            TypeSpec::Int => matches!(self.payload, Payload::Int(_)),
            TypeSpec::Float => matches!(self.payload, Payload::Float(_) | Payload::FloatRef(_)),
            TypeSpec::Str => matches!(self.payload, Payload::Str(_)),
            TypeSpec::Char => matches!(self.payload, Payload::Char(_) | Payload::CharRef(_)),
            TypeSpec::Bool => matches!(self.payload, Payload::Bool(_)),
            TypeSpec::Array => matches!(self.payload, Payload::Array(_)),
            TypeSpec::Dict => matches!(self.payload, Payload::Dict(_)),
            TypeSpec::Vec2 => matches!(self.payload, Payload::Vec2(_)),
            TypeSpec::Vec3 => matches!(self.payload, Payload::Vec3(_)),
            TypeSpec::Pair => matches!(self.payload, Payload::Pair(_, _)),
            TypeSpec::File => matches!(self.payload, Payload::File(_)),
            TypeSpec::Function => {
                matches!(self.payload, Payload::Func(_) | Payload::Overloads(_))
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Numeric read: int promotes, float references deref
    pub fn as_float(&self) -> Option<f64> {
        match &self.payload {
            Payload::Float(f) => Some(*f),
            Payload::Int(n) => Some(*n as f64),
            Payload::FloatRef(slot) => slot.get(),
            _ => None,
        }
    }

    /// Character read through references
    pub fn as_char(&self) -> Option<char> {
        match &self.payload {
            Payload::Char(c) => Some(*c),
            Payload::CharRef(slot) => slot.get(),
            _ => None,
        }
    }

    /// Look up an ad hoc instance member
    pub fn member(&self, name: &str) -> Option<ValueRef> {
        self.members.as_ref()?.get(name).cloned()
    }

    /// Install an ad hoc instance member
    pub fn set_member(&mut self, name: impl Into<String>, value: ValueRef) {
        self.members
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value);
    }

    /// Deep clone: arrays, dictionaries, pairs, and scalar payloads copy;
    /// functions share their closure; scalar references materialize to the
    /// value they alias. Clones are never constant.
    pub fn deep_clone(&self) -> Value {
        let payload = match &self.payload {
            Payload::Array(elems) => Payload::Array(
                elems
                    .iter()
                    .map(|e| e.borrow().deep_clone().into_ref())
                    .collect(),
            ),
            Payload::Dict(map) => Payload::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.borrow().deep_clone().into_ref()))
                    .collect(),
            ),
            Payload::Pair(a, b) => Payload::Pair(
                a.borrow().deep_clone().into_ref(),
                b.borrow().deep_clone().into_ref(),
            ),
            Payload::FloatRef(slot) => match slot.get() {
                Some(f) => Payload::Float(f),
                None => Payload::Null,
            },
            Payload::CharRef(slot) => match slot.get() {
                Some(c) => Payload::Char(c),
                None => Payload::Null,
            },
            other => other.clone(),
        };
        let members = self.members.as_ref().map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.borrow().deep_clone().into_ref()))
                .collect()
        });
        Value {
            payload,
            constant: false,
            members,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Null => write!(f, "null"),
            Payload::Int(n) => write!(f, "{n}"),
            Payload::Float(x) => write!(f, "{x}"),
            Payload::Str(s) => write!(f, "{s}"),
            Payload::Char(c) => write!(f, "{c}"),
            Payload::Bool(b) => write!(f, "{b}"),
            Payload::Type(t) => write!(f, "{}", t.name()),
            Payload::File(state) => write!(f, "<file {}>", state.borrow().path),
            Payload::Vec2([x, y]) => write!(f, "vec2({x}, {y})"),
            Payload::Vec3([x, y, z]) => write!(f, "vec3({x}, {y}, {z})"),
            Payload::Pair(a, b) => write!(f, "({}, {})", a.borrow(), b.borrow()),
            Payload::Cmp(_) => write!(f, "<comparator>"),
            Payload::FloatRef(slot) => match slot.get() {
                Some(v) => write!(f, "{v}"),
                None => write!(f, "null"),
            },
            Payload::CharRef(slot) => match slot.get() {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "null"),
            },
            Payload::Array(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e.borrow())?;
                }
                write!(f, "]")
            }
            Payload::Dict(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {}", map[*k].borrow())?;
                }
                write!(f, "}}")
            }
            Payload::Func(func) => write!(f, "<func {}>", func.name),
            Payload::Overloads(o) => {
                write!(f, "<func {} ({} overloads)>", o.name, o.variants.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::int(42)), "42");
        assert_eq!(format!("{}", Value::str("hi")), "hi");
        assert_eq!(format!("{}", Value::null()), "null");
        assert_eq!(format!("{}", Value::vec3(1.0, 2.0, 3.0)), "vec3(1, 2, 3)");
        let arr = Value::array(vec![Value::int(1).into_ref(), Value::bool(true).into_ref()]);
        assert_eq!(format!("{arr}"), "[1, true]");
    }

    #[test]
    fn test_float_slot_aliases_vector() {
        let v = Value::vec2(1.0, 2.0).into_ref();
        let slot = FloatSlot {
            owner: Rc::clone(&v),
            index: 1,
        };
        assert_eq!(slot.get(), Some(2.0));
        assert!(slot.set(9.5));
        assert!(matches!(v.borrow().payload, Payload::Vec2([1.0, 9.5])));
    }

    #[test]
    fn test_char_slot_aliases_string() {
        let s = Value::str("abc").into_ref();
        let slot = CharSlot {
            owner: Rc::clone(&s),
            index: 1,
        };
        assert_eq!(slot.get(), Some('b'));
        assert!(slot.set('X'));
        assert!(matches!(&s.borrow().payload, Payload::Str(s) if s == "aXc"));
    }

    #[test]
    fn test_deep_clone_detaches_containers() {
        let elem = Value::int(1).into_ref();
        let arr = Value::array(vec![Rc::clone(&elem)]).into_ref();
        let cloned = arr.borrow().deep_clone().into_ref();
        elem.borrow_mut().payload = Payload::Int(99);
        match &cloned.borrow().payload {
            Payload::Array(elems) => {
                assert_eq!(elems[0].borrow().as_int(), Some(1));
            }
            other => panic!("expected array, got {other:?}"),
        };
    }

    #[test]
    fn test_deep_clone_materializes_references() {
        let v = Value::vec2(3.0, 4.0).into_ref();
        let slot = Value::new(Payload::FloatRef(FloatSlot {
            owner: v,
            index: 0,
        }));
        let cloned = slot.deep_clone();
        assert!(matches!(cloned.payload, Payload::Float(f) if f == 3.0));
    }

    #[test]
    fn test_deep_clone_clears_constant() {
        let c = Value::int(5).as_const();
        assert!(c.constant);
        assert!(!c.deep_clone().constant);
    }

    #[test]
    fn test_matches_spec() {
        assert!(Value::int(1).matches_spec(TypeSpec::Int));
        assert!(Value::int(1).matches_spec(TypeSpec::Any));
        assert!(!Value::int(1).matches_spec(TypeSpec::Float));
        assert!(Value::null().matches_spec(TypeSpec::Any));
        assert!(!Value::null().matches_spec(TypeSpec::Int));
    }

    #[test]
    fn test_instance_members() {
        let mut v = Value::int(1);
        assert!(v.member("tag").is_none());
        v.set_member("tag", Value::str("a").into_ref());
        assert_eq!(
            format!("{}", v.member("tag").unwrap().borrow()),
            "a"
        );
    }
}
