//! Builtin library
//!
//! Native functions and constants registered into the builtin module
//! (module 0), plus the constant per-kind method tables consulted by
//! method-call evaluation before instance members.

use super::dispatch;
use super::error::{RuntimeError, RuntimeResult};
use super::module::{ModuleRegistry, BUILTIN_MODULE};
use super::scope::{Scope, Symbol};
use super::value::{
    FileState, FuncBody, Function, NativeFn, Payload, TypeTag, Value, ValueRef,
};
use crate::ast::{Span, TypeSpec};
use std::cell::RefCell;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

/// A builtin method on one of the container/string/vector kinds
pub type MethodFn = fn(&ValueRef, &[ValueRef], Span) -> RuntimeResult<ValueRef>;

/// Register every native function and constant into module 0
pub fn install(registry: &mut ModuleRegistry) {
    let global = Rc::clone(&registry.module(BUILTIN_MODULE).global);
    let mut scope = global.borrow_mut();

    for (name, f) in NATIVES {
        add_native(&mut scope, name, *f);
    }

    add_const(&mut scope, "PI", Value::float(std::f64::consts::PI));
    add_const(&mut scope, "E", Value::float(std::f64::consts::E));

    for (name, tag) in [
        ("int", TypeTag::Int),
        ("float", TypeTag::Float),
        ("string", TypeTag::Str),
        ("char", TypeTag::Char),
        ("bool", TypeTag::Bool),
        ("array", TypeTag::Array),
        ("dict", TypeTag::Dict),
        ("vec2", TypeTag::Vec2),
        ("vec3", TypeTag::Vec3),
        ("pair", TypeTag::Pair),
        ("file", TypeTag::File),
        ("function", TypeTag::Function),
    ] {
        add_const(&mut scope, name, Value::new(Payload::Type(tag)));
    }
}

const NATIVES: &[(&str, NativeFn)] = &[
    ("print", native_print),
    ("println", native_println),
    ("input", native_input),
    ("typeof", native_typeof),
    ("len", native_len),
    ("str", native_str),
    ("to_int", native_to_int),
    ("to_float", native_to_float),
    ("chr", native_chr),
    ("ord", native_ord),
    ("clone", native_clone),
    ("assert", native_assert),
    ("abs", native_abs),
    ("sqrt", native_sqrt),
    ("pow", native_pow),
    ("floor", native_floor),
    ("ceil", native_ceil),
    ("round", native_round),
    ("min", native_min),
    ("max", native_max),
    ("sin", native_sin),
    ("cos", native_cos),
    ("tan", native_tan),
    ("exp", native_exp),
    ("log", native_log),
    ("make_vec2", native_vec2),
    ("make_vec3", native_vec3),
    ("dot", native_dot),
    ("cross", native_cross),
    ("make_pair", native_pair),
    ("compare_all", native_compare_all),
    ("open", native_open),
    ("read_line", native_read_line),
    ("read_all", native_read_all),
    ("write", native_write),
    ("close", native_close),
    ("exists", native_exists),
];

fn add_native(scope: &mut Scope, name: &str, f: NativeFn) {
    let func = Rc::new(Function {
        name: name.to_string(),
        params: Vec::new(),
        ret: TypeSpec::Any,
        body: FuncBody::Native(f),
    });
    let value = Value::new(Payload::Func(func)).as_const().into_ref();
    let _ = scope.declare(Symbol::new(name, value), Span::new(0, 0));
}

fn add_const(scope: &mut Scope, name: &str, value: Value) {
    let _ = scope.declare(Symbol::new(name, value.as_const().into_ref()), Span::new(0, 0));
}

fn arity(name: &str, args: &[ValueRef], n: usize, span: Span) -> RuntimeResult<()> {
    if args.len() != n {
        return Err(RuntimeError::builtin(
            format!("{name} expects {n} argument(s), got {}", args.len()),
            span,
        ));
    }
    Ok(())
}

fn float_arg(name: &str, args: &[ValueRef], i: usize, span: Span) -> RuntimeResult<f64> {
    args[i].borrow().as_float().ok_or_else(|| {
        RuntimeError::builtin(
            format!(
                "{name}: argument {} must be a number, got {}",
                i + 1,
                args[i].borrow().kind_name()
            ),
            span,
        )
    })
}

fn int_arg(name: &str, args: &[ValueRef], i: usize, span: Span) -> RuntimeResult<i64> {
    args[i].borrow().as_int().ok_or_else(|| {
        RuntimeError::builtin(
            format!(
                "{name}: argument {} must be an int, got {}",
                i + 1,
                args[i].borrow().kind_name()
            ),
            span,
        )
    })
}

fn str_arg(name: &str, args: &[ValueRef], i: usize, span: Span) -> RuntimeResult<String> {
    match &args[i].borrow().payload {
        Payload::Str(s) => Ok(s.clone()),
        other => Err(RuntimeError::builtin(
            format!(
                "{name}: argument {} must be a string, got {}",
                i + 1,
                Value::new(other.clone()).kind_name()
            ),
            span,
        )),
    }
}

fn null() -> RuntimeResult<ValueRef> {
    Ok(Value::null().into_ref())
}

// ---- core ----

fn native_print(args: &[ValueRef], _span: Span) -> RuntimeResult<ValueRef> {
    let text: Vec<String> = args.iter().map(|a| a.borrow().to_string()).collect();
    print!("{}", text.join(" "));
    let _ = std::io::stdout().flush();
    null()
}

fn native_println(args: &[ValueRef], _span: Span) -> RuntimeResult<ValueRef> {
    let text: Vec<String> = args.iter().map(|a| a.borrow().to_string()).collect();
    println!("{}", text.join(" "));
    null()
}

fn native_input(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    if args.len() > 1 {
        return Err(RuntimeError::builtin(
            format!("input expects at most 1 argument, got {}", args.len()),
            span,
        ));
    }
    if let Some(prompt) = args.first() {
        print!("{}", prompt.borrow());
        let _ = std::io::stdout().flush();
    }
    let mut line = String::new();
    let n = std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| RuntimeError::builtin(format!("input: {e}"), span))?;
    if n == 0 {
        return null();
    }
    Ok(Value::str(line.trim_end_matches(['\n', '\r'])).into_ref())
}

fn native_typeof(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("typeof", args, 1, span)?;
    let tag = args[0].borrow().type_tag();
    Ok(Value::new(Payload::Type(tag)).into_ref())
}

fn native_len(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("len", args, 1, span)?;
    let v = args[0].borrow();
    let len = match &v.payload {
        Payload::Str(s) => s.chars().count(),
        Payload::Array(elems) => elems.len(),
        Payload::Dict(map) => map.len(),
        _ => {
            return Err(RuntimeError::builtin(
                format!("len is not defined for {}", v.kind_name()),
                span,
            ))
        }
    };
    Ok(Value::int(len as i64).into_ref())
}

fn native_str(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("str", args, 1, span)?;
    Ok(Value::str(args[0].borrow().to_string()).into_ref())
}

fn native_to_int(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("to_int", args, 1, span)?;
    let v = args[0].borrow();
    let out = match &v.payload {
        Payload::Int(n) => *n,
        Payload::Float(f) => *f as i64,
        Payload::FloatRef(slot) => slot.get().map(|f| f as i64).ok_or_else(|| {
            RuntimeError::builtin("to_int: reference target is gone", span)
        })?,
        Payload::Bool(b) => i64::from(*b),
        Payload::Char(c) => *c as i64,
        Payload::Str(s) => s.trim().parse::<i64>().map_err(|_| {
            RuntimeError::builtin(format!("to_int: cannot parse {s:?}"), span)
        })?,
        _ => {
            return Err(RuntimeError::builtin(
                format!("to_int is not defined for {}", v.kind_name()),
                span,
            ))
        }
    };
    Ok(Value::int(out).into_ref())
}

fn native_to_float(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("to_float", args, 1, span)?;
    let v = args[0].borrow();
    let out = match &v.payload {
        Payload::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            RuntimeError::builtin(format!("to_float: cannot parse {s:?}"), span)
        })?,
        _ => v.as_float().ok_or_else(|| {
            RuntimeError::builtin(
                format!("to_float is not defined for {}", v.kind_name()),
                span,
            )
        })?,
    };
    Ok(Value::float(out).into_ref())
}

fn native_chr(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("chr", args, 1, span)?;
    let n = int_arg("chr", args, 0, span)?;
    u32::try_from(n)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::char(c).into_ref())
        .ok_or_else(|| RuntimeError::builtin(format!("chr: {n} is not a valid code point"), span))
}

fn native_ord(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("ord", args, 1, span)?;
    let c = args[0].borrow().as_char().ok_or_else(|| {
        RuntimeError::builtin(
            format!("ord expects a char, got {}", args[0].borrow().kind_name()),
            span,
        )
    })?;
    Ok(Value::int(c as i64).into_ref())
}

fn native_clone(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("clone", args, 1, span)?;
    Ok(args[0].borrow().deep_clone().into_ref())
}

fn native_assert(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    if args.is_empty() || args.len() > 2 {
        return Err(RuntimeError::builtin(
            format!("assert expects 1 or 2 arguments, got {}", args.len()),
            span,
        ));
    }
    let ok = args[0].borrow().as_bool().ok_or_else(|| {
        RuntimeError::builtin(
            format!(
                "assert expects a bool, got {}",
                args[0].borrow().kind_name()
            ),
            span,
        )
    })?;
    if !ok {
        let message = args
            .get(1)
            .map(|m| m.borrow().to_string())
            .unwrap_or_else(|| "assertion failed".to_string());
        return Err(RuntimeError::builtin(message, span));
    }
    null()
}

// ---- math ----

fn native_abs(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("abs", args, 1, span)?;
    if let Some(n) = args[0].borrow().as_int() {
        return Ok(Value::int(n.wrapping_abs()).into_ref());
    }
    let f = float_arg("abs", args, 0, span)?;
    Ok(Value::float(f.abs()).into_ref())
}

fn native_sqrt(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("sqrt", args, 1, span)?;
    let f = float_arg("sqrt", args, 0, span)?;
    if f < 0.0 {
        return Err(RuntimeError::builtin("sqrt of a negative number", span));
    }
    Ok(Value::float(f.sqrt()).into_ref())
}

fn native_pow(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("pow", args, 2, span)?;
    let base = float_arg("pow", args, 0, span)?;
    let exp = float_arg("pow", args, 1, span)?;
    Ok(Value::float(base.powf(exp)).into_ref())
}

fn native_floor(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("floor", args, 1, span)?;
    Ok(Value::float(float_arg("floor", args, 0, span)?.floor()).into_ref())
}

fn native_ceil(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("ceil", args, 1, span)?;
    Ok(Value::float(float_arg("ceil", args, 0, span)?.ceil()).into_ref())
}

fn native_round(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("round", args, 1, span)?;
    Ok(Value::float(float_arg("round", args, 0, span)?.round()).into_ref())
}

fn native_min(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("min", args, 2, span)?;
    min_max(args, span, "min", |a, b| a <= b)
}

fn native_max(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("max", args, 2, span)?;
    min_max(args, span, "max", |a, b| a >= b)
}

fn min_max(
    args: &[ValueRef],
    span: Span,
    name: &str,
    pick_first: fn(f64, f64) -> bool,
) -> RuntimeResult<ValueRef> {
    let a = float_arg(name, args, 0, span)?;
    let b = float_arg(name, args, 1, span)?;
    let winner = if pick_first(a, b) { 0 } else { 1 };
    // int pairs stay int
    if let (Some(_), Some(_)) = (args[0].borrow().as_int(), args[1].borrow().as_int()) {
        return Ok(args[winner].borrow().deep_clone().into_ref());
    }
    Ok(Value::float(if winner == 0 { a } else { b }).into_ref())
}

fn native_sin(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("sin", args, 1, span)?;
    Ok(Value::float(float_arg("sin", args, 0, span)?.sin()).into_ref())
}

fn native_cos(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("cos", args, 1, span)?;
    Ok(Value::float(float_arg("cos", args, 0, span)?.cos()).into_ref())
}

fn native_tan(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("tan", args, 1, span)?;
    Ok(Value::float(float_arg("tan", args, 0, span)?.tan()).into_ref())
}

fn native_exp(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("exp", args, 1, span)?;
    Ok(Value::float(float_arg("exp", args, 0, span)?.exp()).into_ref())
}

fn native_log(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("log", args, 1, span)?;
    let f = float_arg("log", args, 0, span)?;
    if f <= 0.0 {
        return Err(RuntimeError::builtin("log of a non-positive number", span));
    }
    Ok(Value::float(f.ln()).into_ref())
}

// ---- vectors and pairs ----

fn native_vec2(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("make_vec2", args, 2, span)?;
    let x = float_arg("make_vec2", args, 0, span)?;
    let y = float_arg("make_vec2", args, 1, span)?;
    Ok(Value::vec2(x, y).into_ref())
}

fn native_vec3(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("make_vec3", args, 3, span)?;
    let x = float_arg("make_vec3", args, 0, span)?;
    let y = float_arg("make_vec3", args, 1, span)?;
    let z = float_arg("make_vec3", args, 2, span)?;
    Ok(Value::vec3(x, y, z).into_ref())
}

fn vector_components(v: &ValueRef, name: &str, span: Span) -> RuntimeResult<Vec<f64>> {
    match &v.borrow().payload {
        Payload::Vec2(c) => Ok(c.to_vec()),
        Payload::Vec3(c) => Ok(c.to_vec()),
        other => Err(RuntimeError::builtin(
            format!(
                "{name} expects a vector, got {}",
                Value::new(other.clone()).kind_name()
            ),
            span,
        )),
    }
}

fn native_dot(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("dot", args, 2, span)?;
    let a = vector_components(&args[0], "dot", span)?;
    let b = vector_components(&args[1], "dot", span)?;
    if a.len() != b.len() {
        return Err(RuntimeError::builtin(
            "dot expects two vectors of the same size",
            span,
        ));
    }
    Ok(Value::float(a.iter().zip(&b).map(|(x, y)| x * y).sum()).into_ref())
}

fn native_cross(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("cross", args, 2, span)?;
    let a = vector_components(&args[0], "cross", span)?;
    let b = vector_components(&args[1], "cross", span)?;
    if a.len() != 3 || b.len() != 3 {
        return Err(RuntimeError::builtin("cross expects two vec3 values", span));
    }
    Ok(Value::vec3(
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    )
    .into_ref())
}

fn native_pair(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("make_pair", args, 2, span)?;
    // the halves alias the arguments, they are not copies
    Ok(Value::new(Payload::Pair(Rc::clone(&args[0]), Rc::clone(&args[1]))).into_ref())
}

fn native_compare_all(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("compare_all", args, 2, span)?;
    let cmp = dispatch::compare_all(&args[0].borrow(), &args[1].borrow());
    Ok(Value::new(Payload::Cmp(cmp)).into_ref())
}

// ---- files ----

fn file_state(v: &ValueRef, name: &str, span: Span) -> RuntimeResult<Rc<RefCell<FileState>>> {
    match &v.borrow().payload {
        Payload::File(state) => Ok(Rc::clone(state)),
        other => Err(RuntimeError::builtin(
            format!(
                "{name} expects a file, got {}",
                Value::new(other.clone()).kind_name()
            ),
            span,
        )),
    }
}

fn native_open(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("open", args, 2, span)?;
    let path = str_arg("open", args, 0, span)?;
    let mode = str_arg("open", args, 1, span)?;
    let io_err = |e: std::io::Error| RuntimeError::builtin(format!("open {path}: {e}"), span);
    let state = match mode.as_str() {
        "r" => FileState {
            path: path.clone(),
            reader: Some(std::io::BufReader::new(
                std::fs::File::open(&path).map_err(io_err)?,
            )),
            writer: None,
            closed: false,
        },
        "w" => FileState {
            path: path.clone(),
            reader: None,
            writer: Some(std::fs::File::create(&path).map_err(io_err)?),
            closed: false,
        },
        "a" => FileState {
            path: path.clone(),
            reader: None,
            writer: Some(
                std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .map_err(io_err)?,
            ),
            closed: false,
        },
        other => {
            return Err(RuntimeError::builtin(
                format!("open: unknown mode {other:?} (expected r, w, or a)"),
                span,
            ))
        }
    };
    Ok(Value::new(Payload::File(Rc::new(RefCell::new(state)))).into_ref())
}

fn read_line_impl(state: &Rc<RefCell<FileState>>, span: Span) -> RuntimeResult<ValueRef> {
    let mut state = state.borrow_mut();
    if state.closed {
        return Err(RuntimeError::builtin("read_line on a closed file", span));
    }
    let path = state.path.clone();
    let reader = state.reader.as_mut().ok_or_else(|| {
        RuntimeError::builtin(format!("{path} is not open for reading"), span)
    })?;
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(|e| RuntimeError::builtin(format!("read_line {path}: {e}"), span))?;
    if n == 0 {
        return null();
    }
    Ok(Value::str(line.trim_end_matches(['\n', '\r'])).into_ref())
}

fn read_all_impl(state: &Rc<RefCell<FileState>>, span: Span) -> RuntimeResult<ValueRef> {
    let mut state = state.borrow_mut();
    if state.closed {
        return Err(RuntimeError::builtin("read_all on a closed file", span));
    }
    let path = state.path.clone();
    let reader = state.reader.as_mut().ok_or_else(|| {
        RuntimeError::builtin(format!("{path} is not open for reading"), span)
    })?;
    let mut out = String::new();
    reader
        .read_to_string(&mut out)
        .map_err(|e| RuntimeError::builtin(format!("read_all {path}: {e}"), span))?;
    Ok(Value::str(out).into_ref())
}

fn write_impl(
    state: &Rc<RefCell<FileState>>,
    value: &ValueRef,
    span: Span,
) -> RuntimeResult<ValueRef> {
    let mut state = state.borrow_mut();
    if state.closed {
        return Err(RuntimeError::builtin("write on a closed file", span));
    }
    let path = state.path.clone();
    let text = value.borrow().to_string();
    let writer = state.writer.as_mut().ok_or_else(|| {
        RuntimeError::builtin(format!("{path} is not open for writing"), span)
    })?;
    writer
        .write_all(text.as_bytes())
        .map_err(|e| RuntimeError::builtin(format!("write {path}: {e}"), span))?;
    null()
}

fn close_impl(state: &Rc<RefCell<FileState>>) -> RuntimeResult<ValueRef> {
    let mut state = state.borrow_mut();
    state.reader = None;
    state.writer = None;
    state.closed = true;
    null()
}

fn native_read_line(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("read_line", args, 1, span)?;
    read_line_impl(&file_state(&args[0], "read_line", span)?, span)
}

fn native_read_all(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("read_all", args, 1, span)?;
    read_all_impl(&file_state(&args[0], "read_all", span)?, span)
}

fn native_write(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("write", args, 2, span)?;
    write_impl(&file_state(&args[0], "write", span)?, &args[1], span)
}

fn native_close(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("close", args, 1, span)?;
    close_impl(&file_state(&args[0], "close", span)?)
}

fn native_exists(args: &[ValueRef], span: Span) -> RuntimeResult<ValueRef> {
    arity("exists", args, 1, span)?;
    let path = str_arg("exists", args, 0, span)?;
    Ok(Value::bool(std::path::Path::new(&path).exists()).into_ref())
}

// ---- per-kind method tables ----

/// Find a builtin method for a receiver kind. These tables are constant:
/// user instance members can never shadow them.
pub fn find_method(tag: TypeTag, name: &str) -> Option<MethodFn> {
    match tag {
        TypeTag::Array => array_method(name),
        TypeTag::Str => string_method(name),
        TypeTag::Dict => dict_method(name),
        TypeTag::Vec2 | TypeTag::Vec3 => vector_method(name),
        TypeTag::File => file_method(name),
        _ => None,
    }
}

fn array_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "push" => |recv, args, span| {
            arity("push", args, 1, span)?;
            if let Payload::Array(elems) = &mut recv.borrow_mut().payload {
                elems.push(Rc::clone(&args[0]));
            }
            null()
        },
        "pop" => |recv, args, span| {
            arity("pop", args, 0, span)?;
            let popped = match &mut recv.borrow_mut().payload {
                Payload::Array(elems) => elems.pop(),
                _ => None,
            };
            popped.ok_or_else(|| RuntimeError::builtin("pop from an empty array", span))
        },
        "size" => |recv, args, span| {
            arity("size", args, 0, span)?;
            let len = match &recv.borrow().payload {
                Payload::Array(elems) => elems.len(),
                _ => 0,
            };
            Ok(Value::int(len as i64).into_ref())
        },
        "insert" => |recv, args, span| {
            arity("insert", args, 2, span)?;
            let i = int_arg("insert", args, 0, span)?;
            let len = match &recv.borrow().payload {
                Payload::Array(elems) => elems.len(),
                _ => 0,
            };
            if i < 0 || i as usize > len {
                return Err(RuntimeError::out_of_bounds(i, len, span));
            }
            if let Payload::Array(elems) = &mut recv.borrow_mut().payload {
                elems.insert(i as usize, Rc::clone(&args[1]));
            }
            null()
        },
        "remove" => |recv, args, span| {
            arity("remove", args, 1, span)?;
            let i = int_arg("remove", args, 0, span)?;
            let len = match &recv.borrow().payload {
                Payload::Array(elems) => elems.len(),
                _ => 0,
            };
            if i < 0 || i as usize >= len {
                return Err(RuntimeError::out_of_bounds(i, len, span));
            }
            match &mut recv.borrow_mut().payload {
                Payload::Array(elems) => Ok(elems.remove(i as usize)),
                _ => null(),
            }
        },
        "clear" => |recv, args, span| {
            arity("clear", args, 0, span)?;
            if let Payload::Array(elems) = &mut recv.borrow_mut().payload {
                elems.clear();
            }
            null()
        },
        "contains" => |recv, args, span| {
            arity("contains", args, 1, span)?;
            Ok(Value::bool(array_find(recv, &args[0]).is_some()).into_ref())
        },
        "find" => |recv, args, span| {
            arity("find", args, 1, span)?;
            let index = array_find(recv, &args[0]).map(|i| i as i64).unwrap_or(-1);
            Ok(Value::int(index).into_ref())
        },
        "first" => |recv, args, span| {
            arity("first", args, 0, span)?;
            match &recv.borrow().payload {
                Payload::Array(elems) => match elems.first() {
                    Some(v) => Ok(Rc::clone(v)),
                    None => null(),
                },
                _ => null(),
            }
        },
        "last" => |recv, args, span| {
            arity("last", args, 0, span)?;
            match &recv.borrow().payload {
                Payload::Array(elems) => match elems.last() {
                    Some(v) => Ok(Rc::clone(v)),
                    None => null(),
                },
                _ => null(),
            }
        },
        _ => return None,
    })
}

/// First index whose element structurally equals the probe; unordered
/// pairings count as not-equal here instead of erroring
fn array_find(recv: &ValueRef, probe: &ValueRef) -> Option<usize> {
    match &recv.borrow().payload {
        Payload::Array(elems) => elems.iter().position(|e| {
            dispatch::values_equal(&e.borrow(), &probe.borrow()).unwrap_or(false)
        }),
        _ => None,
    }
}

fn string_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "size" => |recv, args, span| {
            arity("size", args, 0, span)?;
            let len = match &recv.borrow().payload {
                Payload::Str(s) => s.chars().count(),
                _ => 0,
            };
            Ok(Value::int(len as i64).into_ref())
        },
        "upper" => |recv, args, span| {
            arity("upper", args, 0, span)?;
            string_map(recv, |s| s.to_uppercase())
        },
        "lower" => |recv, args, span| {
            arity("lower", args, 0, span)?;
            string_map(recv, |s| s.to_lowercase())
        },
        "trim" => |recv, args, span| {
            arity("trim", args, 0, span)?;
            string_map(recv, |s| s.trim().to_string())
        },
        "substr" => |recv, args, span| {
            arity("substr", args, 2, span)?;
            let start = int_arg("substr", args, 0, span)?;
            let count = int_arg("substr", args, 1, span)?;
            let s = match &recv.borrow().payload {
                Payload::Str(s) => s.clone(),
                _ => String::new(),
            };
            let len = s.chars().count();
            if start < 0 || start as usize > len {
                return Err(RuntimeError::out_of_bounds(start, len, span));
            }
            if count < 0 {
                return Err(RuntimeError::builtin("substr: negative length", span));
            }
            let out: String = s.chars().skip(start as usize).take(count as usize).collect();
            Ok(Value::str(out).into_ref())
        },
        "find" => |recv, args, span| {
            arity("find", args, 1, span)?;
            let s = match &recv.borrow().payload {
                Payload::Str(s) => s.clone(),
                _ => String::new(),
            };
            let needle = match &args[0].borrow().payload {
                Payload::Str(n) => n.clone(),
                Payload::Char(c) => c.to_string(),
                other => {
                    return Err(RuntimeError::builtin(
                        format!(
                            "find expects a string or char, got {}",
                            Value::new(other.clone()).kind_name()
                        ),
                        span,
                    ))
                }
            };
            let index = s
                .find(&needle)
                .map(|byte_pos| s[..byte_pos].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::int(index).into_ref())
        },
        "split" => |recv, args, span| {
            arity("split", args, 1, span)?;
            let sep = str_arg("split", args, 0, span)?;
            let s = match &recv.borrow().payload {
                Payload::Str(s) => s.clone(),
                _ => String::new(),
            };
            if sep.is_empty() {
                return Err(RuntimeError::builtin("split: empty separator", span));
            }
            let parts = s
                .split(&sep)
                .map(|p| Value::str(p).into_ref())
                .collect::<Vec<_>>();
            Ok(Value::array(parts).into_ref())
        },
        _ => return None,
    })
}

fn string_map(recv: &ValueRef, f: fn(&str) -> String) -> RuntimeResult<ValueRef> {
    let out = match &recv.borrow().payload {
        Payload::Str(s) => f(s),
        _ => String::new(),
    };
    Ok(Value::str(out).into_ref())
}

fn dict_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "size" => |recv, args, span| {
            arity("size", args, 0, span)?;
            let len = match &recv.borrow().payload {
                Payload::Dict(map) => map.len(),
                _ => 0,
            };
            Ok(Value::int(len as i64).into_ref())
        },
        "has" => |recv, args, span| {
            arity("has", args, 1, span)?;
            let key = str_arg("has", args, 0, span)?;
            let present = match &recv.borrow().payload {
                Payload::Dict(map) => map.contains_key(&key),
                _ => false,
            };
            Ok(Value::bool(present).into_ref())
        },
        "keys" => |recv, args, span| {
            arity("keys", args, 0, span)?;
            let mut keys = match &recv.borrow().payload {
                Payload::Dict(map) => map.keys().cloned().collect::<Vec<_>>(),
                _ => Vec::new(),
            };
            keys.sort();
            let out = keys.into_iter().map(|k| Value::str(k).into_ref()).collect();
            Ok(Value::array(out).into_ref())
        },
        "values" => |recv, args, span| {
            arity("values", args, 0, span)?;
            let out = match &recv.borrow().payload {
                Payload::Dict(map) => {
                    let mut keys = map.keys().cloned().collect::<Vec<_>>();
                    keys.sort();
                    keys.iter().map(|k| Rc::clone(&map[k])).collect()
                }
                _ => Vec::new(),
            };
            Ok(Value::array(out).into_ref())
        },
        "remove" => |recv, args, span| {
            arity("remove", args, 1, span)?;
            let key = str_arg("remove", args, 0, span)?;
            let removed = match &mut recv.borrow_mut().payload {
                Payload::Dict(map) => map.remove(&key),
                _ => None,
            };
            match removed {
                Some(v) => Ok(v),
                None => null(),
            }
        },
        "clear" => |recv, args, span| {
            arity("clear", args, 0, span)?;
            if let Payload::Dict(map) = &mut recv.borrow_mut().payload {
                map.clear();
            }
            null()
        },
        _ => return None,
    })
}

fn vector_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "length" => |recv, args, span| {
            arity("length", args, 0, span)?;
            let c = vector_components(recv, "length", span)?;
            Ok(Value::float(c.iter().map(|x| x * x).sum::<f64>().sqrt()).into_ref())
        },
        "normalize" => |recv, args, span| {
            arity("normalize", args, 0, span)?;
            let c = vector_components(recv, "normalize", span)?;
            let magnitude = c.iter().map(|x| x * x).sum::<f64>().sqrt();
            if magnitude == 0.0 {
                return Err(RuntimeError::builtin(
                    "cannot normalize a zero-length vector",
                    span,
                ));
            }
            let out: Vec<f64> = c.iter().map(|x| x / magnitude).collect();
            Ok(match out.len() {
                2 => Value::vec2(out[0], out[1]),
                _ => Value::vec3(out[0], out[1], out[2]),
            }
            .into_ref())
        },
        "dot" => |recv, args, span| {
            arity("dot", args, 1, span)?;
            native_dot(&[Rc::clone(recv), Rc::clone(&args[0])], span)
        },
        "cross" => |recv, args, span| {
            arity("cross", args, 1, span)?;
            native_cross(&[Rc::clone(recv), Rc::clone(&args[0])], span)
        },
        _ => return None,
    })
}

fn file_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "read_line" => |recv, args, span| {
            arity("read_line", args, 0, span)?;
            read_line_impl(&file_state(recv, "read_line", span)?, span)
        },
        "read_all" => |recv, args, span| {
            arity("read_all", args, 0, span)?;
            read_all_impl(&file_state(recv, "read_all", span)?, span)
        },
        "write" => |recv, args, span| {
            arity("write", args, 1, span)?;
            write_impl(&file_state(recv, "write", span)?, &args[0], span)
        },
        "close" => |recv, args, span| {
            arity("close", args, 0, span)?;
            close_impl(&file_state(recv, "close", span)?)
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(0, 1)
    }

    #[test]
    fn test_install_registers_natives_and_constants() {
        let mut registry = ModuleRegistry::new();
        install(&mut registry);
        let global = Rc::clone(&registry.module(BUILTIN_MODULE).global);
        let scope = global.borrow();
        assert!(scope.contains("println"));
        assert!(scope.contains("sqrt"));
        assert!(scope.contains("PI"));
        let tag = scope.get("int").unwrap();
        assert!(matches!(tag.value.borrow().payload, Payload::Type(TypeTag::Int)));
        assert!(tag.value.borrow().constant);
    }

    #[test]
    fn test_typeof_and_len() {
        let v = Value::str("abc").into_ref();
        let tag = native_typeof(&[Rc::clone(&v)], span()).unwrap();
        assert!(matches!(tag.borrow().payload, Payload::Type(TypeTag::Str)));
        let len = native_len(&[v], span()).unwrap();
        assert_eq!(len.borrow().as_int(), Some(3));
    }

    #[test]
    fn test_conversions() {
        let n = native_to_int(&[Value::str(" 42 ").into_ref()], span()).unwrap();
        assert_eq!(n.borrow().as_int(), Some(42));
        let f = native_to_float(&[Value::int(3).into_ref()], span()).unwrap();
        assert!(matches!(f.borrow().payload, Payload::Float(x) if x == 3.0));
        assert!(native_to_int(&[Value::str("nope").into_ref()], span()).is_err());
        let c = native_chr(&[Value::int(97).into_ref()], span()).unwrap();
        assert_eq!(c.borrow().as_char(), Some('a'));
    }

    #[test]
    fn test_math() {
        let out = native_sqrt(&[Value::float(9.0).into_ref()], span()).unwrap();
        assert_eq!(out.borrow().as_float(), Some(3.0));
        assert!(native_sqrt(&[Value::float(-1.0).into_ref()], span()).is_err());
        // min of two ints stays int
        let out = native_min(
            &[Value::int(3).into_ref(), Value::int(7).into_ref()],
            span(),
        )
        .unwrap();
        assert_eq!(out.borrow().as_int(), Some(3));
    }

    #[test]
    fn test_vector_natives() {
        let a = Value::vec3(1.0, 0.0, 0.0).into_ref();
        let b = Value::vec3(0.0, 1.0, 0.0).into_ref();
        let d = native_dot(&[Rc::clone(&a), Rc::clone(&b)], span()).unwrap();
        assert_eq!(d.borrow().as_float(), Some(0.0));
        let c = native_cross(&[a, b], span()).unwrap();
        assert!(matches!(c.borrow().payload, Payload::Vec3([0.0, 0.0, 1.0])));
    }

    #[test]
    fn test_array_methods() {
        let arr = Value::array(vec![Value::int(1).into_ref(), Value::int(2).into_ref()]).into_ref();
        let push = array_method("push").unwrap();
        push(&arr, &[Value::int(3).into_ref()], span()).unwrap();
        let size = array_method("size").unwrap();
        assert_eq!(size(&arr, &[], span()).unwrap().borrow().as_int(), Some(3));

        let find = array_method("find").unwrap();
        let idx = find(&arr, &[Value::int(2).into_ref()], span()).unwrap();
        assert_eq!(idx.borrow().as_int(), Some(1));
        let idx = find(&arr, &[Value::int(99).into_ref()], span()).unwrap();
        assert_eq!(idx.borrow().as_int(), Some(-1));

        let pop = array_method("pop").unwrap();
        assert_eq!(pop(&arr, &[], span()).unwrap().borrow().as_int(), Some(3));
    }

    #[test]
    fn test_string_methods() {
        let s = Value::str("hello world").into_ref();
        let upper = string_method("upper").unwrap();
        assert_eq!(
            format!("{}", upper(&s, &[], span()).unwrap().borrow()),
            "HELLO WORLD"
        );
        let find = string_method("find").unwrap();
        let idx = find(&s, &[Value::str("world").into_ref()], span()).unwrap();
        assert_eq!(idx.borrow().as_int(), Some(6));
        let substr = string_method("substr").unwrap();
        let out = substr(
            &s,
            &[Value::int(6).into_ref(), Value::int(5).into_ref()],
            span(),
        )
        .unwrap();
        assert_eq!(format!("{}", out.borrow()), "world");
    }

    #[test]
    fn test_dict_methods() {
        let mut map = std::collections::HashMap::new();
        map.insert("b".to_string(), Value::int(2).into_ref());
        map.insert("a".to_string(), Value::int(1).into_ref());
        let d = Value::dict(map).into_ref();
        let keys = dict_method("keys").unwrap();
        assert_eq!(
            format!("{}", keys(&d, &[], span()).unwrap().borrow()),
            "[a, b]"
        );
        let has = dict_method("has").unwrap();
        assert_eq!(
            has(&d, &[Value::str("a").into_ref()], span())
                .unwrap()
                .borrow()
                .as_bool(),
            Some(true)
        );
    }

    #[test]
    fn test_vector_methods() {
        let v = Value::vec2(3.0, 4.0).into_ref();
        let length = vector_method("length").unwrap();
        assert_eq!(length(&v, &[], span()).unwrap().borrow().as_float(), Some(5.0));
        let normalize = vector_method("normalize").unwrap();
        let n = normalize(&v, &[], span()).unwrap();
        assert!(matches!(n.borrow().payload, Payload::Vec2([x, y]) if x == 0.6 && y == 0.8));
        let zero = Value::vec2(0.0, 0.0).into_ref();
        assert!(normalize(&zero, &[], span()).is_err());
    }

    #[test]
    fn test_user_kinds_have_no_method_table() {
        assert!(find_method(TypeTag::Int, "size").is_none());
        assert!(find_method(TypeTag::Array, "nope").is_none());
    }
}
