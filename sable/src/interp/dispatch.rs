//! Operator dispatch
//!
//! Pure mappings from (operator, left, right) to a result value or error.
//! The evaluator is the only caller; this module keeps no state. Each
//! operator is an ordered set of (left-kind, right-kind) cases; falling
//! out of every case is a TypeMismatch.

use super::error::{RuntimeError, RuntimeResult};
use super::value::{Comparator, Payload, Value, ValueRef};
use crate::ast::{AssignOp, BinOp, Span, UnOp};
use std::rc::Rc;

/// Numeric operand: int stays exact, anything else reads as float
enum Num {
    Int(i64),
    Float(f64),
}

/// Arithmetic read: int, float, float reference
fn num(v: &Value) -> Option<Num> {
    match &v.payload {
        Payload::Int(n) => Some(Num::Int(*n)),
        Payload::Float(f) => Some(Num::Float(*f)),
        Payload::FloatRef(slot) => slot.get().map(Num::Float),
        _ => None,
    }
}

/// Comparison read: arithmetic kinds plus char (ordinal) and bool (0/1)
fn scalar_num(v: &Value) -> Option<Num> {
    if let Some(n) = num(v) {
        return Some(n);
    }
    match &v.payload {
        Payload::Char(c) => Some(Num::Int(*c as i64)),
        Payload::CharRef(slot) => slot.get().map(|c| Num::Int(c as i64)),
        Payload::Bool(b) => Some(Num::Int(i64::from(*b))),
        _ => None,
    }
}

/// Vector components of a value, if it is one
fn vec_components(v: &Value) -> Option<Vec<f64>> {
    match &v.payload {
        Payload::Vec2(c) => Some(c.to_vec()),
        Payload::Vec3(c) => Some(c.to_vec()),
        _ => None,
    }
}

fn vec_value(components: Vec<f64>) -> Value {
    match components.len() {
        2 => Value::vec2(components[0], components[1]),
        _ => Value::vec3(components[0], components[1], components[2]),
    }
}

fn type_mismatch(op: &str, l: &Value, r: &Value, span: Span) -> RuntimeError {
    RuntimeError::type_mismatch(
        format!(
            "operator {op} not defined for {} and {}",
            l.kind_name(),
            r.kind_name()
        ),
        span,
    )
}

fn division_by_zero(span: Span) -> RuntimeError {
    RuntimeError::invalid_operation("division by zero", span)
}

/// Dispatch a binary operator over two evaluated operands.
///
/// `&&` and `||` short-circuit in the evaluator and only reach this
/// function when both sides were evaluated.
pub fn binary(op: BinOp, lhs: &ValueRef, rhs: &ValueRef, span: Span) -> RuntimeResult<ValueRef> {
    let l = lhs.borrow();
    let r = rhs.borrow();
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            arith(op, &l, &r, span).map(Value::into_ref)
        }

        BinOp::Eq => values_equal(&l, &r)
            .map(|b| Value::bool(b).into_ref())
            .ok_or_else(|| type_mismatch("==", &l, &r, span)),
        BinOp::Ne => values_equal(&l, &r)
            .map(|b| Value::bool(!b).into_ref())
            .ok_or_else(|| type_mismatch("!=", &l, &r, span)),

        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => ordered(op, &l, &r)
            .map(|b| Value::bool(b).into_ref())
            .ok_or_else(|| type_mismatch(op.symbol(), &l, &r, span)),

        BinOp::And | BinOp::Or | BinOp::Xor => match (l.as_bool(), r.as_bool()) {
            (Some(a), Some(b)) => {
                let out = match op {
                    BinOp::And => a && b,
                    BinOp::Or => a || b,
                    _ => a != b,
                };
                Ok(Value::bool(out).into_ref())
            }
            _ => Err(type_mismatch(op.symbol(), &l, &r, span)),
        },

        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => match (l.as_int(), r.as_int()) {
            (Some(a), Some(b)) => {
                let out = match op {
                    BinOp::BitAnd => a & b,
                    BinOp::BitOr => a | b,
                    _ => a ^ b,
                };
                Ok(Value::int(out).into_ref())
            }
            _ => Err(type_mismatch(op.symbol(), &l, &r, span)),
        },

        BinOp::Shl | BinOp::Shr => match (l.as_int(), r.as_int()) {
            (Some(a), Some(b)) => {
                if !(0..64).contains(&b) {
                    return Err(RuntimeError::invalid_operation(
                        format!("shift amount {b} out of range"),
                        span,
                    ));
                }
                let out = if op == BinOp::Shl { a << b } else { a >> b };
                Ok(Value::int(out).into_ref())
            }
            _ => Err(type_mismatch(op.symbol(), &l, &r, span)),
        },
    }
}

/// Arithmetic: `+ - * / %`
fn arith(op: BinOp, l: &Value, r: &Value, span: Span) -> RuntimeResult<Value> {
    // string + anything stringifies and concatenates
    if let Payload::Str(s) = &l.payload {
        match op {
            BinOp::Add => return Ok(Value::str(format!("{s}{r}"))),
            BinOp::Mul => {
                if let Some(n) = r.as_int() {
                    return repeat_doubling(s, n, span).map(Value::str);
                }
            }
            _ => {}
        }
        return Err(type_mismatch(op.symbol(), l, r, span));
    }

    // char + char makes a two-character string
    if op == BinOp::Add {
        if let (Some(a), Some(b)) = (l.as_char(), r.as_char()) {
            let mut s = String::new();
            s.push(a);
            s.push(b);
            return Ok(Value::str(s));
        }
    }

    // vector cases
    let lv = vec_components(l);
    let rv = vec_components(r);
    match (lv, rv) {
        (Some(a), Some(b)) => {
            if a.len() != b.len() {
                return Err(type_mismatch(op.symbol(), l, r, span));
            }
            return vec_zip(op, &a, &b, span).map(vec_value);
        }
        (Some(a), None) => {
            if let Some(s) = num(r) {
                return vec_broadcast(op, &a, num_to_f64(s), false, span).map(vec_value);
            }
            return Err(type_mismatch(op.symbol(), l, r, span));
        }
        (None, Some(b)) => {
            if let Some(s) = num(l) {
                return vec_broadcast(op, &b, num_to_f64(s), true, span).map(vec_value);
            }
            return Err(type_mismatch(op.symbol(), l, r, span));
        }
        (None, None) => {}
    }

    // numeric: int pairs stay int, anything with a float promotes
    match (num(l), num(r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => int_arith(op, a, b, span),
        (Some(a), Some(b)) => float_arith(op, num_to_f64(a), num_to_f64(b), span),
        _ => Err(type_mismatch(op.symbol(), l, r, span)),
    }
}

fn num_to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn int_arith(op: BinOp, a: i64, b: i64, span: Span) -> RuntimeResult<Value> {
    let out = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(division_by_zero(span));
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::invalid_operation("modulo by zero", span));
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!("arith called with non-arithmetic operator"),
    };
    Ok(Value::int(out))
}

fn float_arith(op: BinOp, a: f64, b: f64, span: Span) -> RuntimeResult<Value> {
    let out = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(division_by_zero(span));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::invalid_operation("modulo by zero", span));
            }
            a % b
        }
        _ => unreachable!("arith called with non-arithmetic operator"),
    };
    Ok(Value::float(out))
}

/// Component-wise vector arithmetic; division checks every divisor slot
fn vec_zip(op: BinOp, a: &[f64], b: &[f64], span: Span) -> RuntimeResult<Vec<f64>> {
    if op == BinOp::Mod {
        return Err(RuntimeError::invalid_operator("% on vectors", span));
    }
    if op == BinOp::Div && b.iter().any(|c| *c == 0.0) {
        return Err(division_by_zero(span));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            _ => x / y,
        })
        .collect())
}

/// Broadcast a scalar to every component; `scalar_left` mirrors the
/// operand order for non-commutative operators
fn vec_broadcast(
    op: BinOp,
    v: &[f64],
    s: f64,
    scalar_left: bool,
    span: Span,
) -> RuntimeResult<Vec<f64>> {
    if op == BinOp::Mod {
        return Err(RuntimeError::invalid_operator("% on vectors", span));
    }
    if op == BinOp::Div {
        let zero_divisor = if scalar_left {
            v.iter().any(|c| *c == 0.0)
        } else {
            s == 0.0
        };
        if zero_divisor {
            return Err(division_by_zero(span));
        }
    }
    Ok(v.iter()
        .map(|c| {
            let (x, y) = if scalar_left { (s, *c) } else { (*c, s) };
            match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                _ => x / y,
            }
        })
        .collect())
}

/// `string * n` repeats by doubling: n self-appends, so the result
/// length is len * 2^n rather than len * n. Long-standing behavior that
/// scripts depend on; do not "fix" it to linear repetition.
fn repeat_doubling(s: &str, n: i64, span: Span) -> RuntimeResult<String> {
    if n < 0 {
        return Err(RuntimeError::invalid_operation(
            "negative string repetition count",
            span,
        ));
    }
    let mut out = s.to_string();
    for _ in 0..n {
        let snapshot = out.clone();
        out.push_str(&snapshot);
    }
    Ok(out)
}

/// Ordered comparison; None when the pairing is not ordered
fn ordered(op: BinOp, l: &Value, r: &Value) -> Option<bool> {
    use std::cmp::Ordering;
    let ord = match (&l.payload, &r.payload) {
        (Payload::Str(a), Payload::Str(b)) => a.cmp(b),
        _ => match (scalar_num(l), scalar_num(r)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a.cmp(&b),
            (Some(a), Some(b)) => num_to_f64(a).partial_cmp(&num_to_f64(b))?,
            _ => return None,
        },
    };
    Some(match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Le => ord != Ordering::Greater,
        _ => ord != Ordering::Less,
    })
}

/// Structural equality; None when the pairing has no equality case
pub fn values_equal(l: &Value, r: &Value) -> Option<bool> {
    match (&l.payload, &r.payload) {
        (Payload::Null, Payload::Null) => Some(true),
        (Payload::Null, _) | (_, Payload::Null) => Some(false),
        (Payload::Str(a), Payload::Str(b)) => Some(a == b),
        (Payload::Type(a), Payload::Type(b)) => Some(a == b),
        (Payload::Vec2(a), Payload::Vec2(b)) => Some(a == b),
        (Payload::Vec3(a), Payload::Vec3(b)) => Some(a == b),
        (Payload::Pair(a1, a2), Payload::Pair(b1, b2)) => {
            let first = values_equal(&a1.borrow(), &b1.borrow())?;
            if !first {
                return Some(false);
            }
            values_equal(&a2.borrow(), &b2.borrow())
        }
        (Payload::Array(a), Payload::Array(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            for (x, y) in a.iter().zip(b) {
                if !values_equal(&x.borrow(), &y.borrow())? {
                    return Some(false);
                }
            }
            Some(true)
        }
        (Payload::Dict(a), Payload::Dict(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            for (key, x) in a {
                match b.get(key) {
                    Some(y) => {
                        if !values_equal(&x.borrow(), &y.borrow())? {
                            return Some(false);
                        }
                    }
                    None => return Some(false),
                }
            }
            Some(true)
        }
        (Payload::File(a), Payload::File(b)) => Some(Rc::ptr_eq(a, b)),
        (Payload::Func(a), Payload::Func(b)) => Some(Rc::ptr_eq(a, b)),
        (Payload::Overloads(a), Payload::Overloads(b)) => Some(a.name == b.name),
        _ => {
            // mixed scalar pairings compare through ordinals
            if let (Some(a), Some(b)) = (l.as_char(), r.as_char()) {
                return Some(a == b);
            }
            match (scalar_num(l), scalar_num(r)) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a == b),
                (Some(a), Some(b)) => Some(num_to_f64(a) == num_to_f64(b)),
                _ => None,
            }
        }
    }
}

/// Build a comparator bundle: all six relations plus type equality.
/// Per-relation mismatches become null placeholders instead of errors.
pub fn compare_all(l: &Value, r: &Value) -> Comparator {
    let eq = values_equal(l, r);
    Comparator {
        lt: ordered(BinOp::Lt, l, r),
        gt: ordered(BinOp::Gt, l, r),
        le: ordered(BinOp::Le, l, r),
        ge: ordered(BinOp::Ge, l, r),
        eq,
        ne: eq.map(|b| !b),
        same_type: l.type_tag() == r.type_tag(),
    }
}

/// Dispatch a unary operator
pub fn unary(op: UnOp, operand: &ValueRef, span: Span) -> RuntimeResult<ValueRef> {
    let v = operand.borrow();
    let fail = || {
        RuntimeError::type_mismatch(
            format!("operator {} not defined for {}", op.symbol(), v.kind_name()),
            span,
        )
    };
    match op {
        UnOp::Not => v.as_bool().map(|b| Value::bool(!b).into_ref()).ok_or_else(fail),
        UnOp::BitNot => v.as_int().map(|n| Value::int(!n).into_ref()).ok_or_else(fail),
        UnOp::Neg | UnOp::Pos => {
            let negate = op == UnOp::Neg;
            match &v.payload {
                Payload::Int(n) => Ok(Value::int(if negate { n.wrapping_neg() } else { *n }).into_ref()),
                Payload::Float(_) | Payload::FloatRef(_) => {
                    let f = v.as_float().ok_or_else(fail)?;
                    Ok(Value::float(if negate { -f } else { f }).into_ref())
                }
                Payload::Vec2(c) => {
                    let s = if negate { -1.0 } else { 1.0 };
                    Ok(Value::vec2(c[0] * s, c[1] * s).into_ref())
                }
                Payload::Vec3(c) => {
                    let s = if negate { -1.0 } else { 1.0 };
                    Ok(Value::vec3(c[0] * s, c[1] * s, c[2] * s).into_ref())
                }
                _ => Err(fail()),
            }
        }
    }
}

/// Assignment: re-type a non-null target from the source; a null slot
/// adopts the source's base kind, and container/function slots thereafter
/// reject other base kinds. Scalar references write through their slot.
pub fn assign(target: &ValueRef, source: &ValueRef, span: Span) -> RuntimeResult<ValueRef> {
    if target.borrow().constant {
        return Err(RuntimeError::constant_assignment("value", span));
    }

    // write-through for scalar references
    let wrote = {
        let t = target.borrow();
        match &t.payload {
            Payload::FloatRef(slot) => {
                let f = source.borrow().as_float().ok_or_else(|| {
                    RuntimeError::type_mismatch(
                        format!(
                            "cannot assign {} through a float reference",
                            source.borrow().kind_name()
                        ),
                        span,
                    )
                })?;
                if !slot.set(f) {
                    return Err(RuntimeError::invalid_operation(
                        "reference target no longer has this slot",
                        span,
                    ));
                }
                true
            }
            Payload::CharRef(slot) => {
                let c = source.borrow().as_char().ok_or_else(|| {
                    RuntimeError::type_mismatch(
                        format!(
                            "cannot assign {} through a character reference",
                            source.borrow().kind_name()
                        ),
                        span,
                    )
                })?;
                if !slot.set(c) {
                    return Err(RuntimeError::invalid_operation(
                        "reference target no longer has this slot",
                        span,
                    ));
                }
                true
            }
            _ => false,
        }
    };
    if wrote {
        return Ok(Rc::clone(target));
    }

    // sticky base kinds for container and function slots
    use super::value::BaseKind;
    let target_base = target.borrow().base_kind();
    let source_base = source.borrow().base_kind();
    if let Some(t) = target_base {
        if matches!(t, BaseKind::Array | BaseKind::Dict | BaseKind::Function)
            && source_base != Some(t)
        {
            return Err(RuntimeError::type_mismatch(
                format!(
                    "slot of type {} cannot be assigned a {}",
                    target.borrow().kind_name(),
                    source.borrow().kind_name()
                ),
                span,
            ));
        }
    }

    let (payload, members) = {
        let s = source.borrow();
        (s.payload.clone(), s.members.clone())
    };
    {
        let mut t = target.borrow_mut();
        t.payload = payload;
        t.members = members;
    }
    Ok(Rc::clone(target))
}

/// Compound assignment: mutate the target in place and return a clone of
/// the new value. `array += v` pushes; `array -= n` pops n elements.
pub fn compound(
    op: AssignOp,
    target: &ValueRef,
    rhs: &ValueRef,
    span: Span,
) -> RuntimeResult<ValueRef> {
    let Some(bin) = op.bin_op() else {
        return assign(target, rhs, span);
    };
    if target.borrow().constant {
        return Err(RuntimeError::constant_assignment("value", span));
    }

    if matches!(target.borrow().payload, Payload::Array(_)) {
        match bin {
            BinOp::Add => {
                if let Payload::Array(elems) = &mut target.borrow_mut().payload {
                    elems.push(Rc::clone(rhs));
                }
            }
            BinOp::Sub => {
                let count = rhs.borrow().as_int().ok_or_else(|| {
                    RuntimeError::type_mismatch(
                        format!("array -= expects an integer, got {}", rhs.borrow().kind_name()),
                        span,
                    )
                })?;
                let len = match &target.borrow().payload {
                    Payload::Array(elems) => elems.len(),
                    _ => 0,
                };
                if count < 0 || count as usize > len {
                    return Err(RuntimeError::invalid_operation(
                        format!("cannot remove {count} element(s) from an array of {len}"),
                        span,
                    ));
                }
                if let Payload::Array(elems) = &mut target.borrow_mut().payload {
                    elems.truncate(len - count as usize);
                }
            }
            _ => {
                return Err(RuntimeError::type_mismatch(
                    format!("operator {} not defined for arrays", op.symbol()),
                    span,
                ))
            }
        }
        return Ok(target.borrow().deep_clone().into_ref());
    }

    // in-place mutation is defined for int/float/float-ref/string/vector
    let mutable_kind = matches!(
        target.borrow().payload,
        Payload::Int(_)
            | Payload::Float(_)
            | Payload::FloatRef(_)
            | Payload::Str(_)
            | Payload::Vec2(_)
            | Payload::Vec3(_)
    );
    if !mutable_kind {
        return Err(RuntimeError::type_mismatch(
            format!(
                "operator {} not defined for {}",
                op.symbol(),
                target.borrow().kind_name()
            ),
            span,
        ));
    }

    let result = binary(bin, target, rhs, span)?;
    write_back(target, &result, span)?;
    Ok(target.borrow().deep_clone().into_ref())
}

/// Store a computed result into a compound-assignment target
fn write_back(target: &ValueRef, result: &ValueRef, span: Span) -> RuntimeResult<()> {
    let through_ref = {
        let t = target.borrow();
        if let Payload::FloatRef(slot) = &t.payload {
            let f = result.borrow().as_float().ok_or_else(|| {
                RuntimeError::type_mismatch(
                    "compound assignment through a float reference must produce a number",
                    span,
                )
            })?;
            if !slot.set(f) {
                return Err(RuntimeError::invalid_operation(
                    "reference target no longer has this slot",
                    span,
                ));
            }
            true
        } else {
            false
        }
    };
    if !through_ref {
        let payload = result.borrow().payload.clone();
        target.borrow_mut().payload = payload;
    }
    Ok(())
}

/// Prefix/postfix increment and decrement. Returns the pre- or
/// post-mutation value depending on the form.
pub fn step(
    target: &ValueRef,
    decrement: bool,
    prefix: bool,
    span: Span,
) -> RuntimeResult<ValueRef> {
    if target.borrow().constant {
        return Err(RuntimeError::constant_assignment("value", span));
    }
    let pre = target.borrow().deep_clone();
    let delta = if decrement { -1.0 } else { 1.0 };

    let stale = RuntimeError::invalid_operation("reference target no longer has this slot", span);
    enum Write {
        Done,
        Float(super::value::FloatSlot, f64),
        Char(super::value::CharSlot, char),
    }
    let action = {
        let mut t = target.borrow_mut();
        match &mut t.payload {
            Payload::Int(n) => {
                *n = if decrement { n.wrapping_sub(1) } else { n.wrapping_add(1) };
                Write::Done
            }
            Payload::Float(f) => {
                *f += delta;
                Write::Done
            }
            Payload::Char(c) => {
                *c = step_char(*c, decrement, span)?;
                Write::Done
            }
            Payload::Vec2(comps) => {
                for c in comps.iter_mut() {
                    *c += delta;
                }
                Write::Done
            }
            Payload::Vec3(comps) => {
                for c in comps.iter_mut() {
                    *c += delta;
                }
                Write::Done
            }
            Payload::FloatRef(slot) => {
                let current = slot.get().ok_or_else(|| stale.clone())?;
                Write::Float(slot.clone(), current + delta)
            }
            Payload::CharRef(slot) => {
                let current = slot.get().ok_or_else(|| stale.clone())?;
                Write::Char(slot.clone(), step_char(current, decrement, span)?)
            }
            other => {
                let name = Value::new(other.clone()).kind_name();
                return Err(RuntimeError::type_mismatch(
                    format!(
                        "operator {} not defined for {name}",
                        if decrement { "--" } else { "++" }
                    ),
                    span,
                ));
            }
        }
    };
    // slot writes borrow the owning container, so they happen after the
    // target borrow is released
    match action {
        Write::Done => {}
        Write::Float(slot, v) => {
            if !slot.set(v) {
                return Err(stale);
            }
        }
        Write::Char(slot, c) => {
            if !slot.set(c) {
                return Err(stale);
            }
        }
    }

    let post = target.borrow().deep_clone();
    Ok(if prefix { post } else { pre }.into_ref())
}

fn step_char(c: char, decrement: bool, span: Span) -> RuntimeResult<char> {
    let code = c as u32;
    let next = if decrement {
        code.checked_sub(1)
    } else {
        code.checked_add(1)
    };
    next.and_then(char::from_u32).ok_or_else(|| {
        RuntimeError::invalid_operation("character increment out of range", span)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::value::FloatSlot;

    fn span() -> Span {
        Span::new(0, 1)
    }

    fn int(n: i64) -> ValueRef {
        Value::int(n).into_ref()
    }

    fn float(f: f64) -> ValueRef {
        Value::float(f).into_ref()
    }

    fn string(s: &str) -> ValueRef {
        Value::str(s).into_ref()
    }

    #[test]
    fn test_int_arithmetic() {
        let out = binary(BinOp::Add, &int(2), &int(3), span()).unwrap();
        assert_eq!(out.borrow().as_int(), Some(5));
        let out = binary(BinOp::Mod, &int(7), &int(3), span()).unwrap();
        assert_eq!(out.borrow().as_int(), Some(1));
    }

    #[test]
    fn test_numeric_promotion() {
        let out = binary(BinOp::Add, &int(1), &float(2.5), span()).unwrap();
        assert_eq!(out.borrow().as_float(), Some(3.5));
        assert!(matches!(out.borrow().payload, Payload::Float(_)));
    }

    #[test]
    fn test_division_by_zero() {
        for (l, r) in [(int(5), int(0)), (float(5.0), float(0.0))] {
            let err = binary(BinOp::Div, &l, &r, span()).unwrap_err();
            assert_eq!(err.kind, crate::interp::ErrorKind::InvalidOperation);
        }
    }

    #[test]
    fn test_string_concat_stringifies_rhs() {
        let out = binary(BinOp::Add, &string("a"), &int(1), span()).unwrap();
        assert_eq!(format!("{}", out.borrow()), "a1");
        let out = binary(BinOp::Add, &string("v="), &Value::vec2(1.0, 2.0).into_ref(), span()).unwrap();
        assert_eq!(format!("{}", out.borrow()), "v=vec2(1, 2)");
    }

    #[test]
    fn test_int_plus_string_is_mismatch() {
        let err = binary(BinOp::Add, &int(1), &string("a"), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_char_plus_char_makes_string() {
        let out = binary(
            BinOp::Add,
            &Value::char('a').into_ref(),
            &Value::char('b').into_ref(),
            span(),
        )
        .unwrap();
        assert_eq!(format!("{}", out.borrow()), "ab");
    }

    #[test]
    fn test_string_repetition_doubles() {
        // preserved doubling behavior: n self-appends, 2^n growth
        let out = binary(BinOp::Mul, &string("ab"), &int(2), span()).unwrap();
        assert_eq!(format!("{}", out.borrow()), "abababab");
        let out = binary(BinOp::Mul, &string("x"), &int(0), span()).unwrap();
        assert_eq!(format!("{}", out.borrow()), "x");
        let err = binary(BinOp::Mul, &string("x"), &int(-1), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_vector_component_wise() {
        let a = Value::vec2(1.0, 2.0).into_ref();
        let b = Value::vec2(3.0, 4.0).into_ref();
        let out = binary(BinOp::Add, &a, &b, span()).unwrap();
        assert!(matches!(out.borrow().payload, Payload::Vec2([4.0, 6.0])));
    }

    #[test]
    fn test_vector_scalar_broadcast() {
        let v = Value::vec3(1.0, 2.0, 3.0).into_ref();
        let out = binary(BinOp::Mul, &v, &int(2), span()).unwrap();
        assert!(matches!(out.borrow().payload, Payload::Vec3([2.0, 4.0, 6.0])));
        // scalar on the left mirrors the order
        let out = binary(BinOp::Sub, &int(10), &Value::vec2(1.0, 2.0).into_ref(), span()).unwrap();
        assert!(matches!(out.borrow().payload, Payload::Vec2([9.0, 8.0])));
    }

    #[test]
    fn test_vector_division_zero_component() {
        let a = Value::vec2(1.0, 2.0).into_ref();
        let b = Value::vec2(1.0, 0.0).into_ref();
        let err = binary(BinOp::Div, &a, &b, span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_mixed_size_vectors_mismatch() {
        let a = Value::vec2(1.0, 2.0).into_ref();
        let b = Value::vec3(1.0, 2.0, 3.0).into_ref();
        assert!(binary(BinOp::Add, &a, &b, span()).is_err());
    }

    #[test]
    fn test_comparisons_mixed_scalars() {
        let out = binary(BinOp::Lt, &int(1), &float(1.5), span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));
        // char compares by ordinal against numbers
        let out = binary(BinOp::Ge, &Value::char('a').into_ref(), &int(97), span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));
        let out = binary(BinOp::Lt, &string("abc"), &string("abd"), span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));
    }

    #[test]
    fn test_structural_array_equality() {
        let a = Value::array(vec![int(1), int(2)]).into_ref();
        let b = Value::array(vec![int(1), int(2)]).into_ref();
        let out = binary(BinOp::Eq, &a, &b, span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));

        if let Payload::Array(elems) = &a.borrow().payload {
            elems[0].borrow_mut().payload = Payload::Int(9);
        }
        let out = binary(BinOp::Eq, &a, &b, span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(false));
    }

    #[test]
    fn test_structural_dict_equality() {
        let mk = || {
            let mut m = std::collections::HashMap::new();
            m.insert("a".to_string(), int(1));
            Value::dict(m).into_ref()
        };
        let out = binary(BinOp::Eq, &mk(), &mk(), span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));
    }

    #[test]
    fn test_equality_mismatch_errors() {
        let err = binary(BinOp::Eq, &int(1), &string("1"), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_compare_all_swallows_mismatch() {
        let cmp = compare_all(&Value::int(1), &Value::str("a"));
        assert_eq!(cmp.lt, None);
        assert_eq!(cmp.eq, None);
        assert!(!cmp.same_type);

        let cmp = compare_all(&Value::int(1), &Value::int(2));
        assert_eq!(cmp.lt, Some(true));
        assert_eq!(cmp.eq, Some(false));
        assert_eq!(cmp.ne, Some(true));
        assert!(cmp.same_type);
    }

    #[test]
    fn test_logical_bool_only() {
        let out = binary(
            BinOp::Xor,
            &Value::bool(true).into_ref(),
            &Value::bool(false).into_ref(),
            span(),
        )
        .unwrap();
        assert_eq!(out.borrow().as_bool(), Some(true));
        assert!(binary(BinOp::And, &int(1), &int(1), span()).is_err());
    }

    #[test]
    fn test_bitwise_int_only() {
        let out = binary(BinOp::Shl, &int(1), &int(4), span()).unwrap();
        assert_eq!(out.borrow().as_int(), Some(16));
        assert!(binary(BinOp::BitAnd, &float(1.0), &int(1), span()).is_err());
        assert!(binary(BinOp::Shl, &int(1), &int(64), span()).is_err());
    }

    #[test]
    fn test_unary() {
        let out = unary(UnOp::Neg, &int(5), span()).unwrap();
        assert_eq!(out.borrow().as_int(), Some(-5));
        let out = unary(UnOp::Not, &Value::bool(true).into_ref(), span()).unwrap();
        assert_eq!(out.borrow().as_bool(), Some(false));
        let out = unary(UnOp::Neg, &Value::vec2(1.0, -2.0).into_ref(), span()).unwrap();
        assert!(matches!(out.borrow().payload, Payload::Vec2([-1.0, 2.0])));
        assert!(unary(UnOp::Not, &int(1), span()).is_err());
    }

    #[test]
    fn test_assign_retypes_scalars() {
        let target = int(1);
        assign(&target, &string("now a string"), span()).unwrap();
        assert!(matches!(target.borrow().payload, Payload::Str(_)));
    }

    #[test]
    fn test_assign_container_slots_sticky() {
        let target = Value::array(vec![]).into_ref();
        let err = assign(&target, &int(1), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::TypeMismatch);
        // array to array is fine
        assign(&target, &Value::array(vec![int(1)]).into_ref(), span()).unwrap();
    }

    #[test]
    fn test_assign_null_slot_adopts() {
        let target = Value::null().into_ref();
        assign(&target, &Value::array(vec![]).into_ref(), span()).unwrap();
        assert!(matches!(target.borrow().payload, Payload::Array(_)));
        // now sticky
        assert!(assign(&target, &int(1), span()).is_err());
    }

    #[test]
    fn test_assign_constant_fails() {
        let target = Value::int(1).as_const().into_ref();
        let err = assign(&target, &int(2), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::ConstantAssignment);
    }

    #[test]
    fn test_assign_through_float_reference() {
        let v = Value::vec2(1.0, 2.0).into_ref();
        let fref = Value::new(Payload::FloatRef(FloatSlot {
            owner: Rc::clone(&v),
            index: 0,
        }))
        .into_ref();
        assign(&fref, &float(7.5), span()).unwrap();
        assert!(matches!(v.borrow().payload, Payload::Vec2([7.5, 2.0])));
    }

    #[test]
    fn test_compound_int_add() {
        let target = int(10);
        let out = compound(AssignOp::AddAssign, &target, &int(5), span()).unwrap();
        assert_eq!(target.borrow().as_int(), Some(15));
        assert_eq!(out.borrow().as_int(), Some(15));
        // returned value is a clone, not an alias
        assert!(!Rc::ptr_eq(&target, &out));
    }

    #[test]
    fn test_compound_array_push_pop() {
        let target = Value::array(vec![int(1), int(2), int(3)]).into_ref();
        compound(AssignOp::AddAssign, &target, &int(4), span()).unwrap();
        match &target.borrow().payload {
            Payload::Array(elems) => assert_eq!(elems.len(), 4),
            _ => panic!("expected array"),
        }

        compound(AssignOp::SubAssign, &target, &int(2), span()).unwrap();
        match &target.borrow().payload {
            Payload::Array(elems) => assert_eq!(elems.len(), 2),
            _ => panic!("expected array"),
        }

        let err = compound(AssignOp::SubAssign, &target, &int(10), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::InvalidOperation);
        let err = compound(AssignOp::SubAssign, &target, &int(-1), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_compound_string_append() {
        let target = string("ab");
        compound(AssignOp::AddAssign, &target, &int(3), span()).unwrap();
        assert_eq!(format!("{}", target.borrow()), "ab3");
    }

    #[test]
    fn test_compound_rejects_bool_target() {
        let target = Value::bool(true).into_ref();
        let err = compound(AssignOp::AddAssign, &target, &int(1), span()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_step_prefix_postfix() {
        let target = int(5);
        let pre = step(&target, false, false, span()).unwrap();
        assert_eq!(pre.borrow().as_int(), Some(5));
        assert_eq!(target.borrow().as_int(), Some(6));

        let post = step(&target, false, true, span()).unwrap();
        assert_eq!(post.borrow().as_int(), Some(7));
        assert_eq!(target.borrow().as_int(), Some(7));
    }

    #[test]
    fn test_step_char_and_vector() {
        let c = Value::char('a').into_ref();
        step(&c, false, true, span()).unwrap();
        assert_eq!(c.borrow().as_char(), Some('b'));

        let v = Value::vec2(1.0, 2.0).into_ref();
        step(&v, true, true, span()).unwrap();
        assert!(matches!(v.borrow().payload, Payload::Vec2([0.0, 1.0])));
    }

    #[test]
    fn test_step_through_float_reference() {
        let v = Value::vec2(1.0, 2.0).into_ref();
        let fref = Value::new(Payload::FloatRef(FloatSlot {
            owner: Rc::clone(&v),
            index: 1,
        }))
        .into_ref();
        let post = step(&fref, false, true, span()).unwrap();
        assert_eq!(post.borrow().as_float(), Some(3.0));
        assert!(matches!(v.borrow().payload, Payload::Vec2([1.0, 3.0])));
    }
}
