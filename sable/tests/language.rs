//! Integration tests for the Sable interpreter
//!
//! Drives whole programs through the lexer, parser, and evaluator. The
//! last expression statement of each script is the observed result.

use sable::interp::{ErrorKind, RuntimeError, ValueRef};
use sable::lexer::tokenize;
use sable::parser::parse;
use sable::Interpreter;
use std::path::Path;

fn run(source: &str) -> Result<Interpreter, RuntimeError> {
    let tokens = tokenize(source).expect("lexing failed");
    let program = parse(&tokens).expect("parsing failed");
    let mut interp = Interpreter::new();
    interp.run_program(&program)?;
    Ok(interp)
}

fn run_in(dir: &Path, source: &str) -> Result<Interpreter, RuntimeError> {
    let tokens = tokenize(source).expect("lexing failed");
    let program = parse(&tokens).expect("parsing failed");
    let mut interp = Interpreter::new();
    interp.set_base_dir(dir.to_path_buf());
    interp.run_program(&program)?;
    Ok(interp)
}

fn eval(source: &str) -> ValueRef {
    let mut interp = run(source).expect("script failed");
    interp.take_last_value().expect("script produced no value")
}

/// Display rendering of the script's final expression
fn eval_str(source: &str) -> String {
    eval(source).borrow().to_string()
}

fn eval_int(source: &str) -> i64 {
    let v = eval(source);
    let n = v.borrow().as_int();
    n.unwrap_or_else(|| panic!("expected int, got {}", v.borrow().kind_name()))
}

fn eval_bool(source: &str) -> bool {
    let v = eval(source);
    let b = v.borrow().as_bool();
    b.unwrap_or_else(|| panic!("expected bool, got {}", v.borrow().kind_name()))
}

fn run_err(source: &str) -> RuntimeError {
    match run(source) {
        Ok(_) => panic!("script should have failed"),
        Err(err) => err,
    }
}

fn run_in_err(dir: &Path, source: &str) -> RuntimeError {
    match run_in(dir, source) {
        Ok(_) => panic!("script should have failed"),
        Err(err) => err,
    }
}

// ============================================
// Arithmetic and dispatch
// ============================================

#[test]
fn test_integer_arithmetic() {
    assert_eq!(eval_int("1 + 2 * 3;"), 7);
    assert_eq!(eval_int("7 / 2;"), 3);
    assert_eq!(eval_int("7 % 3;"), 1);
    assert_eq!(eval_int("-5 + 2;"), -3);
}

#[test]
fn test_integer_arithmetic_wraps() {
    assert_eq!(
        eval_int("9223372036854775807 + 1;"),
        i64::MIN
    );
}

#[test]
fn test_int_promotes_to_float() {
    assert_eq!(eval_str("1 + 2.5;"), "3.5");
    assert_eq!(eval_str("7 / 2.0;"), "3.5");
    assert_eq!(eval_str("2.0 * 3;"), "6");
}

#[test]
fn test_division_by_zero() {
    assert_eq!(run_err("1 / 0;").kind, ErrorKind::InvalidOperation);
    assert_eq!(run_err("1 % 0;").kind, ErrorKind::InvalidOperation);
    assert_eq!(run_err("1.5 / 0;").kind, ErrorKind::InvalidOperation);
}

#[test]
fn test_string_concatenation_stringifies() {
    assert_eq!(eval_str(r#""n = " + 42;"#), "n = 42");
    assert_eq!(eval_str(r#""pi: " + 3.5;"#), "pi: 3.5");
    assert_eq!(eval_str(r#""b: " + true;"#), "b: true");
    assert_eq!(eval_str(r#"'a' + 'b';"#), "ab");
}

#[test]
fn test_string_repetition_doubles() {
    // each round appends the accumulated string to itself
    assert_eq!(eval_str(r#""ab" * 1;"#), "abab");
    assert_eq!(eval_str(r#""ab" * 2;"#), "abababab");
}

#[test]
fn test_bitwise_and_shift() {
    assert_eq!(eval_int("6 & 3;"), 2);
    assert_eq!(eval_int("6 | 3;"), 7);
    assert_eq!(eval_int("6 ^ 3;"), 5);
    assert_eq!(eval_int("1 << 4;"), 16);
    assert_eq!(eval_int("16 >> 2;"), 4);
    assert_eq!(eval_int("~0;"), -1);
}

#[test]
fn test_comparison_over_scalar_ordinals() {
    assert!(eval_bool("1 < 2.5;"));
    assert!(eval_bool("'a' < 'b';"));
    assert!(eval_bool("true > false;"));
    assert!(eval_bool("'A' <= 65;"));
}

#[test]
fn test_incomparable_kinds_error() {
    assert_eq!(run_err(r#"1 < "two";"#).kind, ErrorKind::TypeMismatch);
    assert_eq!(run_err("[1] < [2];").kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_logical_operators_demand_bool() {
    assert!(eval_bool("true && !false;"));
    assert!(eval_bool("false || true;"));
    assert!(eval_bool("true ^^ false;"));
    assert!(!eval_bool("true ^^ true;"));
    assert_eq!(run_err("1 && true;").kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_logical_short_circuit() {
    // the right side would divide by zero if evaluated
    assert!(!eval_bool("false && 1 / 0 == 0;"));
    assert!(eval_bool("true || 1 / 0 == 0;"));
}

#[test]
fn test_unknown_operator_combination() {
    assert_eq!(run_err("true + false;").kind, ErrorKind::TypeMismatch);
    assert_eq!(run_err("[1] * 2;").kind, ErrorKind::TypeMismatch);
}

// ============================================
// Equality
// ============================================

#[test]
fn test_structural_equality() {
    assert!(eval_bool("[1, 2, 3] == [1, 2, 3];"));
    assert!(eval_bool("[1, 2] != [1, 2, 3];"));
    // a statement-leading `{` is a block, so dict literals in statement
    // position need parentheses
    assert!(eval_bool(r#"({"a": 1}) == {"a": 1};"#));
    assert!(eval_bool(r#"({"a": 1}) != {"a": 2};"#));
    assert!(eval_bool("[[1], [2]] == [[1], [2]];"));
}

#[test]
fn test_numeric_equality_promotes() {
    assert!(eval_bool("1 == 1.0;"));
    assert!(eval_bool("1 != 1.5;"));
}

#[test]
fn test_null_equality() {
    assert!(eval_bool("null == null;"));
    assert!(eval_bool("null != 0;"));
}

#[test]
fn test_function_equality_is_identity() {
    assert!(eval_bool(
        "func f() { return 1; }\nvar a = f;\nvar b = f;\na == b;"
    ));
}

#[test]
fn test_compare_all_swallows_mismatch() {
    assert!(eval_bool("compare_all(1, 2).lt;"));
    assert!(!eval_bool("compare_all(2, 2).lt;"));
    assert!(eval_bool("compare_all(2, 2).ge;"));
    assert!(!eval_bool(r#"compare_all(1, "x").same_type;"#));
    assert_eq!(eval_str(r#"compare_all(1, "x").lt;"#), "null");
}

// ============================================
// Variables, constants, scoping
// ============================================

#[test]
fn test_variable_declaration_and_assignment() {
    assert_eq!(eval_int("var x = 1; x = x + 2; x;"), 3);
    assert_eq!(eval_str("var x; x;"), "null");
}

#[test]
fn test_assignment_re_types_scalars() {
    assert_eq!(eval_str(r#"var x = 1; x = "now a string"; x;"#), "now a string");
}

#[test]
fn test_container_base_kind_is_sticky() {
    assert_eq!(run_err("var a = [1]; a = 5;").kind, ErrorKind::TypeMismatch);
    assert_eq!(
        run_err(r#"var d = {"k": 1}; d = "no";"#).kind,
        ErrorKind::TypeMismatch
    );
}

#[test]
fn test_constant_assignment_fails() {
    assert_eq!(
        run_err("const var c = 1; c = 2;").kind,
        ErrorKind::ConstantAssignment
    );
    assert_eq!(
        run_err("const var c = 1; c += 1;").kind,
        ErrorKind::ConstantAssignment
    );
}

#[test]
fn test_duplicate_declaration() {
    assert_eq!(
        run_err("var x = 1; var x = 2;").kind,
        ErrorKind::DuplicateDeclaration
    );
}

#[test]
fn test_shadowing_in_nested_block() {
    assert_eq!(eval_int("var x = 1; { var x = 2; } x;"), 1);
}

#[test]
fn test_global_and_local_conflict() {
    assert_eq!(
        run_err("global local var x;").kind,
        ErrorKind::InvalidDeclaration
    );
}

#[test]
fn test_global_declared_from_nested_scope() {
    assert_eq!(eval_int("{ global var g = 7; } g;"), 7);
}

#[test]
fn test_globals_visible_before_declaration_statement() {
    // the restricted pass installs globals ahead of the full pass
    let src = "
        func total() { return count; }
        global var count = 10;
        total();
    ";
    assert_eq!(eval_int(src), 10);
}

#[test]
fn test_function_body_cannot_see_caller_locals() {
    let src = "
        func peek() { return hidden; }
        {
            var hidden = 1;
            peek();
        }
    ";
    assert_eq!(run_err(src).kind, ErrorKind::UndefinedIdentifier);
}

#[test]
fn test_undefined_identifier() {
    assert_eq!(run_err("nope;").kind, ErrorKind::UndefinedIdentifier);
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_if_else_chain() {
    let src = "
        func describe(n) {
            if (n < 0) { return \"neg\"; }
            else if (n == 0) { return \"zero\"; }
            else { return \"pos\"; }
        }
        describe(0) + describe(3) + describe(-1);
    ";
    assert_eq!(eval_str(src), "zeroposneg");
}

#[test]
fn test_condition_must_be_bool() {
    assert_eq!(run_err("if (1) { }").kind, ErrorKind::TypeMismatch);
    assert_eq!(run_err("while (null) { }").kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_while_loop() {
    assert_eq!(eval_int("var n = 0; while (n < 5) { n += 1; } n;"), 5);
}

#[test]
fn test_for_loop_break_and_continue() {
    let src = "
        var total = 0;
        for (var i = 0; i < 10; i++) {
            if (i == 6) { break; }
            if (i % 2 == 1) { continue; }
            total += i;
        }
        total;
    ";
    // 0 + 2 + 4; continue still runs the step expression
    assert_eq!(eval_int(src), 6);
}

#[test]
fn test_inner_break_leaves_outer_loop_running() {
    let src = "
        var count = 0;
        for (var i = 0; i < 3; i++) {
            while (true) { break; }
            count += 1;
        }
        count;
    ";
    assert_eq!(eval_int(src), 3);
}

#[test]
fn test_return_unwinds_nested_loops() {
    let src = "
        func first_even(items) {
            foreach (e in items) {
                if (e % 2 == 0) { return e; }
            }
            return null;
        }
        first_even([1, 3, 4, 5]);
    ";
    assert_eq!(eval_int(src), 4);
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(run_err("break;").kind, ErrorKind::InvalidBreak);
    assert_eq!(run_err("continue;").kind, ErrorKind::InvalidContinue);
}

#[test]
fn test_return_outside_function() {
    assert_eq!(run_err("return 1;").kind, ErrorKind::InvalidReturn);
}

#[test]
fn test_loop_state_resets_inside_function_call() {
    // a function called from a loop body starts with zero loop depth
    let src = "
        func tries_to_break() { break; }
        while (true) { tries_to_break(); }
    ";
    assert_eq!(run_err(src).kind, ErrorKind::InvalidBreak);
}

#[test]
fn test_step_expressions() {
    assert_eq!(eval_int("var i = 5; var a = i++; a * 10 + i;"), 56);
    assert_eq!(eval_int("var i = 5; var a = ++i; a * 10 + i;"), 66);
    assert_eq!(eval_int("var i = 5; i--; i;"), 4);
}

// ============================================
// Functions
// ============================================

#[test]
fn test_call_before_declaration() {
    let src = "
        var r = square(7);
        func square(n) { return n * n; }
        r;
    ";
    assert_eq!(eval_int(src), 49);
}

#[test]
fn test_call_before_overload_declarations() {
    // an early call must see the whole overload set, not just the last
    // declaration in the file
    let src = "
        var first = pick(1);
        var second = pick(\"x\");
        func pick(int n) { return 10; }
        func pick(string s) { return 20; }
        first + second + pick(1);
    ";
    assert_eq!(eval_int(src), 40);
}

#[test]
fn test_call_before_duplicate_declaration_still_fails() {
    let src = "
        var r = f(1);
        func f(int x) { return 1; }
        func f(int x) { return 2; }
    ";
    assert_eq!(run_err(src).kind, ErrorKind::DuplicateDeclaration);
}

#[test]
fn test_forward_definition_then_body() {
    let src = "
        func later(int n);
        func later(int n) { return n + 1; }
        later(1);
    ";
    assert_eq!(eval_int(src), 2);
}

#[test]
fn test_value_parameters_are_copies() {
    let src = "
        func clobber(n) { n = 99; }
        var x = 1;
        clobber(x);
        x;
    ";
    assert_eq!(eval_int(src), 1);
}

#[test]
fn test_array_value_parameter_deep_clones() {
    let src = "
        func clobber(a) { a.push(99); }
        var items = [1];
        clobber(items);
        len(items);
    ";
    assert_eq!(eval_int(src), 1);
}

#[test]
fn test_ref_parameter_writes_through() {
    let src = "
        func bump(ref n) { n += 1; }
        var x = 41;
        bump(x);
        x;
    ";
    assert_eq!(eval_int(src), 42);
}

#[test]
fn test_ref_parameter_to_array_element() {
    let src = "
        func bump(ref n) { n += 1; }
        var items = [10, 20];
        bump(items[1]);
        items[1];
    ";
    assert_eq!(eval_int(src), 21);
}

#[test]
fn test_ref_parameter_needs_lvalue() {
    let src = "
        func bump(ref n) { n += 1; }
        bump(1 + 2);
    ";
    assert_eq!(run_err(src).kind, ErrorKind::InvalidOperation);
}

#[test]
fn test_typed_parameter_enforced() {
    let src = "
        func twice(int n) { return n * 2; }
        twice(\"three\");
    ";
    assert_eq!(run_err(src).kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_wrong_argument_count() {
    let src = "
        func one(a) { return a; }
        one(1, 2);
    ";
    assert_eq!(run_err(src).kind, ErrorKind::InvalidArgumentCount);
}

#[test]
fn test_implicit_return_is_null() {
    assert_eq!(eval_str("func noop() { }\nnoop();"), "null");
}

#[test]
fn test_recursion() {
    let src = "
        func fib(n) {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        fib(15);
    ";
    assert_eq!(eval_int(src), 610);
}

#[test]
fn test_overload_resolution_by_type() {
    let src = "
        func show(int n) { return \"int\"; }
        func show(string s) { return \"string\"; }
        func show(a, b) { return \"two\"; }
        show(1) + \" \" + show(\"x\") + \" \" + show(1, 2);
    ";
    assert_eq!(eval_str(src), "int string two");
}

#[test]
fn test_overload_first_match_wins() {
    // an `any` variant declared first shadows a later typed one
    let src = "
        func pick(a) { return \"any\"; }
        func pick(int n) { return \"int\"; }
        pick(1);
    ";
    assert_eq!(eval_str(src), "any");
}

#[test]
fn test_overload_no_match() {
    let src = "
        func only_int(int n) { return n; }
        func only_int(int a, int b) { return a; }
        only_int(true);
    ";
    assert_eq!(run_err(src).kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_same_signature_redeclaration_fails() {
    let src = "
        func f(int n) { return 1; }
        func f(int m) { return 2; }
    ";
    assert_eq!(run_err(src).kind, ErrorKind::DuplicateDeclaration);
}

#[test]
fn test_function_value_as_instance_member() {
    let src = "
        func hello() { return \"hi\"; }
        var obj = [];
        obj.greet = hello;
        obj.greet();
    ";
    assert_eq!(eval_str(src), "hi");
}

// ============================================
// Arrays, dictionaries, strings
// ============================================

#[test]
fn test_array_indexing_and_mutation() {
    assert_eq!(eval_int("var a = [1, 2, 3]; a[1] = 20; a[1];"), 20);
    assert_eq!(eval_str("var a = [1, 2]; a;"), "[1, 2]");
}

#[test]
fn test_array_out_of_bounds() {
    assert_eq!(run_err("var a = [1]; a[5];").kind, ErrorKind::OutOfBounds);
    assert_eq!(run_err("var a = [1]; a[-1];").kind, ErrorKind::OutOfBounds);
}

#[test]
fn test_array_compound_push_and_truncate() {
    assert_eq!(eval_str("var a = [1]; a += 5; a;"), "[1, 5]");
    assert_eq!(eval_str("var a = [1, 2, 3]; a -= 2; a;"), "[1]");
    assert_eq!(
        run_err("var a = [1]; a -= 2;").kind,
        ErrorKind::InvalidOperation
    );
    assert_eq!(
        run_err("var a = [1]; a -= -1;").kind,
        ErrorKind::InvalidOperation
    );
}

#[test]
fn test_array_aliasing_is_shared() {
    let src = "
        var a = [1, 2];
        var b = a;
        b.push(3);
        len(a);
    ";
    assert_eq!(eval_int(src), 3);
}

#[test]
fn test_array_methods() {
    assert_eq!(eval_int("var a = [1, 2, 3]; a.pop(); a.size();"), 2);
    assert_eq!(eval_str("var a = [1, 3]; a.insert(1, 2); a;"), "[1, 2, 3]");
    assert_eq!(eval_str("var a = [1, 2, 3]; a.remove(0); a;"), "[2, 3]");
    assert!(eval_bool("[1, 2].contains(2);"));
    assert_eq!(eval_int("[5, 6, 7].find(6);"), 1);
    assert_eq!(eval_int("[5, 6].find(9);"), -1);
    assert_eq!(eval_int("var a = [[1], [1]]; a.find([1]);"), 0);
}

#[test]
fn test_dict_access_and_missing_keys() {
    assert_eq!(eval_int(r#"var d = {"a": 1}; d["a"];"#), 1);
    // lvalue position creates the key, rvalue position errors
    assert_eq!(eval_int(r#"var d = {}; d["k"] = 9; d["k"];"#), 9);
    assert_eq!(
        run_err(r#"var d = {}; d["missing"];"#).kind,
        ErrorKind::OutOfBounds
    );
}

#[test]
fn test_dict_methods() {
    assert!(eval_bool(r#"({"a": 1}).has("a");"#));
    assert_eq!(eval_str(r#"({"b": 2, "a": 1}).keys();"#), "[a, b]");
    assert_eq!(eval_int(r#"var d = {"a": 1}; d.remove("a"); d.size();"#), 0);
}

#[test]
fn test_dict_display_sorts_keys() {
    assert_eq!(eval_str(r#"({"b": 2, "a": 1});"#), "{a: 1, b: 2}");
}

#[test]
fn test_string_indexing_reads_and_writes() {
    assert_eq!(eval_str(r#"var s = "cat"; s[0];"#), "c");
    assert_eq!(eval_str(r#"var s = "cat"; s[0] = 'b'; s;"#), "bat");
    assert_eq!(run_err(r#"var s = "a"; s[3];"#).kind, ErrorKind::OutOfBounds);
}

#[test]
fn test_string_methods() {
    assert_eq!(eval_str(r#""Hi There".upper();"#), "HI THERE");
    assert_eq!(eval_str(r#""Hi".lower();"#), "hi");
    assert_eq!(eval_str(r#""  pad  ".trim();"#), "pad");
    assert_eq!(eval_str(r#""hello".substr(1, 3);"#), "ell");
    assert_eq!(eval_int(r#""hello".find("llo");"#), 2);
    assert_eq!(eval_str(r#""a,b,c".split(",");"#), "[a, b, c]");
    assert_eq!(eval_int(r#""hello".size();"#), 5);
}

#[test]
fn test_foreach_aliases_array_elements() {
    assert_eq!(
        eval_str("var a = [1, 2, 3]; foreach (e in a) { e = e * 2; } a;"),
        "[2, 4, 6]"
    );
}

#[test]
fn test_foreach_over_dict_values_in_key_order() {
    let src = r#"
        var d = {"b": 20, "a": 1};
        var order = [];
        foreach (v in d) { order += v; }
        order;
    "#;
    assert_eq!(eval_str(src), "[1, 20]");
}

#[test]
fn test_foreach_over_string_writes_through() {
    assert_eq!(
        eval_str(r#"var s = "abc"; foreach (c in s) { c = 'x'; } s;"#),
        "xxx"
    );
}

#[test]
fn test_foreach_non_iterable() {
    assert_eq!(run_err("foreach (x in 42) { }").kind, ErrorKind::TypeMismatch);
}

// ============================================
// Vectors and pairs
// ============================================

#[test]
fn test_vector_construction_and_members() {
    assert_eq!(eval_str("make_vec2(1.0, 2.0);"), "vec2(1, 2)");
    assert_eq!(eval_str("var v = make_vec3(1.0, 2.0, 3.0); v.z;"), "3");
}

#[test]
fn test_vector_member_writes_through() {
    assert_eq!(
        eval_str("var v = make_vec2(1.0, 2.0); v.x = 5.0; v;"),
        "vec2(5, 2)"
    );
    assert_eq!(
        eval_str("var v = make_vec3(0.0, 0.0, 0.0); v[2] = 9.0; v;"),
        "vec3(0, 0, 9)"
    );
}

#[test]
fn test_vector_componentwise_and_broadcast() {
    assert_eq!(
        eval_str("make_vec2(1.0, 2.0) + make_vec2(3.0, 4.0);"),
        "vec2(4, 6)"
    );
    assert_eq!(eval_str("make_vec2(1.0, 2.0) * 3;"), "vec2(3, 6)");
    assert_eq!(eval_str("make_vec3(2.0, 4.0, 8.0) / 2.0;"), "vec3(1, 2, 4)");
}

#[test]
fn test_vector_zero_divisor_component() {
    assert_eq!(
        run_err("make_vec2(1.0, 2.0) / make_vec2(1.0, 0.0);").kind,
        ErrorKind::InvalidOperation
    );
}

#[test]
fn test_vector_methods_and_natives() {
    assert_eq!(eval_str("make_vec2(3.0, 4.0).length();"), "5");
    assert_eq!(eval_str("dot(make_vec2(1.0, 2.0), make_vec2(3.0, 4.0));"), "11");
    assert_eq!(
        eval_str("cross(make_vec3(1.0, 0.0, 0.0), make_vec3(0.0, 1.0, 0.0));"),
        "vec3(0, 0, 1)"
    );
}

#[test]
fn test_pair_halves_alias() {
    assert_eq!(
        eval_str(r#"var p = make_pair(1, "two"); p.first = 10; p;"#),
        "(10, two)"
    );
    assert!(eval_bool(r#"make_pair(1, 2) == make_pair(1, 2);"#));
}

// ============================================
// Builtins
// ============================================

#[test]
fn test_type_tags_and_typeof() {
    assert!(eval_bool("typeof(1) == int;"));
    assert!(eval_bool("typeof(1.5) == float;"));
    assert!(eval_bool(r#"typeof("s") == string;"#));
    assert!(eval_bool("typeof([1]) == array;"));
    assert!(eval_bool("typeof(typeof(1)) != int;"));
}

#[test]
fn test_conversions() {
    assert_eq!(eval_int("to_int(3.9);"), 3);
    assert_eq!(eval_int(r#"to_int("42");"#), 42);
    assert_eq!(eval_str("to_float(2);"), "2");
    assert_eq!(eval_str("str(12) + str(true);"), "12true");
    assert_eq!(eval_str("chr(97);"), "a");
    assert_eq!(eval_int("ord('a');"), 97);
}

#[test]
fn test_math_builtins() {
    assert_eq!(eval_str("sqrt(9.0);"), "3");
    assert_eq!(eval_int("abs(-4);"), 4);
    assert_eq!(eval_str("pow(2.0, 10.0);"), "1024");
    assert_eq!(eval_int("min(3, 7);"), 3);
    assert_eq!(eval_int("max(3, 7);"), 7);
    assert_eq!(eval_str("floor(1.9);"), "1");
    assert_eq!(eval_str("ceil(1.1);"), "2");
}

#[test]
fn test_len_builtin() {
    assert_eq!(eval_int(r#"len("abc");"#), 3);
    assert_eq!(eval_int("len([1, 2]);"), 2);
    assert_eq!(eval_int(r#"len({"a": 1});"#), 1);
    assert_eq!(run_err("len(5);").kind, ErrorKind::Builtin);
}

#[test]
fn test_clone_breaks_aliasing() {
    let src = "
        var a = [1, 2];
        var b = clone(a);
        b.push(3);
        len(a);
    ";
    assert_eq!(eval_int(src), 2);
}

#[test]
fn test_assert_builtin() {
    run("assert(1 + 1 == 2);").unwrap();
    assert_eq!(run_err("assert(false);").kind, ErrorKind::Builtin);
}

#[test]
fn test_builtin_constants_are_const() {
    assert_eq!(run_err("PI = 3;").kind, ErrorKind::ConstantAssignment);
}

// ============================================
// Modules
// ============================================

#[test]
fn test_import_exposes_module_symbols() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("math.sbl"),
        "global func triple(n) { return n * 3; }\nvar offset = 100;\n",
    )
    .unwrap();

    let mut interp = run_in(dir.path(), "import \"math.sbl\";\ntriple(5) + offset;").unwrap();
    let v = interp.take_last_value().unwrap();
    assert_eq!(v.borrow().as_int(), Some(115));
}

#[test]
fn test_local_module_symbols_stay_hidden() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lib.sbl"),
        "local var secret = 1;\nvar open = 2;\n",
    )
    .unwrap();

    let err = run_in_err(dir.path(), "import \"lib.sbl\";\nsecret;");
    assert_eq!(err.kind, ErrorKind::UndefinedIdentifier);
}

#[test]
fn test_module_top_level_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("counter.sbl"),
        "global var ticks = 0;\nticks += 1;\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("middle.sbl"),
        "import \"counter.sbl\";\n",
    )
    .unwrap();

    // diamond import: counter reached twice, executed once
    let mut interp = run_in(
        dir.path(),
        "import \"middle.sbl\";\nimport \"counter.sbl\";\nticks;",
    )
    .unwrap();
    let v = interp.take_last_value().unwrap();
    assert_eq!(v.borrow().as_int(), Some(1));
}

#[test]
fn test_missing_module() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_in_err(dir.path(), "import \"nope.sbl\";");
    assert_eq!(err.kind, ErrorKind::Builtin);
}

#[test]
fn test_module_cannot_see_importer_symbols() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("peeker.sbl"), "mine;\n").unwrap();

    let err = run_in_err(dir.path(), "var mine = 1;\nimport \"peeker.sbl\";");
    assert_eq!(err.kind, ErrorKind::UndefinedIdentifier);
}

#[test]
fn test_module_top_level_break_rejected_even_inside_loop() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("oops.sbl"), "break;\n").unwrap();

    // the importer's loop must not lend its nesting to the module
    let err = run_in_err(
        dir.path(),
        "var n = 0;\nwhile (n < 3) { import \"oops.sbl\"; n += 1; }",
    );
    assert_eq!(err.kind, ErrorKind::InvalidBreak);
}

#[test]
fn test_module_top_level_return_rejected_even_inside_function() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("escape.sbl"), "return;\n").unwrap();

    let err = run_in_err(
        dir.path(),
        "func f() { import \"escape.sbl\"; return 1; }\nf();",
    );
    assert_eq!(err.kind, ErrorKind::InvalidReturn);
}

// ============================================
// Files
// ============================================

#[test]
fn test_file_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt").display().to_string();
    let src = format!(
        r#"
        var f = open("{path}", "w");
        f.write("line one\n");
        f.write("line two\n");
        f.close();
        var g = open("{path}", "r");
        var first = g.read_line();
        g.close();
        first;
        "#
    );
    assert_eq!(eval_str(&src), "line one");
}

#[test]
fn test_file_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt").display().to_string();
    std::fs::write(dir.path().join("f.txt"), "x").unwrap();
    assert!(eval_bool(&format!(r#"exists("{path}");"#)));
    assert!(!eval_bool(r#"exists("/definitely/not/here");"#));
}

#[test]
fn test_read_from_closed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.txt").display().to_string();
    std::fs::write(dir.path().join("c.txt"), "x").unwrap();
    let src = format!(
        r#"
        var f = open("{path}", "r");
        f.close();
        f.read_line();
        "#
    );
    assert_eq!(run_err(&src).kind, ErrorKind::Builtin);
}

// ============================================
// Instance members
// ============================================

#[test]
fn test_ad_hoc_members() {
    let src = r#"
        var thing = [1, 2];
        thing.label = "pair of ints";
        thing.label;
    "#;
    assert_eq!(eval_str(src), "pair of ints");
}

#[test]
fn test_missing_member_read_errors() {
    assert_eq!(
        run_err("var a = [1]; a.nothing;").kind,
        ErrorKind::UndefinedIdentifier
    );
}
