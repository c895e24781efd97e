//! End-to-end programs run through the public API.

use monkeylang::error::RuntimeError;
use monkeylang::{eval, run, MonkeyError, Value, VmState};
use pretty_assertions::assert_eq;

fn eval_ok(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("{} failed: {}", source, e))
}

fn runtime_error(source: &str) -> RuntimeError {
    match eval(source) {
        Err(MonkeyError::Runtime(e)) => e,
        other => panic!("{} should fail at runtime, got {:?}", source, other.map(|v| v.inspect())),
    }
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval_ok("1 + 2 * 3"), Value::Integer(7));
}

#[test]
fn recursive_factorial() {
    let source = "
        fact := fn(n) {
            if (n == 0) { return 1; }
            n * fact(n - 1)
        };
        fact(5)
    ";
    assert_eq!(eval_ok(source), Value::Integer(120));

    let terse = "f := fn(x) { if (x == 0) { return 1 } return x * f(x - 1) }; f(5)";
    assert_eq!(eval_ok(terse), Value::Integer(120));
}

#[test]
fn array_out_of_range() {
    assert_eq!(eval_ok("arr := [1, 2, 3]; arr[5]"), Value::Null);
    assert_eq!(
        runtime_error("arr := [1, 2, 3]; arr[5] = 9"),
        RuntimeError::IndexOutOfBounds(5)
    );
}

#[test]
fn string_out_of_range() {
    assert_eq!(eval_ok("\"hello\"[10]"), Value::string(""));
}

#[test]
fn hash_merge_is_right_biased() {
    let merged = eval_ok("{\"a\": 1} + {\"a\": 2, \"b\": 3}");
    assert_eq!(merged.inspect(), "{\"a\": 2, \"b\": 3}");
}

#[test]
fn binary_operator_table() {
    let cases = [
        ("[1] + [2, 3]", "[1, 2, 3]"),
        ("[1, 2] * 2", "[1, 2, 1, 2]"),
        ("2 * [0]", "[0, 0]"),
        ("[7] * 0", "[7]"),
        ("\"ab\" * 3", "\"ababab\""),
        ("3 * \"x\"", "\"xxx\""),
        ("\"ab\" * -2", "\"ab\""),
        ("\"foo\" + \"bar\"", "\"foobar\""),
        ("true || false", "true"),
        ("true && false", "false"),
        ("7 / 2", "3"),
        ("-7 % 3", "-1"),
        ("5 ^ 1", "4"),
        ("1 << 63", "-9223372036854775808"),
        ("-1 >> 64", "-1"),
        ("1 >> 64", "0"),
    ];

    for (source, expected) in cases {
        assert_eq!(eval_ok(source).inspect(), expected, "{}", source);
    }
}

#[test]
fn undocumented_pairings_are_errors() {
    for source in [
        "1 + true",
        "\"a\" - \"b\"",
        "[1] - [1]",
        "{} * 2",
        "1 || 2",
        "null + null",
        "\"a\" * \"b\"",
    ] {
        let err = runtime_error(source);
        assert!(
            matches!(err, RuntimeError::UnsupportedOperands { .. }),
            "{} gave {}",
            source,
            err
        );
    }

    assert_eq!(runtime_error("10 / 0"), RuntimeError::DivisionByZero);
    assert_eq!(runtime_error("10 >> -2"), RuntimeError::NegativeShift(-2));
}

#[test]
fn three_way_comparison() {
    let cases = [
        ("1 > \"a\"", false),
        ("\"a\" > 1", true),
        ("\"b\" > \"a\"", true),
        ("true > false", true),
        ("[1, 2] >= [1, 2]", true),
        ("[1] == [1, 2]", false),
        ("{\"a\": 1} == {\"a\": 1}", true),
        ("{\"a\": 1} == {\"a\": 2}", false),
        ("len == len", true),
        ("f := fn() { 1 }; g := fn() { 1 }; f == g", false),
        ("f := fn() { 1 }; f == f", true),
        ("null >= null", true),
    ];

    for (source, expected) in cases {
        assert_eq!(eval_ok(source), Value::Boolean(expected), "{}", source);
    }
}

#[test]
fn tail_recursion_completes() {
    let source = "
        countdown := fn(n) {
            if (n == 0) { return \"done\"; }
            return countdown(n - 1);
        };
        countdown(100000)
    ";
    assert_eq!(eval_ok(source), Value::string("done"));
}

#[test]
fn tail_call_with_accumulator() {
    let source = "
        sum := fn(n, acc) {
            if (n == 0) { return acc; }
            sum(n - 1, acc + n)
        };
        sum(100000, 0)
    ";
    assert_eq!(eval_ok(source), Value::Integer(5000050000));
}

#[test]
fn non_tail_recursion_overflows() {
    let source = "
        depth := fn(n) {
            if (n == 0) { return 0; }
            1 + depth(n - 1)
        };
        depth(100000)
    ";
    assert_eq!(runtime_error(source), RuntimeError::StackOverflow);
}

#[test]
fn copy_on_bind() {
    assert_eq!(eval_ok("a := 5; b := a; b = b + 1; a"), Value::Integer(5));
    assert_eq!(eval_ok("a := \"x\"; b := a; b = b + \"y\"; a"), Value::string("x"));
    assert_eq!(eval_ok("a := [1]; b := a; push(b, 2); a").inspect(), "[1, 2]");
    assert_eq!(
        eval_ok("a := {}; b := a; b[\"k\"] = 1; a[\"k\"]"),
        Value::Integer(1)
    );
}

#[test]
fn while_and_if_are_expressions() {
    assert_eq!(eval_ok("x := if (1 > 2) { 1 }; x"), Value::Null);
    assert_eq!(eval_ok("y := if (true) { 1 } else { 2 }; y"), Value::Integer(1));
    assert_eq!(eval_ok("i := 0; while (i < 3) { i = i + 1 }"), Value::Null);
}

#[test]
fn builtins_flow_errors_as_values() {
    assert_eq!(
        eval_ok("len(1, 2)"),
        Value::error("TypeError: len() takes exactly 1 argument (2 given)")
    );
    assert_eq!(eval_ok("min([3, 1, 2])"), Value::Integer(1));
    assert_eq!(eval_ok("max([3, 1, 2])"), Value::Integer(3));
    assert_eq!(eval_ok("sorted([3, 1, 2])").inspect(), "[1, 2, 3]");
}

#[test]
fn runtime_error_keeps_earlier_definitions() {
    let mut state = VmState::new();
    assert!(run(&mut state, "kept := 1; kept / 0").is_err());
    assert_eq!(run(&mut state, "kept").unwrap(), Value::Integer(1));
}

#[test]
fn compile_errors_run_nothing() {
    let mut state = VmState::new();
    let err = run(&mut state, "x := 1; undefined_name").unwrap_err();
    assert!(matches!(err, MonkeyError::Compile(_)));
    assert_eq!(err.exit_code(), 65);
    assert_eq!(state.global("x"), Some(Value::Null));
}
