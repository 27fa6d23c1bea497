//! End-to-end expression semantics: compile, run on the VM, check the value

mod common;

use common::*;
use common::assert_eq;
use rstest::rstest;
use stencil_compiler::{
    hash_map_capacity, BinaryOp, Expr, Repr, RuntimeError, Type, UnaryOp, Value, ValueMap,
};

fn value_of(expr: Expr) -> Value {
    run_expr(expr).expect("expression should run")
}

// ============================================================================
// Arithmetic
// ============================================================================

#[rstest]
#[case::int_precedence(binary(BinaryOp::Add, int(1), binary(BinaryOp::Mul, int(2), int(3))), Value::Int(7))]
#[case::division_is_float(binary(BinaryOp::Div, int(7), int(2)), Value::Float(3.5))]
#[case::remainder_is_int(binary(BinaryOp::Mod, int(7), int(2)), Value::Int(1))]
#[case::remainder_sign_follows_dividend(binary(BinaryOp::Mod, int(-7), int(3)), Value::Int(-1))]
#[case::mixed_widen(binary(BinaryOp::Add, int(1), float(2.5)), Value::Float(3.5))]
#[case::int_wraps(binary(BinaryOp::Add, int(i64::MAX), int(1)), Value::Int(i64::MIN))]
#[case::negate_float(unary(UnaryOp::Negate, float(2.5)), Value::Float(-2.5))]
#[case::negate_int(unary(UnaryOp::Negate, int(4)), Value::Int(-4))]
fn test_arithmetic(#[case] expr: Expr, #[case] expected: Value) {
    assert_eq!(value_of(expr), expected);
}

#[test]
fn test_division_compiles_to_float_tag() {
    let program = compile(binary(BinaryOp::Div, int(7), int(2)));
    assert_eq!(program.repr, Repr::Float);
    assert!(program.constant);
}

#[test]
fn test_remainder_compiles_to_int_tag() {
    let program = compile(binary(BinaryOp::Mod, int(7), int(2)));
    assert_eq!(program.repr, Repr::Int);
}

#[rstest]
#[case::int_left(binary(BinaryOp::Add, int(1), string("a")), "1a")]
#[case::float_right(binary(BinaryOp::Add, string("n="), float(2.0)), "n=2")]
#[case::fraction(binary(BinaryOp::Add, string("n="), float(0.5)), "n=0.5")]
#[case::bool_left(binary(BinaryOp::Add, boolean(true), string("x")), "truex")]
#[case::null_left(binary(BinaryOp::Add, null(), string("x")), "nullx")]
#[case::list_right(binary(BinaryOp::Add, string("l="), list(vec![int(1), int(2)])), "l=[1, 2]")]
fn test_string_concatenation(#[case] expr: Expr, #[case] expected: &str) {
    assert_eq!(value_of(expr), Value::string(expected));
}

// ============================================================================
// Equality and comparison
// ============================================================================

#[rstest]
#[case::string_number(binary(BinaryOp::Eq, string("5"), int(5)), true)]
#[case::number_string(binary(BinaryOp::Eq, int(5), string("5")), true)]
#[case::unparseable(binary(BinaryOp::Eq, string("abc"), int(5)), false)]
#[case::trimmed(binary(BinaryOp::Eq, string(" 5 "), int(5)), true)]
#[case::fraction(binary(BinaryOp::Eq, string("1.0"), int(1)), true)]
#[case::strings(binary(BinaryOp::Eq, string("a"), string("a")), true)]
#[case::int_float(binary(BinaryOp::Eq, int(1), float(1.0)), true)]
#[case::nulls(binary(BinaryOp::Eq, null(), null()), true)]
#[case::null_zero(binary(BinaryOp::Eq, null(), int(0)), false)]
#[case::bools(binary(BinaryOp::Eq, boolean(true), boolean(true)), true)]
#[case::not_equal(binary(BinaryOp::Ne, string("5"), int(5)), false)]
#[case::int_lt(binary(BinaryOp::Lt, int(2), int(3)), true)]
#[case::float_ge(binary(BinaryOp::Ge, float(2.5), int(3)), false)]
#[case::string_lt(binary(BinaryOp::Lt, string("a"), string("b")), true)]
#[case::string_gt(binary(BinaryOp::Gt, string("b"), string("a")), true)]
#[case::string_le(binary(BinaryOp::Le, string("b"), string("a")), false)]
#[case::nan_never_equal(binary(BinaryOp::Eq, float(f64::NAN), float(f64::NAN)), false)]
fn test_equality_and_comparison(#[case] expr: Expr, #[case] expected: bool) {
    assert_eq!(value_of(expr), Value::Bool(expected));
}

#[rstest]
fn test_comparison_reversal(
    #[values(Value::Int(1), Value::Int(2), Value::Float(1.5), Value::Float(f64::NAN))] a: Value,
    #[values(Value::Int(1), Value::Float(2.0), Value::Float(1.5))] b: Value,
) {
    let bind = |vm: &mut stencil_compiler::VM| {
        vm.set_global("a", a.clone());
        vm.set_global("b", b.clone());
    };
    let greater = run_with(
        binary(BinaryOp::Gt, var("a", Type::Unknown), var("b", Type::Unknown)),
        bind,
    );
    let bind = |vm: &mut stencil_compiler::VM| {
        vm.set_global("a", a.clone());
        vm.set_global("b", b.clone());
    };
    let less = run_with(
        binary(BinaryOp::Lt, var("b", Type::Unknown), var("a", Type::Unknown)),
        bind,
    );
    assert_eq!(greater, less);
}

#[test]
fn test_greater_or_equal_reversal_on_strings() {
    for (a, b) in [("a", "b"), ("b", "a"), ("a", "a")] {
        let ge = value_of(binary(BinaryOp::Ge, string(a), string(b)));
        let le = value_of(binary(BinaryOp::Le, string(b), string(a)));
        assert_eq!(ge, le, "{} >= {}", a, b);
    }
}

// ============================================================================
// Boolean and conditional
// ============================================================================

#[rstest]
#[case::not_zero(unary(UnaryOp::Not, int(0)), Value::Bool(true))]
#[case::not_empty_string(unary(UnaryOp::Not, string("")), Value::Bool(true))]
#[case::not_string(unary(UnaryOp::Not, string("x")), Value::Bool(false))]
#[case::and(binary(BinaryOp::And, boolean(true), int(0)), Value::Bool(false))]
#[case::or(binary(BinaryOp::Or, null(), string("x")), Value::Bool(true))]
#[case::int_branches(conditional(boolean(true), int(1), int(2)), Value::Int(1))]
#[case::widened_else(conditional(boolean(false), int(1), float(2.5)), Value::Float(2.5))]
#[case::widened_then(conditional(boolean(true), int(1), float(2.5)), Value::Float(1.0))]
#[case::boxed_branches(conditional(boolean(false), string("a"), int(3)), Value::Int(3))]
#[case::truthy_int_condition(conditional(int(0), string("a"), string("b")), Value::string("b"))]
#[case::coalesce_null(binary(BinaryOp::NullCoalesce, null(), int(5)), Value::Int(5))]
#[case::coalesce_value(binary(BinaryOp::NullCoalesce, int(3), int(5)), Value::Int(3))]
#[case::coalesce_false_is_kept(binary(BinaryOp::NullCoalesce, boolean(false), int(5)), Value::Bool(false))]
fn test_logic(#[case] expr: Expr, #[case] expected: Value) {
    assert_eq!(value_of(expr), expected);
}

// ============================================================================
// Collections
// ============================================================================

#[test]
fn test_list_literal() {
    let value = value_of(list(vec![int(1), string("a"), list(vec![boolean(true)])]));
    assert_eq!(
        value,
        Value::list(vec![
            Value::Int(1),
            Value::string("a"),
            Value::list(vec![Value::Bool(true)])
        ])
    );
}

#[test]
fn test_map_literal_stringifies_keys_in_order() {
    let value = value_of(map(vec![
        (string("a"), int(1)),
        (int(2), boolean(true)),
        (string("a"), float(0.5)),
    ]));
    let entries = match value {
        Value::Map(entries) => entries,
        other => panic!("expected a map, got {:?}", other),
    };
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a", "2"]);
    assert_eq!(entries.get("a"), Some(&Value::Float(0.5)));
    assert_eq!(entries.get("2"), Some(&Value::Bool(true)));
}

#[test]
fn test_empty_literals_are_shared_constants() {
    let first = compile(list(vec![]));
    let second = compile(list(vec![]));
    for program in [&first, &second] {
        assert_eq!(program.repr, Repr::Boxed);
        assert_eq!(program.ty, Type::List);
        assert!(program.constant);
    }

    let a = stencil_compiler::VM::new(first.bytecode).run().unwrap();
    let b = stencil_compiler::VM::new(second.bytecode).run().unwrap();
    assert_eq!(a, b);
    assert_eq!(a, Value::list(vec![]));

    assert_eq!(value_of(map(vec![])), Value::Map(ValueMap::new()));
}

#[test]
fn test_map_capacity_formula() {
    let capacities: Vec<u32> = [0, 1, 2, 3, 10].into_iter().map(hash_map_capacity).collect();
    assert_eq!(capacities, vec![1, 2, 3, 5, 15]);
}

#[test]
fn test_item_and_field_access() {
    let numbers = list(vec![int(10), int(20)]);
    assert_eq!(value_of(item(numbers.clone(), int(1), Type::Int)), Value::Int(20));
    assert_eq!(value_of(item(numbers, int(5), Type::Int)), Value::Null);

    let record = map(vec![(string("k"), string("v"))]);
    assert_eq!(value_of(field(record, "k", Type::String)), Value::string("v"));
}

#[test]
fn test_item_access_result_specializes_through_unbox() {
    let numbers = list(vec![int(10), int(20)]);
    let sum = binary(BinaryOp::Add, item(numbers, int(0), Type::Int), int(1));
    let program = compile(sum.clone());
    assert_eq!(program.repr, Repr::Int);
    assert_eq!(value_of(sum), Value::Int(11));
}

// ============================================================================
// Runtime failures
// ============================================================================

#[test]
fn test_remainder_by_zero() {
    let err = run_expr(binary(BinaryOp::Mod, int(5), int(0))).unwrap_err();
    assert!(matches!(err, RuntimeError::DivideByZero { .. }));
}

#[test]
fn test_remainder_on_float_fails_when_unboxed() {
    let err = run_with(
        binary(BinaryOp::Mod, var("x", Type::Float), int(2)),
        |vm| vm.set_global("x", Value::Float(2.5)),
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::TypeError { .. }));
}

#[rstest]
#[case::minus_string(binary(BinaryOp::Sub, string("a"), int(1)))]
#[case::compare_string_number(binary(BinaryOp::Lt, string("a"), int(1)))]
#[case::negate_string(unary(UnaryOp::Negate, string("x")))]
fn test_generic_type_errors(#[case] expr: Expr) {
    let err = run_expr(expr).unwrap_err();
    assert!(matches!(err, RuntimeError::TypeError { .. }), "got {:?}", err);
}
