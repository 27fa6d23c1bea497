//! Generic runtime library
//!
//! Boxed implementations of equality, ordering, arithmetic and string
//! coercion. Compiled code calls into these (via `Opcode::Invoke`) whenever
//! the static operand types do not allow a specialized opcode.

use crate::span::Span;
use crate::value::{RuntimeError, Value};
use std::cmp::Ordering;

/// Runtime library function id, encoded as the `u8` operand of `Invoke`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    // ===== Equality =====
    GenericEquals = 0x00,
    StringEquals = 0x01,
    StringEqualsAsNumber = 0x02,

    // ===== Ordering =====
    LessThan = 0x10,
    LessThanOrEqual = 0x11,

    // ===== Arithmetic =====
    Plus = 0x20,
    Minus = 0x21,
    Times = 0x22,
    Negate = 0x23,

    // ===== Strings and coercion =====
    StringConcat = 0x30,
    CoerceToString = 0x31,
    Truthy = 0x32,
    IsNull = 0x33,

    // ===== Collections =====
    GetItem = 0x40,
}

impl TryFrom<u8> for RuntimeFn {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(RuntimeFn::GenericEquals),
            0x01 => Ok(RuntimeFn::StringEquals),
            0x02 => Ok(RuntimeFn::StringEqualsAsNumber),
            0x10 => Ok(RuntimeFn::LessThan),
            0x11 => Ok(RuntimeFn::LessThanOrEqual),
            0x20 => Ok(RuntimeFn::Plus),
            0x21 => Ok(RuntimeFn::Minus),
            0x22 => Ok(RuntimeFn::Times),
            0x23 => Ok(RuntimeFn::Negate),
            0x30 => Ok(RuntimeFn::StringConcat),
            0x31 => Ok(RuntimeFn::CoerceToString),
            0x32 => Ok(RuntimeFn::Truthy),
            0x33 => Ok(RuntimeFn::IsNull),
            0x40 => Ok(RuntimeFn::GetItem),
            _ => Err(()),
        }
    }
}

impl RuntimeFn {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::GenericEquals => "genericEquals",
            RuntimeFn::StringEquals => "stringEquals",
            RuntimeFn::StringEqualsAsNumber => "stringEqualsAsNumber",
            RuntimeFn::LessThan => "lessThan",
            RuntimeFn::LessThanOrEqual => "lessThanOrEqual",
            RuntimeFn::Plus => "plus",
            RuntimeFn::Minus => "minus",
            RuntimeFn::Times => "times",
            RuntimeFn::Negate => "negate",
            RuntimeFn::StringConcat => "stringConcat",
            RuntimeFn::CoerceToString => "coerceToString",
            RuntimeFn::Truthy => "truthy",
            RuntimeFn::IsNull => "isNull",
            RuntimeFn::GetItem => "getItem",
        }
    }

    /// Number of stack operands consumed
    pub fn arity(self) -> usize {
        match self {
            RuntimeFn::Negate
            | RuntimeFn::CoerceToString
            | RuntimeFn::Truthy
            | RuntimeFn::IsNull => 1,
            _ => 2,
        }
    }

    /// Whether the result is pushed as an unboxed bool
    pub fn returns_bool(self) -> bool {
        matches!(
            self,
            RuntimeFn::GenericEquals
                | RuntimeFn::StringEquals
                | RuntimeFn::StringEqualsAsNumber
                | RuntimeFn::LessThan
                | RuntimeFn::LessThanOrEqual
                | RuntimeFn::Truthy
                | RuntimeFn::IsNull
        )
    }

    /// Apply the function to `arity()` arguments
    pub fn call(self, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
        if args.len() != self.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: self.name().to_string(),
                expected: self.arity(),
                got: args.len(),
                span,
            });
        }

        let result = match self {
            RuntimeFn::GenericEquals => Value::Bool(generic_equals(&args[0], &args[1])),
            RuntimeFn::StringEquals => Value::Bool(coerce_to_string(&args[0]) == coerce_to_string(&args[1])),
            RuntimeFn::StringEqualsAsNumber => {
                let n = args[1].as_f64().ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("expected number, found {}", args[1].type_name()),
                        span,
                    )
                })?;
                Value::Bool(string_equals_as_number(&coerce_to_string(&args[0]), n))
            }
            RuntimeFn::LessThan => Value::Bool(less_than(&args[0], &args[1], span)?),
            RuntimeFn::LessThanOrEqual => {
                Value::Bool(less_than_or_equal(&args[0], &args[1], span)?)
            }
            RuntimeFn::Plus => plus(&args[0], &args[1]),
            RuntimeFn::Minus => minus(&args[0], &args[1], span)?,
            RuntimeFn::Times => times(&args[0], &args[1], span)?,
            RuntimeFn::Negate => negate(&args[0], span)?,
            RuntimeFn::StringConcat => Value::string(format!("{}{}", args[0], args[1])),
            RuntimeFn::CoerceToString => Value::string(coerce_to_string(&args[0])),
            RuntimeFn::Truthy => Value::Bool(args[0].is_truthy()),
            RuntimeFn::IsNull => Value::Bool(args[0].is_null()),
            RuntimeFn::GetItem => get_item(&args[0], &args[1], span)?,
        };
        Ok(result)
    }
}

/// String form of any value
pub fn coerce_to_string(value: &Value) -> String {
    value.to_string()
}

/// Dynamic `==`
///
/// A string compared with a number is parsed as a number; numbers compare
/// numerically across Int and Float; everything else compares structurally.
pub fn generic_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::String(s), other) | (other, Value::String(s)) => match other.as_f64() {
            Some(n) => string_equals_as_number(s, n),
            None => false,
        },
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64() == b.as_f64()
        }
        _ => a == b,
    }
}

/// Compare a string with a number by parsing the (trimmed) string
///
/// Unparseable strings are never equal to any number.
pub fn string_equals_as_number(s: &str, n: f64) -> bool {
    match s.trim().parse::<f64>() {
        Ok(parsed) => parsed == n,
        Err(_) => false,
    }
}

fn compare(a: &Value, b: &Value, span: Span) -> Result<Option<Ordering>, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y)),
            _ => Err(RuntimeError::type_error(
                format!("cannot compare {} with {}", a.type_name(), b.type_name()),
                span,
            )),
        },
    }
}

/// Dynamic `<`; NaN compares false
pub fn less_than(a: &Value, b: &Value, span: Span) -> Result<bool, RuntimeError> {
    Ok(compare(a, b, span)? == Some(Ordering::Less))
}

/// Dynamic `<=`; NaN compares false
pub fn less_than_or_equal(a: &Value, b: &Value, span: Span) -> Result<bool, RuntimeError> {
    Ok(matches!(
        compare(a, b, span)?,
        Some(Ordering::Less | Ordering::Equal)
    ))
}

/// Dynamic `+`; falls back to string concatenation for non-numbers
pub fn plus(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(*y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::Float(x + y),
            _ => Value::string(format!("{}{}", a, b)),
        },
    }
}

fn numeric_op(
    a: &Value,
    b: &Value,
    op: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
    span: Span,
) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(*x, *y))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(RuntimeError::type_error(
                format!(
                    "'{}' requires numbers, found {} and {}",
                    op,
                    a.type_name(),
                    b.type_name()
                ),
                span,
            )),
        },
    }
}

/// Dynamic `-`
pub fn minus(a: &Value, b: &Value, span: Span) -> Result<Value, RuntimeError> {
    numeric_op(a, b, "-", i64::wrapping_sub, |x, y| x - y, span)
}

/// Dynamic `*`
pub fn times(a: &Value, b: &Value, span: Span) -> Result<Value, RuntimeError> {
    numeric_op(a, b, "*", i64::wrapping_mul, |x, y| x * y, span)
}

/// Dynamic unary `-`
pub fn negate(a: &Value, span: Span) -> Result<Value, RuntimeError> {
    match a {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(RuntimeError::type_error(
            format!("cannot negate {}", other.type_name()),
            span,
        )),
    }
}

/// `base[key]` lookup; missing entries and null bases yield null
pub fn get_item(base: &Value, key: &Value, span: Span) -> Result<Value, RuntimeError> {
    match (base, key) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(list), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| list.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::List(_), other) => Err(RuntimeError::type_error(
            format!("list index must be int, found {}", other.type_name()),
            span,
        )),
        (Value::Map(map), key) => {
            let key = coerce_to_string(key);
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        (other, _) => Err(RuntimeError::type_error(
            format!("cannot index into {}", other.type_name()),
            span,
        )),
    }
}
