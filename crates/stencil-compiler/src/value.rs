//! Runtime value representation
//!
//! Boxed values produced by the generic runtime library and stored in VM
//! reference slots.
//! - Int, Float, Bool, Null: immediate values
//! - Strings: reference-counted (Arc<str>), immutable
//! - Lists: copy-on-write (ValueList wrapping Arc<Vec<Value>>), value semantics
//! - Maps: copy-on-write, string-keyed, insertion-ordered (ValueMap)

use crate::span::Span;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Copy-on-write list. Cheap to clone (refcount bump).
/// Mutations on a shared list clone the inner Vec first (Arc::make_mut).
#[derive(Clone, Debug, Default)]
pub struct ValueList(Arc<Vec<Value>>);

impl ValueList {
    pub fn new() -> Self {
        ValueList(Arc::new(Vec::new()))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ValueList(Arc::new(Vec::with_capacity(capacity)))
    }

    pub fn from_vec(v: Vec<Value>) -> Self {
        ValueList(Arc::new(v))
    }

    /// Process-wide empty list; every call returns the same allocation
    pub fn shared_empty() -> Self {
        static EMPTY: OnceLock<ValueList> = OnceLock::new();
        EMPTY.get_or_init(ValueList::new).clone()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Mutable access; clones the backing storage if it is shared
    pub fn push(&mut self, value: Value) {
        Arc::make_mut(&mut self.0).push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// True when both lists share one allocation
    pub fn ptr_eq(&self, other: &ValueList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ValueList {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl From<Vec<Value>> for ValueList {
    fn from(v: Vec<Value>) -> Self {
        ValueList::from_vec(v)
    }
}

impl FromIterator<Value> for ValueList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        ValueList(Arc::new(iter.into_iter().collect()))
    }
}

#[derive(Clone, Debug, Default)]
struct MapEntries {
    entries: Vec<(Arc<str>, Value)>,
    index: HashMap<Arc<str>, usize>,
}

/// Copy-on-write string-keyed map that iterates in insertion order.
///
/// Re-inserting an existing key replaces its value and keeps its position.
#[derive(Clone, Debug, Default)]
pub struct ValueMap(Arc<MapEntries>);

impl ValueMap {
    pub fn new() -> Self {
        ValueMap(Arc::new(MapEntries::default()))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ValueMap(Arc::new(MapEntries {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }))
    }

    /// Process-wide empty map; every call returns the same allocation
    pub fn shared_empty() -> Self {
        static EMPTY: OnceLock<ValueMap> = OnceLock::new();
        EMPTY.get_or_init(ValueMap::new).clone()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.index.get(key).map(|&i| &self.0.entries[i].1)
    }

    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: Value) {
        let key = key.into();
        let inner = Arc::make_mut(&mut self.0);
        match inner.index.get(&key) {
            Some(&i) => inner.entries[i].1 = value,
            None => {
                inner.index.insert(key.clone(), inner.entries.len());
                inner.entries.push((key, value));
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.entries.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.entries.iter().map(|(k, _)| k.as_ref())
    }

    /// True when both maps share one allocation
    pub fn ptr_eq(&self, other: &ValueMap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ValueMap {
    /// Content equality; iteration order is not part of it
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<Arc<str>>> FromIterator<(K, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Boxed runtime value
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    List(ValueList),
    Map(ValueMap),
}

impl Value {
    /// Create a new string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Create a new list value
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(ValueList::from_vec(values))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Template truthiness: null, false, 0, 0.0, NaN and "" are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of Int and Float values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality; `Int(1)` and `Float(1.0)` are different values.
    /// Numeric cross-type equality lives in `runtime::generic_equals`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// Float formatting used for string coercion
///
/// Integral values print without a fraction, non-finite values print as
/// `NaN` / `Infinity` / `-Infinity`.
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        // covers -0.0
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => f.write_str(&format_float(*n)),
            Value::String(s) => f.write_str(s),
            Value::List(list) => {
                let elements: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Runtime error type with source span information
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// Operand of the wrong runtime type
    #[error("Type error: {msg}")]
    TypeError { msg: String, span: Span },
    /// Integer remainder by zero
    #[error("Division by zero")]
    DivideByZero { span: Span },
    /// Global not bound in the VM
    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String, span: Span },
    /// Native function not registered in the VM
    #[error("Unknown function: {name}")]
    UnknownFunction { name: String, span: Span },
    /// Wrong number of arguments to a native function
    #[error("{name} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },
    /// Unknown opcode (VM error)
    #[error("Unknown opcode")]
    UnknownOpcode { span: Span },
    /// Malformed operand such as an out-of-range constant index
    #[error("Invalid operand: {msg}")]
    InvalidOperand { msg: String, span: Span },
    /// Stack underflow (VM error)
    #[error("Stack underflow")]
    StackUnderflow { span: Span },
    /// Configured maximum stack depth exceeded
    #[error("Stack overflow: depth limit {limit} exceeded")]
    StackOverflow { limit: usize, span: Span },
    /// Program halted with other than exactly one value on the stack
    #[error("Stack imbalance: expected 1 value at halt, found {depth}")]
    StackImbalance { depth: usize, span: Span },
}

impl RuntimeError {
    /// Get the source span for this error
    pub fn span(&self) -> Span {
        match self {
            RuntimeError::TypeError { span, .. } => *span,
            RuntimeError::DivideByZero { span } => *span,
            RuntimeError::UndefinedVariable { span, .. } => *span,
            RuntimeError::UnknownFunction { span, .. } => *span,
            RuntimeError::ArityMismatch { span, .. } => *span,
            RuntimeError::UnknownOpcode { span } => *span,
            RuntimeError::InvalidOperand { span, .. } => *span,
            RuntimeError::StackUnderflow { span } => *span,
            RuntimeError::StackOverflow { span, .. } => *span,
            RuntimeError::StackImbalance { span, .. } => *span,
        }
    }

    pub(crate) fn type_error(msg: impl Into<String>, span: Span) -> Self {
        RuntimeError::TypeError {
            msg: msg.into(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Float(-0.0).to_string(), "0");
        assert_eq!(Value::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_display_collections() {
        let list = Value::list(vec![Value::Int(1), Value::string("a")]);
        assert_eq!(list.to_string(), "[1, a]");

        let map: ValueMap = vec![("b", Value::Int(2)), ("a", Value::Int(1))]
            .into_iter()
            .collect();
        assert_eq!(Value::Map(map).to_string(), "{b: 2, a: 1}");
    }

    #[test]
    fn test_shared_empty_collections() {
        assert!(ValueList::shared_empty().ptr_eq(&ValueList::shared_empty()));
        assert!(ValueMap::shared_empty().ptr_eq(&ValueMap::shared_empty()));

        let mut list = ValueList::shared_empty();
        list.push(Value::Int(1));
        assert!(ValueList::shared_empty().is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn test_list_copy_on_write() {
        let mut a = ValueList::from_vec(vec![Value::Int(1)]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));

        a.push(Value::Int(2));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let mut map = ValueMap::with_capacity(4);
        map.insert("z", Value::Int(1));
        map.insert("a", Value::Int(2));
        map.insert("m", Value::Int(3));
        map.insert("z", Value::Int(4));

        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(map.get("z"), Some(&Value::Int(4)));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a: ValueMap = vec![("x", Value::Int(1)), ("y", Value::Int(2))]
            .into_iter()
            .collect();
        let b: ValueMap = vec![("y", Value::Int(2)), ("x", Value::Int(1))]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_int_and_float_are_structurally_distinct() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }
}
