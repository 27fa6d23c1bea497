//! Operand stack slots

use crate::value::Value;

/// One operand stack entry
///
/// Unboxed slots mirror the compiler's `Repr::Int`, `Repr::Float` and
/// `Repr::Bool`; every other representation is a boxed `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Int(i64),
    Float(f64),
    Bool(bool),
    Ref(Value),
}

impl Slot {
    /// Box the slot's contents
    pub fn into_value(self) -> Value {
        match self {
            Slot::Int(n) => Value::Int(n),
            Slot::Float(f) => Value::Float(f),
            Slot::Bool(b) => Value::Bool(b),
            Slot::Ref(value) => value,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Slot::Int(_) => "int",
            Slot::Float(_) => "float",
            Slot::Bool(_) => "bool",
            Slot::Ref(value) => value.type_name(),
        }
    }
}
