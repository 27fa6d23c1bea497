//! Static types assigned by the type checker

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved static type of an expression node
///
/// The expression compiler trusts this annotation and never re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Null,
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit IEEE float
    Float,
    String,
    List,
    Map,
    /// Not statically known; values are handled through the runtime library
    Unknown,
}

impl Type {
    /// `Int` or `Float`
    pub fn is_number(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Null => "null",
            Type::Bool => "bool",
            Type::Int => "int",
            Type::Float => "float",
            Type::String => "string",
            Type::List => "list",
            Type::Map => "map",
            Type::Unknown => "?",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
