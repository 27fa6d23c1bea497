//! Literal and collection-literal compilation

use super::CompileError;
use crate::ast::Literal;
use crate::bytecode::Opcode;
use crate::emitter::{Repr, TypedExpr};
use crate::span::Span;
use crate::types::Type;

/// Largest power of two a hash table can be sized to
const MAX_POWER_OF_TWO: usize = 1 << 30;

/// Initial capacity that lets a hash table hold `n` entries without growing
///
/// `n + 1` for `n < 3`, `ceil(n / 0.75) + 1` below the power-of-two ceiling,
/// otherwise the largest representable capacity.
pub fn hash_map_capacity(n: usize) -> u32 {
    if n < 3 {
        n as u32 + 1
    } else if n < MAX_POWER_OF_TWO {
        (n as f64 / 0.75).ceil() as u32 + 1
    } else {
        i32::MAX as u32
    }
}

pub(super) fn compile_literal(lit: &Literal, span: Span) -> TypedExpr {
    match lit {
        Literal::Null => TypedExpr::null(span),
        Literal::Bool(b) => TypedExpr::bool_const(*b, span),
        Literal::Int(i) => TypedExpr::int_const(*i, span),
        Literal::Float(f) => TypedExpr::float_const(*f, span),
        Literal::String(s) => TypedExpr::string_const(s.as_str(), span),
    }
}

/// `[a, b, c]`: elements are boxed and appended in source order
pub(super) fn compile_list(span: Span, elements: Vec<TypedExpr>) -> Result<TypedExpr, CompileError> {
    if elements.is_empty() {
        return Ok(TypedExpr::empty_list(span));
    }

    let capacity = u32::try_from(elements.len())
        .map_err(|_| CompileError::unsupported("list literal of this size", span))?;
    let constant = elements.iter().all(TypedExpr::is_constant);
    let elements: Vec<TypedExpr> = elements.into_iter().map(TypedExpr::into_boxed).collect();

    Ok(TypedExpr::new(Repr::List, Type::List, constant, span, move |asm| {
        asm.new_list(capacity);
        for element in elements {
            element.gen(asm);
            asm.emit(Opcode::ListAppend);
        }
    }))
}

/// `['k': v, ...]`: keys become strings, values are boxed, insertion in source order
pub(super) fn compile_map(
    span: Span,
    entries: Vec<(TypedExpr, TypedExpr)>,
) -> Result<TypedExpr, CompileError> {
    if entries.is_empty() {
        return Ok(TypedExpr::empty_map(span));
    }

    let capacity = hash_map_capacity(entries.len());
    let constant = entries
        .iter()
        .all(|(k, v)| k.is_constant() && v.is_constant());
    let entries: Vec<(TypedExpr, TypedExpr)> = entries
        .into_iter()
        .map(|(k, v)| (k.into_string(), v.into_boxed()))
        .collect();

    tracing::debug!(entries = entries.len(), capacity, "map literal");

    Ok(TypedExpr::new(Repr::Map, Type::Map, constant, span, move |asm| {
        asm.new_map(capacity);
        for (key, value) in entries {
            key.gen(asm);
            value.gen(asm);
            asm.emit(Opcode::MapPut);
        }
    }))
}
