//! Relational operators and equality

use super::{binary, classify, unary, Operand};
use crate::ast::BinaryOp;
use crate::bytecode::Opcode;
use crate::emitter::{Repr, TypedExpr};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::types::Type;

/// `<`, `<=`, `>`, `>=`
///
/// The runtime library only orders with `lessThan` / `lessThanOrEqual`, so
/// the generic `a > b` is `lessThan(b, a)` with `b` evaluated first.
pub(super) fn compile_relational(
    op: BinaryOp,
    span: Span,
    left: TypedExpr,
    right: TypedExpr,
) -> TypedExpr {
    let (int_op, float_op) = match op {
        BinaryOp::Lt => (Opcode::IntLt, Opcode::FloatLt),
        BinaryOp::Le => (Opcode::IntLe, Opcode::FloatLe),
        BinaryOp::Gt => (Opcode::IntGt, Opcode::FloatGt),
        _ => (Opcode::IntGe, Opcode::FloatGe),
    };

    match (classify(left.ty()), classify(right.ty())) {
        (Operand::Int, Operand::Int) => binary(
            Repr::Bool,
            Type::Bool,
            span,
            left.into_int(),
            right.into_int(),
            move |asm| asm.emit(int_op),
        ),
        (Operand::Int | Operand::Float, Operand::Int | Operand::Float) => binary(
            Repr::Bool,
            Type::Bool,
            span,
            left.into_float(),
            right.into_float(),
            move |asm| asm.emit(float_op),
        ),
        _ => {
            let (first, second, func) = match op {
                BinaryOp::Lt => (left, right, RuntimeFn::LessThan),
                BinaryOp::Le => (left, right, RuntimeFn::LessThanOrEqual),
                BinaryOp::Gt => (right, left, RuntimeFn::LessThan),
                _ => (right, left, RuntimeFn::LessThanOrEqual),
            };
            tracing::debug!(op = op.symbol(), runtime = func.name(), "generic comparison");
            binary(
                Repr::Bool,
                Type::Bool,
                span,
                first.into_boxed(),
                second.into_boxed(),
                move |asm| asm.invoke(func),
            )
        }
    }
}

/// `==`
///
/// A statically known string operand is emitted first and compared as a
/// string, as a number, or generically depending on the other side.
pub(super) fn compile_equality(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    if left.is_known_string() || right.is_known_string() {
        let (string, other) = if left.is_known_string() {
            (left, right)
        } else {
            (right, left)
        };
        let string = string.into_string();

        return match classify(other.ty()) {
            Operand::Str => binary(
                Repr::Bool,
                Type::Bool,
                span,
                string,
                other.into_string(),
                |asm| asm.invoke(RuntimeFn::StringEquals),
            ),
            Operand::Int | Operand::Float => binary(
                Repr::Bool,
                Type::Bool,
                span,
                string,
                other.into_float(),
                |asm| asm.invoke(RuntimeFn::StringEqualsAsNumber),
            ),
            Operand::Dynamic => binary(
                Repr::Bool,
                Type::Bool,
                span,
                string,
                other.into_boxed(),
                |asm| asm.invoke(RuntimeFn::GenericEquals),
            ),
        };
    }

    match (classify(left.ty()), classify(right.ty())) {
        (Operand::Int, Operand::Int) => binary(
            Repr::Bool,
            Type::Bool,
            span,
            left.into_int(),
            right.into_int(),
            |asm| asm.emit(Opcode::IntEq),
        ),
        (Operand::Int | Operand::Float, Operand::Int | Operand::Float) => binary(
            Repr::Bool,
            Type::Bool,
            span,
            left.into_float(),
            right.into_float(),
            |asm| asm.emit(Opcode::FloatEq),
        ),
        _ => binary(
            Repr::Bool,
            Type::Bool,
            span,
            left.into_boxed(),
            right.into_boxed(),
            |asm| asm.invoke(RuntimeFn::GenericEquals),
        ),
    }
}

/// `!=` is the complement of `==`
pub(super) fn compile_not_equal(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    let equal = compile_equality(span, left, right);
    unary(Repr::Bool, Type::Bool, span, equal, |asm| asm.emit(Opcode::Not))
}
