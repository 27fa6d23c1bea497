//! Arithmetic specialization
//!
//! Priority per operator: both `Int` → integer opcode; both numeric → float
//! opcode; `+` with a string on either side → concatenation; otherwise the
//! boxed runtime function.

use super::{binary, classify, unary, Operand};
use crate::ast::BinaryOp;
use crate::bytecode::Opcode;
use crate::emitter::{Repr, TypedExpr};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::types::Type;

fn opcodes_for(op: BinaryOp) -> (Opcode, Opcode, RuntimeFn) {
    match op {
        BinaryOp::Sub => (Opcode::IntSub, Opcode::FloatSub, RuntimeFn::Minus),
        BinaryOp::Mul => (Opcode::IntMul, Opcode::FloatMul, RuntimeFn::Times),
        _ => (Opcode::IntAdd, Opcode::FloatAdd, RuntimeFn::Plus),
    }
}

/// `+`, `-`, `*`
pub(super) fn compile_arithmetic(
    op: BinaryOp,
    span: Span,
    left: TypedExpr,
    right: TypedExpr,
) -> TypedExpr {
    let (int_op, float_op, generic) = opcodes_for(op);

    match (classify(left.ty()), classify(right.ty())) {
        (Operand::Int, Operand::Int) => binary(
            Repr::Int,
            Type::Int,
            span,
            left.into_int(),
            right.into_int(),
            move |asm| asm.emit(int_op),
        ),
        (Operand::Int | Operand::Float, Operand::Int | Operand::Float) => binary(
            Repr::Float,
            Type::Float,
            span,
            left.into_float(),
            right.into_float(),
            move |asm| asm.emit(float_op),
        ),
        (Operand::Str, _) | (_, Operand::Str) if op == BinaryOp::Add => binary(
            Repr::String,
            Type::String,
            span,
            left.into_string(),
            right.into_string(),
            |asm| asm.invoke(RuntimeFn::StringConcat),
        ),
        (l, r) => {
            tracing::debug!(
                op = op.symbol(),
                left = ?l,
                right = ?r,
                "arithmetic falls back to runtime"
            );
            binary(
                Repr::Boxed,
                Type::Unknown,
                span,
                left.into_boxed(),
                right.into_boxed(),
                move |asm| asm.invoke(generic),
            )
        }
    }
}

/// `/` always divides as float
pub(super) fn compile_divide(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    binary(
        Repr::Float,
        Type::Float,
        span,
        left.into_float(),
        right.into_float(),
        |asm| asm.emit(Opcode::FloatDiv),
    )
}

/// `%` always takes the integer remainder
///
/// Operands are trusted to be ints; anything else fails when it is unboxed
/// at runtime.
pub(super) fn compile_remainder(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    if !(left.is_known_int() && right.is_known_int()) {
        tracing::debug!(
            left = %left.ty(),
            right = %right.ty(),
            "remainder on operands not known to be int"
        );
    }
    binary(
        Repr::Int,
        Type::Int,
        span,
        left.into_int(),
        right.into_int(),
        |asm| asm.emit(Opcode::IntRem),
    )
}

/// Unary `-`
pub(super) fn compile_negate(span: Span, operand: TypedExpr) -> TypedExpr {
    match classify(operand.ty()) {
        Operand::Int => unary(Repr::Int, Type::Int, span, operand.into_int(), |asm| {
            asm.emit(Opcode::IntNeg)
        }),
        Operand::Float => unary(
            Repr::Float,
            Type::Float,
            span,
            operand.into_float(),
            |asm| asm.emit(Opcode::FloatNeg),
        ),
        Operand::Str | Operand::Dynamic => unary(
            Repr::Boxed,
            Type::Unknown,
            span,
            operand.into_boxed(),
            |asm| asm.invoke(RuntimeFn::Negate),
        ),
    }
}
