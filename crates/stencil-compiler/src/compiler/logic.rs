//! Boolean operators, null-coalescing and the conditional operator
//!
//! `and`, `or`, `?:` and `cond ? a : b` are the only constructs that branch.
//! Each evaluates its right-hand side (or the untaken branch) at most once
//! and never when the short-circuit already decides the result.

use super::unary;
use crate::bytecode::Opcode;
use crate::emitter::{Repr, TypedExpr};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::types::Type;

/// `a and b`
pub(super) fn compile_and(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    short_circuit(span, left, right, false)
}

/// `a or b`
pub(super) fn compile_or(span: Span, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    short_circuit(span, left, right, true)
}

/// Shared shape of `and` / `or`: when `left` is `decided` the result is
/// `decided` and `right` is skipped
fn short_circuit(span: Span, left: TypedExpr, right: TypedExpr, decided: bool) -> TypedExpr {
    let constant = left.is_constant() && right.is_constant();
    let left = left.into_bool();
    let right = right.into_bool();

    TypedExpr::new(Repr::Bool, Type::Bool, constant, span, move |asm| {
        let short = asm.new_label();
        let end = asm.new_label();

        left.gen(asm);
        if decided {
            asm.jump_if_true(short);
        } else {
            asm.jump_if_false(short);
        }
        right.gen(asm);
        asm.jump(end);

        asm.mark(short);
        asm.push_bool(decided);
        asm.mark(end);
    })
}

/// `not a`
pub(super) fn compile_not(span: Span, operand: TypedExpr) -> TypedExpr {
    unary(Repr::Bool, Type::Bool, span, operand.into_bool(), |asm| {
        asm.emit(Opcode::Not)
    })
}

/// `a ?: b` yields `a` unless it is null
///
/// `a` is evaluated once and kept on the stack for the null test.
pub(super) fn compile_null_coalesce(
    ty: Type,
    span: Span,
    left: TypedExpr,
    right: TypedExpr,
) -> TypedExpr {
    let constant = left.is_constant() && right.is_constant();
    let left = left.into_boxed();
    let right = right.into_boxed();

    TypedExpr::new(Repr::Boxed, ty, constant, span, move |asm| {
        let end = asm.new_label();

        left.gen(asm);
        asm.emit(Opcode::Dup);
        asm.invoke(RuntimeFn::IsNull);
        asm.jump_if_false(end);
        asm.emit(Opcode::Pop);
        right.gen(asm);
        asm.mark(end);
    })
}

/// `cond ? a : b`
///
/// Both branches are converted to a common representation: unboxed when
/// their static types agree on one, boxed otherwise.
pub(super) fn compile_conditional(
    ty: Type,
    span: Span,
    condition: TypedExpr,
    then_branch: TypedExpr,
    else_branch: TypedExpr,
) -> TypedExpr {
    let constant =
        condition.is_constant() && then_branch.is_constant() && else_branch.is_constant();

    let target = if then_branch.is_known_int() && else_branch.is_known_int() {
        Repr::Int
    } else if then_branch.is_known_number() && else_branch.is_known_number() {
        Repr::Float
    } else if then_branch.is_known_string() && else_branch.is_known_string() {
        Repr::String
    } else {
        Repr::Boxed
    };

    let condition = condition.into_bool();
    let then_branch = then_branch.convert(target);
    let else_branch = else_branch.convert(target);

    TypedExpr::new(target, ty, constant, span, move |asm| {
        let otherwise = asm.new_label();
        let end = asm.new_label();

        condition.gen(asm);
        asm.jump_if_false(otherwise);
        then_branch.gen(asm);
        asm.jump(end);

        asm.mark(otherwise);
        else_branch.gen(asm);
        asm.mark(end);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{opcodes, validate, Assembler};
    use pretty_assertions::assert_eq;

    fn ops(expr: TypedExpr) -> Vec<Opcode> {
        let mut asm = Assembler::new();
        expr.gen(&mut asm);
        let bytecode = asm.finish().unwrap();
        assert!(validate(&bytecode).is_ok());
        opcodes(&bytecode)
    }

    fn global(name: &'static str, ty: Type) -> TypedExpr {
        TypedExpr::new(Repr::Boxed, ty, false, Span::dummy(), move |asm| {
            asm.get_global(name)
        })
    }

    #[test]
    fn test_and_layout() {
        let s = Span::dummy();
        let expr = compile_and(s, TypedExpr::bool_const(true, s), TypedExpr::int_const(1, s));
        assert_eq!(expr.repr(), Repr::Bool);
        assert!(expr.is_constant());
        assert_eq!(
            ops(expr),
            vec![
                Opcode::True,
                Opcode::JumpIfFalse,
                Opcode::ConstInt,
                Opcode::IntToBool,
                Opcode::Jump,
                Opcode::False,
                Opcode::Halt
            ]
        );
    }

    #[test]
    fn test_or_pushes_true_on_short_circuit() {
        let s = Span::dummy();
        let expr = compile_or(s, global("a", Type::Bool), global("b", Type::Bool));
        assert!(!expr.is_constant());
        let ops = ops(expr);
        assert_eq!(ops[2], Opcode::JumpIfTrue);
        assert_eq!(ops[ops.len() - 2], Opcode::True);
    }

    #[test]
    fn test_not_converts_to_bool() {
        let s = Span::dummy();
        assert_eq!(
            ops(compile_not(s, TypedExpr::float_const(0.0, s))),
            vec![Opcode::ConstFloat, Opcode::FloatToBool, Opcode::Not, Opcode::Halt]
        );
    }

    #[test]
    fn test_null_coalesce_layout() {
        let s = Span::dummy();
        let expr = compile_null_coalesce(
            Type::Int,
            s,
            global("a", Type::Int),
            TypedExpr::int_const(0, s),
        );
        assert_eq!(expr.repr(), Repr::Boxed);
        assert_eq!(expr.ty(), Type::Int);
        assert!(!expr.is_constant());
        assert_eq!(
            ops(expr),
            vec![
                Opcode::GetGlobal,
                Opcode::Dup,
                Opcode::Invoke,
                Opcode::JumpIfFalse,
                Opcode::Pop,
                Opcode::ConstInt,
                Opcode::BoxInt,
                Opcode::Halt
            ]
        );
    }

    #[test]
    fn test_conditional_common_representation() {
        let s = Span::dummy();
        let ints = compile_conditional(
            Type::Int,
            s,
            TypedExpr::bool_const(true, s),
            TypedExpr::int_const(1, s),
            TypedExpr::int_const(2, s),
        );
        assert_eq!(ints.repr(), Repr::Int);
        assert!(ints.is_constant());

        let mixed = compile_conditional(
            Type::Float,
            s,
            TypedExpr::bool_const(true, s),
            TypedExpr::int_const(1, s),
            TypedExpr::float_const(2.5, s),
        );
        assert_eq!(mixed.repr(), Repr::Float);

        let boxed = compile_conditional(
            Type::Unknown,
            s,
            global("c", Type::Bool),
            TypedExpr::string_const("a", s),
            TypedExpr::int_const(2, s),
        );
        assert_eq!(boxed.repr(), Repr::Boxed);
        assert!(!boxed.is_constant());
        assert_eq!(
            ops(boxed),
            vec![
                Opcode::GetGlobal,
                Opcode::Invoke,
                Opcode::JumpIfFalse,
                Opcode::Constant,
                Opcode::Jump,
                Opcode::ConstInt,
                Opcode::BoxInt,
                Opcode::Halt
            ]
        );
    }
}
