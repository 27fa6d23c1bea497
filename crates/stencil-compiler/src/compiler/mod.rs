//! Typed expression compiler
//!
//! Translates a type-checked expression tree into a `TypedExpr`. Operators
//! pick a specialized instruction sequence from the static types of their
//! operands and fall back to the generic runtime library otherwise.
//! - literals and collection literals: `literals.rs`
//! - `+ - * / %` and unary minus: `arithmetic.rs`
//! - relational operators and equality: `comparison.rs`
//! - `and`, `or`, `not`, `?:` and the conditional operator: `logic.rs`
//!
//! The compiler holds no mutable state, so one instance can compile
//! independent trees from several threads at once.

mod arithmetic;
mod comparison;
mod literals;
mod logic;

pub use literals::hash_map_capacity;

use crate::ast::{BinaryOp, Expr, ExprRoot, UnaryExpr, UnaryOp};
use crate::bytecode::{validate, AssembleError, Assembler, Bytecode, ValidationError};
use crate::emitter::{Repr, TypedExpr};
use crate::environment::{Environment, NoEnvironment};
use crate::options::CompileOptions;
use crate::span::Span;
use crate::types::Type;
use thiserror::Error;

/// Compilation failure; aborts the enclosing unit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Node kind with no compilation rule in the current environment
    #[error("unsupported {construct} at {span}")]
    Unsupported { construct: String, span: Span },
    /// The emitted code broke an assembler invariant (a compiler defect)
    #[error("assembly failed: {}", join(.0))]
    Assemble(Vec<AssembleError>),
    /// The finished bytecode failed validation (a compiler defect)
    #[error("invalid bytecode: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

impl CompileError {
    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        CompileError::Unsupported {
            construct: construct.into(),
            span,
        }
    }
}

fn join<T: std::fmt::Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Operand class used by the specialization tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    Int,
    Float,
    Str,
    Dynamic,
}

pub(crate) fn classify(ty: Type) -> Operand {
    match ty {
        Type::Int => Operand::Int,
        Type::Float => Operand::Float,
        Type::String => Operand::Str,
        Type::Null | Type::Bool | Type::List | Type::Map | Type::Unknown => Operand::Dynamic,
    }
}

/// Emit `left`, then `right`, then `tail`
pub(crate) fn binary(
    repr: Repr,
    ty: Type,
    span: Span,
    left: TypedExpr,
    right: TypedExpr,
    tail: impl FnOnce(&mut Assembler) + Send + 'static,
) -> TypedExpr {
    let constant = left.is_constant() && right.is_constant();
    TypedExpr::new(repr, ty, constant, span, move |asm| {
        left.gen(asm);
        right.gen(asm);
        tail(asm);
    })
}

/// Emit `operand`, then `tail`
pub(crate) fn unary(
    repr: Repr,
    ty: Type,
    span: Span,
    operand: TypedExpr,
    tail: impl FnOnce(&mut Assembler) + Send + 'static,
) -> TypedExpr {
    let constant = operand.is_constant();
    TypedExpr::new(repr, ty, constant, span, move |asm| {
        operand.gen(asm);
        tail(asm);
    })
}

/// Result of compiling a whole expression into a standalone program
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    pub bytecode: Bytecode,
    pub repr: Repr,
    pub ty: Type,
    pub constant: bool,
    /// Deepest operand stack the program reaches
    pub max_stack_depth: usize,
}

/// Expression compiler parameterized by its reference resolver
#[derive(Debug, Clone, Default)]
pub struct ExpressionCompiler<E: Environment = NoEnvironment> {
    env: E,
}

impl ExpressionCompiler<NoEnvironment> {
    /// Compiler with no variables or functions in scope
    pub fn new() -> Self {
        Self { env: NoEnvironment }
    }
}

impl<E: Environment> ExpressionCompiler<E> {
    pub fn with_environment(env: E) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    /// Compile the single child of a root wrapper
    pub fn compile_root(&self, root: &ExprRoot) -> Result<TypedExpr, CompileError> {
        self.compile(&root.expr)
    }

    /// Compile an expression tree
    pub fn compile(&self, expr: &Expr) -> Result<TypedExpr, CompileError> {
        tracing::trace!(kind = expr.kind_name(), span = %expr.span(), "compiling expression");

        match expr {
            Expr::Literal(lit, span) => Ok(literals::compile_literal(lit, *span)),
            Expr::Var(var) => self.env.var_ref(var),
            Expr::Field(field) => {
                let base = self.compile(&field.base)?;
                self.env.field_access(field, base)
            }
            Expr::Item(item) => {
                let base = self.compile(&item.base)?;
                let key = self.compile(&item.key)?;
                self.env.item_access(item, base, key)
            }
            Expr::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.compile(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.env.function_call(call, args)
            }
            Expr::Unary(unary) => self.compile_unary(unary),
            Expr::Binary(binary) => {
                let left = self.compile(&binary.left)?;
                let right = self.compile(&binary.right)?;
                Ok(match binary.op {
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                        arithmetic::compile_arithmetic(binary.op, binary.span, left, right)
                    }
                    BinaryOp::Div => arithmetic::compile_divide(binary.span, left, right),
                    BinaryOp::Mod => arithmetic::compile_remainder(binary.span, left, right),
                    BinaryOp::Eq => comparison::compile_equality(binary.span, left, right),
                    BinaryOp::Ne => comparison::compile_not_equal(binary.span, left, right),
                    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                        comparison::compile_relational(binary.op, binary.span, left, right)
                    }
                    BinaryOp::And => logic::compile_and(binary.span, left, right),
                    BinaryOp::Or => logic::compile_or(binary.span, left, right),
                    BinaryOp::NullCoalesce => {
                        logic::compile_null_coalesce(binary.ty, binary.span, left, right)
                    }
                })
            }
            Expr::Conditional(cond) => {
                let condition = self.compile(&cond.condition)?;
                let then_branch = self.compile(&cond.then_branch)?;
                let else_branch = self.compile(&cond.else_branch)?;
                Ok(logic::compile_conditional(
                    cond.ty,
                    cond.span,
                    condition,
                    then_branch,
                    else_branch,
                ))
            }
            Expr::List(list) => {
                let elements = list
                    .elements
                    .iter()
                    .map(|e| self.compile(e))
                    .collect::<Result<Vec<_>, _>>()?;
                literals::compile_list(list.span, elements)
            }
            Expr::Map(map) => {
                let entries = map
                    .entries
                    .iter()
                    .map(|(k, v)| Ok((self.compile(k)?, self.compile(v)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?;
                literals::compile_map(map.span, entries)
            }
        }
    }

    fn compile_unary(&self, node: &UnaryExpr) -> Result<TypedExpr, CompileError> {
        let operand = self.compile(&node.expr)?;
        Ok(match node.op {
            UnaryOp::Negate => arithmetic::compile_negate(node.span, operand),
            UnaryOp::Not => logic::compile_not(node.span, operand),
        })
    }

    /// Compile `root`, emit it once into a fresh assembler and finish the program
    ///
    /// The program leaves the expression's value as the only stack entry at
    /// `Halt`.
    pub fn compile_program(
        &self,
        root: &ExprRoot,
        options: &CompileOptions,
    ) -> Result<CompiledExpr, CompileError> {
        let expr = self.compile_root(root)?;
        let (repr, ty, constant) = (expr.repr(), expr.ty(), expr.is_constant());

        let mut asm = Assembler::new();
        asm.set_debug_info(options.debug_info);
        expr.gen(&mut asm);
        let max_stack_depth = asm.max_depth();
        let bytecode = asm.finish().map_err(CompileError::Assemble)?;

        if options.validate {
            validate(&bytecode).map_err(CompileError::Validation)?;
        }

        tracing::debug!(
            ?repr,
            %ty,
            constant,
            bytes = bytecode.instructions.len(),
            "compiled expression program"
        );

        Ok(CompiledExpr {
            bytecode,
            repr,
            ty,
            constant,
            max_stack_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, VarRef};

    #[test]
    fn test_classify_is_exhaustive_over_types() {
        assert_eq!(classify(Type::Int), Operand::Int);
        assert_eq!(classify(Type::Float), Operand::Float);
        assert_eq!(classify(Type::String), Operand::Str);
        assert_eq!(classify(Type::Bool), Operand::Dynamic);
        assert_eq!(classify(Type::Unknown), Operand::Dynamic);
    }

    #[test]
    fn test_compile_root_compiles_child() {
        let root = ExprRoot::new(Expr::Literal(Literal::Int(4), Span::new(0, 1)));
        let expr = ExpressionCompiler::new().compile_root(&root).unwrap();
        assert_eq!(expr.repr(), Repr::Int);
        assert!(expr.is_constant());
    }

    #[test]
    fn test_no_environment_rejects_variables() {
        let var = Expr::Var(VarRef {
            name: "x".to_string(),
            ty: Type::Int,
            span: Span::new(2, 4),
        });
        let err = ExpressionCompiler::new().compile(&var).unwrap_err();
        assert_eq!(err, CompileError::unsupported("variable reference", Span::new(2, 4)));
        assert_eq!(err.to_string(), "unsupported variable reference at 2..4");
    }

    #[test]
    fn test_compile_program_validates() {
        let root = ExprRoot::new(Expr::Literal(Literal::String("hi".into()), Span::dummy()));
        let program = ExpressionCompiler::new()
            .compile_program(&root, &CompileOptions::default())
            .unwrap();
        assert_eq!(program.repr, Repr::String);
        assert_eq!(program.max_stack_depth, 1);
        assert!(validate(&program.bytecode).is_ok());
    }
}
