//! Shared test utilities
//!
//! AST builders that fill in the static types a type checker would assign,
//! plus helpers that compile an expression and run it on the VM.

#![allow(dead_code)]

use stencil_compiler::ast::{
    BinaryExpr, ConditionalExpr, FieldAccess, FunctionCall, ItemAccess, ListLiteral, MapLiteral,
    UnaryExpr, VarRef,
};
use stencil_compiler::{
    BinaryOp, CompileOptions, CompiledExpr, Expr, ExprRoot, ExpressionCompiler,
    GlobalEnvironment, Literal, RuntimeError, Span, Type, UnaryOp, Value, VM,
};

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

fn span() -> Span {
    Span::dummy()
}

pub fn null() -> Expr {
    Expr::Literal(Literal::Null, span())
}

pub fn boolean(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b), span())
}

pub fn int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n), span())
}

pub fn float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f), span())
}

pub fn string(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.to_string()), span())
}

pub fn var(name: &str, ty: Type) -> Expr {
    Expr::Var(VarRef {
        name: name.to_string(),
        ty,
        span: span(),
    })
}

pub fn field(base: Expr, name: &str, ty: Type) -> Expr {
    Expr::Field(FieldAccess {
        base: Box::new(base),
        field: name.to_string(),
        ty,
        span: span(),
    })
}

pub fn item(base: Expr, key: Expr, ty: Type) -> Expr {
    Expr::Item(ItemAccess {
        base: Box::new(base),
        key: Box::new(key),
        ty,
        span: span(),
    })
}

pub fn call(name: &str, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::Call(FunctionCall {
        name: name.to_string(),
        args,
        ty,
        span: span(),
    })
}

pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
    let ty = match op {
        UnaryOp::Not => Type::Bool,
        UnaryOp::Negate if expr.ty().is_number() => expr.ty(),
        UnaryOp::Negate => Type::Unknown,
    };
    Expr::Unary(UnaryExpr {
        op,
        expr: Box::new(expr),
        ty,
        span: span(),
    })
}

/// Result type the checker would assign to `left op right`
fn binary_type(op: BinaryOp, left: Type, right: Type) -> Type {
    match op {
        BinaryOp::Add if left == Type::String || right == Type::String => Type::String,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (left, right) {
            (Type::Int, Type::Int) => Type::Int,
            (l, r) if l.is_number() && r.is_number() => Type::Float,
            _ => Type::Unknown,
        },
        BinaryOp::Div => Type::Float,
        BinaryOp::Mod => Type::Int,
        BinaryOp::NullCoalesce if left == right => left,
        BinaryOp::NullCoalesce => Type::Unknown,
        _ => Type::Bool,
    }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let ty = binary_type(op, left.ty(), right.ty());
    Expr::Binary(BinaryExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty,
        span: span(),
    })
}

pub fn conditional(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    let ty = match (then_branch.ty(), else_branch.ty()) {
        (a, b) if a == b => a,
        (a, b) if a.is_number() && b.is_number() => Type::Float,
        _ => Type::Unknown,
    };
    Expr::Conditional(ConditionalExpr {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
        ty,
        span: span(),
    })
}

pub fn list(elements: Vec<Expr>) -> Expr {
    Expr::List(ListLiteral {
        elements,
        span: span(),
    })
}

pub fn map(entries: Vec<(Expr, Expr)>) -> Expr {
    Expr::Map(MapLiteral {
        entries,
        span: span(),
    })
}

/// Compile `expr` against VM globals and natives
pub fn compile(expr: Expr) -> CompiledExpr {
    ExpressionCompiler::with_environment(GlobalEnvironment)
        .compile_program(&ExprRoot::new(expr), &CompileOptions::default())
        .expect("expression should compile")
}

/// Compile and run `expr` with no globals bound
pub fn run_expr(expr: Expr) -> Result<Value, RuntimeError> {
    run_with(expr, |_| {})
}

/// Compile `expr`, let `setup` bind globals and natives, then run it
pub fn run_with(expr: Expr, setup: impl FnOnce(&mut VM)) -> Result<Value, RuntimeError> {
    let program = compile(expr);
    let mut vm = VM::new(program.bytecode);
    setup(&mut vm);
    vm.run()
}
