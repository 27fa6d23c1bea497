//! Type-checked expression tree
//!
//! Produced by the template parser and annotated by the type checker; both
//! live outside this crate. Every composite node carries the static type the
//! checker resolved for it.

use crate::span::Span;
use crate::types::Type;
use serde::{Deserialize, Serialize};

/// Root wrapper around a single expression (e.g. the body of a print tag)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprRoot {
    pub expr: Box<Expr>,
    pub span: Span,
}

impl ExprRoot {
    pub fn new(expr: Expr) -> Self {
        let span = expr.span();
        Self {
            expr: Box::new(expr),
            span,
        }
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal, Span),
    Var(VarRef),
    Field(FieldAccess),
    Item(ItemAccess),
    Call(FunctionCall),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Conditional(ConditionalExpr),
    List(ListLiteral),
    Map(MapLiteral),
}

/// Literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Null => Type::Null,
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::String(_) => Type::String,
        }
    }
}

/// Template variable reference (`$name`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// Field access (`base.field`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccess {
    pub base: Box<Expr>,
    pub field: String,
    pub ty: Type,
    pub span: Span,
}

/// Item access (`base[key]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAccess {
    pub base: Box<Expr>,
    pub key: Box<Expr>,
    pub ty: Type,
    pub span: Span,
}

/// Function call (`name(args...)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub ty: Type,
    pub span: Span,
}

/// Unary expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub expr: Box<Expr>,
    pub ty: Type,
    pub span: Span,
}

/// Binary expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub ty: Type,
    pub span: Span,
}

/// Conditional expression (`condition ? then : else`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub condition: Box<Expr>,
    pub then_branch: Box<Expr>,
    pub else_branch: Box<Expr>,
    pub ty: Type,
    pub span: Span,
}

/// List literal (`[a, b, c]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListLiteral {
    pub elements: Vec<Expr>,
    pub span: Span,
}

/// Map literal (`['k': v, ...]`), entries in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLiteral {
    pub entries: Vec<(Expr, Expr)>,
    pub span: Span,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    /// `a ?: b`
    NullCoalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::NullCoalesce => "?:",
        }
    }
}

// Helper methods for getting spans and types from AST nodes

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, span) => *span,
            Expr::Var(v) => v.span,
            Expr::Field(f) => f.span,
            Expr::Item(i) => i.span,
            Expr::Call(c) => c.span,
            Expr::Unary(u) => u.span,
            Expr::Binary(b) => b.span,
            Expr::Conditional(c) => c.span,
            Expr::List(l) => l.span,
            Expr::Map(m) => m.span,
        }
    }

    /// Static type resolved by the type checker
    pub fn ty(&self) -> Type {
        match self {
            Expr::Literal(lit, _) => lit.ty(),
            Expr::Var(v) => v.ty,
            Expr::Field(f) => f.ty,
            Expr::Item(i) => i.ty,
            Expr::Call(c) => c.ty,
            Expr::Unary(u) => u.ty,
            Expr::Binary(b) => b.ty,
            Expr::Conditional(c) => c.ty,
            Expr::List(_) => Type::List,
            Expr::Map(_) => Type::Map,
        }
    }

    /// Node kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal(..) => "literal",
            Expr::Var(_) => "variable reference",
            Expr::Field(_) => "field access",
            Expr::Item(_) => "item access",
            Expr::Call(_) => "function call",
            Expr::Unary(_) => "unary operator",
            Expr::Binary(_) => "binary operator",
            Expr::Conditional(_) => "conditional operator",
            Expr::List(_) => "list literal",
            Expr::Map(_) => "map literal",
        }
    }
}
