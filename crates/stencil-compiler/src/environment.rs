//! Reference resolution for the expression compiler
//!
//! Variable references, field and item access and function calls need
//! lookups the expression compiler does not own. An `Environment` supplies
//! emitters for those nodes; the compiler has already compiled their
//! children (base, key, arguments) and hands them over.

use crate::ast::{FieldAccess, FunctionCall, ItemAccess, VarRef};
use crate::compiler::CompileError;
use crate::emitter::{Repr, TypedExpr};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::types::Type;
use std::sync::Arc;

/// Resolver for reference nodes
///
/// Every method defaults to `CompileError::Unsupported`.
pub trait Environment {
    fn var_ref(&self, node: &VarRef) -> Result<TypedExpr, CompileError> {
        Err(CompileError::unsupported("variable reference", node.span))
    }

    fn field_access(
        &self,
        node: &FieldAccess,
        _base: TypedExpr,
    ) -> Result<TypedExpr, CompileError> {
        Err(CompileError::unsupported("field access", node.span))
    }

    fn item_access(
        &self,
        node: &ItemAccess,
        _base: TypedExpr,
        _key: TypedExpr,
    ) -> Result<TypedExpr, CompileError> {
        Err(CompileError::unsupported("item access", node.span))
    }

    fn function_call(
        &self,
        node: &FunctionCall,
        _args: Vec<TypedExpr>,
    ) -> Result<TypedExpr, CompileError> {
        Err(CompileError::unsupported("function call", node.span))
    }
}

/// Environment with nothing in scope; every reference node is unsupported
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnvironment;

impl Environment for NoEnvironment {}

/// Environment backed by VM globals and registered native functions
///
/// - variables load with `GetGlobal`, tagged `Boxed` with the declared type
/// - `base.field` and `base[key]` go through the runtime `getItem`
/// - calls box their arguments and use `CallNative`
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalEnvironment;

impl Environment for GlobalEnvironment {
    fn var_ref(&self, node: &VarRef) -> Result<TypedExpr, CompileError> {
        let name = node.name.clone();
        Ok(TypedExpr::new(
            Repr::Boxed,
            node.ty,
            false,
            node.span,
            move |asm| asm.get_global(&name),
        ))
    }

    fn field_access(
        &self,
        node: &FieldAccess,
        base: TypedExpr,
    ) -> Result<TypedExpr, CompileError> {
        let base = base.into_boxed();
        let constant = base.is_constant();
        let field: Arc<str> = Arc::from(node.field.as_str());
        let key = TypedExpr::string_const(field, node.span);
        Ok(lookup(node.ty, constant, node.span, base, key))
    }

    fn item_access(
        &self,
        node: &ItemAccess,
        base: TypedExpr,
        key: TypedExpr,
    ) -> Result<TypedExpr, CompileError> {
        let constant = base.is_constant() && key.is_constant();
        Ok(lookup(
            node.ty,
            constant,
            node.span,
            base.into_boxed(),
            key.into_boxed(),
        ))
    }

    fn function_call(
        &self,
        node: &FunctionCall,
        args: Vec<TypedExpr>,
    ) -> Result<TypedExpr, CompileError> {
        if args.len() > u8::MAX as usize {
            return Err(CompileError::unsupported(
                "function call with more than 255 arguments",
                node.span,
            ));
        }
        let name = node.name.clone();
        let args: Vec<TypedExpr> = args.into_iter().map(TypedExpr::into_boxed).collect();
        Ok(TypedExpr::new(
            Repr::Boxed,
            node.ty,
            false,
            node.span,
            move |asm| {
                let argc = args.len();
                for arg in args {
                    arg.gen(asm);
                }
                asm.call_native(&name, argc);
            },
        ))
    }
}

fn lookup(
    ty: Type,
    constant: bool,
    span: Span,
    base: TypedExpr,
    key: TypedExpr,
) -> TypedExpr {
    TypedExpr::new(Repr::Boxed, ty, constant, span, move |asm| {
        base.gen(asm);
        key.gen(asm);
        asm.invoke(RuntimeFn::GetItem);
    })
}
