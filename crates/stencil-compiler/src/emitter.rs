//! Typed expression emitters
//!
//! A `TypedExpr` is the compiled form of one expression subtree: a static
//! representation tag, the type checker's declared type, a constant flag and
//! a deferred emission procedure. The procedure is consumed by `gen`, so it
//! can run at most once; conversions compose a new procedure around the old
//! one instead of re-running it.

use crate::bytecode::{Assembler, Opcode};
use crate::runtime::RuntimeFn;
use crate::span::Span;
use crate::types::Type;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Runtime representation of the value an emitter leaves on the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repr {
    Null,
    /// Unboxed bool slot
    Bool,
    /// Unboxed 64-bit integer slot
    Int,
    /// Unboxed 64-bit float slot
    Float,
    String,
    List,
    Map,
    /// Type-erased runtime value; only the runtime library can inspect it
    Boxed,
}

impl Repr {
    /// The static type implied by an unboxed representation
    pub fn implied_type(self) -> Type {
        match self {
            Repr::Null => Type::Null,
            Repr::Bool => Type::Bool,
            Repr::Int => Type::Int,
            Repr::Float => Type::Float,
            Repr::String => Type::String,
            Repr::List => Type::List,
            Repr::Map => Type::Map,
            Repr::Boxed => Type::Unknown,
        }
    }
}

type EmitFn = Box<dyn FnOnce(&mut Assembler) + Send>;

/// Compiled expression awaiting emission
pub struct TypedExpr {
    repr: Repr,
    ty: Type,
    constant: bool,
    span: Span,
    code: EmitFn,
}

impl fmt::Debug for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedExpr")
            .field("repr", &self.repr)
            .field("ty", &self.ty)
            .field("constant", &self.constant)
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

impl TypedExpr {
    /// Wrap an emission procedure that pushes exactly one value of `repr`
    ///
    /// For unboxed representations `ty` is forced to the implied type.
    pub fn new(
        repr: Repr,
        ty: Type,
        constant: bool,
        span: Span,
        code: impl FnOnce(&mut Assembler) + Send + 'static,
    ) -> Self {
        let ty = match repr {
            Repr::Boxed => ty,
            other => other.implied_type(),
        };
        Self {
            repr,
            ty,
            constant,
            span,
            code: Box::new(code),
        }
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    pub fn null(span: Span) -> Self {
        Self::new(Repr::Null, Type::Null, true, span, |asm| asm.push_null())
    }

    /// `true` / `false` use the shared `True` / `False` instructions
    pub fn bool_const(value: bool, span: Span) -> Self {
        Self::new(Repr::Bool, Type::Bool, true, span, move |asm| {
            asm.push_bool(value)
        })
    }

    pub fn int_const(value: i64, span: Span) -> Self {
        Self::new(Repr::Int, Type::Int, true, span, move |asm| {
            asm.push_int(value)
        })
    }

    pub fn float_const(value: f64, span: Span) -> Self {
        Self::new(Repr::Float, Type::Float, true, span, move |asm| {
            asm.push_float(value)
        })
    }

    pub fn string_const(value: impl Into<Arc<str>>, span: Span) -> Self {
        let value: Arc<str> = value.into();
        Self::new(Repr::String, Type::String, true, span, move |asm| {
            asm.push_constant(Value::String(value))
        })
    }

    /// The shared empty list, tagged `Boxed`
    pub fn empty_list(span: Span) -> Self {
        Self::new(Repr::Boxed, Type::List, true, span, |asm| {
            asm.emit(Opcode::EmptyList)
        })
    }

    /// The shared empty map, tagged `Boxed`
    pub fn empty_map(span: Span) -> Self {
        Self::new(Repr::Boxed, Type::Map, true, span, |asm| {
            asm.emit(Opcode::EmptyMap)
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn repr(&self) -> Repr {
        self.repr
    }

    /// Declared static type (the representation's type when unboxed)
    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn is_known_int(&self) -> bool {
        self.ty == Type::Int
    }

    pub fn is_known_float(&self) -> bool {
        self.ty == Type::Float
    }

    pub fn is_known_number(&self) -> bool {
        self.ty.is_number()
    }

    pub fn is_known_string(&self) -> bool {
        self.ty == Type::String
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    /// Run the emission procedure, leaving one value on the stack
    pub fn gen(self, asm: &mut Assembler) {
        let previous = asm.set_span(self.span);
        let before = asm.depth();
        (self.code)(asm);
        debug_assert_eq!(
            asm.depth(),
            before + 1,
            "emitter for {:?} must push exactly one value",
            self.repr
        );
        asm.set_span(previous);
    }

    /// Compose a follow-up sequence after this emitter's code
    fn then(
        self,
        repr: Repr,
        ty: Type,
        tail: impl FnOnce(&mut Assembler) + Send + 'static,
    ) -> TypedExpr {
        let constant = self.constant;
        let span = self.span;
        TypedExpr::new(repr, ty, constant, span, move |asm| {
            self.gen(asm);
            tail(asm);
        })
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Erase to the generic runtime representation
    pub fn into_boxed(self) -> TypedExpr {
        let ty = self.ty;
        match self.repr {
            Repr::Boxed => self,
            Repr::Int => self.then(Repr::Boxed, ty, |asm| asm.emit(Opcode::BoxInt)),
            Repr::Float => self.then(Repr::Boxed, ty, |asm| asm.emit(Opcode::BoxFloat)),
            Repr::Bool => self.then(Repr::Boxed, ty, |asm| asm.emit(Opcode::BoxBool)),
            // Reference representations are already runtime values.
            Repr::Null | Repr::String | Repr::List | Repr::Map => TypedExpr {
                repr: Repr::Boxed,
                ..self
            },
        }
    }

    /// Narrow to an unboxed int
    ///
    /// Anything that is not already an unboxed int goes through `UnboxInt`,
    /// which fails at runtime unless the value really is an int.
    pub fn into_int(self) -> TypedExpr {
        match self.repr {
            Repr::Int => self,
            Repr::Boxed => self.then(Repr::Int, Type::Int, |asm| asm.emit(Opcode::UnboxInt)),
            _ => self
                .into_boxed()
                .then(Repr::Int, Type::Int, |asm| asm.emit(Opcode::UnboxInt)),
        }
    }

    /// Widen or unbox to an unboxed float
    pub fn into_float(self) -> TypedExpr {
        match self.repr {
            Repr::Float => self,
            Repr::Int => self.then(Repr::Float, Type::Float, |asm| {
                asm.emit(Opcode::IntToFloat)
            }),
            Repr::Boxed => self.then(Repr::Float, Type::Float, |asm| {
                asm.emit(Opcode::UnboxFloat)
            }),
            _ => self.into_boxed().then(Repr::Float, Type::Float, |asm| {
                asm.emit(Opcode::UnboxFloat)
            }),
        }
    }

    /// Convert to an unboxed bool using template truthiness
    pub fn into_bool(self) -> TypedExpr {
        match self.repr {
            Repr::Bool => self,
            Repr::Int => self.then(Repr::Bool, Type::Bool, |asm| {
                asm.emit(Opcode::IntToBool)
            }),
            Repr::Float => self.then(Repr::Bool, Type::Bool, |asm| {
                asm.emit(Opcode::FloatToBool)
            }),
            Repr::Null | Repr::String | Repr::List | Repr::Map | Repr::Boxed => self
                .into_boxed()
                .then(Repr::Bool, Type::Bool, |asm| asm.invoke(RuntimeFn::Truthy)),
        }
    }

    /// Convert any value to its string form
    pub fn into_string(self) -> TypedExpr {
        match self.repr {
            Repr::String => self,
            Repr::Int => self.then(Repr::String, Type::String, |asm| {
                asm.emit(Opcode::IntToString)
            }),
            Repr::Float => self.then(Repr::String, Type::String, |asm| {
                asm.emit(Opcode::FloatToString)
            }),
            Repr::Bool => self.then(Repr::String, Type::String, |asm| {
                asm.emit(Opcode::BoolToString)
            }),
            Repr::Null | Repr::List | Repr::Map | Repr::Boxed => self
                .into_boxed()
                .then(Repr::String, Type::String, |asm| {
                    asm.invoke(RuntimeFn::CoerceToString)
                }),
        }
    }

    /// Convert to the given representation
    pub fn convert(self, target: Repr) -> TypedExpr {
        match target {
            Repr::Int => self.into_int(),
            Repr::Float => self.into_float(),
            Repr::Bool => self.into_bool(),
            Repr::String => self.into_string(),
            Repr::Boxed => self.into_boxed(),
            Repr::Null | Repr::List | Repr::Map if self.repr == target => self,
            Repr::Null | Repr::List | Repr::Map => self.into_boxed(),
        }
    }
}
