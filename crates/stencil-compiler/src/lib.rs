//! Stencil Compiler - typed expression compilation
//!
//! This library compiles type-checked template expressions to stack bytecode:
//! - Typed expression emitters with static representation tags
//! - Operator specialization from operand static types, with a boxed
//!   runtime-library fallback
//! - Short-circuit boolean, null-coalescing and conditional control flow
//! - An assembler, validator and disassembler for the bytecode
//! - A typed-slot VM that executes compiled programs

/// Stencil compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod emitter;
pub mod environment;
pub mod options;
pub mod runtime;
pub mod span;
pub mod types;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use ast::{BinaryOp, Expr, ExprRoot, Literal, UnaryOp};
pub use bytecode::{Assembler, Bytecode, Opcode};
pub use compiler::{hash_map_capacity, CompileError, CompiledExpr, ExpressionCompiler};
pub use emitter::{Repr, TypedExpr};
pub use environment::{Environment, GlobalEnvironment, NoEnvironment};
pub use options::{CompileOptions, VmOptions};
pub use runtime::RuntimeFn;
pub use span::Span;
pub use types::Type;
pub use value::{RuntimeError, Value, ValueList, ValueMap};
pub use vm::{NativeFn, Slot, VM};
