//! Compiler and VM settings derived from `stencil.toml`

use stencil_config::project::DEFAULT_MAX_STACK_DEPTH;
use stencil_config::Config;

/// Settings for `ExpressionCompiler::compile_program`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run the bytecode validator on every finished program
    pub validate: bool,
    /// Record instruction spans for runtime error reporting
    pub debug_info: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            validate: true,
            debug_info: true,
        }
    }
}

impl CompileOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            validate: config.validate_bytecode(),
            debug_info: config.debug_info(),
        }
    }
}

/// Settings for `VM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    /// Deepest operand stack a program may reach before `StackOverflow`
    pub max_stack_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}

impl VmOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_stack_depth: config.max_stack_depth(),
        }
    }
}
