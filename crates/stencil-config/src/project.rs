//! Project Configuration (stencil.toml)
//!
//! Handles project-level configuration stored in `stencil.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum VM stack depth
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;

/// Project configuration from stencil.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Compiler configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConfig>,

    /// Virtual machine configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmConfig>,
}

/// Compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Run the bytecode validator after assembly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<bool>,

    /// Record instruction offset to source span debug info
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<bool>,
}

/// Virtual machine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VmConfig {
    /// Maximum number of value slots on the VM stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stack_depth: Option<usize>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path.to_path_buf())
    }

    /// Parse project configuration from TOML source
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, PathBuf::from(crate::CONFIG_FILE_NAME))
    }

    fn parse(content: &str, file: PathBuf) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|error| ConfigError::TomlParseError { file, error })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(depth) = self.vm.as_ref().and_then(|vm| vm.max_stack_depth) {
            if depth == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "vm.max_stack_depth".to_string(),
                    reason: "stack depth must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: &ProjectConfig) {
        if let Some(other_compiler) = &other.compiler {
            let compiler = self.compiler.get_or_insert_with(Default::default);
            if other_compiler.validate.is_some() {
                compiler.validate = other_compiler.validate;
            }
            if other_compiler.debug_info.is_some() {
                compiler.debug_info = other_compiler.debug_info;
            }
        }

        if let Some(other_vm) = &other.vm {
            let vm = self.vm.get_or_insert_with(Default::default);
            if other_vm.max_stack_depth.is_some() {
                vm.max_stack_depth = other_vm.max_stack_depth;
            }
        }
    }

    /// Whether the bytecode validator should run (default: true)
    pub fn validate_bytecode(&self) -> bool {
        self.compiler
            .as_ref()
            .and_then(|c| c.validate)
            .unwrap_or(true)
    }

    /// Whether debug spans should be recorded (default: true)
    pub fn debug_info(&self) -> bool {
        self.compiler
            .as_ref()
            .and_then(|c| c.debug_info)
            .unwrap_or(true)
    }

    /// Maximum VM stack depth (default: [`DEFAULT_MAX_STACK_DEPTH`])
    pub fn max_stack_depth(&self) -> usize {
        self.vm
            .as_ref()
            .and_then(|vm| vm.max_stack_depth)
            .unwrap_or(DEFAULT_MAX_STACK_DEPTH)
    }
}
