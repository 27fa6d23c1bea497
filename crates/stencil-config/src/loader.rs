//! Locates `stencil.toml` and layers `STENCIL_*` environment overrides on top

use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Resolves the effective configuration
///
/// Environment variables win over the project file, which wins over
/// built-in defaults.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment variable overrides (used by embedders that own their env)
    ignore_env: bool,
}

/// Effective configuration after all layers are applied
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where stencil.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Create a loader that does not consult STENCIL_* environment variables
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Search `start_dir` and its ancestors for stencil.toml
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let project = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project,
            project_root,
        })
    }

    /// Use an explicit config file instead of searching
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Returns (project_root, project_config); defaults when no file exists
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Recognised variables: STENCIL_VALIDATE, STENCIL_DEBUG_INFO,
    /// STENCIL_MAX_STACK_DEPTH
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(validate) = env::var("STENCIL_VALIDATE") {
            config
                .compiler
                .get_or_insert_with(Default::default)
                .validate = Some(parse_bool(&validate));
        }

        if let Ok(debug_info) = env::var("STENCIL_DEBUG_INFO") {
            config
                .compiler
                .get_or_insert_with(Default::default)
                .debug_info = Some(parse_bool(&debug_info));
        }

        if let Ok(depth) = env::var("STENCIL_MAX_STACK_DEPTH") {
            let depth = depth
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "STENCIL_MAX_STACK_DEPTH".to_string(),
                    reason: e.to_string(),
                })?;
            config.vm.get_or_insert_with(Default::default).max_stack_depth = Some(depth);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has stencil.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Whether assembled bytecode should be validated
    pub fn validate_bytecode(&self) -> bool {
        self.project.validate_bytecode()
    }

    /// Whether debug spans should be recorded
    pub fn debug_info(&self) -> bool {
        self.project.debug_info()
    }

    /// Maximum VM stack depth
    pub fn max_stack_depth(&self) -> usize {
        self.project.max_stack_depth()
    }
}
