//! Configuration loading and precedence tests

use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use stencil_config::{ConfigError, ConfigLoader, ProjectConfig, CONFIG_FILE_NAME};
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> std::path::PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_project_config_basic() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[compiler]
validate = false
"#,
    );

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.is_project());
    assert!(!config.validate_bytecode());
    assert!(config.debug_info());
}

#[test]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert!(config.validate_bytecode());
    assert_eq!(config.max_stack_depth(), 1024);
}

#[test]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[vm]
max_stack_depth = 16
"#,
    );

    let sub2 = temp_dir.path().join("sub1").join("sub2");
    fs::create_dir_all(&sub2).unwrap();

    let config = ConfigLoader::without_env()
        .load_from_directory(&sub2)
        .unwrap();

    assert_eq!(config.max_stack_depth(), 16);
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
fn test_load_from_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join(CONFIG_FILE_NAME);

    let result = ConfigLoader::without_env().load_from_file(&missing);

    assert!(matches!(result, Err(ConfigError::NotFound(path)) if path == missing));
}

#[test]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[compiler\nvalidate = ");

    let result = ProjectConfig::load_from_file(&path);

    match result {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("Expected TomlParseError, got {:?}", other),
    }
}

// ============================================================================
// Environment Override Tests
// ============================================================================

#[rstest]
#[case("true", true)]
#[case("1", true)]
#[case("YES", true)]
#[case("false", false)]
#[case("0", false)]
#[serial]
fn test_env_override_validate(#[case] raw: &str, #[case] expected: bool) {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("STENCIL_VALIDATE", raw);
    let config = ConfigLoader::new()
        .load_from_directory(temp_dir.path())
        .unwrap();
    env::remove_var("STENCIL_VALIDATE");

    assert_eq!(config.validate_bytecode(), expected);
}

#[test]
#[serial]
fn test_env_override_beats_project_file() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[vm]
max_stack_depth = 16
"#,
    );

    env::set_var("STENCIL_MAX_STACK_DEPTH", "4096");
    let config = ConfigLoader::new()
        .load_from_directory(temp_dir.path())
        .unwrap();
    env::remove_var("STENCIL_MAX_STACK_DEPTH");

    assert_eq!(config.max_stack_depth(), 4096);
}

#[test]
#[serial]
fn test_env_override_zero_depth_is_invalid() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("STENCIL_MAX_STACK_DEPTH", "0");
    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    env::remove_var("STENCIL_MAX_STACK_DEPTH");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
