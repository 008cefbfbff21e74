//! Configuration loading, precedence and validation tests

use kiln_config::{ConfigError, ConfigLoader, HeadlessMode, Preset, ProjectConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const PROJECT: &str = r#"
[source]
url = "https://example.org/tool-1.0.tgz"

[paths]
work_dir = "work"

[[component]]
name = "plotlib"
pattern = "plotlib"
required = false

[[component]]
name = "main"
pattern = "bin"
artifact = "tool"
depends_on = ["plotlib"]

[headless]
component = "plotlib"
archive = "libPlt.a"

[[headless.symbol]]
name = "plopen"
args = ["a", "b"]
"#;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("kiln.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Loader that never touches the real home directory
fn isolated_loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new().with_global_path(dir.join("no-global.toml"))
}

fn clear_env() {
    for var in [
        "KILN_WORK_DIR",
        "KILN_INSTALL_DIR",
        "KILN_BUILD_TOOL",
        "KILN_TIMEOUT",
        "KILN_HEADLESS",
    ] {
        std::env::remove_var(var);
    }
}

// ============================================================================
// Loading
// ============================================================================

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), PROJECT);
    let nested = temp_dir.path().join("a/b");
    fs::create_dir_all(&nested).unwrap();

    let config = isolated_loader(temp_dir.path())
        .load_from_directory(&nested)
        .unwrap();

    assert_eq!(config.project_root, temp_dir.path());
    assert_eq!(config.work_dir(), temp_dir.path().join("work"));
    assert_eq!(config.project.components.len(), 2);
}

#[test]
fn test_missing_project_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let err = isolated_loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn test_unknown_field_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        &format!("{}\n[extras]\nflag = true\n", PROJECT),
    );
    let err = ProjectConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParseError { .. }));
}

#[test]
#[serial]
fn test_defaults_when_unset() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        "[source]\nurl = \"tool.tgz\"\n\n[[component]]\nname = \"main\"\npattern = \"bin\"\n",
    );

    let config = isolated_loader(temp_dir.path()).load_from_file(&path).unwrap();
    assert_eq!(config.work_dir(), temp_dir.path().join("build"));
    assert_eq!(config.install_dir(), PathBuf::from("/usr/local/bin"));
    assert_eq!(config.build_tool(), "make");
    assert_eq!(config.timeout(), Some(Duration::from_secs(1800)));
    assert_eq!(config.search_depth(), 4);
    assert_eq!(config.headless_mode(), HeadlessMode::Never);
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
#[serial]
fn test_global_defaults_fill_gaps() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), PROJECT);
    let global = temp_dir.path().join("global.toml");
    fs::write(
        &global,
        "[defaults]\nwork_dir = \"/ignored\"\nbuild_tool = \"gmake\"\ntimeout_secs = 0\n",
    )
    .unwrap();

    let config = ConfigLoader::new()
        .with_global_path(&global)
        .load_from_file(&path)
        .unwrap();

    // Project wins over global for work_dir
    assert_eq!(config.work_dir(), temp_dir.path().join("work"));
    assert_eq!(config.build_tool(), "gmake");
    assert_eq!(config.timeout(), None);
}

#[test]
#[serial]
fn test_env_overrides_project() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), PROJECT);

    std::env::set_var("KILN_WORK_DIR", "/tmp/kiln-env-work");
    std::env::set_var("KILN_TIMEOUT", "60");
    std::env::set_var("KILN_HEADLESS", "always");
    let result = isolated_loader(temp_dir.path()).load_from_file(&path);
    clear_env();

    let config = result.unwrap();
    assert_eq!(config.work_dir(), PathBuf::from("/tmp/kiln-env-work"));
    assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
    assert_eq!(config.headless_mode(), HeadlessMode::Always);
}

#[rstest]
#[case("KILN_TIMEOUT", "soon")]
#[case("KILN_HEADLESS", "sometimes")]
#[serial]
fn test_invalid_env_value_rejected(#[case] var: &str, #[case] value: &str) {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), PROJECT);

    std::env::set_var(var, value);
    let result = isolated_loader(temp_dir.path()).load_from_file(&path);
    clear_env();

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
#[case::empty_pattern("[[component]]\nname = \"x\"\npattern = \"\"\n")]
#[case::parent_segment("[[component]]\nname = \"x\"\npattern = \"../bin\"\n")]
#[case::bad_symbol("[headless]\ncomponent = \"plotlib\"\narchive = \"a.a\"\n[[headless.symbol]]\nname = \"1bad\"\n")]
fn test_invalid_additions_rejected(#[case] extra: &str) {
    let content = if extra.starts_with("[headless]") {
        PROJECT.split("[headless]").next().unwrap().to_string() + extra
    } else {
        format!("{}\n{}", PROJECT, extra)
    };
    let config: ProjectConfig = toml::from_str(&content).unwrap();
    assert!(config.validate().is_err(), "accepted:\n{}", content);
}

#[test]
fn test_presets_roundtrip_through_file() {
    for preset in Preset::all() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_config_file(temp_dir.path(), preset.render());
        let config = ProjectConfig::load_from_file(&path).unwrap();
        assert!(!config.components.is_empty(), "preset {}", preset);
    }
}
