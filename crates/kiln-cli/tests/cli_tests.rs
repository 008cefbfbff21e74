//! End-to-end tests for the kiln binary
//!
//! Each test gets its own project directory and HOME so neither a real
//! ~/.kiln/config.toml nor KILN_* variables leak in. Builds use `sh -c` as
//! the build tool; the Makefile-driven test is skipped without `make`.

#![cfg(unix)]

use assert_cmd::Command;
use flate2::write::GzEncoder;
use flate2::Compression;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const PLOTLIB_MAKEFILE: &str = "\
FC = f77
FFLAGS = -O -fpe0

libPlt_gDP.a:
\ttouch libPlt_gDP.a
";

const BIN_MAKEFILE: &str = "\
FC = f77

xfoil: ../plotlib/libPlt_gDP.a
\tcp run.sh xfoil
";

const RUN_SCRIPT: &str = "#!/bin/sh\necho 'XFOIL Version 6.99'\n";

const SHELL_COMPONENTS: &str = r#"
[toolchain]
build_tool = "sh"
build_args = ["-c"]
timeout_secs = 60

[[component]]
name = "plotlib"
pattern = "plotlib"
target = "touch libPlt_gDP.a"
artifact = "libPlt_gDP.a"
required = false

[[component]]
name = "main"
pattern = "bin"
target = "test -f ../plotlib/libPlt_gDP.a && cp run.sh xfoil"
artifact = "xfoil"
depends_on = ["plotlib"]
verify_args = ["--version"]

[[patch.rule]]
name = "fortran-compiler"
pattern = '(?m)^(\s*FC\s*=\s*)f77[ \t]*$'
replacement = "${1}gfortran"
"#;

fn create_tarball(path: &Path, files: &[(&str, &str, u32)]) {
    let file = fs::File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// A project directory holding a source archive and kiln.toml
struct Project {
    dir: TempDir,
    home: TempDir,
}

impl Project {
    fn new(files: &[(&str, &str, u32)], body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("xfoil6.99.tgz");
        create_tarball(&archive, files);
        fs::write(
            dir.path().join("kiln.toml"),
            format!(
                "[source]\nurl = 'xfoil6.99.tgz'\n\n[paths]\nwork_dir = 'work'\ninstall_dir = 'install'\n{}",
                body
            ),
        )
        .unwrap();
        Self {
            dir,
            home: TempDir::new().unwrap(),
        }
    }

    fn xfoil(body: &str) -> Self {
        Self::new(
            &[
                ("Xfoil/plotlib/Makefile", PLOTLIB_MAKEFILE, 0o644),
                ("Xfoil/bin/Makefile", BIN_MAKEFILE, 0o644),
                ("Xfoil/bin/run.sh", RUN_SCRIPT, 0o755),
            ],
            body,
        )
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn install_dir(&self) -> PathBuf {
        self.path().join("install")
    }

    fn plotlib_makefile(&self) -> String {
        fs::read_to_string(self.path().join("work/source/Xfoil/plotlib/Makefile")).unwrap()
    }

    fn kiln(&self) -> Command {
        kiln_in(self.path(), self.home.path())
    }
}

fn kiln_in(dir: &Path, home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kiln");
    cmd.current_dir(dir)
        .env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("KILN_JSON");
    for var in [
        "KILN_WORK_DIR",
        "KILN_INSTALL_DIR",
        "KILN_BUILD_TOOL",
        "KILN_TIMEOUT",
        "KILN_HEADLESS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn make_available() -> bool {
    std::process::Command::new("make")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ============================================================================
// kiln run
// ============================================================================

#[test]
fn test_run_installs_patched_build() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed:"))
        .stdout(predicate::str::contains("verified"));

    assert!(project.plotlib_makefile().contains("FC = gfortran"));
    let installed = project.install_dir().join("xfoil");
    let mode = fs::metadata(&installed).unwrap().permissions().mode();
    assert!(mode & 0o111 != 0);
}

#[test]
fn test_run_with_make() {
    if !make_available() {
        eprintln!("make not installed; skipping");
        return;
    }

    let project = Project::xfoil(
        r#"
[[component]]
name = "plotlib"
pattern = "plotlib"
target = "libPlt_gDP.a"
artifact = "libPlt_gDP.a"
required = false

[[component]]
name = "main"
pattern = "bin"
target = "xfoil"
artifact = "xfoil"
depends_on = ["plotlib"]

[[patch.rule]]
name = "fortran-compiler"
pattern = '(?m)^(\s*FC\s*=\s*)f77[ \t]*$'
replacement = "${1}gfortran"
"#,
    );

    project.kiln().arg("run").assert().code(0);

    assert!(project.plotlib_makefile().contains("FC = gfortran"));
    assert!(project.install_dir().join("xfoil").is_file());
}

#[test]
fn test_run_json_summary() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    let output = project.kiln().args(["run", "--json"]).output().unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let states: Vec<&str> = summary["builds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["state"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["succeeded", "succeeded"]);
    assert_eq!(summary["installs"][0]["component"], "main");
}

#[test]
fn test_run_missing_bin_exits_with_layout_code() {
    let project = Project::new(
        &[("Xfoil/plotlib/Makefile", PLOTLIB_MAKEFILE, 0o644)],
        SHELL_COMPONENTS,
    );

    project
        .kiln()
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("locate step failed"))
        .stderr(predicate::str::contains("'main'"));

    assert!(!project.install_dir().exists());
}

#[test]
fn test_run_missing_bin_json_error() {
    let project = Project::new(
        &[("Xfoil/plotlib/Makefile", PLOTLIB_MAKEFILE, 0o644)],
        SHELL_COMPONENTS,
    );

    let output = project.kiln().args(["run", "--json"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));

    let error: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(error["success"], false);
    assert_eq!(error["step"], "locate");
    assert_eq!(error["exit_code"], 3);
}

#[test]
fn test_run_required_build_failure_exits_5_with_diagnostics() {
    let body = SHELL_COMPONENTS.replace(
        "test -f ../plotlib/libPlt_gDP.a && cp run.sh xfoil",
        "echo 'gfortran: command not found' >&2; exit 127",
    );
    let project = Project::xfoil(&body);

    project
        .kiln()
        .arg("run")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("gfortran: command not found"));

    assert!(!project.install_dir().exists());
}

#[test]
fn test_run_dry_run_leaves_makefiles_alone() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would patch"));

    assert!(project.plotlib_makefile().contains("FC = f77"));
    assert!(!project.install_dir().exists());
}

#[test]
fn test_run_install_dir_override() {
    let project = Project::xfoil(SHELL_COMPONENTS);
    let target = TempDir::new().unwrap();

    project
        .kiln()
        .arg("run")
        .arg("--install-dir")
        .arg(target.path())
        .assert()
        .success();

    assert!(target.path().join("xfoil").is_file());
    assert!(!project.install_dir().exists());
}

#[test]
fn test_missing_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    kiln_in(dir.path(), home.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("kiln.toml"));
}

#[test]
fn test_usage_error_exits_1() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    kiln_in(dir.path(), home.path())
        .args(["run", "--headless", "sometimes"])
        .assert()
        .code(1);
}

// ============================================================================
// kiln patch / fetch
// ============================================================================

#[test]
fn test_patch_twice_changes_nothing_the_second_time() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .arg("patch")
        .assert()
        .success()
        .stdout(predicate::str::contains("Patched 2 of 2"));
    let once = project.plotlib_makefile();

    project
        .kiln()
        .arg("patch")
        .assert()
        .success()
        .stdout(predicate::str::contains("Patched 0 of 2"));
    assert_eq!(project.plotlib_makefile(), once);
}

#[test]
fn test_fetch_reuses_extracted_tree() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .arg("fetch")
        .assert()
        .success()
        .stdout(predicate::str::contains("(extracted)"));

    project
        .kiln()
        .arg("fetch")
        .assert()
        .success()
        .stdout(predicate::str::contains("already extracted"));
}

// ============================================================================
// kiln init / plan
// ============================================================================

#[test]
fn test_init_then_plan() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    kiln_in(dir.path(), home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dir.path().join("kiln.toml").is_file());

    kiln_in(dir.path(), home.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build order:"))
        .stdout(predicate::str::contains("plotlib"))
        .stdout(predicate::str::contains("fortran-compiler"));

    // plan has no side effects
    assert!(!dir.path().join("build").exists());
}

#[test]
fn test_init_refuses_existing_config() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_plan_json_order() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    let output = project.kiln().args(["plan", "--json"]).output().unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let order: Vec<&str> = plan["order"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec!["plotlib", "main"]);
}

// ============================================================================
// kiln which / completions
// ============================================================================

#[test]
fn test_which_honours_env_override() {
    let project = Project::xfoil(SHELL_COMPONENTS);
    let custom = project.path().join("my-xfoil");
    fs::write(&custom, RUN_SCRIPT).unwrap();
    fs::set_permissions(&custom, fs::Permissions::from_mode(0o755)).unwrap();

    project
        .kiln()
        .args(["which", "main"])
        .env("XFOIL_PATH", &custom)
        .assert()
        .success()
        .stdout(predicate::str::contains("my-xfoil"));
}

#[test]
fn test_which_finds_installed_binary() {
    let project = Project::xfoil(SHELL_COMPONENTS);
    project.kiln().arg("run").assert().success();

    project
        .kiln()
        .args(["which", "xfoil"])
        .env_remove("XFOIL_PATH")
        .env("PATH", "/nonexistent")
        .assert()
        .success()
        .stdout(predicate::str::contains("install/xfoil"));
}

#[test]
fn test_which_not_found_exits_1() {
    let project = Project::xfoil(SHELL_COMPONENTS);

    project
        .kiln()
        .args(["which", "xfoil"])
        .env_remove("XFOIL_PATH")
        .env("PATH", "/nonexistent")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("XFOIL_PATH"));
}

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    kiln_in(dir.path(), home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kiln"));
}
