//! Artifact installation
use crate::component::{BuildResult, ComponentSpec};
use crate::error::{KilnError, KilnResult};
use crate::process::ToolInvocation;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);
const VERIFY_TAIL_LINES: usize = 10;

/// One installed artifact
#[derive(Debug, Clone, Serialize)]
pub struct InstallRecord {
    pub component: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Smoke test outcome; `None` when no smoke test is configured
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub verify_output: String,
}

/// Copies successful artifacts into the install directory
pub struct Installer {
    install_dir: PathBuf,
    verify_timeout: Duration,
}

impl Installer {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            verify_timeout: VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install every installable component whose build succeeded
    ///
    /// Returns records plus warnings from smoke tests that did not pass.
    pub fn install_all(
        &self,
        specs: &[ComponentSpec],
        results: &[BuildResult],
    ) -> KilnResult<(Vec<InstallRecord>, Vec<String>)> {
        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for spec in specs.iter().filter(|s| s.install) {
            let Some(result) = results.iter().find(|r| r.component == spec.name) else {
                continue;
            };
            let Some(artifact) = result.artifact.as_deref().filter(|_| result.success()) else {
                continue;
            };

            let record = self.install(spec, artifact)?;
            if record.verified == Some(false) {
                warnings.push(format!(
                    "smoke test of {} exited non-zero",
                    record.destination.display()
                ));
            }
            records.push(record);
        }

        Ok((records, warnings))
    }

    /// Copy one artifact, mark it executable and smoke-test it
    pub fn install(&self, spec: &ComponentSpec, artifact: &Path) -> KilnResult<InstallRecord> {
        let file_name = spec
            .install_file_name()
            .or_else(|| artifact.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| spec.name.clone());
        let destination = self.install_dir.join(&file_name);
        let fail = |path: &Path, e| KilnError::install(&spec.name, path, e);

        fs::create_dir_all(&self.install_dir).map_err(|e| fail(&self.install_dir, e))?;

        // Copy beside the target and rename so a running old binary is not rewritten in place
        let staging = self.install_dir.join(format!(".{}.kiln-tmp", file_name));
        fs::copy(artifact, &staging).map_err(|e| fail(&staging, e))?;
        set_executable(&staging).map_err(|e| fail(&staging, e))?;
        fs::rename(&staging, &destination).map_err(|e| {
            let _ = fs::remove_file(&staging);
            fail(&destination, e)
        })?;
        info!("Installed {} -> {}", spec.name, destination.display());

        let (verified, verify_output) = self.verify(spec, &destination);
        Ok(InstallRecord {
            component: spec.name.clone(),
            source: artifact.to_path_buf(),
            destination,
            verified,
            verify_output,
        })
    }

    fn verify(&self, spec: &ComponentSpec, destination: &Path) -> (Option<bool>, String) {
        if spec.verify_args.is_empty() && spec.verify_stdin.is_none() {
            return (None, String::new());
        }

        let invocation = ToolInvocation::new(destination.to_string_lossy())
            .args(spec.verify_args.iter().cloned())
            .stdin(spec.verify_stdin.clone())
            .timeout(Some(self.verify_timeout));
        match invocation.run() {
            Ok(output) if output.success() => (Some(true), output.tail(VERIFY_TAIL_LINES)),
            Ok(output) => {
                warn!(
                    "Smoke test '{}' ended with {}; the binary may simply need input",
                    invocation.command_line(),
                    output.status_text()
                );
                (Some(false), output.tail(VERIFY_TAIL_LINES))
            }
            Err(e) => {
                warn!("Could not run smoke test '{}': {}", invocation.command_line(), e);
                (Some(false), e.to_string())
            }
        }
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::component::ComponentState;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path
    }

    fn succeeded(component: &str, artifact: &Path) -> BuildResult {
        BuildResult::new(component, ComponentState::Succeeded)
            .with_artifact(Some(artifact.to_path_buf()))
    }

    #[test]
    fn test_install_copies_and_marks_executable() {
        let temp = TempDir::new().unwrap();
        let artifact = script(temp.path(), "xfoil", "exit 0");
        let install_dir = temp.path().join("bin");

        let spec = ComponentSpec::new("main", "bin").with_artifact("xfoil");
        let record = Installer::new(&install_dir).install(&spec, &artifact).unwrap();

        assert_eq!(record.destination, install_dir.join("xfoil"));
        let mode = fs::metadata(&record.destination).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(record.verified, None);
    }

    #[test]
    fn test_failed_smoke_test_is_only_a_warning() {
        let temp = TempDir::new().unwrap();
        let artifact = script(temp.path(), "tool", "echo 'no input'; exit 1");
        let mut spec = ComponentSpec::new("main", "bin").with_artifact("tool");
        spec.verify_args = vec!["-h".to_string()];

        let (records, warnings) = Installer::new(temp.path().join("bin"))
            .install_all(&[spec], &[succeeded("main", &artifact)])
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].verified, Some(false));
        assert!(records[0].verify_output.contains("no input"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_smoke_test_receives_stdin() {
        let temp = TempDir::new().unwrap();
        let artifact = script(temp.path(), "tool", "read cmd; [ \"$cmd\" = QUIT ]");
        let mut spec = ComponentSpec::new("main", "bin").with_artifact("tool");
        spec.verify_stdin = Some("QUIT\n".to_string());

        let record = Installer::new(temp.path().join("bin"))
            .install(&spec, &artifact)
            .unwrap();
        assert_eq!(record.verified, Some(true));
    }

    #[test]
    fn test_skips_failed_and_non_installable() {
        let temp = TempDir::new().unwrap();
        let artifact = script(temp.path(), "tool", "exit 0");
        let specs = vec![
            ComponentSpec::new("lib", "plotlib").optional().with_artifact("tool"),
            ComponentSpec::new("main", "bin").with_artifact("tool"),
        ];
        let results = vec![
            succeeded("lib", &artifact),
            BuildResult::new("main", ComponentState::Failed),
        ];

        let (records, _) = Installer::new(temp.path().join("bin"))
            .install_all(&specs, &results)
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unwritable_install_dir_is_install_error() {
        let temp = TempDir::new().unwrap();
        let artifact = script(temp.path(), "tool", "exit 0");
        // A regular file where the install directory should be
        let blocker = temp.path().join("bin");
        fs::write(&blocker, "").unwrap();

        let spec = ComponentSpec::new("main", "bin").with_artifact("tool");
        let err = Installer::new(&blocker).install(&spec, &artifact).unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }
}
