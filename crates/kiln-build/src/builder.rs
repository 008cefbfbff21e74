//! Component builder
//!
//! Runs the native build tool once per component in dependency order and
//! decides, per failure, whether the run aborts, continues degraded, or
//! substitutes headless stubs.

use crate::component::{BuildResult, ComponentSpec, ComponentState};
use crate::error::{KilnError, KilnResult};
use crate::headless::{HeadlessDecision, StubArtifact, StubSynthesizer};
use crate::locator::LocatedTree;
use crate::process::ToolInvocation;
use kiln_config::HeadlessConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lines of captured output kept in results and errors
pub const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Headless substitution settings for one run
#[derive(Debug, Clone)]
pub struct HeadlessPlan {
    pub config: HeadlessConfig,
    pub decision: HeadlessDecision,
    /// Where stub sources and objects are written
    pub staging_dir: PathBuf,
}

/// Everything the build step produced
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Results in build order
    pub results: Vec<BuildResult>,
    pub stubs: Option<StubArtifact>,
    pub warnings: Vec<String>,
}

impl BuildOutcome {
    pub fn result(&self, component: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.component == component)
    }
}

/// Invokes the native build tool per component
pub struct ComponentBuilder {
    tool: String,
    base_args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    headless: Option<HeadlessPlan>,
}

impl ComponentBuilder {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            base_args: Vec::new(),
            env: BTreeMap::new(),
            timeout: None,
            headless: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_headless(mut self, plan: Option<HeadlessPlan>) -> Self {
        self.headless = plan;
        self
    }

    /// Command that builds one component
    pub fn invocation(&self, spec: &ComponentSpec, dir: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.tool)
            .args(self.base_args.iter().cloned())
            .args(spec.build_args.iter().cloned())
            .args(spec.target.iter().cloned())
            .current_dir(dir)
            .envs(&self.env)
            .timeout(self.timeout)
    }

    /// Build `ordered` (already topologically sorted)
    ///
    /// Returns an error only when a required component fails.
    pub fn build_all(
        &self,
        ordered: &[ComponentSpec],
        located: &LocatedTree,
    ) -> KilnResult<BuildOutcome> {
        let mut outcome = BuildOutcome::default();
        let mut states: BTreeMap<String, ComponentState> = ordered
            .iter()
            .map(|s| (s.name.clone(), ComponentState::Pending))
            .collect();

        for spec in ordered {
            let result = self.build_one(spec, located, &mut states, &mut outcome)?;
            debug!("{}: {}", spec.name, result.state);
            states.insert(spec.name.clone(), result.state);
            outcome.results.push(result);
        }

        Ok(outcome)
    }

    fn headless_for(&self, component: &str) -> Option<&HeadlessPlan> {
        self.headless
            .as_ref()
            .filter(|plan| plan.config.component == component && plan.decision.allows_stubs())
    }

    fn build_one(
        &self,
        spec: &ComponentSpec,
        located: &LocatedTree,
        states: &mut BTreeMap<String, ComponentState>,
        outcome: &mut BuildOutcome,
    ) -> KilnResult<BuildResult> {
        let dir = located.path(&spec.name).map(Path::to_path_buf);

        if let Some(plan) = self.headless_for(&spec.name) {
            if plan.decision == HeadlessDecision::Substitute {
                let output_dir = dir.clone().unwrap_or_else(|| plan.staging_dir.clone());
                return self.substitute(spec, plan, &output_dir, "no display stack; using stubs", outcome);
            }
        }

        let Some(dir) = dir else {
            return Ok(BuildResult::skipped(&spec.name, "directory not found"));
        };

        for dep in &spec.depends_on {
            let dep_state = states
                .get(dep)
                .copied()
                .unwrap_or(ComponentState::Pending);
            if dep_state.is_available() {
                continue;
            }

            if let Some(plan) = self.headless_for(dep) {
                let output_dir = located
                    .path(dep)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| plan.staging_dir.clone());
                let reason = format!("'{}' unavailable for '{}'; using stubs", dep, spec.name);
                match self.synthesize(plan, &output_dir, &reason, outcome) {
                    Ok(stub) => {
                        states.insert(dep.clone(), ComponentState::Substituted);
                        if let Some(existing) =
                            outcome.results.iter_mut().find(|r| &r.component == dep)
                        {
                            existing.state = ComponentState::Substituted;
                            existing.artifact = Some(stub.archive);
                            existing.note = Some(reason);
                        }
                        continue;
                    }
                    Err(e) => {
                        let message = format!("stub synthesis for '{}' failed: {}", dep, e);
                        warn!("{}", message);
                        outcome.warnings.push(message);
                    }
                }
            }

            let message = format!("dependency '{}' of '{}' is {}", dep, spec.name, dep_state);
            if !spec.required {
                warn!("{}; skipping", message);
                outcome.warnings.push(format!("{}; skipped", message));
                return Ok(BuildResult::skipped(
                    &spec.name,
                    format!("dependency '{}' unavailable", dep),
                ));
            }
            warn!("{}; building anyway", message);
            outcome.warnings.push(format!("{}; attempted anyway", message));
        }

        let result = self.run_build(spec, &dir);
        if result.state == ComponentState::Succeeded {
            return Ok(result);
        }

        if let Some(plan) = self.headless_for(&spec.name) {
            warn!("Build of '{}' failed; substituting headless stubs", spec.name);
            let reason = format!(
                "real build failed ({}); using stubs",
                result.note.as_deref().unwrap_or("unknown error")
            );
            let mut substituted = self.substitute(spec, plan, &dir, &reason, outcome)?;
            substituted.diagnostics = result.diagnostics;
            return Ok(substituted);
        }

        let reason = result.note.clone().unwrap_or_default();
        if spec.required {
            return Err(KilnError::build(&spec.name, reason, result.diagnostics));
        }

        warn!("Optional component '{}' failed: {}", spec.name, reason);
        outcome
            .warnings
            .push(format!("optional component '{}' failed: {}", spec.name, reason));
        Ok(result)
    }

    fn run_build(&self, spec: &ComponentSpec, dir: &Path) -> BuildResult {
        let invocation = self.invocation(spec, dir);
        info!("Building {} ({})", spec.name, invocation.command_line());
        debug!("{}: {}", spec.name, ComponentState::Building);

        let start = Instant::now();
        let output = match invocation.run() {
            Ok(output) => output,
            Err(e) => {
                let mut result = BuildResult::new(&spec.name, ComponentState::Failed)
                    .with_note(format!("cannot run '{}': {}", self.tool, e));
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        let mut result = BuildResult::new(&spec.name, ComponentState::Failed);
        result.exit_code = output.exit_code;
        result.duration_ms = output.elapsed.as_millis() as u64;
        result.diagnostics = output.tail(DIAGNOSTIC_TAIL_LINES);

        if !output.success() {
            result.note = Some(format!("{} {}", self.tool, output.status_text()));
            return result;
        }

        match &spec.artifact {
            Some(artifact) => {
                let path = dir.join(artifact);
                if path.exists() {
                    result.state = ComponentState::Succeeded;
                    result.artifact = Some(path);
                } else {
                    result.note = Some(format!(
                        "build succeeded but artifact {} was not produced",
                        path.display()
                    ));
                }
            }
            None => result.state = ComponentState::Succeeded,
        }
        result
    }

    fn substitute(
        &self,
        spec: &ComponentSpec,
        plan: &HeadlessPlan,
        output_dir: &Path,
        reason: &str,
        outcome: &mut BuildOutcome,
    ) -> KilnResult<BuildResult> {
        match self.synthesize(plan, output_dir, reason, outcome) {
            Ok(stub) => Ok(BuildResult::new(&spec.name, ComponentState::Substituted)
                .with_artifact(Some(stub.archive))
                .with_note(reason)),
            Err(KilnError::Build {
                reason: failure,
                diagnostics,
                ..
            }) if !spec.required => {
                let message = format!("stub synthesis for '{}' failed: {}", spec.name, failure);
                warn!("{}", message);
                outcome.warnings.push(message);
                let mut result =
                    BuildResult::new(&spec.name, ComponentState::Failed).with_note(failure);
                result.diagnostics = diagnostics;
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    fn synthesize(
        &self,
        plan: &HeadlessPlan,
        output_dir: &Path,
        reason: &str,
        outcome: &mut BuildOutcome,
    ) -> KilnResult<StubArtifact> {
        if let Some(stub) = &outcome.stubs {
            if stub.archive.parent() == Some(output_dir) {
                return Ok(stub.clone());
            }
        }

        let stub = StubSynthesizer::new(&plan.config, &plan.staging_dir)
            .with_env(self.env.clone())
            .with_timeout(self.timeout)
            .synthesize(output_dir)?;

        warn!("{}", reason);
        outcome.warnings.push(format!("{}: {}", plan.config.component, reason));
        outcome.stubs = Some(stub.clone());
        Ok(stub)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn located(root: &Path, dirs: &[(&str, &str)]) -> LocatedTree {
        let mut tree = LocatedTree {
            root: root.to_path_buf(),
            ..LocatedTree::default()
        };
        for (name, dir) in dirs {
            let path = root.join(dir);
            fs::create_dir_all(&path).unwrap();
            tree.components.insert(name.to_string(), path);
        }
        tree
    }

    /// A builder whose "build tool" is `sh -c <script>`
    fn shell_builder() -> ComponentBuilder {
        ComponentBuilder::new("sh").with_args(vec!["-c".to_string()])
    }

    #[test]
    fn test_optional_failure_does_not_abort() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("gen", "gen"), ("main", "bin")]);
        let specs = vec![
            ComponentSpec::new("gen", "gen").optional().with_target("exit 1"),
            ComponentSpec::new("main", "bin").with_target("touch tool").with_artifact("tool"),
        ];

        let outcome = shell_builder().build_all(&specs, &tree).unwrap();
        assert_eq!(outcome.result("gen").unwrap().state, ComponentState::Failed);
        assert_eq!(outcome.result("main").unwrap().state, ComponentState::Succeeded);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_required_failure_carries_diagnostics() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("main", "bin")]);
        let specs = vec![ComponentSpec::new("main", "bin").with_target("echo 'f77: not found' >&2; exit 2")];

        match shell_builder().build_all(&specs, &tree) {
            Err(KilnError::Build {
                component,
                diagnostics,
                ..
            }) => {
                assert_eq!(component, "main");
                assert!(diagnostics.contains("f77: not found"));
            }
            other => panic!("expected Build error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_artifact_is_failure() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("main", "bin")]);
        let specs = vec![ComponentSpec::new("main", "bin").with_target("true").with_artifact("tool")];

        let err = shell_builder().build_all(&specs, &tree).unwrap_err();
        assert!(err.to_string().contains("main"));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_optional_dependent_of_failed_component_is_skipped() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("lib", "lib"), ("extra", "extra"), ("main", "bin")]);
        let specs = vec![
            ComponentSpec::new("lib", "lib").optional().with_target("exit 1"),
            ComponentSpec::new("extra", "extra")
                .optional()
                .with_dependencies(&["lib"])
                .with_target("true"),
            ComponentSpec::new("main", "bin").with_target("true"),
        ];

        let outcome = shell_builder().build_all(&specs, &tree).unwrap();
        assert_eq!(outcome.result("extra").unwrap().state, ComponentState::Skipped);
        assert_eq!(outcome.result("main").unwrap().state, ComponentState::Succeeded);
    }

    #[test]
    fn test_unlocated_component_is_skipped() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("main", "bin")]);
        let specs = vec![
            ComponentSpec::new("gen", "orrs/bin").optional().with_target("true"),
            ComponentSpec::new("main", "bin").with_target("true"),
        ];

        let outcome = shell_builder().build_all(&specs, &tree).unwrap();
        assert_eq!(outcome.result("gen").unwrap().state, ComponentState::Skipped);
    }

    #[test]
    fn test_build_env_and_timeout_applied() {
        let temp = TempDir::new().unwrap();
        let tree = located(temp.path(), &[("main", "bin")]);
        let mut env = BTreeMap::new();
        env.insert("FC".to_string(), "gfortran".to_string());
        let specs = vec![ComponentSpec::new("main", "bin")
            .with_target("echo $FC > fc.txt")
            .with_artifact("fc.txt")];

        let outcome = shell_builder()
            .with_env(env)
            .with_timeout(Some(Duration::from_secs(30)))
            .build_all(&specs, &tree)
            .unwrap();
        let artifact = outcome.result("main").unwrap().artifact.clone().unwrap();
        assert_eq!(fs::read_to_string(artifact).unwrap().trim(), "gfortran");
    }
}
