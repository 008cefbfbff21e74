//! Buildable components and their per-run outcomes
use kiln_config::ComponentConfig;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// One buildable unit of the vendored tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSpec {
    /// Logical name
    pub name: String,
    /// Case-insensitive directory pattern
    pub pattern: String,
    /// Build target; the tool's default target when `None`
    pub target: Option<String>,
    /// Artifact expected after the build, relative to the component dir
    pub artifact: Option<PathBuf>,
    /// Whether a failure aborts the run
    pub required: bool,
    /// Components built first
    pub depends_on: Vec<String>,
    /// Whether the artifact is copied to the install dir
    pub install: bool,
    /// File name in the install dir
    pub install_name: Option<String>,
    /// Post-install smoke test arguments
    pub verify_args: Vec<String>,
    /// Post-install smoke test stdin
    pub verify_stdin: Option<String>,
    /// Extra build tool arguments
    pub build_args: Vec<String>,
}

impl ComponentSpec {
    /// Create a required component with no target or artifact
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            target: None,
            artifact: None,
            required: true,
            depends_on: Vec::new(),
            install: false,
            install_name: None,
            verify_args: Vec::new(),
            verify_stdin: None,
            build_args: Vec::new(),
        }
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.depends_on = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the expected artifact; required components with an artifact install it
    pub fn with_artifact(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self.install = self.required;
        self
    }

    pub fn with_install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    /// Name of the installed file, if this component installs anything
    pub fn install_file_name(&self) -> Option<String> {
        if let Some(name) = &self.install_name {
            return Some(name.clone());
        }
        self.artifact
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }
}

impl From<&ComponentConfig> for ComponentSpec {
    fn from(config: &ComponentConfig) -> Self {
        Self {
            name: config.name.clone(),
            pattern: config.pattern.clone(),
            target: config.target.clone(),
            artifact: config.artifact.clone(),
            required: config.required,
            depends_on: config.depends_on.clone(),
            install: config.installs(),
            install_name: config.install_name.clone(),
            verify_args: config.verify_args.clone(),
            verify_stdin: config.verify_stdin.clone(),
            build_args: config.build_args.clone(),
        }
    }
}

/// Lifecycle of a component within one run
///
/// `Pending -> Building -> {Succeeded, Failed}`; `Skipped` when its directory
/// or a dependency is unavailable, `Substituted` when headless stubs stand in
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Pending,
    Building,
    Succeeded,
    Failed,
    Skipped,
    Substituted,
}

impl ComponentState {
    /// Whether dependents can link against this component
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Substituted)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Substituted => "substituted",
        };
        f.write_str(s)
    }
}

/// Outcome of one component's build step
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub component: String,
    pub state: ComponentState,
    /// Produced artifact, absolute
    pub artifact: Option<PathBuf>,
    /// Captured diagnostic tail
    pub diagnostics: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Why the component ended in this state, when not a plain success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BuildResult {
    pub fn new(component: impl Into<String>, state: ComponentState) -> Self {
        Self {
            component: component.into(),
            state,
            artifact: None,
            diagnostics: String::new(),
            exit_code: None,
            duration_ms: 0,
            note: None,
        }
    }

    pub fn skipped(component: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(component, ComponentState::Skipped).with_note(note)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn success(&self) -> bool {
        self.state.is_available()
    }
}
