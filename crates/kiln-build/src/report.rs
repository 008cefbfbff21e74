//! Run summaries
use crate::component::{BuildResult, ComponentSpec, ComponentState};
use crate::headless::{HeadlessDecision, StubArtifact};
use crate::installer::InstallRecord;
use crate::locator::LocatedTree;
use crate::patch::PatchReport;
use kiln_fetch::FetchOutcome;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Wall time of one pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub step: String,
    pub millis: u64,
}

/// Everything a run did, in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub work_dir: PathBuf,
    pub install_dir: PathBuf,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<HeadlessDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub located: Option<LocatedTree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchReport>,
    pub builds: Vec<BuildResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stubs: Option<StubArtifact>,
    pub installs: Vec<InstallRecord>,
    pub warnings: Vec<String>,
    pub timings: Vec<StepTiming>,
}

impl RunSummary {
    pub fn new(work_dir: PathBuf, install_dir: PathBuf, dry_run: bool) -> Self {
        Self {
            work_dir,
            install_dir,
            dry_run,
            ..Self::default()
        }
    }

    /// Record how long a step took since `start`
    pub fn record_step(&mut self, step: &str, start: Instant) {
        self.timings.push(StepTiming {
            step: step.to_string(),
            millis: start.elapsed().as_millis() as u64,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn build(&self, component: &str) -> Option<&BuildResult> {
        self.builds.iter().find(|b| b.component == component)
    }

    /// Components that ended in `state`
    pub fn components_in(&self, state: ComponentState) -> Vec<&str> {
        self.builds
            .iter()
            .filter(|b| b.state == state)
            .map(|b| b.component.as_str())
            .collect()
    }

    pub fn total_millis(&self) -> u64 {
        self.timings.iter().map(|t| t.millis).sum()
    }
}

/// Side-effect-free description of what a run would do
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub source: String,
    pub work_dir: PathBuf,
    pub install_dir: PathBuf,
    pub build_tool: String,
    /// Components in build order
    pub order: Vec<PlannedComponent>,
    pub patch_files: Vec<String>,
    pub rules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<PlannedHeadless>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedComponent {
    pub name: String,
    pub pattern: String,
    pub target: Option<String>,
    pub required: bool,
    pub depends_on: Vec<String>,
    /// Installed file name, when the component installs
    pub installs_as: Option<String>,
}

impl From<&ComponentSpec> for PlannedComponent {
    fn from(spec: &ComponentSpec) -> Self {
        Self {
            name: spec.name.clone(),
            pattern: spec.pattern.clone(),
            target: spec.target.clone(),
            required: spec.required,
            depends_on: spec.depends_on.clone(),
            installs_as: if spec.install {
                spec.install_file_name()
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedHeadless {
    pub component: String,
    pub mode: String,
    pub decision: HeadlessDecision,
    pub archive: String,
    pub aliases: Vec<String>,
    pub symbols: usize,
}
