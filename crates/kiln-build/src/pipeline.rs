//! The run pipeline: lock, fetch, locate, patch, build, install
use crate::build_order::ordered_specs;
use crate::builder::{ComponentBuilder, HeadlessPlan};
use crate::component::ComponentSpec;
use crate::error::{KilnError, KilnResult};
use crate::headless::HeadlessDecision;
use crate::installer::Installer;
use crate::locator::{LocatedTree, SourceTree};
use crate::lock::RunLock;
use crate::patch::{PatchReport, Patcher};
use crate::report::{PlanReport, PlannedComponent, PlannedHeadless, RunSummary};
use kiln_config::{Config, HeadlessConfig, HeadlessMode, PatchConfig};
use kiln_fetch::{ArchiveSource, FetchOutcome, FetchRequest, Fetcher, STATE_DIR};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Archive URL or path as configured
    pub source: String,
    pub archive_name: Option<String>,
    pub sha256: Option<String>,
    /// Base for relative source paths
    pub project_root: PathBuf,
    pub work_dir: PathBuf,
    pub install_dir: PathBuf,
    pub components: Vec<ComponentSpec>,
    pub patch: PatchConfig,
    pub headless: Option<HeadlessConfig>,
    pub headless_mode: HeadlessMode,
    pub build_tool: String,
    pub build_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub search_depth: usize,
    /// Remove the extracted tree before fetching
    pub clean: bool,
    /// Stop after reporting what patching would change
    pub dry_run: bool,
    /// Copy artifacts to the install dir
    pub install: bool,
}

impl RunConfig {
    /// Resolve a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let project = &config.project;
        let toolchain = project.toolchain.clone().unwrap_or_default();

        Self {
            source: project.source.url.clone(),
            archive_name: project.source.archive.clone(),
            sha256: project.source.sha256.clone(),
            project_root: config.project_root.clone(),
            work_dir: config.work_dir(),
            install_dir: config.install_dir(),
            components: project.components.iter().map(ComponentSpec::from).collect(),
            patch: project.patch.clone(),
            headless: project.headless.clone(),
            headless_mode: config.headless_mode(),
            build_tool: config.build_tool().to_string(),
            build_args: toolchain.build_args,
            env: toolchain.env,
            timeout: config.timeout(),
            search_depth: config.search_depth(),
            clean: false,
            dry_run: false,
            install: true,
        }
    }

    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn with_install_dir(mut self, install_dir: PathBuf) -> Self {
        self.install_dir = install_dir;
        self
    }

    /// Override the headless policy; ignored without a `[headless]` table
    pub fn with_headless_mode(mut self, mode: HeadlessMode) -> Self {
        if self.headless.is_some() {
            self.headless_mode = mode;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    fn fetch_request(&self) -> KilnResult<FetchRequest> {
        let source = ArchiveSource::parse(&self.source, &self.project_root)?;
        Ok(FetchRequest::new(source, self.archive_name.clone())?.with_sha256(self.sha256.clone()))
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher::new(&self.work_dir).with_timeout(self.timeout)
    }

    fn headless_decision(&self) -> Option<HeadlessDecision> {
        self.headless
            .as_ref()
            .map(|h| HeadlessDecision::resolve(self.headless_mode, &h.probes()))
    }
}

/// Executes a [`RunConfig`]
pub struct Pipeline {
    config: RunConfig,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Describe the run without touching the filesystem
    pub fn plan(&self) -> KilnResult<PlanReport> {
        let ordered = ordered_specs(&self.config.components)?;
        let headless = match (&self.config.headless, self.config.headless_decision()) {
            (Some(h), Some(decision)) => Some(PlannedHeadless {
                component: h.component.clone(),
                mode: self.config.headless_mode.to_string(),
                decision,
                archive: h.archive.clone(),
                aliases: h.aliases.clone(),
                symbols: h.symbols.len(),
            }),
            _ => None,
        };

        Ok(PlanReport {
            source: self.config.source.clone(),
            work_dir: self.config.work_dir.clone(),
            install_dir: self.config.install_dir.clone(),
            build_tool: self.config.build_tool.clone(),
            order: ordered.iter().map(PlannedComponent::from).collect(),
            patch_files: self.config.patch.effective_files(),
            rules: self.config.patch.rules.iter().map(|r| r.name.clone()).collect(),
            headless,
        })
    }

    /// Fetch and extract only
    pub fn fetch(&self) -> KilnResult<FetchOutcome> {
        let _lock = RunLock::acquire(&self.config.work_dir)?;
        self.fetch_locked()
    }

    /// Fetch, locate and patch; honours `dry_run`
    pub fn patch(&self) -> KilnResult<(LocatedTree, PatchReport)> {
        let ordered = ordered_specs(&self.config.components)?;
        let _lock = RunLock::acquire(&self.config.work_dir)?;
        let fetched = self.fetch_locked()?;
        let located = self.locate(&ordered, &fetched)?;
        let report = self.patch_tree(&located, &fetched)?;
        Ok((located, report))
    }

    /// Run every step
    pub fn run(&self) -> KilnResult<RunSummary> {
        let config = &self.config;
        let mut summary = RunSummary::new(
            config.work_dir.clone(),
            config.install_dir.clone(),
            config.dry_run,
        );

        let ordered = ordered_specs(&config.components)?;
        let _lock = RunLock::acquire(&config.work_dir)?;

        let start = Instant::now();
        let fetched = self.fetch_locked()?;
        summary.record_step("fetch", start);

        let start = Instant::now();
        let located = self.locate(&ordered, &fetched)?;
        for name in &located.missing {
            summary.warn(format!("optional component '{}' not found in source tree", name));
        }
        summary.record_step("locate", start);

        let start = Instant::now();
        let patch = self.patch_tree(&located, &fetched)?;
        summary.warnings.extend(patch.warnings.iter().cloned());
        summary.record_step("patch", start);

        summary.fetch = Some(fetched);
        summary.patch = Some(patch);

        if config.dry_run {
            info!("Dry run: stopping before build");
            summary.located = Some(located);
            return Ok(summary);
        }

        let decision = config.headless_decision();
        summary.headless = decision;
        let headless_plan = match (&config.headless, decision) {
            (Some(h), Some(decision)) => {
                info!("Headless policy for '{}': {:?}", h.component, decision);
                Some(HeadlessPlan {
                    config: h.clone(),
                    decision,
                    staging_dir: config
                        .work_dir
                        .join(STATE_DIR)
                        .join("headless")
                        .join(&h.component),
                })
            }
            _ => None,
        };

        let start = Instant::now();
        let outcome = ComponentBuilder::new(&config.build_tool)
            .with_args(config.build_args.clone())
            .with_env(config.env.clone())
            .with_timeout(config.timeout)
            .with_headless(headless_plan)
            .build_all(&ordered, &located)?;
        summary.record_step("build", start);
        summary.warnings.extend(outcome.warnings);
        summary.builds = outcome.results;
        summary.stubs = outcome.stubs;
        summary.located = Some(located);

        if !config.install {
            info!("Skipping install");
            return Ok(summary);
        }

        let start = Instant::now();
        let (records, warnings) =
            Installer::new(&config.install_dir).install_all(&ordered, &summary.builds)?;
        summary.record_step("install", start);
        summary.installs = records;
        summary.warnings.extend(warnings);

        for spec in ordered.iter().filter(|s| s.required && s.install) {
            if !summary.installs.iter().any(|r| r.component == spec.name) {
                let diagnostics = summary
                    .build(&spec.name)
                    .map(|b| b.diagnostics.clone())
                    .unwrap_or_default();
                return Err(KilnError::build(
                    &spec.name,
                    "required artifact was not installed",
                    diagnostics,
                ));
            }
        }

        info!(
            "Run complete: {} installed, {} warning(s)",
            summary.installs.len(),
            summary.warnings.len()
        );
        Ok(summary)
    }

    fn fetch_locked(&self) -> KilnResult<FetchOutcome> {
        let request = self.config.fetch_request()?;
        let fetcher = self.config.fetcher();
        if self.config.clean {
            fetcher.clean()?;
        }
        Ok(fetcher.fetch(&request)?)
    }

    fn locate(&self, ordered: &[ComponentSpec], fetched: &FetchOutcome) -> KilnResult<LocatedTree> {
        SourceTree::new(&fetched.source_dir, self.config.search_depth).locate(ordered)
    }

    fn patch_tree(&self, located: &LocatedTree, fetched: &FetchOutcome) -> KilnResult<PatchReport> {
        Patcher::from_config(&self.config.patch, located)?
            .with_dry_run(self.config.dry_run)
            .patch_tree(&fetched.source_dir)
    }
}
