//! Run command - fetch, patch, build and install in one pass

use super::load_config;
use crate::report;
use anyhow::Result;
use kiln_build::{Pipeline, RunConfig};
use kiln_config::HeadlessMode;
use std::path::PathBuf;
use std::time::Duration;

/// Run command arguments
#[derive(Debug, Default)]
pub struct RunArgs {
    /// Explicit kiln.toml
    pub config_path: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub headless: Option<HeadlessMode>,
    /// Per-subprocess timeout in seconds; 0 disables it
    pub timeout: Option<u64>,
    pub clean: bool,
    pub dry_run: bool,
    pub no_install: bool,
    pub json: bool,
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(
    mut config: RunConfig,
    work_dir: Option<PathBuf>,
    install_dir: Option<PathBuf>,
    headless: Option<HeadlessMode>,
    timeout: Option<u64>,
) -> RunConfig {
    if let Some(dir) = work_dir {
        config = config.with_work_dir(dir);
    }
    if let Some(dir) = install_dir {
        config = config.with_install_dir(dir);
    }
    if let Some(mode) = headless {
        config = config.with_headless_mode(mode);
    }
    if let Some(secs) = timeout {
        config = config.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    config
}

/// Run the full pipeline
pub fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;
    let run_config = apply_overrides(
        RunConfig::from_config(&config),
        args.work_dir,
        args.install_dir,
        args.headless,
        args.timeout,
    )
    .with_clean(args.clean)
    .with_dry_run(args.dry_run)
    .with_install(!args.no_install);

    let summary = Pipeline::new(run_config).run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_run_summary(&summary);
    }
    Ok(())
}
