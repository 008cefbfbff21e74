//! Plan command - show what a run would do without touching the filesystem

use super::load_config;
use super::run::apply_overrides;
use crate::report;
use anyhow::Result;
use kiln_build::{Pipeline, RunConfig};
use kiln_config::HeadlessMode;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct PlanArgs {
    pub config_path: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub headless: Option<HeadlessMode>,
    pub json: bool,
}

pub fn run(args: PlanArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;
    let run_config = apply_overrides(
        RunConfig::from_config(&config),
        args.work_dir,
        args.install_dir,
        args.headless,
        None,
    );

    let plan = Pipeline::new(run_config).plan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        report::print_plan(&plan);
    }
    Ok(())
}
