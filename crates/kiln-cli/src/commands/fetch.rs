//! Fetch command - download and extract the source archive only

use super::load_config;
use crate::report;
use anyhow::Result;
use kiln_build::{Pipeline, RunConfig};
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct FetchArgs {
    pub config_path: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    /// Remove the extracted tree first
    pub clean: bool,
    pub json: bool,
}

pub fn run(args: FetchArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;
    let mut run_config = RunConfig::from_config(&config).with_clean(args.clean);
    if let Some(dir) = args.work_dir {
        run_config = run_config.with_work_dir(dir);
    }

    let outcome = Pipeline::new(run_config).fetch()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        report::print_fetch(&outcome);
    }
    Ok(())
}
