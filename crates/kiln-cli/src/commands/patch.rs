//! Patch command - locate components and rewrite build files

use super::load_config;
use crate::report;
use anyhow::Result;
use kiln_build::{Pipeline, RunConfig};
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct PatchArgs {
    pub config_path: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    /// Report the files that would change without writing them
    pub dry_run: bool,
    pub json: bool,
}

pub fn run(args: PatchArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;
    let mut run_config = RunConfig::from_config(&config).with_dry_run(args.dry_run);
    if let Some(dir) = args.work_dir {
        run_config = run_config.with_work_dir(dir);
    }

    let (located, patch) = Pipeline::new(run_config).patch()?;

    if args.json {
        let value = serde_json::json!({
            "located": located,
            "patch": patch,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        report::print_located(&located);
        report::print_patch(&patch);
    }
    Ok(())
}
