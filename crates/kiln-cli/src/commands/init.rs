//! Project initialization command (kiln init)

use anyhow::{bail, Context, Result};
use colored::Colorize;
use kiln_config::{Preset, PROJECT_FILE};
use std::fs;
use std::path::PathBuf;

/// Arguments for the init command
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Directory to write kiln.toml into
    pub path: PathBuf,
    pub preset: Preset,
    /// Overwrite an existing kiln.toml
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let target = args.path.join(PROJECT_FILE);
    if target.exists() && !args.force {
        bail!(
            "{} already exists at {} (use --force to overwrite)",
            PROJECT_FILE,
            target.display()
        );
    }

    fs::create_dir_all(&args.path)
        .with_context(|| format!("Failed to create {}", args.path.display()))?;
    fs::write(&target, args.preset.render())
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!(
        "{} Created {} from the '{}' preset",
        "\u{2713}".green(),
        target.display(),
        args.preset
    );
    println!("\nNext steps:");
    println!("  kiln plan     Review the build order and patch rules");
    println!("  kiln run      Fetch, patch, build and install");
    Ok(())
}
