//! Which command - locate an installed executable
//!
//! Lookup order: `<NAME>_PATH`, the configured install dir, then `PATH`.

use super::load_config;
use anyhow::{bail, Result};
use kiln_build::ComponentSpec;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct WhichArgs {
    pub config_path: Option<PathBuf>,
    /// Component name or executable file name
    pub name: String,
    pub install_dir: Option<PathBuf>,
    pub json: bool,
}

/// Where an executable was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Env,
    InstallDir,
    SearchPath,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::InstallDir => "install-dir",
            Self::SearchPath => "path",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    pub origin: Origin,
}

/// Override variable for `executable`, e.g. `XFOIL_PATH`
pub fn env_var_name(executable: &str) -> String {
    let mut name: String = executable
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    name.push_str("_PATH");
    name
}

/// Resolve `executable` from an override value, an install dir and a search path
pub fn resolve(
    executable: &str,
    env_override: Option<OsString>,
    install_dir: Option<&Path>,
    search_path: Option<OsString>,
) -> Result<Option<Resolved>> {
    if let Some(value) = env_override.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        if !path.is_file() {
            bail!(
                "{} points to {}, which is not a file",
                env_var_name(executable),
                path.display()
            );
        }
        return Ok(Some(Resolved {
            path,
            origin: Origin::Env,
        }));
    }

    if let Some(dir) = install_dir {
        if let Some(path) = find_in(executable, dir.as_os_str()) {
            return Ok(Some(Resolved {
                path,
                origin: Origin::InstallDir,
            }));
        }
    }

    Ok(search_path
        .and_then(|paths| find_in(executable, &paths))
        .map(|path| Resolved {
            path,
            origin: Origin::SearchPath,
        }))
}

/// First executable named `executable` in a `PATH`-style directory list
fn find_in(executable: &str, dirs: &OsStr) -> Option<PathBuf> {
    which::which_in(executable, Some(dirs), ".").ok()
}

pub fn run(args: WhichArgs) -> Result<()> {
    // Outside a project only the env override and PATH apply
    let config = match args.config_path.as_deref() {
        Some(path) => Some(load_config(Some(path))?),
        None => load_config(None).ok(),
    };

    let executable = config
        .as_ref()
        .and_then(|c| c.project.component(&args.name))
        .and_then(|c| ComponentSpec::from(c).install_file_name())
        .unwrap_or_else(|| args.name.clone());
    let install_dir = args
        .install_dir
        .clone()
        .or_else(|| config.as_ref().map(|c| c.install_dir()));

    let variable = env_var_name(&executable);
    let resolved = resolve(
        &executable,
        env::var_os(&variable),
        install_dir.as_deref(),
        env::var_os("PATH"),
    )?;

    let Some(resolved) = resolved else {
        bail!(
            "'{}' not found: set {}, install it with `kiln run`, or add it to PATH",
            executable,
            variable
        );
    };

    if args.json {
        let value = serde_json::json!({
            "name": args.name,
            "executable": executable,
            "path": resolved.path,
            "origin": resolved.origin.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", resolved.path.display());
    }
    Ok(())
}
