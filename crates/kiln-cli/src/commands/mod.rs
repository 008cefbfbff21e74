pub mod fetch;
pub mod init;
pub mod patch;
pub mod plan;
pub mod run;
pub mod which;

use anyhow::Result;
use kiln_config::{Config, ConfigLoader};
use std::env;
use std::path::Path;

/// Load kiln.toml from `path`, or search upward from the current directory
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    let config = match path {
        Some(path) => loader.load_from_file(path)?,
        None => loader.load_from_directory(&env::current_dir()?)?,
    };
    Ok(config)
}
