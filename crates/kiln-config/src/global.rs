//! Global Configuration (~/.kiln/config.toml)
//!
//! Handles user-level defaults shared by every project on the machine.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.kiln/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Machine-wide defaults, overridden by kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Default working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Default install directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// Default build tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_tool: Option<String>,

    /// Default per-subprocess timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Default locator depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_depth: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })
    }

    /// Get the path to the global configuration file
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kiln").join("config.toml"))
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.defaults.as_ref().and_then(|d| d.work_dir.as_deref())
    }

    pub fn install_dir(&self) -> Option<&Path> {
        self.defaults.as_ref().and_then(|d| d.install_dir.as_deref())
    }

    pub fn build_tool(&self) -> Option<&str> {
        self.defaults.as_ref().and_then(|d| d.build_tool.as_deref())
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.defaults.as_ref().and_then(|d| d.timeout_secs)
    }

    pub fn search_depth(&self) -> Option<usize> {
        self.defaults.as_ref().and_then(|d| d.search_depth)
    }
}
