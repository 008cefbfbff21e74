//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{HeadlessMode, PathsConfig, ProjectConfig, ToolchainConfig};
use crate::{ConfigError, ConfigResult, PROJECT_FILE};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Work dir used when neither kiln.toml nor the global config names one
pub const DEFAULT_WORK_DIR: &str = "build";
/// Install dir used when neither kiln.toml nor the global config names one
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";
/// Native build tool used by default
pub const DEFAULT_BUILD_TOOL: &str = "make";
/// Default per-subprocess timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
/// Default locator depth bound
pub const DEFAULT_SEARCH_DEPTH: usize = 4;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.kiln/config.toml) - lowest priority
/// 2. Project config (./kiln.toml) - overrides global
/// 3. Environment variables (KILN_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Directory holding kiln.toml; relative paths resolve against it
    pub project_root: PathBuf,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.kiln/config.toml
    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let config_path = Self::find_project_file(start_dir)
            .ok_or_else(|| ConfigError::NotFound(start_dir.join(PROJECT_FILE)))?;
        self.load_from_file(&config_path)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find kiln.toml by walking up the directory tree
    pub fn find_project_file(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let candidate = dir.join(PROJECT_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Load global configuration from ~/.kiln/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        if self.global_config_path.is_none() {
            match GlobalConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match self.global_config_path.as_ref() {
            // Global config is optional - if it doesn't exist, return default
            Some(path) if path.exists() => GlobalConfig::load_from_file(path),
            _ => Ok(GlobalConfig::default()),
        }
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: KILN_WORK_DIR, KILN_INSTALL_DIR, KILN_BUILD_TOOL,
    /// KILN_TIMEOUT (seconds) and KILN_HEADLESS (auto|always|never).
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(work_dir) = env::var("KILN_WORK_DIR") {
            config
                .paths
                .get_or_insert_with(PathsConfig::default)
                .work_dir = Some(absolute_from_cwd(&work_dir)?);
        }

        if let Ok(install_dir) = env::var("KILN_INSTALL_DIR") {
            config
                .paths
                .get_or_insert_with(PathsConfig::default)
                .install_dir = Some(absolute_from_cwd(&install_dir)?);
        }

        if let Ok(tool) = env::var("KILN_BUILD_TOOL") {
            config
                .toolchain
                .get_or_insert_with(ToolchainConfig::default)
                .build_tool = Some(tool);
        }

        if let Ok(timeout) = env::var("KILN_TIMEOUT") {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "KILN_TIMEOUT".to_string(),
                    reason: format!("'{}' is not a number of seconds", timeout),
                })?;
            config
                .toolchain
                .get_or_insert_with(ToolchainConfig::default)
                .timeout_secs = Some(secs);
        }

        if let Ok(mode) = env::var("KILN_HEADLESS") {
            let mode: HeadlessMode = mode.parse()?;
            if let Some(headless) = config.headless.as_mut() {
                headless.mode = Some(mode);
            }
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.kiln)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kiln"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn absolute_from_cwd(value: &str) -> ConfigResult<PathBuf> {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

impl Config {
    /// Build a merged configuration from an in-memory project config
    pub fn from_project(project: ProjectConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            project,
            global: GlobalConfig::default(),
            project_root: project_root.into(),
        }
    }

    /// Resolve a configured path against the project root
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn toolchain(&self) -> Option<&ToolchainConfig> {
        self.project.toolchain.as_ref()
    }

    /// Effective working directory (project > global > default)
    pub fn work_dir(&self) -> PathBuf {
        let configured = self
            .project
            .paths
            .as_ref()
            .and_then(|p| p.work_dir.as_deref())
            .or_else(|| self.global.work_dir())
            .unwrap_or(Path::new(DEFAULT_WORK_DIR));
        self.resolve(configured)
    }

    /// Effective install directory (project > global > default)
    pub fn install_dir(&self) -> PathBuf {
        let configured = self
            .project
            .paths
            .as_ref()
            .and_then(|p| p.install_dir.as_deref())
            .or_else(|| self.global.install_dir())
            .unwrap_or(Path::new(DEFAULT_INSTALL_DIR));
        self.resolve(configured)
    }

    /// Effective native build tool
    pub fn build_tool(&self) -> &str {
        self.toolchain()
            .and_then(|t| t.build_tool.as_deref())
            .or_else(|| self.global.build_tool())
            .unwrap_or(DEFAULT_BUILD_TOOL)
    }

    /// Effective per-subprocess timeout; `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        let secs = self
            .toolchain()
            .and_then(|t| t.timeout_secs)
            .or_else(|| self.global.timeout_secs())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Effective locator depth bound
    pub fn search_depth(&self) -> usize {
        self.toolchain()
            .and_then(|t| t.search_depth)
            .or_else(|| self.global.search_depth())
            .unwrap_or(DEFAULT_SEARCH_DEPTH)
    }

    /// Effective headless policy; `Never` when no [headless] table exists
    pub fn headless_mode(&self) -> HeadlessMode {
        self.project
            .headless
            .as_ref()
            .map(|h| h.mode())
            .unwrap_or(HeadlessMode::Never)
    }
}
