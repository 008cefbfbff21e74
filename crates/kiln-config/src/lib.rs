//! Kiln Configuration System
//!
//! Provides configuration management for kiln runs including:
//! - Project configuration (kiln.toml): source archive, components, patch rules
//! - Global user configuration (~/.kiln/config.toml)
//! - Configuration precedence and merging
//! - Starter presets written by `kiln init`
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.kiln/config.toml)
//! 2. Project config (./kiln.toml)
//! 3. Environment variables (KILN_*)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{} components", config.project.components.len());
//! ```

pub mod global;
pub mod loader;
pub mod preset;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Patch rule '{rule}' is not idempotent: its replacement matches its own pattern")]
    NonIdempotentRule { rule: String },

    #[error("Patch rule '{rule}' does not converge: a second pass changes {sample:?} again")]
    NonConvergingRule { rule: String, sample: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the project configuration file
pub const PROJECT_FILE: &str = "kiln.toml";

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use preset::Preset;
pub use project::{
    ComponentConfig, HeadlessConfig, HeadlessMode, PatchConfig, PatchRuleConfig, PathsConfig,
    ProjectConfig, ReturnKind, SourceConfig, StubLanguage, SymbolConfig, ToolchainConfig,
};
