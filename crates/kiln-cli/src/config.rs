//! CLI configuration via environment variables

use std::env;

/// CLI settings read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Default to JSON output (KILN_JSON=1)
    pub default_json: bool,
    /// Disable colored output (KILN_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            default_json: env::var("KILN_JSON")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            no_color: env::var_os("KILN_NO_COLOR").is_some() || env::var_os("NO_COLOR").is_some(),
        }
    }

    /// Apply the color preference to `colored`
    pub fn apply_color(&self) {
        if self.no_color {
            colored::control::set_override(false);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "json"
    )
}
