//! Project Configuration (kiln.toml)
//!
//! Describes one vendored source tree: where its archive comes from, which
//! components live inside it, how their build files are rewritten for the host
//! toolchain, and how a graphics library is stubbed out on headless hosts.

use crate::{ConfigError, ConfigResult};
use globset::{GlobBuilder, GlobMatcher};
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Build-configuration file globs patched when `[patch].files` is not set
pub const DEFAULT_PATCH_FILES: &[&str] = &["makefile*", "config.make*"];

/// Header probed in `auto` headless mode when `[headless].probe` is not set
pub const DEFAULT_DISPLAY_PROBE: &str = "/usr/include/X11/Xlib.h";

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Upstream source archive
    pub source: SourceConfig,

    /// Working and install directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsConfig>,

    /// Native build tool settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainConfig>,

    /// Buildable units inside the source tree
    #[serde(default, rename = "component", skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentConfig>,

    /// Build-configuration rewrite rules
    #[serde(default)]
    pub patch: PatchConfig,

    /// Headless graphics substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<HeadlessConfig>,
}

/// Source archive location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// http(s):// URL, file:// URL or local path
    pub url: String,

    /// Archive file name inside the work dir (default: last URL segment)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,

    /// Expected SHA-256 of the archive, lowercase hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Directories used by a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Working directory holding the archive and extracted tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Directory receiving installed executables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

/// Native build tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Build tool executable (default: "make")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_tool: Option<String>,

    /// Arguments placed before every build target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_args: Vec<String>,

    /// Per-subprocess timeout in seconds; 0 disables it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Directory depth searched by the locator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_depth: Option<usize>,

    /// Extra environment for build steps
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// One buildable unit of the vendored tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    /// Logical name ("plotlib", "generator", "main")
    pub name: String,

    /// Case-insensitive glob matched against trailing directory segments
    pub pattern: String,

    /// Build target passed to the build tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Artifact expected after a successful build, relative to the component dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,

    /// Whether a failure aborts the run
    #[serde(default = "default_required")]
    pub required: bool,

    /// Components that must be built first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Whether the artifact is installed (default: required and has an artifact)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<bool>,

    /// File name in the install dir (default: artifact file name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_name: Option<String>,

    /// Arguments for the post-install smoke test
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify_args: Vec<String>,

    /// Stdin fed to the post-install smoke test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_stdin: Option<String>,

    /// Component-specific build tool arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_args: Vec<String>,
}

fn default_required() -> bool {
    true
}

impl ComponentConfig {
    /// Create a required component with no target or artifact
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            target: None,
            artifact: None,
            required: true,
            depends_on: Vec::new(),
            install: None,
            install_name: None,
            verify_args: Vec::new(),
            verify_stdin: None,
            build_args: Vec::new(),
        }
    }

    /// Whether the artifact of this component is copied to the install dir
    pub fn installs(&self) -> bool {
        self.install
            .unwrap_or(self.required && self.artifact.is_some())
    }
}

/// Patch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    /// Build-configuration file globs (case-insensitive)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Ordered rewrite rules
    #[serde(default, rename = "rule", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PatchRuleConfig>,
}

impl PatchConfig {
    /// File globs in effect, falling back to the defaults
    pub fn effective_files(&self) -> Vec<String> {
        if self.files.is_empty() {
            DEFAULT_PATCH_FILES.iter().map(|s| s.to_string()).collect()
        } else {
            self.files.clone()
        }
    }
}

/// A single search/replace rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PatchRuleConfig {
    /// Rule name used in reports
    pub name: String,

    /// Regular expression (or literal text when `literal = true`)
    pub pattern: String,

    /// Replacement; `${1}` style capture references unless literal
    pub replacement: String,

    /// Treat pattern and replacement as plain text
    #[serde(default)]
    pub literal: bool,

    /// Match case-insensitively
    #[serde(default)]
    pub case_insensitive: bool,

    /// Restrict the rule to these components' directories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,

    /// File globs overriding `[patch].files` for this rule
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Sample text the rule must rewrite once and then leave alone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl PatchRuleConfig {
    /// Create a regex rule
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            literal: false,
            case_insensitive: false,
            components: Vec::new(),
            files: Vec::new(),
            example: None,
        }
    }

    /// Create a literal text rule
    pub fn literal(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            literal: true,
            ..Self::new(name, pattern, replacement)
        }
    }

    /// Compile the search pattern
    pub fn compile_pattern(&self) -> Result<Regex, regex::Error> {
        let source = if self.literal {
            regex::escape(&self.pattern)
        } else {
            self.pattern.clone()
        };
        RegexBuilder::new(&source)
            .case_insensitive(self.case_insensitive)
            .build()
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Whether the replacement expands capture groups
    pub fn uses_captures(&self) -> bool {
        !self.literal && self.replacement.contains('$')
    }

    /// Rewrite `text` with a pattern compiled by [`Self::compile_pattern`]
    pub fn rewrite(&self, regex: &Regex, text: &str) -> String {
        if self.literal {
            regex
                .replace_all(text, NoExpand(&self.replacement))
                .into_owned()
        } else {
            regex
                .replace_all(text, self.replacement.as_str())
                .into_owned()
        }
    }

    /// Whether a second pass over `sample` changes it again
    fn diverges_on(&self, regex: &Regex, sample: &str) -> bool {
        let once = self.rewrite(regex, sample);
        self.rewrite(regex, &once) != once
    }
}

/// When to substitute the graphics component with stubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeadlessMode {
    /// Substitute when no display probe exists or the real build fails
    #[default]
    Auto,
    /// Always substitute, never build the real component
    Always,
    /// Never substitute
    Never,
}

impl FromStr for HeadlessMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "on" | "yes" | "true" | "1" => Ok(Self::Always),
            "never" | "off" | "no" | "false" | "0" => Ok(Self::Never),
            other => Err(ConfigError::InvalidValue {
                field: "headless.mode".to_string(),
                reason: format!("expected auto, always or never, got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for HeadlessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Language of the generated stub source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StubLanguage {
    #[default]
    Fortran,
    C,
}

impl StubLanguage {
    /// Compiler used when `[headless].compiler` is not set
    pub fn default_compiler(&self) -> &'static str {
        match self {
            Self::Fortran => "gfortran",
            Self::C => "cc",
        }
    }

    /// Source file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Fortran => "f90",
            Self::C => "c",
        }
    }
}

/// Return type of a stub function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    Integer,
    Real,
    Double,
    Logical,
}

/// Headless substitution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeadlessConfig {
    /// Substitution policy (default: auto)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<HeadlessMode>,

    /// Library component replaced by the stub archive
    pub component: String,

    /// Files whose presence indicates a usable display stack
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe: Vec<PathBuf>,

    /// Stub source language
    #[serde(default)]
    pub language: StubLanguage,

    /// Compiler for the stub source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    /// Archiver producing the static library (default: "ar")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver: Option<String>,

    /// Archive file name the dependent link step expects
    pub archive: String,

    /// Additional names resolving to the same archive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Symbols the dependent components link against
    #[serde(default, rename = "symbol", skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<SymbolConfig>,
}

impl HeadlessConfig {
    /// Effective substitution policy
    pub fn mode(&self) -> HeadlessMode {
        self.mode.unwrap_or_default()
    }

    /// Effective display probes
    pub fn probes(&self) -> Vec<PathBuf> {
        if self.probe.is_empty() {
            vec![PathBuf::from(DEFAULT_DISPLAY_PROBE)]
        } else {
            self.probe.clone()
        }
    }

    /// Effective stub compiler
    pub fn compiler(&self) -> &str {
        self.compiler
            .as_deref()
            .unwrap_or_else(|| self.language.default_compiler())
    }

    /// Effective archiver
    pub fn archiver(&self) -> &str {
        self.archiver.as_deref().unwrap_or("ar")
    }
}

/// A stubbed link-time symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SymbolConfig {
    /// Symbol name as written in the calling source
    pub name: String,

    /// Dummy argument names, in call order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Function return type; subroutine when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<ReturnKind>,
}

impl SymbolConfig {
    /// Create a subroutine symbol
    pub fn subroutine(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            returns: None,
        }
    }
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("cannot serialize config: {}", e)))
    }

    /// Look up a component by name
    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source.url".to_string(),
                reason: "url cannot be empty".to_string(),
            });
        }

        if let Some(sha) = &self.source.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::InvalidValue {
                    field: "source.sha256".to_string(),
                    reason: "expected 64 hex digits".to_string(),
                });
            }
        }

        self.validate_components()?;
        self.validate_patch()?;

        if let Some(headless) = &self.headless {
            self.validate_headless(headless)?;
        }

        Ok(())
    }

    fn validate_components(&self) -> ConfigResult<()> {
        if self.components.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[component]] is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for component in &self.components {
            if component.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "component.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            if !names.insert(component.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate component '{}'",
                    component.name
                )));
            }
            segment_matchers(&component.pattern).map_err(|reason| ConfigError::InvalidValue {
                field: format!("component '{}' pattern", component.name),
                reason,
            })?;
        }

        for component in &self.components {
            for dep in &component.depends_on {
                if dep == &component.name {
                    return Err(ConfigError::ValidationError(format!(
                        "component '{}' depends on itself",
                        component.name
                    )));
                }
                if !names.contains(dep.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "component '{}' depends on unknown component '{}'",
                        component.name, dep
                    )));
                }
            }
        }

        if !self.components.iter().any(|c| c.required) {
            return Err(ConfigError::ValidationError(
                "at least one component must be required".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_patch(&self) -> ConfigResult<()> {
        for glob in &self.patch.files {
            file_matcher(glob).map_err(|reason| ConfigError::InvalidValue {
                field: "patch.files".to_string(),
                reason,
            })?;
        }

        for rule in &self.patch.rules {
            let regex = rule.compile_pattern().map_err(|e| ConfigError::InvalidValue {
                field: format!("patch rule '{}' pattern", rule.name),
                reason: e.to_string(),
            })?;

            // Without capture references the replacement is inserted verbatim,
            // so a pattern matching it would fire again on the next run.
            if !rule.uses_captures() && regex.is_match(&rule.replacement) {
                return Err(ConfigError::NonIdempotentRule {
                    rule: rule.name.clone(),
                });
            }

            // Capture rules are checked by running them twice
            for sample in std::iter::once(&rule.replacement).chain(rule.example.as_ref()) {
                if rule.diverges_on(&regex, sample) {
                    return Err(ConfigError::NonConvergingRule {
                        rule: rule.name.clone(),
                        sample: sample.clone(),
                    });
                }
            }
            if let Some(example) = &rule.example {
                if !regex.is_match(example) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("patch rule '{}' example", rule.name),
                        reason: "the pattern does not match it".to_string(),
                    });
                }
            }

            for component in &rule.components {
                if self.component(component).is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "patch rule '{}' names unknown component '{}'",
                        rule.name, component
                    )));
                }
            }

            for glob in &rule.files {
                file_matcher(glob).map_err(|reason| ConfigError::InvalidValue {
                    field: format!("patch rule '{}' files", rule.name),
                    reason,
                })?;
            }
        }

        Ok(())
    }

    fn validate_headless(&self, headless: &HeadlessConfig) -> ConfigResult<()> {
        if self.component(&headless.component).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "headless component '{}' is not declared",
                headless.component
            )));
        }

        if headless.archive.trim().is_empty() || headless.archive.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "headless.archive".to_string(),
                reason: "expected a bare file name".to_string(),
            });
        }

        for alias in &headless.aliases {
            if alias.trim().is_empty() || alias.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: "headless.aliases".to_string(),
                    reason: format!("'{}' is not a bare file name", alias),
                });
            }
        }

        if headless.symbols.is_empty() {
            return Err(ConfigError::ValidationError(
                "headless substitution needs at least one [[headless.symbol]]".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for symbol in &headless.symbols {
            if !is_identifier(&symbol.name) {
                return Err(ConfigError::InvalidValue {
                    field: "headless.symbol.name".to_string(),
                    reason: format!("'{}' is not a valid identifier", symbol.name),
                });
            }
            if !seen.insert(symbol.name.to_ascii_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate headless symbol '{}'",
                    symbol.name
                )));
            }
            if let Some(bad) = symbol.args.iter().find(|a| !is_identifier(a)) {
                return Err(ConfigError::InvalidValue {
                    field: format!("headless symbol '{}' args", symbol.name),
                    reason: format!("'{}' is not a valid identifier", bad),
                });
            }
        }

        Ok(())
    }
}

/// Build a case-insensitive matcher for a build-configuration file name glob
pub fn file_matcher(glob: &str) -> Result<GlobMatcher, String> {
    GlobBuilder::new(glob)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| e.to_string())
}

/// Split a component pattern into per-segment case-insensitive matchers
///
/// `"orrs/bin"` yields two matchers that must match the last two path
/// segments of a candidate directory, in order.
pub fn segment_matchers(pattern: &str) -> Result<Vec<GlobMatcher>, String> {
    let segments: Vec<&str> = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err("pattern cannot be empty".to_string());
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err("pattern cannot contain '.' or '..' segments".to_string());
    }
    segments.into_iter().map(file_matcher).collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[source]
url = "https://example.org/tool.tgz"

[[component]]
name = "main"
pattern = "bin"
"#;

    #[test]
    fn test_parse_minimal_project_config() {
        let config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.components.len(), 1);
        assert!(config.components[0].required);
        assert!(config.patch.rules.is_empty());
    }

    #[test]
    fn test_installs_defaults_to_required_with_artifact() {
        let mut component = ComponentConfig::new("main", "bin");
        assert!(!component.installs());
        component.artifact = Some(PathBuf::from("tool"));
        assert!(component.installs());
        component.required = false;
        assert!(!component.installs());
        component.install = Some(true);
        assert!(component.installs());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.components[0].depends_on = vec!["ghost".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.components.push(ComponentConfig::new("main", "src"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_optional_rejected() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.components[0].required = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_self_matching_literal_rule_rejected() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config
            .patch
            .rules
            .push(PatchRuleConfig::literal("opt", "-O", "-O2"));
        match config.validate() {
            Err(ConfigError::NonIdempotentRule { rule }) => assert_eq!(rule, "opt"),
            other => panic!("expected NonIdempotentRule, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_rule_skips_static_check() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.patch.rules.push(
            PatchRuleConfig::new("fc", r"(?m)^(FC\s*=\s*)f77$", "${1}gfortran")
                .with_example("FC = f77\n"),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_growing_capture_rule_rejected_by_example() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.patch.rules.push(
            PatchRuleConfig::new(
                "mismatch",
                r"(?m)^(FFLAGS\s*=.*)$",
                "${1} -fallow-argument-mismatch",
            )
            .with_example("FFLAGS = -O\n"),
        );
        match config.validate() {
            Err(ConfigError::NonConvergingRule { rule, sample }) => {
                assert_eq!(rule, "mismatch");
                assert_eq!(sample, "FFLAGS = -O\n");
            }
            other => panic!("expected NonConvergingRule, got {:?}", other),
        }
    }

    #[test]
    fn test_example_must_match_pattern() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.patch.rules.push(
            PatchRuleConfig::new("fc", r"(?m)^(FC\s*=\s*)f77$", "${1}gfortran")
                .with_example("CC = cc\n"),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_example_parsed_from_toml() {
        const RULE: &str = r#"
[[patch.rule]]
name = "fc"
pattern = '(?m)^(FC\s*=\s*)f77$'
replacement = "${1}gfortran"
example = "FC = f77"
"#;
        let config: ProjectConfig = toml::from_str(&format!("{}{}", MINIMAL, RULE)).unwrap();
        assert_eq!(config.patch.rules[0].example.as_deref(), Some("FC = f77"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config
            .patch
            .rules
            .push(PatchRuleConfig::new("broken", "(unclosed", "x"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_headless_requires_declared_component() {
        let mut config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        config.headless = Some(HeadlessConfig {
            mode: None,
            component: "plotlib".to_string(),
            probe: Vec::new(),
            language: StubLanguage::Fortran,
            compiler: None,
            archiver: None,
            archive: "libPlt.a".to_string(),
            aliases: Vec::new(),
            symbols: vec![SymbolConfig::subroutine("plopen", &["a"])],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_headless_mode_from_str() {
        assert_eq!("AUTO".parse::<HeadlessMode>().unwrap(), HeadlessMode::Auto);
        assert_eq!("1".parse::<HeadlessMode>().unwrap(), HeadlessMode::Always);
        assert_eq!("never".parse::<HeadlessMode>().unwrap(), HeadlessMode::Never);
        assert!("sometimes".parse::<HeadlessMode>().is_err());
    }

    #[test]
    fn test_segment_matchers_case_insensitive() {
        let matchers = segment_matchers("orrs/BIN").unwrap();
        assert_eq!(matchers.len(), 2);
        assert!(matchers[0].is_match("ORRS"));
        assert!(matchers[1].is_match("bin"));
        assert!(segment_matchers("").is_err());
        assert!(segment_matchers("../bin").is_err());
    }

    #[test]
    fn test_effective_patch_files_default() {
        let patch = PatchConfig::default();
        assert_eq!(patch.effective_files(), vec!["makefile*", "config.make*"]);
    }

    #[test]
    fn test_roundtrip_to_toml() {
        let config: ProjectConfig = toml::from_str(MINIMAL).unwrap();
        let text = config.to_toml_string().unwrap();
        let reparsed: ProjectConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, reparsed);
    }
}
