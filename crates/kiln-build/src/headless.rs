//! Headless graphics substitution
//!
//! On hosts without a display stack the plotting library cannot be built, yet
//! the main program still links against it. This module renders a source file
//! with a no-op body for every symbol the dependents call, compiles it into an
//! archive with the file name their link step expects, and adds alias names
//! for other precision variants.

use crate::error::{KilnError, KilnResult};
use crate::process::ToolInvocation;
use kiln_config::{HeadlessConfig, HeadlessMode, ReturnKind, StubLanguage, SymbolConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const FORTRAN_LINE_LIMIT: usize = 72;
const DIAGNOSTIC_LINES: usize = 40;

/// Whether any display probe exists on this host
pub fn display_available(probes: &[PathBuf]) -> bool {
    probes.iter().any(|p| p.exists())
}

/// How the headless component is handled in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeadlessDecision {
    /// Build the real component; no stubs
    Disabled,
    /// Build the real component, falling back to stubs if it fails
    Fallback,
    /// Skip the real build and substitute stubs
    Substitute,
}

impl HeadlessDecision {
    /// Resolve the policy for this host
    pub fn resolve(mode: HeadlessMode, probes: &[PathBuf]) -> Self {
        match mode {
            HeadlessMode::Never => Self::Disabled,
            HeadlessMode::Always => Self::Substitute,
            HeadlessMode::Auto if display_available(probes) => Self::Fallback,
            HeadlessMode::Auto => Self::Substitute,
        }
    }

    /// Whether stubs may be produced at all
    pub fn allows_stubs(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Render stub source for `symbols`
pub fn render_stub_source(language: StubLanguage, component: &str, symbols: &[SymbolConfig]) -> String {
    match language {
        StubLanguage::Fortran => render_fortran(component, symbols),
        StubLanguage::C => render_c(component, symbols),
    }
}

fn render_fortran(component: &str, symbols: &[SymbolConfig]) -> String {
    let mut out = format!(
        "! Headless stand-ins for {} generated by kiln.\n! Every routine is a no-op.\n",
        component
    );

    for symbol in symbols {
        out.push('\n');
        let (kind, prefix) = match symbol.returns {
            None => ("subroutine", String::new()),
            Some(ReturnKind::Integer) => ("function", "integer ".to_string()),
            Some(ReturnKind::Real) => ("function", "real ".to_string()),
            Some(ReturnKind::Double) => ("function", "double precision ".to_string()),
            Some(ReturnKind::Logical) => ("function", "logical ".to_string()),
        };
        let head = format!("{}{} {}", prefix, kind, symbol.name);
        out.push_str(&wrap_fortran_header(&head, &symbol.args));

        if let Some(kind) = symbol.returns {
            let zero = match kind {
                ReturnKind::Integer => "0",
                ReturnKind::Real => "0.0",
                ReturnKind::Double => "0.0d0",
                ReturnKind::Logical => ".false.",
            };
            out.push_str(&format!("  {} = {}\n", symbol.name, zero));
        }
        out.push_str(&format!("end {} {}\n", kind, symbol.name));
    }

    out
}

/// `head(a, b, c)` with `&` continuation lines kept under the fixed-form width
fn wrap_fortran_header(head: &str, args: &[String]) -> String {
    if args.is_empty() {
        return format!("{}()\n", head);
    }

    let mut out = String::new();
    let mut line = format!("{}(", head);
    for (i, arg) in args.iter().enumerate() {
        let piece = if i + 1 == args.len() {
            format!("{})", arg)
        } else {
            format!("{}, ", arg)
        };
        if line.len() + piece.len() > FORTRAN_LINE_LIMIT - 2 {
            out.push_str(line.trim_end());
            out.push_str(" &\n");
            line = format!("    & {}", piece);
        } else {
            line.push_str(&piece);
        }
    }
    out.push_str(&line);
    out.push('\n');
    out
}

fn render_c(component: &str, symbols: &[SymbolConfig]) -> String {
    let mut out = format!(
        "/* Headless stand-ins for {} generated by kiln. Every routine is a no-op. */\n",
        component
    );

    for symbol in symbols {
        let (ret, value) = match symbol.returns {
            None => ("void", None),
            Some(ReturnKind::Integer) | Some(ReturnKind::Logical) => ("int", Some("0")),
            Some(ReturnKind::Real) => ("float", Some("0.0f")),
            Some(ReturnKind::Double) => ("double", Some("0.0")),
        };
        let params = if symbol.args.is_empty() {
            "void".to_string()
        } else {
            symbol
                .args
                .iter()
                .map(|a| format!("void *{}", a))
                .collect::<Vec<_>>()
                .join(", ")
        };

        out.push('\n');
        out.push_str(&format!(
            "{} {}_({})\n{{\n",
            ret,
            symbol.name.to_ascii_lowercase(),
            params
        ));
        for arg in &symbol.args {
            out.push_str(&format!("    (void){};\n", arg));
        }
        if let Some(value) = value {
            out.push_str(&format!("    return {};\n", value));
        }
        out.push_str("}\n");
    }

    out
}

/// Files produced by a substitution
#[derive(Debug, Clone, Serialize)]
pub struct StubArtifact {
    pub source: PathBuf,
    pub archive: PathBuf,
    pub aliases: Vec<PathBuf>,
}

/// Compiles and installs the stub archive
pub struct StubSynthesizer<'a> {
    config: &'a HeadlessConfig,
    staging_dir: PathBuf,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl<'a> StubSynthesizer<'a> {
    /// Sources and objects are written under `staging_dir`
    pub fn new(config: &'a HeadlessConfig, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            staging_dir: staging_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the archive and place it (plus aliases) in `output_dir`
    pub fn synthesize(&self, output_dir: &Path) -> KilnResult<StubArtifact> {
        let component = &self.config.component;
        fs::create_dir_all(&self.staging_dir).map_err(|e| KilnError::io(&self.staging_dir, e))?;
        fs::create_dir_all(output_dir).map_err(|e| KilnError::io(output_dir, e))?;

        let language = self.config.language;
        let source = self
            .staging_dir
            .join(format!("headless_stubs.{}", language.extension()));
        let object = self.staging_dir.join("headless_stubs.o");
        let staged_archive = self.staging_dir.join(&self.config.archive);

        let text = render_stub_source(language, component, &self.config.symbols);
        fs::write(&source, text).map_err(|e| KilnError::io(&source, e))?;
        info!(
            "Synthesizing {} stub symbols for '{}'",
            self.config.symbols.len(),
            component
        );

        self.run_step(
            ToolInvocation::new(self.config.compiler())
                .arg("-c")
                .arg(source.to_string_lossy())
                .arg("-o")
                .arg(object.to_string_lossy()),
            "compile",
        )?;

        if staged_archive.exists() {
            fs::remove_file(&staged_archive).map_err(|e| KilnError::io(&staged_archive, e))?;
        }
        self.run_step(
            ToolInvocation::new(self.config.archiver())
                .arg("rcs")
                .arg(staged_archive.to_string_lossy())
                .arg(object.to_string_lossy()),
            "archive",
        )?;

        let archive = output_dir.join(&self.config.archive);
        fs::copy(&staged_archive, &archive).map_err(|e| KilnError::io(&archive, e))?;

        let mut aliases = Vec::new();
        for alias in &self.config.aliases {
            if alias == &self.config.archive {
                continue;
            }
            let alias_path = output_dir.join(alias);
            link_alias(&archive, &alias_path)?;
            debug!("Aliased {} -> {}", alias_path.display(), self.config.archive);
            aliases.push(alias_path);
        }

        Ok(StubArtifact {
            source,
            archive,
            aliases,
        })
    }

    fn run_step(&self, invocation: ToolInvocation, step: &str) -> KilnResult<()> {
        let invocation = invocation
            .current_dir(&self.staging_dir)
            .envs(&self.env)
            .timeout(self.timeout);
        let command_line = invocation.command_line();

        let output = invocation.run().map_err(|e| {
            KilnError::build(
                &self.config.component,
                format!("cannot run stub {} step '{}': {}", step, command_line, e),
                String::new(),
            )
        })?;

        if !output.success() {
            return Err(KilnError::build(
                &self.config.component,
                format!("stub {} step '{}' failed ({})", step, command_line, output.status_text()),
                output.tail(DIAGNOSTIC_LINES),
            ));
        }
        Ok(())
    }
}

/// Make `alias` resolve to `archive`; both live in the same directory
fn link_alias(archive: &Path, alias: &Path) -> KilnResult<()> {
    if alias.symlink_metadata().is_ok() {
        fs::remove_file(alias).map_err(|e| KilnError::io(alias, e))?;
    }

    #[cfg(unix)]
    {
        let target = archive.file_name().map(Path::new).unwrap_or(archive);
        std::os::unix::fs::symlink(target, alias).map_err(|e| KilnError::io(alias, e))
    }

    #[cfg(not(unix))]
    {
        fs::copy(archive, alias)
            .map(|_| ())
            .map_err(|e| KilnError::io(alias, e))
    }
}
