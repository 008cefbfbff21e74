//! Source tree discovery
//!
//! Upstream archives do not agree on directory names or nesting
//! (`Xfoil/plotlib`, `xfoil6.99/Plotlib`, `XFOIL/PLOTLIB`). The locator walks
//! the extracted tree once, in lexical order and to a bounded depth, and
//! matches each component's pattern case-insensitively against the trailing
//! segments of every directory. The first match wins.

use crate::component::ComponentSpec;
use crate::error::{KilnError, KilnResult};
use globset::GlobMatcher;
use kiln_config::project::segment_matchers;
use kiln_config::ConfigError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Root of an extracted archive
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    max_depth: usize,
}

/// Component directories resolved under a source tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocatedTree {
    pub root: PathBuf,
    /// Component name to absolute directory
    pub components: BTreeMap<String, PathBuf>,
    /// Optional components with no matching directory
    pub missing: Vec<String>,
}

impl LocatedTree {
    pub fn path(&self, component: &str) -> Option<&Path> {
        self.components.get(component).map(PathBuf::as_path)
    }

    pub fn is_located(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            root: root.into(),
            max_depth,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories under the root, relative, in lexical traversal order
    pub fn directories(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect()
    }

    /// Find the directory for one component pattern
    pub fn find(&self, pattern: &str) -> KilnResult<Option<PathBuf>> {
        let matchers = compile(pattern)?;
        Ok(self
            .directories()
            .into_iter()
            .find(|dir| matches_trailing(dir, &matchers))
            .map(|dir| self.root.join(dir)))
    }

    /// Resolve every component
    ///
    /// A required component with no match fails the whole lookup; an optional
    /// one is recorded as missing.
    pub fn locate(&self, specs: &[ComponentSpec]) -> KilnResult<LocatedTree> {
        let directories = if self.root.is_dir() {
            self.directories()
        } else {
            Vec::new()
        };
        debug!(
            "Scanned {} directories under {}",
            directories.len(),
            self.root.display()
        );

        let mut located = LocatedTree {
            root: self.root.clone(),
            ..LocatedTree::default()
        };

        for spec in specs {
            let matchers = compile(&spec.pattern)?;
            match directories
                .iter()
                .find(|dir| matches_trailing(dir, &matchers))
            {
                Some(dir) => {
                    info!("Located {} at {}", spec.name, dir.display());
                    located
                        .components
                        .insert(spec.name.clone(), self.root.join(dir));
                }
                None if spec.required => {
                    return Err(KilnError::Layout {
                        component: spec.name.clone(),
                        pattern: spec.pattern.clone(),
                        root: self.root.clone(),
                        depth: self.max_depth,
                        candidates: directories,
                    });
                }
                None => {
                    warn!(
                        "Optional component '{}' (pattern '{}') not found; it will be skipped",
                        spec.name, spec.pattern
                    );
                    located.missing.push(spec.name.clone());
                }
            }
        }

        Ok(located)
    }
}

fn compile(pattern: &str) -> KilnResult<Vec<GlobMatcher>> {
    segment_matchers(pattern).map_err(|reason| {
        KilnError::Config(ConfigError::InvalidValue {
            field: format!("pattern '{}'", pattern),
            reason,
        })
    })
}

/// Whether the last segments of `dir` match `matchers`, in order
fn matches_trailing(dir: &Path, matchers: &[GlobMatcher]) -> bool {
    let segments: Vec<&std::ffi::OsStr> = dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();
    if segments.len() < matchers.len() {
        return false;
    }
    let tail = &segments[segments.len() - matchers.len()..];
    tail.iter()
        .zip(matchers)
        .all(|(segment, matcher)| matcher.is_match(segment))
}
