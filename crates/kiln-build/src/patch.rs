//! Build-configuration rewriting
//!
//! Rules are plain substitutions. [`apply_rules`] is a pure function from
//! file content to new content so rule sets can be tested without touching
//! the filesystem; [`Patcher`] walks a tree and writes back only the files
//! whose content actually changed.

use crate::error::{KilnError, KilnResult};
use crate::locator::LocatedTree;
use globset::GlobMatcher;
use kiln_config::project::file_matcher;
use kiln_config::{ConfigError, PatchConfig, PatchRuleConfig};
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A compiled search/replace rule with its scope
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub name: String,
    regex: Regex,
    replacement: String,
    literal: bool,
    /// File name globs; empty means the patcher's defaults
    files: Vec<GlobMatcher>,
    /// Directories the rule is limited to; empty means the whole tree
    scope: Vec<PathBuf>,
}

impl PatchRule {
    /// Regex rule; `${1}` references expand in the replacement
    pub fn regex(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> KilnResult<Self> {
        Self::from_config(&PatchRuleConfig::new(name, pattern, replacement))
    }

    /// Literal text rule
    pub fn literal(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> KilnResult<Self> {
        Self::from_config(&PatchRuleConfig::literal(name, pattern, replacement))
    }

    /// Compile a configured rule, unscoped
    pub fn from_config(config: &PatchRuleConfig) -> KilnResult<Self> {
        let regex = config.compile_pattern().map_err(|e| {
            KilnError::Config(ConfigError::InvalidValue {
                field: format!("patch rule '{}' pattern", config.name),
                reason: e.to_string(),
            })
        })?;
        let files = compile_globs(&config.files, &config.name)?;

        Ok(Self {
            name: config.name.clone(),
            regex,
            replacement: config.replacement.clone(),
            literal: config.literal,
            files,
            scope: Vec::new(),
        })
    }

    /// Limit the rule to files under these directories
    pub fn with_scope(mut self, scope: Vec<PathBuf>) -> Self {
        self.scope = scope;
        self
    }

    /// Apply to `content`, returning the new text and the number of matches
    pub fn apply(&self, content: &str) -> (String, usize) {
        let hits = self.regex.find_iter(content).count();
        if hits == 0 {
            return (content.to_string(), 0);
        }
        let replaced = if self.literal {
            self.regex.replace_all(content, NoExpand(&self.replacement))
        } else {
            self.regex.replace_all(content, self.replacement.as_str())
        };
        (replaced.into_owned(), hits)
    }

    fn applies_to(&self, path: &Path, file_name: &str, defaults: &[GlobMatcher]) -> bool {
        let globs = if self.files.is_empty() {
            defaults
        } else {
            &self.files
        };
        let name_matches = globs.iter().any(|g| g.is_match(file_name));
        let in_scope = self.scope.is_empty() || self.scope.iter().any(|dir| path.starts_with(dir));
        name_matches && in_scope
    }
}

/// Per-rule match count for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleHit {
    pub rule: String,
    pub matches: usize,
}

/// Apply rules in order to `content`
///
/// Rules that match nothing are no-ops.
pub fn apply_rules<'a, I>(content: &str, rules: I) -> (String, Vec<RuleHit>)
where
    I: IntoIterator<Item = &'a PatchRule>,
{
    let mut current = content.to_string();
    let mut hits = Vec::new();
    for rule in rules {
        let (next, matches) = rule.apply(&current);
        if matches > 0 {
            hits.push(RuleHit {
                rule: rule.name.clone(),
                matches,
            });
        }
        current = next;
    }
    (current, hits)
}

/// Whether one more pass over `content` leaves it unchanged
pub fn is_fixed_point<'a, I>(content: &str, rules: I) -> bool
where
    I: IntoIterator<Item = &'a PatchRule>,
{
    apply_rules(content, rules).0 == content
}

/// What a patch pass did (or would do)
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub dry_run: bool,
    /// Build-configuration files examined
    pub files_scanned: usize,
    /// Files whose content changed (or would change)
    pub files_changed: Vec<PathBuf>,
    /// Total matches per rule across all files
    pub rule_hits: BTreeMap<String, usize>,
    /// Rules that matched nowhere
    pub unmatched_rules: Vec<String>,
    pub warnings: Vec<String>,
}

/// Applies rules to every build-configuration file in a tree
pub struct Patcher {
    rules: Vec<PatchRule>,
    defaults: Vec<GlobMatcher>,
    dry_run: bool,
}

impl Patcher {
    pub fn new(rules: Vec<PatchRule>, default_files: &[String]) -> KilnResult<Self> {
        Ok(Self {
            rules,
            defaults: compile_globs(default_files, "patch.files")?,
            dry_run: false,
        })
    }

    /// Compile `[patch]` against a located tree, scoping component-bound rules
    pub fn from_config(config: &PatchConfig, located: &LocatedTree) -> KilnResult<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule_config in &config.rules {
            let scope: Vec<PathBuf> = rule_config
                .components
                .iter()
                .filter_map(|name| located.path(name).map(Path::to_path_buf))
                .collect();
            if !rule_config.components.is_empty() && scope.is_empty() {
                debug!(
                    "Rule '{}' targets no located component; dropping it",
                    rule_config.name
                );
                continue;
            }
            rules.push(PatchRule::from_config(rule_config)?.with_scope(scope));
        }
        Self::new(rules, &config.effective_files())
    }

    /// Report changes without writing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Patch every matching file under `root`
    pub fn patch_tree(&self, root: &Path) -> KilnResult<PatchReport> {
        let mut report = PatchReport {
            dry_run: self.dry_run,
            ..PatchReport::default()
        };

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    let error = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    return Err(KilnError::patch_io(path, error));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            let rules: Vec<&PatchRule> = self
                .rules
                .iter()
                .filter(|r| r.applies_to(path, &file_name, &self.defaults))
                .collect();
            let is_config_file = self.defaults.iter().any(|g| g.is_match(&*file_name));
            if rules.is_empty() && !is_config_file {
                continue;
            }

            report.files_scanned += 1;
            self.patch_file(path, &rules, &mut report)?;
        }

        for rule in &self.rules {
            if !report.rule_hits.contains_key(&rule.name) {
                debug!("Rule '{}' matched nothing", rule.name);
                report.unmatched_rules.push(rule.name.clone());
            }
        }

        info!(
            "{} {} of {} build files",
            if self.dry_run { "Would patch" } else { "Patched" },
            report.files_changed.len(),
            report.files_scanned
        );
        Ok(report)
    }

    fn patch_file(
        &self,
        path: &Path,
        rules: &[&PatchRule],
        report: &mut PatchReport,
    ) -> KilnResult<()> {
        if rules.is_empty() {
            return Ok(());
        }

        let bytes = fs::read(path).map_err(|e| KilnError::patch_io(path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                let message = format!("{} is not UTF-8; left unpatched", path.display());
                warn!("{}", message);
                report.warnings.push(message);
                return Ok(());
            }
        };

        let (patched, hits) = apply_rules(&content, rules.iter().copied());
        for hit in &hits {
            *report.rule_hits.entry(hit.rule.clone()).or_insert(0) += hit.matches;
            debug!("{}: rule '{}' x{}", path.display(), hit.rule, hit.matches);
        }

        if patched == content {
            return Ok(());
        }

        // Writing a file the next run would rewrite again breaks re-runs
        let (again, repeat_hits) = apply_rules(&patched, rules.iter().copied());
        if again != patched {
            let names: Vec<&str> = repeat_hits.iter().map(|h| h.rule.as_str()).collect();
            return Err(KilnError::Config(ConfigError::NonConvergingRule {
                rule: names.join(", "),
                sample: path.display().to_string(),
            }));
        }

        if !self.dry_run {
            fs::write(path, &patched).map_err(|e| KilnError::patch_io(path, e))?;
        }
        report.files_changed.push(path.to_path_buf());
        Ok(())
    }
}

fn compile_globs(globs: &[String], owner: &str) -> KilnResult<Vec<GlobMatcher>> {
    globs
        .iter()
        .map(|glob| {
            file_matcher(glob).map_err(|reason| {
                KilnError::Config(ConfigError::InvalidValue {
                    field: format!("{} files", owner),
                    reason,
                })
            })
        })
        .collect()
}
