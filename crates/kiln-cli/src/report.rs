//! Human-readable output for each command

use colored::{ColoredString, Colorize};
use kiln_build::{
    ComponentState, HeadlessDecision, KilnError, LocatedTree, PatchReport, PlanReport, RunSummary,
};
use kiln_fetch::FetchOutcome;

fn state_label(state: ComponentState) -> ColoredString {
    let text = state.to_string();
    match state {
        ComponentState::Succeeded => text.green(),
        ComponentState::Substituted => text.cyan(),
        ComponentState::Skipped => text.yellow(),
        ComponentState::Failed => text.red(),
        ComponentState::Pending | ComponentState::Building => text.normal(),
    }
}

fn decision_label(decision: HeadlessDecision) -> &'static str {
    match decision {
        HeadlessDecision::Disabled => "build real library",
        HeadlessDecision::Fallback => "build real library, stubs on failure",
        HeadlessDecision::Substitute => "substitute stubs",
    }
}

pub fn print_fetch(outcome: &FetchOutcome) {
    println!(
        "{} {} ({})",
        "Archive:".bold(),
        outcome.archive_path.display(),
        if outcome.downloaded { "fetched" } else { "cached" }
    );
    println!("  sha256 {}", outcome.sha256);
    println!(
        "{} {} ({})",
        "Source: ".bold(),
        outcome.source_dir.display(),
        if outcome.extracted {
            "extracted"
        } else {
            "already extracted"
        }
    );
}

pub fn print_located(located: &LocatedTree) {
    println!("{}", "Components:".bold());
    for (name, path) in &located.components {
        let shown = path.strip_prefix(&located.root).unwrap_or(path);
        println!("  {:<12} {}", name, shown.display());
    }
    for name in &located.missing {
        println!("  {:<12} {}", name, "not found".yellow());
    }
}

pub fn print_patch(report: &PatchReport) {
    let verb = if report.dry_run { "Would patch" } else { "Patched" };
    println!(
        "{} {} of {} build file(s)",
        verb.bold(),
        report.files_changed.len(),
        report.files_scanned
    );
    for file in &report.files_changed {
        println!("  {}", file.display());
    }
    for (rule, hits) in &report.rule_hits {
        println!("  rule {:<20} {} match(es)", rule, hits);
    }
    if !report.unmatched_rules.is_empty() {
        println!("  unmatched: {}", report.unmatched_rules.join(", ").dimmed());
    }
}

pub fn print_run_summary(summary: &RunSummary) {
    if let Some(fetch) = &summary.fetch {
        print_fetch(fetch);
    }
    if let Some(patch) = &summary.patch {
        print_patch(patch);
    }

    if summary.dry_run {
        println!("\n{}", "Dry run: nothing was built or installed".yellow());
    }

    if !summary.builds.is_empty() {
        println!("\n{}", "Builds:".bold());
        for build in &summary.builds {
            let detail = build
                .note
                .clone()
                .or_else(|| build.artifact.as_ref().map(|p| p.display().to_string()))
                .unwrap_or_default();
            println!(
                "  {:<12} {:<12} {:>7}ms  {}",
                build.component,
                state_label(build.state),
                build.duration_ms,
                detail
            );
        }
    }

    if let Some(stubs) = &summary.stubs {
        println!("\n{} {}", "Headless stubs:".bold(), stubs.archive.display());
        for alias in &stubs.aliases {
            println!("  alias {}", alias.display());
        }
    }

    if !summary.installs.is_empty() {
        println!("\n{}", "Installed:".bold());
        for record in &summary.installs {
            let check = match record.verified {
                Some(true) => "verified".green(),
                Some(false) => "smoke test failed".yellow(),
                None => "not verified".dimmed(),
            };
            println!("  {} ({})", record.destination.display(), check);
        }
    }

    if !summary.warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for warning in &summary.warnings {
            println!("  - {}", warning);
        }
    }

    let timings: Vec<String> = summary
        .timings
        .iter()
        .map(|t| format!("{} {}ms", t.step, t.millis))
        .collect();
    println!(
        "\n{} in {:.2}s ({})",
        "Done".green().bold(),
        summary.total_millis() as f64 / 1000.0,
        timings.join(", ")
    );
}

pub fn print_plan(plan: &PlanReport) {
    println!("{} {}", "Source: ".bold(), plan.source);
    println!("{} {}", "Work dir:".bold(), plan.work_dir.display());
    println!("{} {}", "Install:".bold(), plan.install_dir.display());
    println!("{} {}", "Tool:   ".bold(), plan.build_tool);

    println!("\n{}", "Build order:".bold());
    for (i, component) in plan.order.iter().enumerate() {
        let kind = if component.required {
            "required".normal()
        } else {
            "optional".dimmed()
        };
        let mut line = format!(
            "  {}. {:<12} {:<10} pattern '{}'",
            i + 1,
            component.name,
            kind,
            component.pattern
        );
        if let Some(target) = &component.target {
            line.push_str(&format!(", target '{}'", target));
        }
        if !component.depends_on.is_empty() {
            line.push_str(&format!(", after {}", component.depends_on.join(", ")));
        }
        if let Some(name) = &component.installs_as {
            line.push_str(&format!(", installs {}", name));
        }
        println!("{}", line);
    }

    println!("\n{} {}", "Patch files:".bold(), plan.patch_files.join(", "));
    for rule in &plan.rules {
        println!("  rule {}", rule);
    }

    if let Some(headless) = &plan.headless {
        println!(
            "\n{} {} ({}: {})",
            "Headless:".bold(),
            headless.component,
            headless.mode,
            decision_label(headless.decision)
        );
        println!(
            "  {} symbol(s) into {}{}",
            headless.symbols,
            headless.archive,
            if headless.aliases.is_empty() {
                String::new()
            } else {
                format!(" (aliases {})", headless.aliases.join(", "))
            }
        );
    }
}

/// Failure report on stderr
pub fn print_error(err: &anyhow::Error, kiln: Option<&KilnError>) {
    match kiln {
        Some(kiln) => {
            eprintln!(
                "{} {} step failed: {}",
                "error:".red().bold(),
                kiln.step(),
                kiln
            );
            let diagnostics = kiln.diagnostics();
            if !diagnostics.is_empty() {
                eprintln!("{}", "--- diagnostics ---".dimmed());
                eprintln!("{}", diagnostics);
            }
        }
        None => eprintln!("{} {:#}", "error:".red().bold(), err),
    }
}

/// Failure report as JSON on stdout
pub fn print_error_json(err: &anyhow::Error, kiln: Option<&KilnError>, code: i32) {
    let value = serde_json::json!({
        "success": false,
        "exit_code": code,
        "step": kiln.map(KilnError::step),
        "error": format!("{:#}", err),
        "diagnostics": kiln.map(KilnError::diagnostics),
    });
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{}", text),
        Err(_) => print_error(err, kiln),
    }
}
