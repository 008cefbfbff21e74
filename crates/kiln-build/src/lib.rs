//! Kiln build orchestration
//!
//! Turns an unpacked third-party source tree into installed binaries:
//! - Source tree location with case-insensitive, bounded-depth discovery
//! - Idempotent build-configuration patching
//! - Dependency-ordered native builds with per-component failure policy
//! - Headless stub substitution for graphics libraries
//! - Installation with a post-install smoke test
//! - A work-directory lock so concurrent runs fail fast

pub mod build_order;
pub mod builder;
pub mod component;
pub mod error;
pub mod headless;
pub mod installer;
pub mod locator;
pub mod lock;
pub mod patch;
pub mod pipeline;
pub mod process;
pub mod report;

// Re-export main types
pub use build_order::{ordered_specs, BuildGraph, ComponentNode};
pub use builder::{BuildOutcome, ComponentBuilder, HeadlessPlan};
pub use component::{BuildResult, ComponentSpec, ComponentState};
pub use error::{KilnError, KilnResult};
pub use headless::{render_stub_source, HeadlessDecision, StubArtifact, StubSynthesizer};
pub use installer::{InstallRecord, Installer};
pub use locator::{LocatedTree, SourceTree};
pub use lock::RunLock;
pub use patch::{apply_rules, PatchReport, PatchRule, Patcher, RuleHit};
pub use pipeline::{Pipeline, RunConfig};
pub use process::{ProcessOutput, ToolInvocation};
pub use report::{PlanReport, PlannedComponent, PlannedHeadless, RunSummary, StepTiming};
