/// Run error types
use kiln_config::ConfigError;
use kiln_fetch::FetchError;
use std::path::PathBuf;
use thiserror::Error;

pub type KilnResult<T> = Result<T, KilnError>;

/// Number of candidate directories listed in a layout diagnostic
const MAX_LAYOUT_CANDIDATES: usize = 25;

#[derive(Debug, Error)]
pub enum KilnError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid component graph: {0}")]
    Graph(String),

    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Extraction failed: {0}")]
    Extract(FetchError),

    #[error("Required component '{component}' (pattern '{pattern}') not found under {root}")]
    Layout {
        component: String,
        pattern: String,
        root: PathBuf,
        depth: usize,
        candidates: Vec<PathBuf>,
    },

    #[error("Patch I/O error at {path}: {error}")]
    PatchIo {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Build of required component '{component}' failed: {reason}")]
    Build {
        component: String,
        reason: String,
        diagnostics: String,
    },

    #[error("Failed to install '{component}' to {path}: {error}")]
    Install {
        component: String,
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Another kiln run is active in this work dir (lock {lock}, pid {pid})")]
    ConcurrentRun {
        lock: PathBuf,
        pid: u32,
        started: String,
    },

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl From<FetchError> for KilnError {
    fn from(error: FetchError) -> Self {
        if error.is_extract() {
            Self::Extract(error)
        } else {
            Self::Fetch(error)
        }
    }
}

impl KilnError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a patch I/O error
    pub fn patch_io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::PatchIo {
            path: path.into(),
            error,
        }
    }

    /// Create a required-build failure
    pub fn build(
        component: impl Into<String>,
        reason: impl ToString,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::Build {
            component: component.into(),
            reason: reason.to_string(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create an install failure
    pub fn install(
        component: impl Into<String>,
        path: impl Into<PathBuf>,
        error: std::io::Error,
    ) -> Self {
        Self::Install {
            component: component.into(),
            path: path.into(),
            error,
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Graph(_) | Self::Io { .. } => 1,
            Self::Fetch(_) => 2,
            Self::Layout { .. } => 3,
            Self::PatchIo { .. } => 4,
            Self::Build { .. } => 5,
            Self::Install { .. } => 6,
            Self::Extract(_) => 7,
            Self::ConcurrentRun { .. } => 8,
        }
    }

    /// Pipeline step the error belongs to
    pub fn step(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Graph(_) => "config",
            Self::Io { .. } => "setup",
            Self::Fetch(_) => "fetch",
            Self::Extract(_) => "extract",
            Self::Layout { .. } => "locate",
            Self::PatchIo { .. } => "patch",
            Self::Build { .. } => "build",
            Self::Install { .. } => "install",
            Self::ConcurrentRun { .. } => "lock",
        }
    }

    /// Captured detail shown beneath the error message
    pub fn diagnostics(&self) -> String {
        match self {
            Self::Fetch(e) | Self::Extract(e) => e.diagnostics(),
            Self::Layout {
                root,
                depth,
                candidates,
                ..
            } => {
                let mut out = format!(
                    "searched {} to depth {}; directories seen:",
                    root.display(),
                    depth
                );
                if candidates.is_empty() {
                    out.push_str(" (none)");
                }
                for candidate in candidates.iter().take(MAX_LAYOUT_CANDIDATES) {
                    out.push_str("\n  ");
                    out.push_str(&candidate.display().to_string());
                }
                if candidates.len() > MAX_LAYOUT_CANDIDATES {
                    out.push_str(&format!(
                        "\n  ... and {} more",
                        candidates.len() - MAX_LAYOUT_CANDIDATES
                    ));
                }
                out
            }
            Self::PatchIo { error, .. } | Self::Install { error, .. } | Self::Io { error, .. } => {
                format!("{:?}", error.kind())
            }
            Self::Build { diagnostics, .. } => diagnostics.clone(),
            Self::ConcurrentRun { started, .. } => format!("lock held since {}", started),
            Self::Config(_) | Self::Graph(_) => String::new(),
        }
    }
}
