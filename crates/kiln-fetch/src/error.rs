//! Fetch error types
use std::path::PathBuf;
use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid source '{source_spec}': {reason}")]
    InvalidSource { source_spec: String, reason: String },

    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        url: String,
        status: u16,
        body_excerpt: String,
    },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Failed to extract {archive}: {reason}")]
    Extract { archive: PathBuf, reason: String },

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl FetchError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create an extraction error
    pub fn extract(archive: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extract {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error belongs to the extraction step rather than retrieval
    pub fn is_extract(&self) -> bool {
        matches!(self, Self::Extract { .. })
    }

    /// Extra detail worth showing next to the message
    pub fn diagnostics(&self) -> String {
        match self {
            Self::HttpStatus { body_excerpt, .. } => body_excerpt.clone(),
            Self::Io { error, .. } => format!("{:?}", error.kind()),
            _ => String::new(),
        }
    }
}
