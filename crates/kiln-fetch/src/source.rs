//! Archive source specifications
use crate::error::{FetchError, FetchResult};
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where an archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Remote archive fetched over http(s)
    Http(Url),
    /// Archive already on the local filesystem (plain path or file:// URL)
    Local(PathBuf),
}

impl ArchiveSource {
    /// Parse a source string
    ///
    /// Relative local paths resolve against `base`.
    pub fn parse(spec: &str, base: &Path) -> FetchResult<Self> {
        let trimmed = spec.trim();
        let invalid = |reason: String| FetchError::InvalidSource {
            source_spec: spec.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("empty source".to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
            return Ok(Self::Http(url));
        }

        if lower.starts_with("file://") {
            let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
            let path = url
                .to_file_path()
                .map_err(|_| invalid("file URL has no local path".to_string()))?;
            return Ok(Self::Local(path));
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(invalid(format!("unsupported scheme '{}'", scheme)));
        }

        let path = PathBuf::from(trimmed);
        Ok(Self::Local(if path.is_absolute() {
            path
        } else {
            base.join(path)
        }))
    }

    /// File name the archive is stored under when none is configured
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Http(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| s.to_string()),
            Self::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) => write!(f, "{}", url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https() {
        let source =
            ArchiveSource::parse("https://example.org/pub/xfoil6.99.tgz", Path::new("/")).unwrap();
        assert!(source.is_remote());
        assert_eq!(source.file_name().as_deref(), Some("xfoil6.99.tgz"));
    }

    #[test]
    fn test_parse_relative_path() {
        let source = ArchiveSource::parse("vendor/tool.tar.gz", Path::new("/srv/proj")).unwrap();
        assert_eq!(
            source,
            ArchiveSource::Local(PathBuf::from("/srv/proj/vendor/tool.tar.gz"))
        );
        assert_eq!(source.file_name().as_deref(), Some("tool.tar.gz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_file_url() {
        let source = ArchiveSource::parse("file:///tmp/mirror/tool.zip", Path::new("/")).unwrap();
        assert_eq!(
            source,
            ArchiveSource::Local(PathBuf::from("/tmp/mirror/tool.zip"))
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = ArchiveSource::parse("ftp://example.org/tool.tgz", Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn test_url_without_file_name() {
        let source = ArchiveSource::parse("https://example.org/", Path::new("/")).unwrap();
        assert_eq!(source.file_name(), None);
    }
}
