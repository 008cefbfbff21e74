//! Archive retrieval and idempotent extraction
use crate::archive::{self, sha256_file};
use crate::error::{FetchError, FetchResult};
use crate::source::ArchiveSource;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Directory (inside the work dir) holding kiln bookkeeping files
pub const STATE_DIR: &str = ".kiln";
/// Directory (inside the work dir) receiving the extracted tree
pub const SOURCE_DIR: &str = "source";
const STAMP_FILE: &str = "extracted.json";
const BODY_EXCERPT_LEN: usize = 512;

/// What to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Archive origin
    pub source: ArchiveSource,
    /// File name inside the work dir
    pub archive_name: String,
    /// Expected SHA-256, lowercase hex
    pub sha256: Option<String>,
}

impl FetchRequest {
    /// Create a request, deriving the archive name from the source when not given
    pub fn new(source: ArchiveSource, archive_name: Option<String>) -> FetchResult<Self> {
        let archive_name = match archive_name.or_else(|| source.file_name()) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(FetchError::InvalidSource {
                    source_spec: source.to_string(),
                    reason: "cannot derive an archive file name; set source.archive".to_string(),
                })
            }
        };

        Ok(Self {
            source,
            archive_name,
            sha256: None,
        })
    }

    /// Require the archive to hash to this digest
    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256.map(|s| s.to_ascii_lowercase());
        self
    }
}

/// Result of a fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    /// Archive location inside the work dir
    pub archive_path: PathBuf,
    /// Extraction root
    pub source_dir: PathBuf,
    /// SHA-256 of the archive
    pub sha256: String,
    /// Whether the archive was retrieved during this call
    pub downloaded: bool,
    /// Whether the archive was unpacked during this call
    pub extracted: bool,
}

/// Record of a completed extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStamp {
    pub archive: String,
    pub sha256: String,
    pub entries: usize,
}

/// Retrieves archives into a work dir and unpacks them once
pub struct Fetcher {
    work_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Fetcher {
    /// Create a fetcher rooted at `work_dir`
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout: None,
        }
    }

    /// Set the network timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Extraction root
    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join(SOURCE_DIR)
    }

    fn stamp_path(&self) -> PathBuf {
        self.work_dir.join(STATE_DIR).join(STAMP_FILE)
    }

    /// Fetch (or reuse) the archive and make sure it is extracted
    pub fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchOutcome> {
        fs::create_dir_all(&self.work_dir).map_err(|e| FetchError::io(&self.work_dir, e))?;

        let archive_path = self.work_dir.join(&request.archive_name);
        let downloaded = self.ensure_archive(request, &archive_path)?;

        let sha256 = sha256_file(&archive_path)?;
        if let Some(expected) = &request.sha256 {
            if expected != &sha256 {
                return Err(FetchError::ChecksumMismatch {
                    path: archive_path,
                    expected: expected.clone(),
                    actual: sha256,
                });
            }
        }

        let extracted = self.ensure_extracted(request, &archive_path, &sha256)?;

        Ok(FetchOutcome {
            archive_path,
            source_dir: self.source_dir(),
            sha256,
            downloaded,
            extracted,
        })
    }

    /// Remove the extracted tree and its stamp; the archive is kept
    pub fn clean(&self) -> FetchResult<()> {
        let source_dir = self.source_dir();
        if source_dir.exists() {
            info!("Removing extracted tree {}", source_dir.display());
            fs::remove_dir_all(&source_dir).map_err(|e| FetchError::io(&source_dir, e))?;
        }
        let stamp = self.stamp_path();
        if stamp.exists() {
            fs::remove_file(&stamp).map_err(|e| FetchError::io(&stamp, e))?;
        }
        Ok(())
    }

    /// Read the extraction stamp, if a valid one exists
    pub fn read_stamp(&self) -> Option<ExtractionStamp> {
        let content = fs::read_to_string(self.stamp_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Returns true when the archive had to be retrieved
    fn ensure_archive(&self, request: &FetchRequest, archive_path: &Path) -> FetchResult<bool> {
        if archive_path.exists() {
            match self.cached_is_valid(archive_path, request.sha256.as_deref()) {
                Ok(()) => {
                    info!("Reusing cached archive {}", archive_path.display());
                    return Ok(false);
                }
                Err(e) => warn!("Cached archive is unusable ({}); fetching again", e),
            }
        }

        let partial = archive_path.with_extension("part");
        info!("Fetching {}", request.source);
        self.retrieve(&request.source, &partial)?;

        if let Err(e) = archive::verify(&partial) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, archive_path).map_err(|e| FetchError::io(archive_path, e))?;
        Ok(true)
    }

    fn cached_is_valid(&self, archive_path: &Path, sha256: Option<&str>) -> FetchResult<()> {
        if let Some(expected) = sha256 {
            let actual = sha256_file(archive_path)?;
            if actual != expected {
                return Err(FetchError::ChecksumMismatch {
                    path: archive_path.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        let entries = archive::verify(archive_path)?;
        debug!("Cached archive has {} entries", entries);
        Ok(())
    }

    fn retrieve(&self, source: &ArchiveSource, destination: &Path) -> FetchResult<()> {
        match source {
            ArchiveSource::Local(path) => {
                fs::copy(path, destination).map_err(|e| FetchError::io(path, e))?;
                Ok(())
            }
            ArchiveSource::Http(url) => {
                let url_text = url.to_string();
                let network = |e: reqwest::Error| FetchError::Network {
                    url: url_text.clone(),
                    reason: if e.is_timeout() {
                        "request timed out".to_string()
                    } else if e.is_connect() {
                        format!("connection error: {}", e)
                    } else {
                        e.to_string()
                    },
                };

                let mut builder = reqwest::blocking::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                let client = builder.build().map_err(network)?;
                let mut response = client.get(url.clone()).send().map_err(network)?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().unwrap_or_default();
                    return Err(FetchError::HttpStatus {
                        url: url_text,
                        status: status.as_u16(),
                        body_excerpt: body.chars().take(BODY_EXCERPT_LEN).collect(),
                    });
                }

                let mut file =
                    File::create(destination).map_err(|e| FetchError::io(destination, e))?;
                let bytes = response.copy_to(&mut file).map_err(network)?;
                debug!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(())
            }
        }
    }

    /// Returns true when the archive was unpacked during this call
    fn ensure_extracted(
        &self,
        request: &FetchRequest,
        archive_path: &Path,
        sha256: &str,
    ) -> FetchResult<bool> {
        let source_dir = self.source_dir();

        if let Some(stamp) = self.read_stamp() {
            if stamp.sha256 == sha256 && source_dir.is_dir() {
                info!(
                    "Archive already extracted to {}; leaving tree untouched",
                    source_dir.display()
                );
                return Ok(false);
            }
        }

        // A tree from another archive would leave stale directories behind
        if source_dir.exists() {
            info!("Removing previous tree {}", source_dir.display());
            fs::remove_dir_all(&source_dir).map_err(|e| FetchError::io(&source_dir, e))?;
        }

        info!("Extracting {} into {}", archive_path.display(), source_dir.display());
        let entries = archive::extract(archive_path, &source_dir)?;

        let stamp = ExtractionStamp {
            archive: request.archive_name.clone(),
            sha256: sha256.to_string(),
            entries: entries.len(),
        };
        let stamp_path = self.stamp_path();
        if let Some(parent) = stamp_path.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&stamp)
            .map_err(|e| FetchError::extract(archive_path, e))?;
        fs::write(&stamp_path, json).map_err(|e| FetchError::io(&stamp_path, e))?;

        Ok(true)
    }
}
