//! Archive format detection, validation and extraction
//!
//! Supports gzip-compressed tar, plain tar and zip. Entries are unpacked
//! relative to the destination; any entry that would land outside it is
//! rejected.

use crate::error::{FetchError, FetchResult};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use zip::ZipArchive;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the leading bytes of a file
    pub fn sniff(path: &Path) -> FetchResult<Self> {
        let mut file = File::open(path).map_err(|e| FetchError::io(path, e))?;
        let mut header = [0u8; 512];
        let mut filled = 0;
        while filled < header.len() {
            let n = file
                .read(&mut header[filled..])
                .map_err(|e| FetchError::io(path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Self::from_magic(&header[..filled])
            .ok_or_else(|| FetchError::extract(path, "unrecognized archive format"))
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if bytes.len() >= 262 && &bytes[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }
}

/// Read every entry of an archive to prove it is complete
///
/// Returns the number of entries.
pub fn verify(path: &Path) -> FetchResult<usize> {
    let format = ArchiveFormat::sniff(path)?;
    let corrupt = |reason: String| FetchError::CorruptArchive {
        path: path.to_path_buf(),
        reason,
    };

    match format {
        ArchiveFormat::TarGz | ArchiveFormat::Tar => {
            let file = File::open(path).map_err(|e| FetchError::io(path, e))?;
            let reader: Box<dyn Read> = if format == ArchiveFormat::TarGz {
                Box::new(GzDecoder::new(file))
            } else {
                Box::new(file)
            };
            let mut archive = Archive::new(reader);
            let mut count = 0;
            for entry in archive.entries().map_err(|e| corrupt(e.to_string()))? {
                let mut entry = entry.map_err(|e| corrupt(e.to_string()))?;
                io::copy(&mut entry, &mut io::sink()).map_err(|e| corrupt(e.to_string()))?;
                count += 1;
            }
            if count == 0 {
                return Err(corrupt("archive has no entries".to_string()));
            }
            Ok(count)
        }
        ArchiveFormat::Zip => {
            let file = File::open(path).map_err(|e| FetchError::io(path, e))?;
            let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
                io::copy(&mut entry, &mut io::sink()).map_err(|e| corrupt(e.to_string()))?;
            }
            if archive.is_empty() {
                return Err(corrupt("archive has no entries".to_string()));
            }
            Ok(archive.len())
        }
    }
}

/// Extract an archive into `output_dir`, overwriting existing files
///
/// Returns the extracted paths.
pub fn extract(archive_path: &Path, output_dir: &Path) -> FetchResult<Vec<PathBuf>> {
    let format = ArchiveFormat::sniff(archive_path)?;

    fs::create_dir_all(output_dir).map_err(|e| FetchError::io(output_dir, e))?;

    match format {
        ArchiveFormat::TarGz => {
            let file = File::open(archive_path).map_err(|e| FetchError::io(archive_path, e))?;
            extract_tar(Archive::new(GzDecoder::new(file)), archive_path, output_dir)
        }
        ArchiveFormat::Tar => {
            let file = File::open(archive_path).map_err(|e| FetchError::io(archive_path, e))?;
            extract_tar(Archive::new(file), archive_path, output_dir)
        }
        ArchiveFormat::Zip => extract_zip(archive_path, output_dir),
    }
}

fn extract_tar<R: Read>(
    mut archive: Archive<R>,
    archive_path: &Path,
    output_dir: &Path,
) -> FetchResult<Vec<PathBuf>> {
    archive.set_overwrite(true);
    let mut extracted = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| FetchError::extract(archive_path, format!("failed to read entries: {}", e)))?
    {
        let mut entry = entry
            .map_err(|e| FetchError::extract(archive_path, format!("failed to read entry: {}", e)))?;

        let entry_path = entry
            .path()
            .map_err(|e| FetchError::extract(archive_path, format!("invalid entry path: {}", e)))?
            .to_path_buf();

        if !is_contained(&entry_path) {
            return Err(FetchError::extract(
                archive_path,
                format!("path traversal detected: {}", entry_path.display()),
            ));
        }

        entry.unpack_in(output_dir).map_err(|e| {
            FetchError::extract(
                archive_path,
                format!("failed to extract {}: {}", entry_path.display(), e),
            )
        })?;

        extracted.push(output_dir.join(&entry_path));
    }

    Ok(extracted)
}

fn extract_zip(archive_path: &Path, output_dir: &Path) -> FetchResult<Vec<PathBuf>> {
    let file = File::open(archive_path).map_err(|e| FetchError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| FetchError::extract(archive_path, format!("failed to open zip: {}", e)))?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FetchError::extract(archive_path, format!("failed to read entry: {}", e)))?;

        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                return Err(FetchError::extract(
                    archive_path,
                    format!("path traversal detected: {}", entry.name()),
                ))
            }
        };
        let target = output_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| FetchError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
            }
            let mut out = File::create(&target).map_err(|e| FetchError::io(&target, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| FetchError::io(&target, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                        .map_err(|e| FetchError::io(&target, e))?;
                }
            }
        }

        extracted.push(target);
    }

    Ok(extracted)
}

/// Whether a relative entry path stays inside the extraction root
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Compute the lowercase hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> FetchResult<String> {
    let mut file = File::open(path).map_err(|e| FetchError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| FetchError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
