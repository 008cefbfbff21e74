//! Fetch and extraction tests against local archives

use flate2::write::GzEncoder;
use flate2::Compression;
use kiln_fetch::{sha256_file, ArchiveSource, FetchError, FetchRequest, Fetcher};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a gzip tarball containing the given files
fn create_tarball(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let file = fs::File::create(&path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (entry_path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, entry_path, content.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
    path
}

fn local_request(archive: &Path) -> FetchRequest {
    let source = ArchiveSource::parse(archive.to_str().unwrap(), Path::new("/")).unwrap();
    FetchRequest::new(source, None).unwrap()
}

// ============================================================================
// Fetch and extract
// ============================================================================

#[test]
fn test_fetch_local_archive_extracts_tree() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[
            ("Tool/plotlib/Makefile", "FC = f77\n"),
            ("Tool/bin/Makefile", "all:\n"),
        ],
    );

    let fetcher = Fetcher::new(work.path());
    let outcome = fetcher.fetch(&local_request(&archive)).unwrap();

    assert!(outcome.downloaded);
    assert!(outcome.extracted);
    assert_eq!(outcome.archive_path, work.path().join("tool.tar.gz"));
    assert_eq!(
        fs::read_to_string(outcome.source_dir.join("Tool/plotlib/Makefile")).unwrap(),
        "FC = f77\n"
    );

    let stamp = fetcher.read_stamp().unwrap();
    assert_eq!(stamp.sha256, outcome.sha256);
    assert_eq!(stamp.entries, 2);
}

#[rstest]
#[case("xfoil6.99.tgz")]
#[case("xfoil.tar.gz")]
#[case("XFOIL.TGZ")]
#[case("download")]
fn test_format_sniffed_from_content_not_name(#[case] name: &str) {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(upstream.path(), name, &[("Xfoil/bin/Makefile", "all:\n")]);

    let outcome = Fetcher::new(work.path())
        .fetch(&local_request(&archive))
        .unwrap();
    assert_eq!(outcome.archive_path, work.path().join(name));
    assert!(outcome.source_dir.join("Xfoil/bin/Makefile").is_file());
}

#[test]
fn test_refetch_leaves_extracted_tree_unchanged() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[("Tool/plotlib/Makefile", "FC = f77\n")],
    );

    let fetcher = Fetcher::new(work.path());
    let request = local_request(&archive);
    let first = fetcher.fetch(&request).unwrap();

    // Simulate a patch applied between runs
    let makefile = first.source_dir.join("Tool/plotlib/Makefile");
    fs::write(&makefile, "FC = gfortran\n").unwrap();

    let second = fetcher.fetch(&request).unwrap();
    assert!(!second.downloaded);
    assert!(!second.extracted);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(fs::read_to_string(&makefile).unwrap(), "FC = gfortran\n");
}

#[test]
fn test_new_archive_replaces_previous_tree() {
    let old_release = TempDir::new().unwrap();
    let new_release = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let first = create_tarball(
        old_release.path(),
        "xfoil.tgz",
        &[("xfoil6.97/bin/Makefile", "all:\n")],
    );
    let second = create_tarball(
        new_release.path(),
        "xfoil.tgz",
        &[("xfoil6.99/bin/Makefile", "all:\n")],
    );

    let fetcher = Fetcher::new(work.path());
    fetcher.fetch(&local_request(&first)).unwrap();

    // Same archive name, new pinned digest
    let digest = sha256_file(&second).unwrap();
    let outcome = fetcher
        .fetch(&local_request(&second).with_sha256(Some(digest.clone())))
        .unwrap();

    assert!(outcome.downloaded);
    assert!(outcome.extracted);
    assert_eq!(outcome.sha256, digest);
    assert!(outcome.source_dir.join("xfoil6.99/bin/Makefile").is_file());
    assert!(!outcome.source_dir.join("xfoil6.97").exists());
}

#[test]
fn test_clean_forces_reextraction() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[("Tool/bin/Makefile", "all:\n")],
    );

    let fetcher = Fetcher::new(work.path());
    let request = local_request(&archive);
    fetcher.fetch(&request).unwrap();

    fetcher.clean().unwrap();
    assert!(!fetcher.source_dir().exists());
    assert!(fetcher.read_stamp().is_none());

    let outcome = fetcher.fetch(&request).unwrap();
    assert!(!outcome.downloaded);
    assert!(outcome.extracted);
    assert!(outcome.source_dir.join("Tool/bin/Makefile").exists());
}

#[test]
fn test_corrupt_cached_archive_is_refetched() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[("Tool/bin/Makefile", "all:\n")],
    );

    // A truncated download left behind by an interrupted run
    fs::write(work.path().join("tool.tar.gz"), [0x1f, 0x8b, 0x08, 0x00]).unwrap();

    let outcome = Fetcher::new(work.path())
        .fetch(&local_request(&archive))
        .unwrap();
    assert!(outcome.downloaded);
    assert_eq!(outcome.sha256, sha256_file(&archive).unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_checksum_mismatch_rejected() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[("Tool/bin/Makefile", "all:\n")],
    );

    let request = local_request(&archive).with_sha256(Some("0".repeat(64)));
    let err = Fetcher::new(work.path()).fetch(&request).unwrap_err();
    assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    assert!(!work.path().join("source").exists());
}

#[test]
fn test_checksum_match_accepted_case_insensitively() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let archive = create_tarball(
        upstream.path(),
        "tool.tar.gz",
        &[("Tool/bin/Makefile", "all:\n")],
    );

    let digest = sha256_file(&archive).unwrap().to_ascii_uppercase();
    let request = local_request(&archive).with_sha256(Some(digest));
    assert!(Fetcher::new(work.path()).fetch(&request).is_ok());
}

#[test]
fn test_missing_local_archive_is_io_error() {
    let work = TempDir::new().unwrap();
    let request = local_request(&work.path().join("absent.tgz"));
    let err = Fetcher::new(work.path().join("w")).fetch(&request).unwrap_err();
    assert!(matches!(err, FetchError::Io { .. }));
}

#[test]
fn test_unrecognized_format_is_extract_error() {
    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let bogus = upstream.path().join("tool.tgz");
    fs::write(&bogus, "<html>moved</html>").unwrap();

    let err = Fetcher::new(work.path())
        .fetch(&local_request(&bogus))
        .unwrap_err();
    assert!(err.is_extract());
    assert!(!work.path().join("tool.tgz").exists());
}

#[test]
fn test_zip_archive_extracts() {
    use std::io::Write;

    let upstream = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let path = upstream.path().join("tool.zip");
    {
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("Tool/bin/Makefile", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(b"all:\n").unwrap();
        zip.finish().unwrap();
    }

    let outcome = Fetcher::new(work.path())
        .fetch(&local_request(&path))
        .unwrap();
    assert_eq!(
        fs::read_to_string(outcome.source_dir.join("Tool/bin/Makefile")).unwrap(),
        "all:\n"
    );
}
