//! Kiln archive fetching
//!
//! Retrieves an upstream source archive and unpacks it into a working
//! directory. Both steps are safe to repeat:
//! - a cached archive is reused when it is readable (and matches the
//!   configured SHA-256), otherwise it is fetched again
//! - extraction is skipped when a stamp records that the same archive was
//!   already unpacked, so a previously patched tree is left untouched

pub mod archive;
pub mod error;
pub mod fetcher;
pub mod source;

pub use archive::{sha256_file, ArchiveFormat};
pub use error::{FetchError, FetchResult};
pub use fetcher::{ExtractionStamp, FetchOutcome, FetchRequest, Fetcher, SOURCE_DIR, STATE_DIR};
pub use source::ArchiveSource;
