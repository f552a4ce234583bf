//! Partial files for resumable downloads.
//!
//! A download writes sequentially into `<dest>.part`; the file length always
//! equals the bytes written so far, so it can be compared against the durable
//! checkpoint on restart. Space is reserved without changing the visible length
//! (`FALLOC_FL_KEEP_SIZE` on Linux), and the partial is renamed onto the final
//! path only after the integrity check passes.

mod writer;

pub use writer::PartialWriter;

use std::path::{Path, PathBuf};

/// Suffix of in-progress files.
pub const PARTIAL_SUFFIX: &str = ".part";

/// `movie.mp4` -> `movie.mp4.part`.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(PARTIAL_SUFFIX);
    PathBuf::from(o)
}

/// Length of the partial for `final_path`, or None when there is none.
pub fn partial_len(final_path: &Path) -> Option<u64> {
    std::fs::metadata(partial_path(final_path))
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

/// Remove the partial for `final_path` if present.
pub fn discard_partial(final_path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(partial_path(final_path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
