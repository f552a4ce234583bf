//! Decide whether a recorded transfer may continue from its checkpoint.
//!
//! A download resumes only when the remote object is unchanged (size and ETag)
//! and the local partial is exactly as long as the checkpoint. An upload
//! resumes only when the local source file is unchanged. Anything else means
//! the caller discards progress and starts over from zero.

mod error;

pub use error::{ResumeError, ResumeErrorKind};

use crate::store::ObjectMeta;
use crate::transfer_db::TransferRecord;

/// Check a download record against the current remote metadata and partial length.
pub fn validate_download(
    record: &TransferRecord,
    remote: &ObjectMeta,
    partial_len: Option<u64>,
) -> Result<(), ResumeError> {
    let etag_changed = match (&record.etag, &remote.etag) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    };
    let size_changed = record.total_bytes != remote.size;
    if etag_changed || size_changed {
        return Err(ResumeError {
            kind: ResumeErrorKind::RemoteChanged {
                etag_changed,
                size_changed,
            },
        });
    }
    match partial_len {
        None if record.checkpoint > 0 => Err(ResumeError {
            kind: ResumeErrorKind::PartialMissing {
                checkpoint: record.checkpoint,
            },
        }),
        Some(len) if len != record.checkpoint => Err(ResumeError {
            kind: ResumeErrorKind::PartialMismatch {
                checkpoint: record.checkpoint,
                partial_len: len,
            },
        }),
        _ => Ok(()),
    }
}

/// Check an upload record against the local file's current fingerprint.
pub fn validate_upload(record: &TransferRecord, fingerprint: &str) -> Result<(), ResumeError> {
    if record.fingerprint.as_deref() != Some(fingerprint) {
        return Err(ResumeError {
            kind: ResumeErrorKind::SourceChanged,
        });
    }
    Ok(())
}
