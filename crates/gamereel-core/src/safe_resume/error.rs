use std::fmt;

/// Why a recorded transfer cannot continue from its checkpoint.
#[derive(Debug)]
pub struct ResumeError {
    pub kind: ResumeErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResumeErrorKind {
    /// Remote size or ETag differs from what was recorded.
    RemoteChanged {
        etag_changed: bool,
        size_changed: bool,
    },
    /// The checkpoint is past zero but the partial file is gone.
    PartialMissing { checkpoint: u64 },
    /// The partial is longer or shorter than the verified prefix.
    PartialMismatch { checkpoint: u64, partial_len: u64 },
    /// The local upload source was modified.
    SourceChanged,
}

impl fmt::Display for ResumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResumeErrorKind::RemoteChanged {
                etag_changed,
                size_changed,
            } => {
                write!(f, "remote object changed")?;
                match (etag_changed, size_changed) {
                    (true, true) => write!(f, " (ETag, size)")?,
                    (true, false) => write!(f, " (ETag)")?,
                    (false, true) => write!(f, " (size)")?,
                    (false, false) => {}
                }
                write!(f, "; restarting from zero")
            }
            ResumeErrorKind::PartialMissing { checkpoint } => write!(
                f,
                "partial file missing (checkpoint at {} bytes); restarting from zero",
                checkpoint
            ),
            ResumeErrorKind::PartialMismatch {
                checkpoint,
                partial_len,
            } => write!(
                f,
                "partial file is {} bytes but checkpoint is {}; restarting from zero",
                partial_len, checkpoint
            ),
            ResumeErrorKind::SourceChanged => {
                write!(f, "local file changed since the upload started; restarting")
            }
        }
    }
}

impl std::error::Error for ResumeError {}
