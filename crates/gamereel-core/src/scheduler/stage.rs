use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::job_store::{Angle, JobStoreError};
use crate::media::MediaError;
use crate::transfer::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Probe,
    Transcode,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Probe => "probe",
            Stage::Transcode => "transcode",
            Stage::Upload => "upload",
        })
    }
}

/// A failed angle stage. The Display text becomes the angle's error reason.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("extract_failed: {0}")]
    Extract(#[source] MediaError),
    #[error("probe_failed: {0}")]
    Probe(#[source] MediaError),
    #[error("transcode_failed: {0}")]
    Transcode(#[source] MediaError),
    #[error("upload_failed: {0}")]
    Upload(#[source] TransferError),
    #[error("{stage}_timeout: no result after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },
    #[error("missing_source: no recording for {0}")]
    MissingSource(Angle),
    #[error("state: {0}")]
    State(#[from] JobStoreError),
}

/// Await `fut` for at most `limit`. On expiry the future is dropped, which kills
/// any child process it owns.
pub(crate) async fn within<T>(
    stage: Stage,
    limit: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, StageError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StageError::Timeout {
            stage,
            after: limit,
        })
}
