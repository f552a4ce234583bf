//! Resumable chunked transfers between local files and an [`ObjectStore`].
//!
//! Downloads write sequentially into a partial file and persist a byte
//! checkpoint after every flushed chunk. Uploads above the multipart threshold
//! commit each chunk as an independent part and persist which parts the store
//! has acknowledged. Each chunk is retried with exponential backoff; when the
//! attempts run out the record is marked `error` and kept, so calling
//! [`TransferEngine::transfer`] again for the same pair resumes it.

mod download;
mod error;
mod plan;
mod progress;
mod upload;

pub use error::TransferError;
pub use plan::{plan_chunks, Chunk};
pub use progress::TransferProgress;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::TransferConfig;
use crate::retry::{run_with_retry, Exhausted, RetryPolicy};
use crate::store::{ObjectStore, StoreError};
use crate::transfer_db::{Direction, TransferDb, TransferRecord};

/// What to move and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: Direction,
    pub local: PathBuf,
    pub key: String,
}

impl TransferRequest {
    pub fn download(key: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self {
            direction: Direction::Download,
            local: local.into(),
            key: key.into(),
        }
    }

    pub fn upload(local: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            direction: Direction::Upload,
            local: local.into(),
            key: key.into(),
        }
    }

    /// `(source, destination)` as stored in the checkpoint db.
    pub(crate) fn endpoints(&self) -> (String, String) {
        let local = self.local.display().to_string();
        match self.direction {
            Direction::Download => (self.key.clone(), local),
            Direction::Upload => (local, self.key.clone()),
        }
    }
}

#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
    db: TransferDb,
    cfg: TransferConfig,
    policy: RetryPolicy,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn ObjectStore>, db: TransferDb, cfg: TransferConfig) -> Self {
        let policy = cfg.retry_policy();
        Self {
            store,
            db,
            cfg,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn db(&self) -> &TransferDb {
        &self.db
    }

    /// Run (or resume) one transfer. On success the returned record has
    /// `bytes_transferred == total_bytes` and the durable record is gone.
    pub async fn transfer(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferRecord, TransferError> {
        match req.direction {
            Direction::Download => self.download(req, progress).await,
            Direction::Upload => self.upload(req, progress).await,
        }
    }

    /// Forget a transfer that will not be resumed: abort its multipart upload,
    /// discard a download partial and drop the record. Failures are only logged.
    pub async fn abandon(&self, req: &TransferRequest) {
        let (source, destination) = req.endpoints();
        let record = match self.db.find(req.direction, &source, &destination).await {
            Ok(Some(r)) => r,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(key = %req.key, "could not look up transfer to abandon: {:#}", e);
                return;
            }
        };
        if let Some(upload_id) = &record.upload_id {
            self.abort_quietly(&req.key, upload_id).await;
        }
        if req.direction == Direction::Download {
            if let Err(e) = crate::storage::discard_partial(&req.local) {
                tracing::warn!(dest = %req.local.display(), "could not remove partial: {}", e);
            }
        }
        if let Err(e) = self.db.remove(record.id).await {
            tracing::warn!(id = record.id, "could not drop transfer record: {:#}", e);
            return;
        }
        tracing::info!(direction = %req.direction, key = %req.key, id = record.id, "transfer abandoned");
    }

    /// Run a store call under the retry policy; also returns how many attempts it took.
    async fn retried<T, F, Fut>(
        &self,
        what: &str,
        mut op: F,
    ) -> Result<(T, u32), Exhausted<StoreError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempts = 0u32;
        let out = run_with_retry(&self.policy, what, |n| {
            attempts = n;
            op()
        })
        .await?;
        Ok((out, attempts))
    }

    /// Record failed attempts and the error on the durable record, then build the error.
    async fn give_up(
        &self,
        record: &TransferRecord,
        key: &str,
        checkpoint: u64,
        e: Exhausted<StoreError>,
    ) -> TransferError {
        let message = e.last.to_string();
        if let Err(db_err) = self.db.add_attempts(record.id, e.attempts).await {
            tracing::warn!(id = record.id, "could not record attempts: {:#}", db_err);
        }
        if let Err(db_err) = self.db.mark_error(record.id, &message).await {
            tracing::warn!(id = record.id, "could not mark transfer failed: {:#}", db_err);
        }
        tracing::warn!(
            direction = %record.direction,
            key,
            attempts = e.attempts,
            checkpoint,
            "transfer gave up: {}",
            message
        );
        TransferError::Exhausted {
            direction: record.direction,
            key: key.to_string(),
            attempts: e.attempts,
            checkpoint,
            source: e.last,
        }
    }
}

fn db_err(e: anyhow::Error) -> TransferError {
    TransferError::Db(e)
}

/// Error for a call that failed before any durable record existed.
fn early_failure(direction: Direction, key: &str, e: Exhausted<StoreError>) -> TransferError {
    TransferError::Exhausted {
        direction,
        key: key.to_string(),
        attempts: e.attempts,
        checkpoint: 0,
        source: e.last,
    }
}
