use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::plan::plan_chunks;
use super::progress::ProgressReporter;
use super::{db_err, early_failure, TransferEngine, TransferError, TransferProgress, TransferRequest};
use crate::checksum;
use crate::safe_resume;
use crate::storage::{self, PartialWriter};
use crate::transfer_db::{Direction, NewTransfer, TransferRecord};

impl TransferEngine {
    pub(super) async fn download(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferRecord, TransferError> {
        let key = req.key.as_str();
        let dest = req.local.as_path();
        let (source, destination) = req.endpoints();

        let (meta, _) = self
            .retried("head", || {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                async move { store.head(&key).await }
            })
            .await
            .map_err(|e| early_failure(Direction::Download, key, e))?;

        let existing = self
            .db
            .find(Direction::Download, &source, &destination)
            .await
            .map_err(db_err)?;
        let partial = storage::partial_len(dest);

        let resumable = match existing {
            Some(rec) => match safe_resume::validate_download(&rec, &meta, partial) {
                Ok(()) => Some(rec),
                Err(e) => {
                    warn!(key, dest = %dest.display(), "{}", e);
                    None
                }
            },
            None => {
                if let Some(len) = partial {
                    warn!(key, len, "discarding partial file with no checkpoint record");
                }
                None
            }
        };

        let (mut record, writer) = match resumable {
            Some(rec) => {
                self.db.mark_active(rec.id).await.map_err(db_err)?;
                let writer = if rec.checkpoint == 0 {
                    PartialWriter::create(dest)
                } else {
                    PartialWriter::open_existing(dest)
                }
                .map_err(TransferError::Local)?;
                info!(key, checkpoint = rec.checkpoint, total = rec.total_bytes, "resuming download");
                (rec, writer)
            }
            None => {
                storage::discard_partial(dest)?;
                let rec = self
                    .db
                    .start(&NewTransfer {
                        direction: Direction::Download,
                        source,
                        destination,
                        total_bytes: meta.size,
                        chunk_size: self.cfg.chunk_size.max(1),
                        etag: meta.etag.clone(),
                        fingerprint: None,
                    })
                    .await
                    .map_err(db_err)?;
                let writer = PartialWriter::create(dest).map_err(TransferError::Local)?;
                debug!(key, total = rec.total_bytes, "starting download");
                (rec, writer)
            }
        };
        writer.reserve(record.total_bytes);

        let chunks = plan_chunks(record.total_bytes, record.chunk_size);
        let reporter = ProgressReporter::new(progress, record.total_bytes, chunks.len() as u32);
        let mut checkpoint = record.checkpoint;
        let mut chunks_done = chunks.iter().filter(|c| c.end <= checkpoint).count() as u32;
        reporter.report(checkpoint, chunks_done);

        for chunk in &chunks {
            if chunk.end <= checkpoint {
                continue;
            }
            let fetched = self
                .retried("get range", || {
                    let store = Arc::clone(&self.store);
                    let key = key.to_string();
                    let (start, end) = (chunk.start, chunk.end);
                    async move { store.get_range(&key, start, end).await }
                })
                .await;
            let (data, attempts) = match fetched {
                Ok(v) => v,
                Err(e) => return Err(self.give_up(&record, key, checkpoint, e).await),
            };
            if attempts > 1 {
                self.db
                    .add_attempts(record.id, attempts - 1)
                    .await
                    .map_err(db_err)?;
            }

            let w = writer.clone();
            let offset = chunk.start;
            tokio::task::spawn_blocking(move || {
                w.write_at(offset, &data)?;
                w.sync()
            })
            .await
            .map_err(|e| TransferError::Local(e.into()))?
            .map_err(TransferError::Local)?;

            checkpoint = chunk.end;
            chunks_done += 1;
            self.db
                .set_checkpoint(record.id, checkpoint)
                .await
                .map_err(db_err)?;
            reporter.report(checkpoint, chunks_done);
        }

        let written = writer.len().map_err(TransferError::Local)?;
        if written != record.total_bytes {
            return Err(self
                .integrity_failure(&record, dest, format!("wrote {} of {} bytes", written, record.total_bytes))
                .await);
        }
        if let Some(expected) = &meta.sha256 {
            let actual = checksum::sha256_path_async(writer.path().to_path_buf())
                .await
                .map_err(TransferError::Local)?;
            if &actual != expected {
                return Err(self
                    .integrity_failure(&record, dest, format!("sha256 {} != {}", actual, expected))
                    .await);
            }
        }

        writer.finalize(dest).map_err(TransferError::Local)?;
        self.db.remove(record.id).await.map_err(db_err)?;
        record.checkpoint = record.total_bytes;
        record.bytes_transferred = record.total_bytes;
        info!(key, dest = %dest.display(), bytes = record.total_bytes, "download complete");
        Ok(record)
    }

    /// The assembled file is wrong: drop the partial and the record so the next run starts clean.
    pub(super) async fn integrity_failure(
        &self,
        record: &TransferRecord,
        dest: &std::path::Path,
        detail: String,
    ) -> TransferError {
        if let Err(e) = storage::discard_partial(dest) {
            warn!(dest = %dest.display(), "could not remove bad partial: {}", e);
        }
        if let Err(e) = self.db.remove(record.id).await {
            warn!(id = record.id, "could not drop transfer record: {:#}", e);
        }
        let key = match record.direction {
            Direction::Download => record.source.clone(),
            Direction::Upload => record.destination.clone(),
        };
        TransferError::Integrity { key, detail }
    }
}
