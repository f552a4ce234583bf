use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::plan::{plan_chunks, Chunk};
use super::progress::ProgressReporter;
use super::{db_err, early_failure, TransferEngine, TransferError, TransferProgress, TransferRequest};
use crate::checksum;
use crate::safe_resume;
use crate::store::{ObjectMeta, StoreErrorKind, UploadedPart};
use crate::transfer_db::{Direction, NewTransfer, PartBitmap, TransferRecord};

/// `"{len}-{mtime_nanos}"`; changes whenever the file is rewritten.
fn local_fingerprint(meta: &std::fs::Metadata) -> String {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}-{}", meta.len(), mtime)
}

async fn read_chunk(path: &Path, chunk: &Chunk) -> std::io::Result<Vec<u8>> {
    let mut f = tokio::fs::File::open(path).await?;
    f.seek(std::io::SeekFrom::Start(chunk.start)).await?;
    let mut buf = vec![0u8; chunk.len() as usize];
    f.read_exact(&mut buf).await?;
    Ok(buf)
}

impl TransferEngine {
    pub(super) async fn upload(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferRecord, TransferError> {
        let local_meta = tokio::fs::metadata(&req.local).await?;
        let size = local_meta.len();
        let fingerprint = local_fingerprint(&local_meta);
        if size <= self.cfg.multipart_threshold {
            self.upload_single(req, size, fingerprint, progress).await
        } else {
            self.upload_multipart(req, size, fingerprint, progress).await
        }
    }

    async fn upload_single(
        &self,
        req: &TransferRequest,
        size: u64,
        fingerprint: String,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferRecord, TransferError> {
        let key = req.key.as_str();
        let (source, destination) = req.endpoints();
        let mut record = self
            .db
            .start(&NewTransfer {
                direction: Direction::Upload,
                source,
                destination,
                total_bytes: size,
                chunk_size: size.max(1),
                etag: None,
                fingerprint: Some(fingerprint),
            })
            .await
            .map_err(db_err)?;
        let reporter = ProgressReporter::new(progress, size, 1);
        reporter.report(0, 0);

        let put = self
            .retried("put", || {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                let file = req.local.clone();
                async move { store.put(&key, &file).await }
            })
            .await;
        let (put_meta, attempts) = match put {
            Ok(v) => v,
            Err(e) => return Err(self.give_up(&record, key, 0, e).await),
        };
        record.attempt_count += attempts;

        self.verify_remote(&record, key, &req.local, &put_meta).await?;
        self.db.remove(record.id).await.map_err(db_err)?;
        reporter.report(size, 1);
        record.bytes_transferred = size;
        record.checkpoint = size;
        info!(key, bytes = size, "upload complete");
        Ok(record)
    }

    async fn upload_multipart(
        &self,
        req: &TransferRequest,
        size: u64,
        fingerprint: String,
        progress: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferRecord, TransferError> {
        let key = req.key.as_str();
        let (source, destination) = req.endpoints();

        let existing = self
            .db
            .find(Direction::Upload, &source, &destination)
            .await
            .map_err(db_err)?;
        let resumable = match existing {
            Some(rec) => match safe_resume::validate_upload(&rec, &fingerprint) {
                Ok(()) => Some(rec),
                Err(e) => {
                    warn!(key, "{}", e);
                    if let Some(upload_id) = &rec.upload_id {
                        self.abort_quietly(key, upload_id).await;
                    }
                    None
                }
            },
            None => None,
        };
        let mut record = match resumable {
            Some(rec) => {
                self.db.mark_active(rec.id).await.map_err(db_err)?;
                rec
            }
            None => self
                .db
                .start(&NewTransfer {
                    direction: Direction::Upload,
                    source,
                    destination,
                    total_bytes: size,
                    chunk_size: self.cfg.chunk_size.max(1),
                    etag: None,
                    fingerprint: Some(fingerprint),
                })
                .await
                .map_err(db_err)?,
        };

        let chunks = plan_chunks(record.total_bytes, record.chunk_size);
        let upload_id = self.reconcile_upload(&mut record, key, &chunks).await?;

        let reporter = ProgressReporter::new(progress, record.total_bytes, chunks.len() as u32);
        let mut committed_bytes: u64 = chunks
            .iter()
            .filter(|c| record.committed_parts.is_set(c.index))
            .map(Chunk::len)
            .sum();
        let mut chunks_done = record.committed_parts.count_set(chunks.len() as u32);
        if chunks_done > 0 {
            info!(key, parts = chunks_done, bytes = committed_bytes, "resuming multipart upload");
        }
        reporter.report(committed_bytes, chunks_done);

        for chunk in &chunks {
            if record.committed_parts.is_set(chunk.index) {
                continue;
            }
            let data = read_chunk(&req.local, chunk).await?;
            let sent = self
                .retried("upload part", || {
                    let store = Arc::clone(&self.store);
                    let key = key.to_string();
                    let upload_id = upload_id.clone();
                    let data = data.clone();
                    let part = chunk.part_number();
                    async move { store.upload_part(&key, &upload_id, part, data).await }
                })
                .await;
            let (etag, attempts) = match sent {
                Ok(v) => v,
                Err(e) => return Err(self.give_up(&record, key, committed_bytes, e).await),
            };
            if attempts > 1 {
                self.db
                    .add_attempts(record.id, attempts - 1)
                    .await
                    .map_err(db_err)?;
            }
            record.committed_parts.set(chunk.index);
            record.part_etags.insert(chunk.part_number(), etag);
            committed_bytes += chunk.len();
            chunks_done += 1;
            self.db
                .set_parts(record.id, &record.committed_parts, &record.part_etags, committed_bytes)
                .await
                .map_err(db_err)?;
            reporter.report(committed_bytes, chunks_done);
        }

        let parts: Vec<UploadedPart> = chunks
            .iter()
            .filter_map(|c| {
                record.part_etags.get(&c.part_number()).map(|etag| UploadedPart {
                    part_number: c.part_number(),
                    etag: etag.clone(),
                    size: c.len(),
                })
            })
            .collect();
        if parts.len() != chunks.len() {
            return Err(self
                .integrity_failure(
                    &record,
                    &req.local,
                    format!("{} of {} parts committed", parts.len(), chunks.len()),
                )
                .await);
        }

        let completed = self
            .retried("complete multipart", || {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                let upload_id = upload_id.clone();
                let parts = parts.clone();
                async move { store.complete_multipart(&key, &upload_id, &parts).await }
            })
            .await;
        let final_meta = match completed {
            Ok((m, _)) => m,
            // A retried complete can find the upload already gone because the first call landed.
            Err(e) if e.last.kind == StoreErrorKind::NotFound && e.attempts > 1 => {
                debug!(key, "upload id gone after retried complete; checking object");
                ObjectMeta {
                    size: record.total_bytes,
                    etag: None,
                    sha256: None,
                }
            }
            Err(e) => return Err(self.give_up(&record, key, committed_bytes, e).await),
        };

        self.verify_remote(&record, key, &req.local, &final_meta).await?;
        self.db.remove(record.id).await.map_err(db_err)?;
        record.bytes_transferred = record.total_bytes;
        record.checkpoint = record.total_bytes;
        info!(key, bytes = record.total_bytes, parts = parts.len(), "multipart upload complete");
        Ok(record)
    }

    /// Make sure the record has a live upload id and that its committed-part set
    /// matches what the store actually holds. Returns the upload id.
    async fn reconcile_upload(
        &self,
        record: &mut TransferRecord,
        key: &str,
        chunks: &[Chunk],
    ) -> Result<String, TransferError> {
        if let Some(upload_id) = record.upload_id.clone() {
            let listed = self
                .retried("list parts", || {
                    let store = Arc::clone(&self.store);
                    let key = key.to_string();
                    let upload_id = upload_id.clone();
                    async move { store.list_parts(&key, &upload_id).await }
                })
                .await;
            match listed {
                Ok((parts, _)) => {
                    let mut bitmap = PartBitmap::new(chunks.len() as u32);
                    let mut etags = BTreeMap::new();
                    for chunk in chunks {
                        let acked = parts
                            .iter()
                            .find(|p| p.part_number == chunk.part_number() && p.size == chunk.len());
                        if let Some(p) = acked {
                            bitmap.set(chunk.index);
                            etags.insert(p.part_number, p.etag.clone());
                        }
                    }
                    let count = chunks.len() as u32;
                    let dropped = record
                        .committed_parts
                        .count_set(count)
                        .saturating_sub(bitmap.count_set(count));
                    if dropped > 0 {
                        warn!(key, dropped, "store no longer holds some recorded parts; re-sending them");
                    }
                    let bytes = chunks
                        .iter()
                        .filter(|c| bitmap.is_set(c.index))
                        .map(Chunk::len)
                        .sum();
                    self.db
                        .set_parts(record.id, &bitmap, &etags, bytes)
                        .await
                        .map_err(db_err)?;
                    record.committed_parts = bitmap;
                    record.part_etags = etags;
                    record.bytes_transferred = bytes;
                    return Ok(upload_id);
                }
                Err(e) if e.last.is_not_found() => {
                    warn!(key, %upload_id, "multipart upload expired; starting a new one");
                }
                Err(e) => return Err(self.give_up(record, key, record.bytes_transferred, e).await),
            }
        }

        let created = self
            .retried("create multipart", || {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                async move { store.create_multipart(&key).await }
            })
            .await;
        let upload_id = match created {
            Ok((id, _)) => id,
            Err(e) => return Err(self.give_up(record, key, 0, e).await),
        };
        record.committed_parts = PartBitmap::new(chunks.len() as u32);
        record.part_etags.clear();
        record.bytes_transferred = 0;
        self.db
            .set_parts(record.id, &record.committed_parts, &record.part_etags, 0)
            .await
            .map_err(db_err)?;
        self.db
            .set_upload_id(record.id, Some(&upload_id))
            .await
            .map_err(db_err)?;
        record.upload_id = Some(upload_id.clone());
        debug!(key, %upload_id, parts = chunks.len(), "multipart upload created");
        Ok(upload_id)
    }

    /// HEAD the finished object and compare size, ETag and (when stored) SHA-256.
    async fn verify_remote(
        &self,
        record: &TransferRecord,
        key: &str,
        local: &Path,
        written: &ObjectMeta,
    ) -> Result<(), TransferError> {
        let (remote, _) = self
            .retried("verify head", || {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                async move { store.head(&key).await }
            })
            .await
            .map_err(|e| early_failure(Direction::Upload, key, e))?;

        let mut problems = Vec::new();
        if remote.size != record.total_bytes {
            problems.push(format!("size {} != {}", remote.size, record.total_bytes));
        }
        if let (Some(a), Some(b)) = (&written.etag, &remote.etag) {
            if a != b {
                problems.push(format!("etag {} != {}", b, a));
            }
        }
        if let Some(remote_sha) = &remote.sha256 {
            let local_sha = checksum::sha256_path_async(local.to_path_buf())
                .await
                .map_err(TransferError::Local)?;
            if &local_sha != remote_sha {
                problems.push(format!("sha256 {} != {}", remote_sha, local_sha));
            }
        }
        if problems.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.db.remove(record.id).await {
            warn!(id = record.id, "could not drop transfer record: {:#}", e);
        }
        Err(TransferError::Integrity {
            key: key.to_string(),
            detail: problems.join("; "),
        })
    }

    pub(super) async fn abort_quietly(&self, key: &str, upload_id: &str) {
        if let Err(e) = self.store.abort_multipart(key, upload_id).await {
            debug!(key, upload_id, "abort of stale multipart upload failed: {}", e);
        }
    }
}
