use anyhow::Result;
use std::collections::BTreeMap;

use super::super::bitmap::PartBitmap;
use super::super::db::{unix_timestamp, TransferDb};
use super::super::types::{NewTransfer, TransferId, TransferRecord, TransferState};

impl TransferDb {
    /// Start tracking a transfer, replacing any previous record with the same identity.
    pub async fn start(&self, t: &NewTransfer) -> Result<TransferRecord> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM transfers
            WHERE direction = ?1 AND source = ?2 AND destination = ?3
            "#,
        )
        .bind(t.direction.as_str())
        .bind(&t.source)
        .bind(&t.destination)
        .execute(&mut *tx)
        .await?;
        let id = sqlx::query(
            r#"
            INSERT INTO transfers (
                direction, source, destination, total_bytes, chunk_size,
                etag, fingerprint, state, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(t.direction.as_str())
        .bind(&t.source)
        .bind(&t.destination)
        .bind(t.total_bytes as i64)
        .bind(t.chunk_size as i64)
        .bind(&t.etag)
        .bind(&t.fingerprint)
        .bind(TransferState::Active.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(TransferRecord {
            id,
            direction: t.direction,
            source: t.source.clone(),
            destination: t.destination.clone(),
            total_bytes: t.total_bytes,
            bytes_transferred: 0,
            chunk_size: t.chunk_size,
            attempt_count: 0,
            checkpoint: 0,
            etag: t.etag.clone(),
            fingerprint: t.fingerprint.clone(),
            upload_id: None,
            committed_parts: PartBitmap::default(),
            part_etags: BTreeMap::new(),
            state: TransferState::Active,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Record a verified download boundary. Never moves the checkpoint backwards.
    pub async fn set_checkpoint(&self, id: TransferId, checkpoint: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET checkpoint = MAX(checkpoint, ?1),
                bytes_transferred = MAX(bytes_transferred, ?1),
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(checkpoint as i64)
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_upload_id(&self, id: TransferId, upload_id: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET upload_id = ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(upload_id)
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the committed-part set after a part is acknowledged.
    pub async fn set_parts(
        &self,
        id: TransferId,
        committed: &PartBitmap,
        part_etags: &BTreeMap<u32, String>,
        bytes_transferred: u64,
    ) -> Result<()> {
        let etags = serde_json::to_string(part_etags)?;
        sqlx::query(
            r#"
            UPDATE transfers
            SET committed_parts = ?1,
                part_etags = ?2,
                bytes_transferred = ?3,
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(committed.as_bytes())
        .bind(etags)
        .bind(bytes_transferred as i64)
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_attempts(&self, id: TransferId, n: u32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET attempt_count = attempt_count + ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(i64::from(n))
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_error(&self, id: TransferId, message: &str) -> Result<()> {
        self.set_state(id, TransferState::Error, Some(message)).await
    }

    pub async fn mark_active(&self, id: TransferId) -> Result<()> {
        self.set_state(id, TransferState::Active, None).await
    }

    async fn set_state(
        &self,
        id: TransferId,
        state: TransferState,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET state = ?1,
                last_error = ?2,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget a transfer (finished or abandoned).
    pub async fn remove(&self, id: TransferId) -> Result<()> {
        sqlx::query("DELETE FROM transfers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
