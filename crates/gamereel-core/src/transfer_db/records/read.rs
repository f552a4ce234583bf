use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

use super::super::bitmap::PartBitmap;
use super::super::db::TransferDb;
use super::super::types::{Direction, TransferId, TransferRecord, TransferState};

const COLUMNS: &str = "id, direction, source, destination, total_bytes, bytes_transferred, \
     chunk_size, attempt_count, checkpoint, etag, fingerprint, upload_id, committed_parts, \
     part_etags, state, last_error, created_at, updated_at";

fn from_row(row: &SqliteRow) -> Result<TransferRecord> {
    let direction: String = row.get("direction");
    let direction = Direction::parse(&direction)
        .with_context(|| format!("unknown transfer direction {:?}", direction))?;
    let part_etags: String = row.get("part_etags");
    let part_etags: BTreeMap<u32, String> =
        serde_json::from_str(&part_etags).context("corrupt part_etags column")?;
    let committed: Vec<u8> = row.get("committed_parts");
    let state: String = row.get("state");
    Ok(TransferRecord {
        id: row.get("id"),
        direction,
        source: row.get("source"),
        destination: row.get("destination"),
        total_bytes: row.get::<i64, _>("total_bytes").max(0) as u64,
        bytes_transferred: row.get::<i64, _>("bytes_transferred").max(0) as u64,
        chunk_size: row.get::<i64, _>("chunk_size").max(0) as u64,
        attempt_count: row.get::<i64, _>("attempt_count").max(0) as u32,
        checkpoint: row.get::<i64, _>("checkpoint").max(0) as u64,
        etag: row.get("etag"),
        fingerprint: row.get("fingerprint"),
        upload_id: row.get("upload_id"),
        committed_parts: PartBitmap::from_bytes(&committed),
        part_etags,
        state: TransferState::from_str(&state),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl TransferDb {
    /// The record for this exact transfer, if one is being tracked.
    pub async fn find(
        &self,
        direction: Direction,
        source: &str,
        destination: &str,
    ) -> Result<Option<TransferRecord>> {
        let sql = format!(
            "SELECT {} FROM transfers WHERE direction = ?1 AND source = ?2 AND destination = ?3",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(direction.as_str())
            .bind(source)
            .bind(destination)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    pub async fn get(&self, id: TransferId) -> Result<Option<TransferRecord>> {
        let sql = format!("SELECT {} FROM transfers WHERE id = ?1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// All unfinished transfers, oldest first.
    pub async fn list(&self) -> Result<Vec<TransferRecord>> {
        let sql = format!("SELECT {} FROM transfers ORDER BY created_at ASC, id ASC", COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(from_row).collect()
    }
}
