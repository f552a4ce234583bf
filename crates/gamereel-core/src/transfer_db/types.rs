//! Row types for the checkpoint database.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::bitmap::PartBitmap;

pub type TransferId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Object store -> local file.
    Download,
    /// Local file -> object store.
    Upload,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "download" => Some(Direction::Download),
            "upload" => Some(Direction::Upload),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Being transferred, or interrupted without a recorded failure.
    Active,
    /// Retries were exhausted; the checkpoint is kept for the next attempt.
    Error,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferState::Active => "active",
            TransferState::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => TransferState::Active,
            _ => TransferState::Error,
        }
    }
}

/// Fields needed to start tracking a transfer.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    pub total_bytes: u64,
    pub chunk_size: u64,
    /// Remote version tag (downloads).
    pub etag: Option<String>,
    /// Local file identity, `"{len}-{mtime}"` (uploads).
    pub fingerprint: Option<String>,
}

/// One resumable transfer.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: TransferId,
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub chunk_size: u64,
    pub attempt_count: u32,
    /// Last verified byte boundary of a download.
    pub checkpoint: u64,
    pub etag: Option<String>,
    pub fingerprint: Option<String>,
    pub upload_id: Option<String>,
    pub committed_parts: PartBitmap,
    /// ETag per committed 1-based part number.
    pub part_etags: BTreeMap<u32, String>,
    pub state: TransferState,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TransferRecord {
    /// Number of chunks for this record's size and chunk size.
    pub fn chunk_count(&self) -> u32 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.total_bytes.div_ceil(self.chunk_size) as u32
    }

    /// Failed, or an upload whose local source no longer exists and so can never resume.
    pub fn prunable(&self) -> bool {
        match (self.state, self.direction) {
            (TransferState::Error, _) => true,
            (TransferState::Active, Direction::Upload) => !Path::new(&self.source).exists(),
            (TransferState::Active, Direction::Download) => false,
        }
    }
}
