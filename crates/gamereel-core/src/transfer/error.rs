use thiserror::Error;

use crate::store::StoreError;
use crate::transfer_db::Direction;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Retries ran out (or the error was not retryable). Progress up to
    /// `checkpoint` is kept for the next invocation.
    #[error("{direction} of {key} failed after {attempts} attempt(s), checkpoint at {checkpoint} bytes: {source}")]
    Exhausted {
        direction: Direction,
        key: String,
        attempts: u32,
        checkpoint: u64,
        #[source]
        source: StoreError,
    },

    #[error("integrity check failed for {key}: {detail}")]
    Integrity { key: String, detail: String },

    #[error("local file: {0:#}")]
    Local(anyhow::Error),

    #[error("transfer checkpoint db: {0:#}")]
    Db(anyhow::Error),
}

impl TransferError {
    /// Bytes known to be safely transferred when the error happened.
    pub fn checkpoint(&self) -> Option<u64> {
        match self {
            TransferError::Exhausted { checkpoint, .. } => Some(*checkpoint),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Local(e.into())
    }
}
