//! Durable transfer checkpoints (SQLite via sqlx).
//!
//! One row per `(direction, source, destination)`: sizes, the byte checkpoint
//! of a download, the multipart upload id with its committed-part bitmap and
//! part ETags, and the remote version tag used to validate a resume.

mod bitmap;
mod db;
mod records;
mod types;

pub use bitmap::PartBitmap;
pub use db::TransferDb;
pub use types::{Direction, NewTransfer, TransferId, TransferRecord, TransferState};

#[cfg(test)]
pub(crate) use db::open_memory;

#[cfg(test)]
mod tests;
