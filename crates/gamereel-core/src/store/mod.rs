//! Object storage seen by the transfer engine.
//!
//! [`ObjectStore`] covers what chunked transfers need: metadata (`head`),
//! byte ranges for downloads, single-shot `put`, and multipart uploads whose
//! parts are committed independently and can be listed after a restart.
//!
//! Backends: [`S3Store`] (any S3-compatible endpoint), [`LocalStore`]
//! (a directory, used for tests and offline runs) and [`HttpSource`]
//! (read-only HTTP(S) with Range support).

mod error;
mod http;
mod local;
mod s3;

pub use error::{StoreError, StoreErrorKind};
pub use http::{parse_head_headers, HttpSource};
pub use local::LocalStore;
pub use s3::{S3Settings, S3Store};

use async_trait::async_trait;
use std::path::Path;

/// Object metadata returned by `head`, `put` and `complete_multipart`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMeta {
    pub size: u64,
    /// Opaque version tag (quotes stripped).
    pub etag: Option<String>,
    /// Lowercase hex SHA-256 of the content, when the backend knows it.
    pub sha256: Option<String>,
}

/// A committed multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based part number.
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError>;

    /// Bytes `[start, end)` of the object.
    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError>;

    async fn put(&self, key: &str, file: &Path) -> Result<ObjectMeta, StoreError>;

    /// Start a multipart upload; returns the upload id.
    async fn create_multipart(&self, key: &str) -> Result<String, StoreError>;

    /// Commit one part; returns its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StoreError>;

    /// Parts the store has already committed for this upload, ascending by part number.
    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<UploadedPart>, StoreError>;

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<ObjectMeta, StoreError>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;
}

/// Strip surrounding quotes that S3 and HTTP servers put around ETags.
pub(crate) fn clean_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}
