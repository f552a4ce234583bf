//! S3-compatible object store (AWS, MinIO, R2).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::debug;

use super::{clean_etag, ObjectMeta, ObjectStore, StoreError, StoreErrorKind, UploadedPart};
use crate::checksum;
use crate::config::StorageConfig;

/// User metadata key carrying the hex SHA-256 of single-put objects.
const SHA256_META: &str = "sha256";

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    /// Static credentials; None uses the default AWS provider chain.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Settings {
    /// Settings from `[storage]`, with static credentials taken from
    /// `GAMEREEL_S3_ACCESS_KEY_ID` / `GAMEREEL_S3_SECRET_ACCESS_KEY` when both are set.
    pub fn from_config(cfg: &StorageConfig) -> Self {
        Self {
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
            endpoint_url: cfg.endpoint_url.clone(),
            access_key_id: std::env::var("GAMEREEL_S3_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("GAMEREEL_S3_SECRET_ACCESS_KEY").ok(),
        }
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(settings: S3Settings) -> Self {
        let conf = match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(id), Some(secret)) => {
                let credentials = Credentials::new(id, secret, None, None, "gamereel");
                let mut b = Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(settings.region.clone()))
                    .credentials_provider(credentials);
                if let Some(ep) = &settings.endpoint_url {
                    b = b.endpoint_url(ep).force_path_style(true);
                }
                b.build()
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(settings.region.clone()))
                    .load()
                    .await;
                let mut b = Builder::from(&shared);
                if let Some(ep) = &settings.endpoint_url {
                    b = b.endpoint_url(ep).force_path_style(true);
                }
                b.build()
            }
        };
        debug!(bucket = %settings.bucket, endpoint = ?settings.endpoint_url, "s3 client ready");
        Self {
            client: Client::from_conf(conf),
            bucket: settings.bucket,
        }
    }
}

fn sdk_err<E>(op: &str, key: &str, e: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let kind = match &e {
        SdkError::TimeoutError(_) => StoreErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => StoreErrorKind::Connection,
        SdkError::ServiceError(se) => {
            let status = se.raw().status().as_u16();
            match (se.err().code(), status) {
                (Some("NoSuchKey" | "NoSuchUpload" | "NotFound"), _) | (_, 404) => {
                    StoreErrorKind::NotFound
                }
                (Some("SlowDown"), _) | (_, 429 | 503) => StoreErrorKind::Throttled,
                (_, 500..=599) => StoreErrorKind::Server,
                _ => StoreErrorKind::Other,
            }
        }
        _ => StoreErrorKind::Other,
    };
    StoreError::new(kind, format!("{} {}: {}", op, key, DisplayErrorContext(&e)))
}

fn missing(op: &str, field: &str) -> StoreError {
    StoreError::new(
        StoreErrorKind::Other,
        format!("{} response has no {}", op, field),
    )
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let out = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_err("head", key, e))?;
        Ok(ObjectMeta {
            size: out.content_length().unwrap_or(0).max(0) as u64,
            etag: out.e_tag().map(clean_etag),
            sha256: out
                .metadata()
                .and_then(|m| m.get(SHA256_META))
                .map(|s| s.to_ascii_lowercase()),
        })
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, end - 1))
            .send()
            .await
            .map_err(|e| sdk_err("get", key, e))?;
        let bytes = out
            .body
            .collect()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Connection, format!("get {}: {}", key, e)))?
            .into_bytes()
            .to_vec();
        let expected = end - start;
        if bytes.len() as u64 != expected {
            return Err(StoreError::new(
                StoreErrorKind::ShortRead,
                format!("get {}: expected {} bytes, got {}", key, expected, bytes.len()),
            ));
        }
        Ok(bytes)
    }

    async fn put(&self, key: &str, file: &Path) -> Result<ObjectMeta, StoreError> {
        let sha = checksum::sha256_path_async(file.to_path_buf())
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Other, format!("hash {}: {}", file.display(), e)))?;
        let size = tokio::fs::metadata(file)
            .await
            .map_err(|e| StoreError::from_io("stat upload source", &e))?
            .len();
        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Other, format!("read {}: {}", file.display(), e)))?;
        let out = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("video/mp4")
            .metadata(SHA256_META, &sha)
            .body(body)
            .send()
            .await
            .map_err(|e| sdk_err("put", key, e))?;
        Ok(ObjectMeta {
            size,
            etag: out.e_tag().map(clean_etag),
            sha256: Some(sha),
        })
    }

    async fn create_multipart(&self, key: &str) -> Result<String, StoreError> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type("video/mp4")
            .send()
            .await
            .map_err(|e| sdk_err("create multipart", key, e))?;
        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| missing("create multipart", "upload id"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StoreError> {
        let out = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_err("upload part", key, e))?;
        out.e_tag()
            .map(clean_etag)
            .ok_or_else(|| missing("upload part", "etag"))
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<UploadedPart>, StoreError> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_err("list parts", key, e))?;
            for p in out.parts() {
                if let (Some(n), Some(etag)) = (p.part_number(), p.e_tag()) {
                    parts.push(UploadedPart {
                        part_number: n.max(0) as u32,
                        etag: clean_etag(etag),
                        size: p.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }
            match (out.is_truncated(), out.next_part_number_marker()) {
                (Some(true), Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<ObjectMeta, StoreError> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();
        let out = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_err("complete multipart", key, e))?;
        Ok(ObjectMeta {
            size: parts.iter().map(|p| p.size).sum(),
            etag: out.e_tag().map(clean_etag),
            sha256: None,
        })
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_err("abort multipart", key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_storage_config() {
        let cfg = StorageConfig {
            bucket: "league-archive".to_string(),
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            ..StorageConfig::default()
        };
        let s = S3Settings::from_config(&cfg);
        assert_eq!(s.bucket, "league-archive");
        assert_eq!(s.region, "us-east-1");
        assert_eq!(s.endpoint_url.as_deref(), Some("http://127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn client_builds_with_static_credentials() {
        let store = S3Store::new(S3Settings {
            bucket: "b".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: Some("http://127.0.0.1:9".to_string()),
            access_key_id: Some("id".to_string()),
            secret_access_key: Some("secret".to_string()),
        })
        .await;
        assert_eq!(store.name(), "s3");
        assert_eq!(store.bucket, "b");
    }
}
