//! Directory-backed store. Objects are files under `root`; in-flight multipart
//! uploads live under `root/.multipart/<upload_id>/` with one file per part.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{ObjectMeta, ObjectStore, StoreError, StoreErrorKind, UploadedPart};
use crate::checksum;

const MULTIPART_DIR: &str = ".multipart";
const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`. Rejects keys that would escape the root.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|seg| seg == ".." || seg == MULTIPART_DIR) {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                format!("invalid key: {:?}", key),
            ));
        }
        Ok(self.root.join(key))
    }

    fn upload_dir(&self, upload_id: &str) -> Result<PathBuf, StoreError> {
        if upload_id.is_empty() || !upload_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                format!("invalid upload id: {:?}", upload_id),
            ));
        }
        Ok(self.root.join(MULTIPART_DIR).join(upload_id))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("{:05}{}", part_number, PART_SUFFIX))
    }
}

async fn sha256_of(path: &Path) -> Result<String, StoreError> {
    checksum::sha256_path_async(path.to_path_buf())
        .await
        .map_err(|e| StoreError::new(StoreErrorKind::Other, format!("{:#}", e)))
}

/// Write via a sibling temp file and rename, so readers never see a half-written object.
async fn write_atomic(dest: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::from_io("create dir", &e))?;
    }
    let tmp = crate::storage::partial_path(dest);
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| StoreError::from_io("write", &e))?;
    tokio::fs::rename(&tmp, dest)
        .await
        .map_err(|e| StoreError::from_io("rename", &e))
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let path = self.object_path(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StoreError::from_io(key, &e))?;
        if !meta.is_file() {
            return Err(StoreError::not_found(key));
        }
        let digest = sha256_of(&path).await?;
        Ok(ObjectMeta {
            size: meta.len(),
            etag: Some(digest.clone()),
            sha256: Some(digest),
        })
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        let mut f = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StoreError::from_io(key, &e))?;
        let len = f
            .metadata()
            .await
            .map_err(|e| StoreError::from_io(key, &e))?
            .len();
        if start > end || end > len {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                format!("range {}..{} outside object of {} bytes", start, end, len),
            ));
        }
        f.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| StoreError::from_io(key, &e))?;
        let mut buf = vec![0u8; (end - start) as usize];
        f.read_exact(&mut buf)
            .await
            .map_err(|e| StoreError::from_io(key, &e))?;
        Ok(buf)
    }

    async fn put(&self, key: &str, file: &Path) -> Result<ObjectMeta, StoreError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io("create dir", &e))?;
        }
        let tmp = crate::storage::partial_path(&dest);
        tokio::fs::copy(file, &tmp)
            .await
            .map_err(|e| StoreError::from_io("copy", &e))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| StoreError::from_io("rename", &e))?;
        self.head(key).await
    }

    async fn create_multipart(&self, key: &str) -> Result<String, StoreError> {
        self.object_path(key)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seed = format!("{}:{}:{}", key, nanos, std::process::id());
        let upload_id = checksum::sha256_bytes(seed.as_bytes())[..24].to_string();
        let dir = self.upload_dir(&upload_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::from_io("create upload dir", &e))?;
        tokio::fs::write(dir.join("key"), key)
            .await
            .map_err(|e| StoreError::from_io("write upload key", &e))?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StoreError> {
        let dir = self.upload_dir(upload_id)?;
        if !dir.is_dir() {
            return Err(StoreError::not_found(upload_id));
        }
        let etag = checksum::sha256_bytes(&data);
        write_atomic(&Self::part_path(&dir, part_number), &data).await?;
        Ok(etag)
    }

    async fn list_parts(&self, _key: &str, upload_id: &str) -> Result<Vec<UploadedPart>, StoreError> {
        let dir = self.upload_dir(upload_id)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::from_io(upload_id, &e))?;
        let mut parts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io("read upload dir", &e))?
        {
            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|n| n.strip_suffix(PART_SUFFIX))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let path = entry.path();
            let size = entry
                .metadata()
                .await
                .map_err(|e| StoreError::from_io("stat part", &e))?
                .len();
            parts.push(UploadedPart {
                part_number: number,
                etag: sha256_of(&path).await?,
                size,
            });
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
        let dir = self.upload_dir(upload_id)?;
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io("create dir", &e))?;
        }
        let tmp = crate::storage::partial_path(&dest);
        let mut out = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::from_io("create object", &e))?;
        for (i, part) in parts.iter().enumerate() {
            if part.part_number as usize != i + 1 {
                return Err(StoreError::new(
                    StoreErrorKind::Other,
                    format!("parts must be consecutive from 1; got {} at {}", part.part_number, i),
                ));
            }
            let path = Self::part_path(&dir, part.part_number);
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| StoreError::from_io("read part", &e))?;
            if checksum::sha256_bytes(&data) != part.etag {
                return Err(StoreError::new(
                    StoreErrorKind::Other,
                    format!("part {} etag mismatch", part.part_number),
                ));
            }
            out.write_all(&data)
                .await
                .map_err(|e| StoreError::from_io("write object", &e))?;
        }
        out.sync_all()
            .await
            .map_err(|e| StoreError::from_io("sync object", &e))?;
        drop(out);
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| StoreError::from_io("rename", &e))?;
        let _ = tokio::fs::remove_dir_all(&dir).await;
        self.head(key).await
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), StoreError> {
        let dir = self.upload_dir(upload_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io("abort upload", &e)),
        }
    }
}
