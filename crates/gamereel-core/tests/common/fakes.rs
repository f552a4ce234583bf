//! In-process stand-ins for ffmpeg, ffprobe and a misbehaving object store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use gamereel_core::job_store::ClockTime;
use gamereel_core::media::{EncodeMode, Encoder, MediaError, MediaInfo, Prober};
use gamereel_core::store::{
    LocalStore, ObjectMeta, ObjectStore, StoreError, StoreErrorKind, UploadedPart,
};

/// Writes small placeholder files instead of running ffmpeg.
#[derive(Default)]
pub struct FakeEncoder {
    calls: Mutex<Vec<String>>,
    /// Source file names whose extraction fails.
    failing_sources: Mutex<HashSet<String>>,
    hardware_broken: AtomicBool,
    extract_delay: Mutex<Duration>,
    hardware_delay: Mutex<Duration>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_extract_for(&self, source_file_name: &str) {
        self.failing_sources
            .lock()
            .unwrap()
            .insert(source_file_name.to_string());
    }

    pub fn break_hardware(&self) {
        self.hardware_broken.store(true, Ordering::SeqCst);
    }

    pub fn set_extract_delay(&self, d: Duration) {
        *self.extract_delay.lock().unwrap() = d;
    }

    /// Hardware transcodes sleep for `d` before doing anything.
    pub fn hang_hardware(&self, d: Duration) {
        *self.hardware_delay.lock().unwrap() = d;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn failed(program: &str, msg: &str) -> MediaError {
    MediaError::Failed {
        program: program.to_string(),
        exit_code: Some(1),
        stderr_tail: msg.to_string(),
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn extract(
        &self,
        source: &Path,
        start: ClockTime,
        end: ClockTime,
        output: &Path,
    ) -> Result<(), MediaError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push(format!("extract {} {}-{}", name, start, end));
        let delay = *self.extract_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing_sources.lock().unwrap().contains(&name) {
            return Err(failed("ffmpeg", "moov atom not found"));
        }
        tokio::fs::write(output, format!("segment of {}", name).repeat(64)).await?;
        Ok(())
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target_height: u32,
        mode: EncodeMode,
    ) -> Result<(), MediaError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("transcode {} {}", mode, target_height));
        let hang = *self.hardware_delay.lock().unwrap();
        if mode == EncodeMode::Hardware && !hang.is_zero() {
            tokio::time::sleep(hang).await;
        }
        if mode == EncodeMode::Hardware && self.hardware_broken.load(Ordering::SeqCst) {
            return Err(failed("ffmpeg", "No NVENC capable devices found"));
        }
        let data = tokio::fs::read(input).await?;
        tokio::fs::write(output, &data[..data.len() / 2]).await?;
        Ok(())
    }
}

/// Reports the same dimensions for every file.
pub struct FakeProber {
    pub width: u32,
    pub height: u32,
}

impl FakeProber {
    pub fn uhd() -> Self {
        Self {
            width: 3840,
            height: 2160,
        }
    }

    pub fn hd() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, file: &Path) -> Result<MediaInfo, MediaError> {
        tokio::fs::metadata(file).await?;
        Ok(MediaInfo {
            width: self.width,
            height: self.height,
            duration_secs: 60.0,
            codec: "h264".to_string(),
        })
    }
}

/// [`LocalStore`] that can fail part uploads after a quota and hold puts at a barrier.
pub struct FlakyStore {
    inner: LocalStore,
    parts_before_failure: Mutex<Option<usize>>,
    part_calls: AtomicUsize,
    put_gate: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl FlakyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalStore::new(root),
            parts_before_failure: Mutex::new(None),
            part_calls: AtomicUsize::new(0),
            put_gate: Mutex::new(None),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner
    }

    /// Accept `n` more parts, then fail every later `upload_part` with a connection error.
    pub fn fail_parts_after(&self, n: usize) {
        *self.parts_before_failure.lock().unwrap() = Some(n);
    }

    pub fn heal(&self) {
        *self.parts_before_failure.lock().unwrap() = None;
    }

    /// Successful plus failed `upload_part` calls so far.
    pub fn part_calls(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    /// The next `n` puts each wait until all `n` have arrived.
    pub fn gate_puts(&self, n: usize) {
        *self.put_gate.lock().unwrap() = Some((Arc::new(Barrier::new(n)), n));
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.inner.head(key).await
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        self.inner.get_range(key, start, end).await
    }

    async fn put(&self, key: &str, file: &Path) -> Result<ObjectMeta, StoreError> {
        let barrier = {
            let mut gate = self.put_gate.lock().unwrap();
            match gate.as_mut() {
                Some((b, left)) if *left > 0 => {
                    *left -= 1;
                    Some(Arc::clone(b))
                }
                _ => None,
            }
        };
        if let Some(b) = barrier {
            b.wait().await;
        }
        self.inner.put(key, file).await
    }

    async fn create_multipart(&self, key: &str) -> Result<String, StoreError> {
        self.inner.create_multipart(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StoreError> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        let refuse = {
            let mut quota = self.parts_before_failure.lock().unwrap();
            match quota.as_mut() {
                Some(0) => true,
                Some(left) => {
                    *left -= 1;
                    false
                }
                None => false,
            }
        };
        if refuse {
            return Err(StoreError::new(
                StoreErrorKind::Connection,
                "connection reset by peer",
            ));
        }
        self.inner.upload_part(key, upload_id, part_number, data).await
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<UploadedPart>, StoreError> {
        self.inner.list_parts(key, upload_id).await
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<ObjectMeta, StoreError> {
        self.inner.complete_multipart(key, upload_id, parts).await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.inner.abort_multipart(key, upload_id).await
    }
}
