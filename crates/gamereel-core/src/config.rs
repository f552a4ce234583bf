use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Chunked transfer parameters (`[transfer]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes for range downloads and multipart parts.
    pub chunk_size: u64,
    /// Maximum attempts per chunk (including the first).
    pub max_retries: u32,
    /// Base delay in seconds; doubles on every retry.
    pub base_backoff_secs: f64,
    /// Upper bound on a single backoff delay, in seconds.
    pub retry_cap_secs: u64,
    /// Files at or below this size are uploaded with a single put.
    pub multipart_threshold: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024,
            max_retries: 10,
            base_backoff_secs: 2.0,
            retry_cap_secs: 60,
            multipart_threshold: 100 * 1024 * 1024,
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.retry_cap_secs);
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            // Values too large for a Duration (including inf) mean "always the cap".
            base_delay: Duration::try_from_secs_f64(self.base_backoff_secs.max(0.0))
                .unwrap_or(max_delay),
            max_delay,
        }
    }
}

/// Stage ceilings above a week are clamped to it.
const MAX_STAGE_TIMEOUT_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Angle pipeline parameters (`[pipeline]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pixel area at or above which a segment is downscaled (default 3840x2160).
    pub resolution_threshold_area: u64,
    /// Output height for downscaled segments.
    pub target_height: u32,
    /// Stage ceiling as a multiple of the segment duration.
    pub stage_timeout_factor: f64,
    /// Lower bound for any stage ceiling, in seconds.
    pub min_stage_timeout_secs: u64,
    /// Optional override for the sampled concurrency ceiling (clamped to 1..=4).
    pub max_concurrent: Option<usize>,
    /// Free space under the work dir below which a run logs a warning.
    pub min_free_disk_gb: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution_threshold_area: 3840 * 2160,
            target_height: 1080,
            stage_timeout_factor: 4.0,
            min_stage_timeout_secs: 300,
            max_concurrent: None,
            min_free_disk_gb: 10.0,
        }
    }
}

impl PipelineConfig {
    /// Ceiling for one stage of a segment lasting `segment_secs`.
    pub fn stage_timeout(&self, segment_secs: u32) -> Duration {
        let scaled = self.stage_timeout_factor.max(0.0) * f64::from(segment_secs);
        let floor = self.min_stage_timeout_secs as f64;
        let secs = scaled.max(floor).min(MAX_STAGE_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(MAX_STAGE_TIMEOUT_SECS as u64))
    }
}

/// Destination store and local working area (`[storage]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint (MinIO, R2); None uses the AWS default resolver.
    pub endpoint_url: Option<String>,
    /// Leading path segment for destination keys ("" for none).
    pub key_prefix: String,
    /// Directory for extracted/compressed working files.
    pub work_dir: Option<PathBuf>,
    /// Use this directory as the destination store instead of S3.
    pub local_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "basketball-games".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            key_prefix: "Games".to_string(),
            work_dir: None,
            local_root: None,
        }
    }
}

/// Global configuration loaded from `~/.config/gamereel/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    pub transfer: TransferConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

impl ReelConfig {
    /// Working directory for pipeline files, defaulting to the XDG cache dir.
    pub fn work_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.work_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("gamereel")?;
        Ok(xdg_dirs.get_cache_home().join("work"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("gamereel")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReelConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReelConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ReelConfig = toml::from_str(&data)?;
    Ok(cfg)
}
