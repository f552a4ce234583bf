//! Video tooling behind two small traits so the pipeline can run against
//! ffmpeg/ffprobe in production and fakes in tests.

mod error;
mod ffmpeg;
mod ffprobe;

pub use error::MediaError;
pub use ffmpeg::{extract_args, transcode_args, FfmpegEncoder};
pub use ffprobe::{parse_probe_output, FfprobeProber};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::job_store::ClockTime;

/// Which encoder a transcode should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// NVENC with CUDA scaling.
    Hardware,
    /// libx264.
    Software,
}

impl fmt::Display for EncodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EncodeMode::Hardware => "hardware",
            EncodeMode::Software => "software",
        })
    }
}

/// Stream facts the pipeline needs from a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub codec: String,
}

impl MediaInfo {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Copy `[start, end)` of `source` into `output` without re-encoding.
    async fn extract(
        &self,
        source: &Path,
        start: ClockTime,
        end: ClockTime,
        output: &Path,
    ) -> Result<(), MediaError>;

    /// Re-encode `input` down to `target_height` lines.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target_height: u32,
        mode: EncodeMode,
    ) -> Result<(), MediaError>;
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, file: &Path) -> Result<MediaInfo, MediaError>;
}
