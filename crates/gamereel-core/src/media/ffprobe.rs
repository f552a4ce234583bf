use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use super::ffmpeg::run_tool;
use super::{MediaError, MediaInfo, Prober};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Extract the first video stream from `ffprobe -print_format json` output.
pub fn parse_probe_output(json: &[u8], file: &Path) -> Result<MediaInfo, MediaError> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.width.is_some() && s.height.is_some())
        .ok_or_else(|| MediaError::NoVideoStream(file.display().to_string()))?;
    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    Ok(MediaInfo {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration_secs,
        codec: video.codec_name.clone().unwrap_or_default(),
    })
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }
}

impl FfprobeProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, file: &Path) -> Result<MediaInfo, MediaError> {
        let args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(file.to_string_lossy().into_owned()))
        .collect();
        let stdout = run_tool(&self.program, &args).await?;
        parse_probe_output(&stdout, file)
    }
}
