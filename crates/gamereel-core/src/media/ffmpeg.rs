use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{EncodeMode, Encoder, MediaError};
use crate::job_store::ClockTime;

const STDERR_TAIL_LINES: usize = 12;

/// Arguments for a stream-copy cut of `[start, end)`.
pub fn extract_args(source: &Path, start: ClockTime, end: ClockTime, output: &Path) -> Vec<String> {
    let duration = end.as_secs().saturating_sub(start.as_secs());
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-ss".into(),
        start.to_string(),
        "-i".into(),
        source.to_string_lossy().into_owned(),
        "-t".into(),
        duration.to_string(),
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Arguments for a 16:9 downscale to `target_height`.
pub fn transcode_args(input: &Path, output: &Path, target_height: u32, mode: EncodeMode) -> Vec<String> {
    // Width rounded down to an even number, as both encoders require.
    let width = (target_height * 16 / 9) & !1;
    let mut args: Vec<String> = vec!["-y".into(), "-v".into(), "error".into()];
    match mode {
        EncodeMode::Hardware => {
            args.extend(
                ["-hwaccel", "cuda", "-hwaccel_output_format", "cuda", "-i"]
                    .map(String::from),
            );
            args.push(input.to_string_lossy().into_owned());
            args.push("-vf".into());
            args.push(format!("scale_cuda={}:{}", width, target_height));
            args.extend(
                [
                    "-c:v", "h264_nvenc", "-preset", "p7", "-tune", "hq", "-rc", "vbr", "-cq",
                    "19", "-b:v", "8M", "-maxrate", "12M", "-bufsize", "16M",
                ]
                .map(String::from),
            );
        }
        EncodeMode::Software => {
            args.push("-i".into());
            args.push(input.to_string_lossy().into_owned());
            args.push("-vf".into());
            args.push(format!("scale={}:{}", width, target_height));
            args.extend(
                ["-c:v", "libx264", "-preset", "slow", "-crf", "20", "-pix_fmt", "yuv420p"]
                    .map(String::from),
            );
        }
    }
    args.extend(["-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart"].map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Run `program args`, collecting stderr. The child is killed if the future is dropped
/// (the pipeline's stage timeout relies on this).
pub(crate) async fn run_tool(program: &str, args: &[String]) -> Result<Vec<u8>, MediaError> {
    debug!(program, args = %args.join(" "), "running");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(MediaError::Failed {
            program: program.to_string(),
            exit_code: output.status.code(),
            stderr_tail: stderr_tail(&output.stderr),
        });
    }
    Ok(output.stdout)
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn extract(
        &self,
        source: &Path,
        start: ClockTime,
        end: ClockTime,
        output: &Path,
    ) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_tool(&self.program, &extract_args(source, start, end, output)).await?;
        Ok(())
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target_height: u32,
        mode: EncodeMode,
    ) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_tool(&self.program, &transcode_args(input, output, target_height, mode)).await?;
        Ok(())
    }
}
