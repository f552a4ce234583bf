//! One angle from extraction to upload.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::stage::{within, Stage, StageError};
use super::PipelineContext;
use crate::job_store::{Angle, AngleState, GameJob};
use crate::keys;
use crate::media::{EncodeMode, MediaError};
use crate::transfer::TransferRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AngleOutcome {
    Completed,
    Failed,
}

/// Run every stage, remove working files, then record the terminal state.
///
/// The dispatcher has already moved the angle to `extracting`.
pub(crate) async fn run_angle(
    ctx: &PipelineContext,
    job: &GameJob,
    angle: Angle,
    gpu_available: bool,
) -> AngleOutcome {
    let segment = keys::segment_path(&ctx.work_dir, job, angle);
    let compressed = keys::compressed_path(&ctx.work_dir, job, angle);

    let result = run_stages(ctx, job, angle, gpu_available, &segment, &compressed).await;
    cleanup(&[&segment, &compressed]).await;

    let (state, outcome) = match result {
        Ok(()) => (AngleState::Completed, AngleOutcome::Completed),
        Err(e) => (AngleState::Error(e.to_string()), AngleOutcome::Failed),
    };
    if let Err(e) = ctx.advance(&job.game_id, angle, state) {
        warn!(game_id = %job.game_id, %angle, "terminal transition rejected: {}", e);
    }
    outcome
}

async fn run_stages(
    ctx: &PipelineContext,
    job: &GameJob,
    angle: Angle,
    gpu_available: bool,
    segment: &Path,
    compressed: &Path,
) -> Result<(), StageError> {
    let limit = ctx.pipeline.stage_timeout(job.duration_secs());
    let source = job
        .sources
        .get(&angle)
        .ok_or(StageError::MissingSource(angle))?;

    ensure_parent(segment).await.map_err(StageError::Extract)?;
    within(
        Stage::Extract,
        limit,
        ctx.encoder
            .extract(source, job.time_start, job.time_end, segment),
    )
    .await?
    .map_err(StageError::Extract)?;

    ctx.advance(&job.game_id, angle, AngleState::CheckingResolution)?;
    let info = within(Stage::Probe, limit, ctx.prober.probe(segment))
        .await?
        .map_err(StageError::Probe)?;
    debug!(
        game_id = %job.game_id,
        %angle,
        width = info.width,
        height = info.height,
        codec = %info.codec,
        "probed segment"
    );

    let upload_from: &Path = if info.area() >= ctx.pipeline.resolution_threshold_area {
        ctx.advance(&job.game_id, angle, AngleState::Compressing)?;
        ensure_parent(compressed)
            .await
            .map_err(StageError::Transcode)?;
        transcode(ctx, job, angle, gpu_available, segment, compressed, limit).await?;
        compressed
    } else {
        segment
    };

    ctx.advance(&job.game_id, angle, AngleState::Uploading)?;
    let key = keys::destination_key(&ctx.key_prefix, job, angle);
    let req = TransferRequest::upload(upload_from, key.clone());
    let uploaded = within(Stage::Upload, limit, ctx.transfer.transfer(&req, None))
        .await
        .and_then(|r| r.map_err(StageError::Upload));
    // The working file is removed after this angle, so a failed upload can never resume.
    let record = match uploaded {
        Ok(record) => record,
        Err(e) => {
            ctx.transfer.abandon(&req).await;
            return Err(e);
        }
    };
    info!(
        game_id = %job.game_id,
        %angle,
        key = %key,
        bytes = record.total_bytes,
        "uploaded"
    );
    Ok(())
}

/// Hardware encode when a GPU is present, falling back once to software on any failure.
///
/// Both attempts share `limit`: hardware gets at most half of it and software
/// whatever is left.
async fn transcode(
    ctx: &PipelineContext,
    job: &GameJob,
    angle: Angle,
    gpu_available: bool,
    input: &Path,
    output: &Path,
    limit: Duration,
) -> Result<(), StageError> {
    let height = ctx.pipeline.target_height;
    let started = Instant::now();
    if gpu_available {
        let hw = within(
            Stage::Transcode,
            limit / 2,
            ctx.encoder
                .transcode(input, output, height, EncodeMode::Hardware),
        )
        .await;
        match hw {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => {
                warn!(game_id = %job.game_id, %angle, "hardware encode failed, retrying in software: {}", e)
            }
            Err(e) => {
                warn!(game_id = %job.game_id, %angle, "hardware encode failed, retrying in software: {}", e)
            }
        }
        remove_quietly(output).await;
    }
    let remaining = limit.saturating_sub(started.elapsed());
    within(
        Stage::Transcode,
        remaining,
        ctx.encoder
            .transcode(input, output, height, EncodeMode::Software),
    )
    .await
    .map_err(|_| StageError::Timeout {
        stage: Stage::Transcode,
        after: limit,
    })?
    .map_err(StageError::Transcode)
}

async fn ensure_parent(path: &Path) -> Result<(), MediaError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

async fn cleanup(paths: &[&PathBuf]) {
    for p in paths {
        remove_quietly(p).await;
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed working file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "could not remove working file: {}", e),
    }
}
