//! Bounded-concurrency execution of angle pipelines.
//!
//! A run takes a FIFO of `(game_id, angle)` tasks and a ceiling. The
//! dispatcher waits for a permit, then hands it to the oldest queued task;
//! the permit is held until that angle has reached a terminal state, so the
//! number of active angles never exceeds the ceiling. Each admitted angle runs
//! extract, probe, optional transcode and upload, every stage under a timeout;
//! failures become `error(reason)` on that angle only.

mod dispatch;
mod pipeline;
pub(crate) mod stage;

pub use dispatch::RunReport;
pub use stage::{Stage, StageError};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::control::CancelRegistry;
use crate::job_store::{Angle, AngleState, GameJob, JobStatus, JobStore, JobStoreError};
use crate::media::{Encoder, Prober};
use crate::progress::{ProgressBus, ProgressEvent};
use crate::transfer::TransferEngine;

/// One angle of one job waiting for a permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AngleTask {
    pub game_id: String,
    pub angle: Angle,
}

/// Queue every still-queued angle, jobs in the given order, angles in canonical order.
pub fn build_queue(jobs: &[GameJob]) -> VecDeque<AngleTask> {
    jobs.iter()
        .flat_map(|job| {
            job.angle_status
                .iter()
                .filter(|(_, state)| **state == AngleState::Queued)
                .map(|(angle, _)| AngleTask {
                    game_id: job.game_id.clone(),
                    angle: *angle,
                })
        })
        .collect()
}

/// Everything an angle pipeline talks to.
pub struct PipelineContext {
    pub jobs: Arc<JobStore>,
    pub bus: ProgressBus,
    pub encoder: Arc<dyn Encoder>,
    pub prober: Arc<dyn Prober>,
    pub transfer: TransferEngine,
    pub cancel: Arc<CancelRegistry>,
    pub pipeline: PipelineConfig,
    /// Leading segment of destination keys.
    pub key_prefix: String,
    pub work_dir: PathBuf,
}

impl PipelineContext {
    /// Apply one angle transition and publish it.
    pub(crate) fn advance(
        &self,
        game_id: &str,
        angle: Angle,
        state: AngleState,
    ) -> Result<JobStatus, JobStoreError> {
        let t = self.jobs.transition(game_id, angle, state.clone())?;
        match &state {
            AngleState::Error(reason) => {
                tracing::warn!(game_id, %angle, job_status = %t.job_status, "angle failed: {}", reason)
            }
            _ => tracing::info!(game_id, %angle, state = %state, job_status = %t.job_status, "angle transition"),
        }
        self.bus
            .publish(ProgressEvent::new(game_id, angle, state, t.counts));
        Ok(t.job_status)
    }
}

/// Per-run settings resolved from the resource snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_concurrent: usize,
    pub gpu_available: bool,
}

#[derive(Clone)]
pub struct Scheduler {
    ctx: Arc<PipelineContext>,
}

impl Scheduler {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Drain `queue` under `opts.max_concurrent` permits and wait for every admitted angle.
    pub async fn run(&self, queue: VecDeque<AngleTask>, opts: RunOptions) -> RunReport {
        dispatch::run_queue(Arc::clone(&self.ctx), queue, opts).await
    }
}
