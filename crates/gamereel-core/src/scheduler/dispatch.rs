use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::pipeline::{self, AngleOutcome};
use super::{AngleTask, PipelineContext, RunOptions};
use crate::job_store::{AngleState, JobStoreError};

/// Reason recorded on angles that were cancelled before admission.
pub(crate) const CANCELLED: &str = "cancelled";

/// What happened to the tasks of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Angles that acquired a permit and ran.
    pub admitted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Angles marked `error(cancelled)` without running.
    pub cancelled: usize,
    /// Tasks dropped because their job was deleted or the angle had already moved on.
    pub skipped: usize,
}

impl RunReport {
    fn record(&mut self, outcome: AngleOutcome) {
        match outcome {
            AngleOutcome::Completed => self.completed += 1,
            AngleOutcome::Failed => self.failed += 1,
        }
    }
}

pub(crate) async fn run_queue(
    ctx: Arc<PipelineContext>,
    mut queue: VecDeque<AngleTask>,
    opts: RunOptions,
) -> RunReport {
    let permits = opts.max_concurrent.max(1);
    let sem = Arc::new(Semaphore::new(permits));
    let mut running: JoinSet<AngleOutcome> = JoinSet::new();
    let mut report = RunReport::default();
    info!(
        tasks = queue.len(),
        max_concurrent = permits,
        gpu = opts.gpu_available,
        "run started"
    );

    while let Some(task) = queue.pop_front() {
        let permit = match Arc::clone(&sem).acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        while let Some(done) = running.try_join_next() {
            reap(&mut report, done);
        }

        if ctx.cancel.is_cancelled(&task.game_id) {
            drop(permit);
            match ctx.advance(&task.game_id, task.angle, AngleState::Error(CANCELLED.to_string())) {
                Ok(_) => report.cancelled += 1,
                Err(e) => {
                    debug!(game_id = %task.game_id, angle = %task.angle, "cancel skipped: {}", e);
                    report.skipped += 1;
                }
            }
            continue;
        }

        let job = match ctx.jobs.get(&task.game_id) {
            Ok(job) => job,
            Err(JobStoreError::NotFound { .. }) => {
                debug!(game_id = %task.game_id, "job deleted before admission");
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                error!(game_id = %task.game_id, "cannot load job: {}", e);
                report.skipped += 1;
                continue;
            }
        };
        if job.angle_status.get(&task.angle) != Some(&AngleState::Queued) {
            report.skipped += 1;
            continue;
        }

        // Admission is the first transition, so state order follows permit order.
        if let Err(e) = ctx.advance(&task.game_id, task.angle, AngleState::Extracting) {
            debug!(game_id = %task.game_id, angle = %task.angle, "admission skipped: {}", e);
            report.skipped += 1;
            continue;
        }
        report.admitted += 1;
        let ctx = Arc::clone(&ctx);
        let gpu = opts.gpu_available;
        running.spawn(async move {
            // Held until the angle is terminal.
            let _permit = permit;
            pipeline::run_angle(&ctx, &job, task.angle, gpu).await
        });
    }

    while let Some(done) = running.join_next().await {
        reap(&mut report, done);
    }
    info!(
        admitted = report.admitted,
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        skipped = report.skipped,
        "run finished"
    );
    report
}

fn reap(report: &mut RunReport, done: Result<AngleOutcome, tokio::task::JoinError>) {
    match done {
        Ok(outcome) => report.record(outcome),
        Err(e) => {
            error!("angle task aborted: {}", e);
            report.failed += 1;
        }
    }
}
