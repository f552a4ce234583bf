//! Authoritative in-memory state of all jobs and their per-angle sub-tasks.
//!
//! Every mutation happens under one `RwLock` write guard, and the job status is
//! recomputed inside the same critical section as the angle transition that
//! changed it. Readers get cloned snapshots; the map itself never escapes.

mod types;
mod validate;

pub use types::{
    game_id, Angle, AngleState, ClockTime, GameJob, JobSpec, JobStatus, JobTotals, StageCounts,
    Transition,
};
pub use validate::ValidationError;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("game {game_id} not found")]
    NotFound { game_id: String },
    #[error("game {game_id} has no {angle} angle")]
    AngleNotFound { game_id: String, angle: Angle },
    #[error("game {game_id} is {status}")]
    InvalidState { game_id: String, status: JobStatus },
}

#[derive(Debug, Default)]
pub struct JobStore {
    // Creation order.
    jobs: RwLock<Vec<GameJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<GameJob>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<GameJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and record a new pending job.
    pub fn create(&self, spec: JobSpec) -> Result<GameJob, JobStoreError> {
        validate::validate_spec(&spec)?;
        let mut jobs = self.write();
        validate::validate_against(&spec, &jobs)?;
        let job = GameJob::from_spec(spec);
        tracing::info!(
            game_id = %job.game_id,
            start = %job.time_start,
            end = %job.time_end,
            angles = job.angle_status.len(),
            "job created"
        );
        jobs.push(job.clone());
        Ok(job)
    }

    /// Remove a job. Only pending jobs can be deleted.
    pub fn delete(&self, game_id: &str) -> Result<GameJob, JobStoreError> {
        let mut jobs = self.write();
        let idx = jobs
            .iter()
            .position(|j| j.game_id == game_id)
            .ok_or_else(|| JobStoreError::NotFound {
                game_id: game_id.to_string(),
            })?;
        if jobs[idx].status != JobStatus::Pending {
            return Err(JobStoreError::InvalidState {
                game_id: game_id.to_string(),
                status: jobs[idx].status,
            });
        }
        let job = jobs.remove(idx);
        tracing::info!(game_id = %job.game_id, "job deleted");
        Ok(job)
    }

    pub fn get(&self, game_id: &str) -> Result<GameJob, JobStoreError> {
        self.read()
            .iter()
            .find(|j| j.game_id == game_id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound {
                game_id: game_id.to_string(),
            })
    }

    /// All jobs in creation order.
    pub fn list(&self) -> Vec<GameJob> {
        self.read().clone()
    }

    pub fn pending(&self) -> Vec<GameJob> {
        self.read()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect()
    }

    /// Move one angle to `new_state`, recompute the job status, and snapshot counts.
    ///
    /// Terminal angle states are final: moving out of `completed`/`error` is rejected.
    pub fn transition(
        &self,
        game_id: &str,
        angle: Angle,
        new_state: AngleState,
    ) -> Result<Transition, JobStoreError> {
        let mut jobs = self.write();
        let job = jobs
            .iter_mut()
            .find(|j| j.game_id == game_id)
            .ok_or_else(|| JobStoreError::NotFound {
                game_id: game_id.to_string(),
            })?;
        let slot = job
            .angle_status
            .get_mut(&angle)
            .ok_or_else(|| JobStoreError::AngleNotFound {
                game_id: game_id.to_string(),
                angle,
            })?;
        if slot.is_terminal() {
            return Err(JobStoreError::InvalidState {
                game_id: game_id.to_string(),
                status: job.status,
            });
        }
        *slot = new_state;
        job.status = JobStatus::derive(job.angle_status.values());
        let job_status = job.status;
        Ok(Transition {
            job_status,
            counts: count_angles(&jobs),
        })
    }

    /// Store-wide angle counts.
    pub fn counts(&self) -> StageCounts {
        count_angles(&self.read())
    }

    /// Job-level totals for status queries.
    pub fn totals(&self) -> JobTotals {
        let jobs = self.read();
        let mut t = JobTotals {
            total_games: jobs.len(),
            ..JobTotals::default()
        };
        for j in jobs.iter() {
            match j.status {
                JobStatus::Pending => t.pending += 1,
                JobStatus::Processing => t.in_progress += 1,
                JobStatus::Completed => t.completed += 1,
                JobStatus::Error => t.error += 1,
            }
        }
        t
    }
}

fn count_angles(jobs: &[GameJob]) -> StageCounts {
    let mut counts = StageCounts::default();
    for state in jobs.iter().flat_map(|j| j.angle_status.values()) {
        counts.add(state);
    }
    counts
}
