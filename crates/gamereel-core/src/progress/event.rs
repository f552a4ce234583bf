use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job_store::{Angle, AngleState, StageCounts};

/// Snapshot emitted on every angle transition.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub angle: Angle,
    pub new_state: AngleState,
    pub timestamp: DateTime<Utc>,
    pub error_detail: Option<String>,
    /// Store-wide counts taken atomically with the transition.
    pub counts: StageCounts,
}

impl ProgressEvent {
    pub fn new(job_id: &str, angle: Angle, new_state: AngleState, counts: StageCounts) -> Self {
        let error_detail = match &new_state {
            AngleState::Error(reason) => Some(reason.clone()),
            _ => None,
        };
        Self {
            job_id: job_id.to_string(),
            angle,
            new_state,
            timestamp: Utc::now(),
            error_detail,
            counts,
        }
    }

    /// One-line human summary, e.g. `10-02_game1/farleft uploading [2 active, 1 done, 0 failed of 4]`.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} {} [{} active, {} done, {} failed of {}]",
            self.job_id,
            self.angle,
            self.new_state,
            self.counts.active,
            self.counts.completed,
            self.counts.failed,
            self.counts.total
        )
    }
}
