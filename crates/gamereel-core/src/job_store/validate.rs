//! Synchronous checks on a job spec before it is stored.

use super::types::{GameJob, JobSpec};

/// Reasons a job spec is rejected. Rejected specs never reach the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid date {0:?}: use letters, digits, '-' or '_'")]
    BadDate(String),
    #[error("game number must be at least 1")]
    BadGameNumber,
    #[error("end time {end} must be after start time {start}")]
    EmptyRange { start: String, end: String },
    #[error("job needs at least one angle source")]
    NoAngles,
    #[error("game {0} already exists")]
    Duplicate(String),
    #[error("time range overlaps game {0}")]
    Overlap(String),
    #[error("no pending jobs to process")]
    NothingPending,
}

/// Checks the spec alone (no other jobs involved).
pub(crate) fn validate_spec(spec: &JobSpec) -> Result<(), ValidationError> {
    let date_ok = !spec.date.is_empty()
        && spec
            .date
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !date_ok {
        return Err(ValidationError::BadDate(spec.date.clone()));
    }
    if spec.game_number == 0 {
        return Err(ValidationError::BadGameNumber);
    }
    if spec.time_end <= spec.time_start {
        return Err(ValidationError::EmptyRange {
            start: spec.time_start.to_string(),
            end: spec.time_end.to_string(),
        });
    }
    if spec.sources.is_empty() {
        return Err(ValidationError::NoAngles);
    }
    Ok(())
}

/// Checks the spec against jobs already stored: unique id, no overlapping range on the same date.
/// Ranges are half-open so back-to-back games are allowed.
pub(crate) fn validate_against(spec: &JobSpec, existing: &[GameJob]) -> Result<(), ValidationError> {
    let id = spec.game_id();
    for job in existing {
        if job.game_id == id {
            return Err(ValidationError::Duplicate(id));
        }
        if job.date == spec.date
            && spec.time_start < job.time_end
            && job.time_start < spec.time_end
        {
            return Err(ValidationError::Overlap(job.game_id.clone()));
        }
    }
    Ok(())
}
