//! Job, angle and state types owned by the job store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One fixed camera viewpoint. Declaration order is the canonical processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Angle {
    FarLeft,
    FarRight,
    NearLeft,
    NearRight,
}

impl Angle {
    pub const ALL: [Angle; 4] = [
        Angle::FarLeft,
        Angle::FarRight,
        Angle::NearLeft,
        Angle::NearRight,
    ];

    /// Two-letter camera code used in recording filenames (`FL`, `FR`, `NL`, `NR`).
    pub fn short_code(self) -> &'static str {
        match self {
            Angle::FarLeft => "FL",
            Angle::FarRight => "FR",
            Angle::NearLeft => "NL",
            Angle::NearRight => "NR",
        }
    }

    /// Name used in destination keys.
    pub fn full_name(self) -> &'static str {
        match self {
            Angle::FarLeft => "farleft",
            Angle::FarRight => "farright",
            Angle::NearLeft => "nearleft",
            Angle::NearRight => "nearright",
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// Accepts either the short code or the full name, case-insensitively.
impl FromStr for Angle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Angle::ALL
            .into_iter()
            .find(|a| s.eq_ignore_ascii_case(a.short_code()) || s.eq_ignore_ascii_case(a.full_name()))
            .ok_or_else(|| format!("unknown angle: {}", s))
    }
}

/// Offset into a recording, `HH:MM:SS`, stored as whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub fn from_secs(secs: u32) -> Self {
        ClockTime(secs)
    }

    pub fn as_secs(self) -> u32 {
        self.0
    }

    /// Parse `HH:MM:SS` (hours may be one or more digits; minutes and seconds two digits, < 60).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(':');
        let (h, m, sec) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || h.is_empty() || m.len() != 2 || sec.len() != 2 {
            return None;
        }
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(h) || !all_digits(m) || !all_digits(sec) {
            return None;
        }
        let h: u32 = h.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        let sec: u32 = sec.parse().ok()?;
        if m >= 60 || sec >= 60 {
            return None;
        }
        Some(ClockTime(h.checked_mul(3600)?.checked_add(m * 60 + sec)?))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClockTime::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("expected HH:MM:SS, got {:?}", s)))
    }
}

/// Per-angle pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AngleState {
    Queued,
    Extracting,
    CheckingResolution,
    Compressing,
    Uploading,
    Completed,
    Error(String),
}

impl AngleState {
    /// Holding a permit: any stage between admission and a terminal state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AngleState::Extracting
                | AngleState::CheckingResolution
                | AngleState::Compressing
                | AngleState::Uploading
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AngleState::Completed | AngleState::Error(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            AngleState::Queued => "queued",
            AngleState::Extracting => "extracting",
            AngleState::CheckingResolution => "checking_resolution",
            AngleState::Compressing => "compressing",
            AngleState::Uploading => "uploading",
            AngleState::Completed => "completed",
            AngleState::Error(_) => "error",
        }
    }
}

impl fmt::Display for AngleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AngleState::Error(reason) => write!(f, "error({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Job status, always derived from the angle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// Status implied by a set of angle states.
    ///
    /// All completed → completed; any active → processing; all terminal with an
    /// error → error; all queued → pending; queued mixed with terminal → processing.
    pub fn derive<'a>(states: impl IntoIterator<Item = &'a AngleState>) -> JobStatus {
        let (mut total, mut queued, mut active, mut completed, mut failed) = (0, 0, 0, 0, 0);
        for s in states {
            total += 1;
            match s {
                AngleState::Queued => queued += 1,
                AngleState::Completed => completed += 1,
                AngleState::Error(_) => failed += 1,
                _ => active += 1,
            }
        }
        if total == 0 || queued == total {
            JobStatus::Pending
        } else if completed == total {
            JobStatus::Completed
        } else if active > 0 || queued > 0 {
            JobStatus::Processing
        } else {
            debug_assert!(failed > 0);
            JobStatus::Error
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator input for a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Recording date as used in keys, e.g. `10-02`.
    pub date: String,
    pub game_number: u32,
    pub time_start: ClockTime,
    pub time_end: ClockTime,
    /// Source recording per angle.
    pub sources: BTreeMap<Angle, PathBuf>,
}

impl JobSpec {
    pub fn game_id(&self) -> String {
        game_id(&self.date, self.game_number)
    }
}

/// `{date}_game{n}`, e.g. `10-02_game1`.
pub fn game_id(date: &str, game_number: u32) -> String {
    format!("{}_game{}", date, game_number)
}

/// A defined game segment with one sub-task per angle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameJob {
    pub game_id: String,
    pub date: String,
    pub game_number: u32,
    pub time_start: ClockTime,
    pub time_end: ClockTime,
    pub sources: BTreeMap<Angle, PathBuf>,
    pub status: JobStatus,
    pub angle_status: BTreeMap<Angle, AngleState>,
}

impl GameJob {
    pub(crate) fn from_spec(spec: JobSpec) -> Self {
        let angle_status = spec
            .sources
            .keys()
            .map(|a| (*a, AngleState::Queued))
            .collect();
        GameJob {
            game_id: spec.game_id(),
            date: spec.date,
            game_number: spec.game_number,
            time_start: spec.time_start,
            time_end: spec.time_end,
            sources: spec.sources,
            status: JobStatus::Pending,
            angle_status,
        }
    }

    /// Segment length in seconds.
    pub fn duration_secs(&self) -> u32 {
        self.time_end.as_secs().saturating_sub(self.time_start.as_secs())
    }

    pub fn angles(&self) -> impl Iterator<Item = Angle> + '_ {
        self.angle_status.keys().copied()
    }
}

/// Aggregate angle counts across the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl StageCounts {
    pub(crate) fn add(&mut self, state: &AngleState) {
        self.total += 1;
        match state {
            AngleState::Queued => self.queued += 1,
            AngleState::Completed => self.completed += 1,
            AngleState::Error(_) => self.failed += 1,
            _ => self.active += 1,
        }
    }
}

/// Result of a transition: the job's recomputed status and store-wide counts, taken under the same lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub job_status: JobStatus,
    pub counts: StageCounts,
}

/// Job-level totals for the processing status view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobTotals {
    pub total_games: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub error: usize,
}
