//! Game manifest: which segments to cut from which recordings.
//!
//! ```toml
//! date = "10-02"
//!
//! [sources]
//! FL = "recordings/10-02/FL.mp4"
//! FR = "recordings/10-02/FR.mp4"
//!
//! [[game]]
//! number = 1
//! start = "00:05:30"
//! end = "00:35:45"
//! # angles = ["FL"]   # optional subset of [sources]
//! ```
//!
//! Relative source paths are resolved against the manifest's directory.

use anyhow::{anyhow, bail, Context, Result};
use gamereel_core::job_store::{Angle, ClockTime, JobSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub date: String,
    /// Angle (short code or full name) -> recording.
    pub sources: BTreeMap<String, PathBuf>,
    #[serde(default, rename = "game")]
    pub games: Vec<GameEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameEntry {
    pub number: u32,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub angles: Option<Vec<String>>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let m: Manifest =
            toml::from_str(&data).with_context(|| format!("parse manifest {}", path.display()))?;
        Ok(m)
    }

    /// One job spec per game. `base` resolves relative recording paths.
    pub fn job_specs(&self, base: &Path) -> Result<Vec<JobSpec>> {
        let mut recordings = BTreeMap::new();
        for (name, file) in &self.sources {
            let angle: Angle = name.parse().map_err(|e: String| anyhow!(e))?;
            let file = if file.is_relative() {
                base.join(file)
            } else {
                file.clone()
            };
            recordings.insert(angle, file);
        }
        if self.games.is_empty() {
            bail!("manifest lists no [[game]] entries");
        }

        self.games
            .iter()
            .map(|g| {
                let time_start = parse_time(&g.start, g.number)?;
                let time_end = parse_time(&g.end, g.number)?;
                let sources = match &g.angles {
                    None => recordings.clone(),
                    Some(names) => {
                        let mut picked = BTreeMap::new();
                        for name in names {
                            let angle: Angle = name.parse().map_err(|e: String| anyhow!(e))?;
                            let file = recordings.get(&angle).ok_or_else(|| {
                                anyhow!("game {}: no recording listed for {}", g.number, angle)
                            })?;
                            picked.insert(angle, file.clone());
                        }
                        picked
                    }
                };
                Ok(JobSpec {
                    date: self.date.clone(),
                    game_number: g.number,
                    time_start,
                    time_end,
                    sources,
                })
            })
            .collect()
    }
}

fn parse_time(s: &str, game: u32) -> Result<ClockTime> {
    ClockTime::parse(s).ok_or_else(|| anyhow!("game {}: bad time {:?}, expected HH:MM:SS", game, s))
}
