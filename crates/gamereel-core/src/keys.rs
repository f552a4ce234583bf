//! Destination key and working-file naming.

use std::path::{Path, PathBuf};

use crate::job_store::{Angle, GameJob};

/// `{date}/Game-{n}`, the per-game folder in the destination store.
pub fn game_prefix(date: &str, game_number: u32) -> String {
    format!("{}/Game-{}", date, game_number)
}

/// `[{key_prefix}/]{date}/Game-{n}/{date}_game{n}_{angle}.mp4`.
pub fn destination_key(key_prefix: &str, job: &GameJob, angle: Angle) -> String {
    let object = format!(
        "{}/{}_{}.mp4",
        game_prefix(&job.date, job.game_number),
        job.game_id,
        angle.full_name()
    );
    let prefix = key_prefix.trim_matches('/');
    if prefix.is_empty() {
        object
    } else {
        format!("{}/{}", prefix, object)
    }
}

/// Extracted (stream-copied) segment for one angle.
pub fn segment_path(work_dir: &Path, job: &GameJob, angle: Angle) -> PathBuf {
    work_dir
        .join("segments")
        .join(format!("{}_{}_segment.mp4", job.game_id, angle.full_name()))
}

/// Downscaled output for one angle.
pub fn compressed_path(work_dir: &Path, job: &GameJob, angle: Angle) -> PathBuf {
    work_dir
        .join("compressed")
        .join(format!("{}_{}.mp4", job.game_id, angle.full_name()))
}
