//! `gamereel check`: validate a manifest the same way `run` would, without processing.

use anyhow::{bail, Result};
use gamereel_core::job_store::JobStore;
use std::path::Path;

use crate::cli::manifest::Manifest;

pub fn run_check(manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let store = JobStore::new();
    let mut missing = 0usize;
    for spec in manifest.job_specs(base)? {
        let job = store.create(spec)?;
        println!(
            "{:<16} {} - {}  ({} s)",
            job.game_id,
            job.time_start,
            job.time_end,
            job.duration_secs()
        );
        for (angle, file) in &job.sources {
            let mark = if file.exists() {
                "ok"
            } else {
                missing += 1;
                "MISSING"
            };
            println!("    {:<10} {:<8} {}", angle, mark, file.display());
        }
    }
    if missing > 0 {
        bail!("{} recording(s) not found", missing);
    }
    println!("manifest ok");
    Ok(())
}
