//! `gamereel health`: what the resource sampler sees on this host.

use anyhow::Result;
use gamereel_core::config::ReelConfig;
use gamereel_core::facade::concurrency_ceiling;
use gamereel_core::resources::ResourceSampler;

pub async fn run_health(cfg: &ReelConfig) -> Result<()> {
    let work_dir = cfg.work_dir()?;
    std::fs::create_dir_all(&work_dir)?;
    let snapshot = ResourceSampler::new(work_dir.clone()).sample_host().await;
    let ceiling = concurrency_ceiling(&snapshot, &cfg.pipeline);

    println!("gpu_available:          {}", snapshot.gpu_available);
    println!("cpu_cores:              {}", snapshot.cpu_cores);
    println!("ram_available_gb:       {:.1}", snapshot.ram_gb);
    println!(
        "disk_space_gb:          {:.1}  ({})",
        snapshot.disk_free_gb,
        work_dir.display()
    );
    println!("max_concurrent_ffmpeg:  {}", ceiling);
    if snapshot.disk_free_gb < cfg.pipeline.min_free_disk_gb {
        println!(
            "warning: less than {:.0} GB free under the work dir",
            cfg.pipeline.min_free_disk_gb
        );
    }
    Ok(())
}
