use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::process::Command;
use tracing::{debug, warn};

use super::tier::ResourceSnapshot;
use super::ResourceSource;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Samples the local host.
#[derive(Debug, Clone)]
pub struct ResourceSampler {
    /// Disk free space is measured on the filesystem holding this path.
    work_dir: PathBuf,
    gpu_probe: String,
}

impl ResourceSampler {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            gpu_probe: "nvidia-smi".to_string(),
        }
    }

    /// Use a different GPU probe binary (exit 0 means a GPU is usable).
    pub fn with_gpu_probe(mut self, program: impl Into<String>) -> Self {
        self.gpu_probe = program.into();
        self
    }

    pub async fn sample_host(&self) -> ResourceSnapshot {
        let work_dir = self.work_dir.clone();
        let host = tokio::task::spawn_blocking(move || {
            let cpu_cores = num_cpus::get().max(1);
            let mut sys = System::new();
            sys.refresh_memory();
            let ram_gb = sys.available_memory() as f64 / GIB;
            (cpu_cores, ram_gb, disk_free_gb(&work_dir))
        })
        .await;

        let (cpu_cores, ram_gb, disk_free) = match host {
            Ok(v) => v,
            Err(e) => {
                warn!("host sampling task failed: {}", e);
                let c = ResourceSnapshot::conservative();
                (c.cpu_cores, c.ram_gb, None)
            }
        };
        let disk_free_gb = disk_free.unwrap_or_else(|| {
            warn!(path = %self.work_dir.display(), "could not determine free disk space");
            0.0
        });
        let gpu_available = probe_gpu(&self.gpu_probe, GPU_PROBE_TIMEOUT).await;

        let snap = ResourceSnapshot {
            cpu_cores,
            ram_gb,
            gpu_available,
            disk_free_gb,
        };
        debug!(
            cpu_cores,
            ram_gb = %format!("{:.1}", ram_gb),
            gpu_available,
            disk_free_gb = %format!("{:.1}", disk_free_gb),
            max_concurrent = snap.max_concurrent(),
            "sampled host resources"
        );
        snap
    }
}

#[async_trait]
impl ResourceSource for ResourceSampler {
    async fn sample(&self) -> ResourceSnapshot {
        self.sample_host().await
    }
}

/// Run `program` with a timeout; a zero exit means a GPU is present. Any failure means absent.
pub async fn probe_gpu(program: &str, timeout: Duration) -> bool {
    let child = Command::new(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!(program, "gpu probe not runnable: {}", e);
            false
        }
        Err(_) => {
            warn!(program, "gpu probe timed out after {:?}", timeout);
            false
        }
    }
}

/// Free space in GiB on the filesystem holding `path` (longest matching mount point).
/// Walks up to the nearest existing ancestor so a not-yet-created work dir still resolves.
pub fn disk_free_gb(path: &Path) -> Option<f64> {
    let existing = path.ancestors().find(|p| p.exists())?;
    let resolved = existing.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| resolved.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space() as f64 / GIB)
}
