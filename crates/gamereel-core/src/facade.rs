//! Single entry point used by the CLI (and anything else embedding the engine).
//!
//! The façade owns the job store, the progress bus and the cancel registry,
//! and starts at most one processing run at a time in the background.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{PipelineConfig, ReelConfig};
use crate::control::{CancelRegistry, CancelTarget};
use crate::job_store::{GameJob, JobSpec, JobStore, JobStoreError, JobTotals, ValidationError};
use crate::media::{Encoder, FfmpegEncoder, FfprobeProber, Prober};
use crate::progress::{ProgressBus, ProgressSubscription};
use crate::resources::{
    ResourceSampler, ResourceSnapshot, ResourceSource, MAX_CONCURRENT_CEILING,
};
use crate::scheduler::{build_queue, PipelineContext, RunOptions, RunReport, Scheduler};
use crate::store::{LocalStore, ObjectStore, S3Settings, S3Store};
use crate::transfer::TransferEngine;
use crate::transfer_db::TransferDb;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Job(#[from] JobStoreError),
    #[error("invalid state: a processing run is already active")]
    AlreadyProcessing,
}

/// Collaborators and settings the façade is built from.
pub struct Components {
    pub encoder: Arc<dyn Encoder>,
    pub prober: Arc<dyn Prober>,
    pub resources: Arc<dyn ResourceSource>,
    pub transfer: TransferEngine,
    pub pipeline: PipelineConfig,
    pub key_prefix: String,
    pub work_dir: PathBuf,
}

impl Components {
    /// Production wiring: ffmpeg/ffprobe, host sampler, the checkpoint db under
    /// XDG state, and S3 (or `storage.local_root` when set) as destination.
    pub async fn from_config(cfg: &ReelConfig) -> Result<Self> {
        let work_dir = cfg.work_dir()?;
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("create work dir {}", work_dir.display()))?;
        let store = destination_store(cfg).await;
        let db = TransferDb::open_default()
            .await
            .context("open transfer checkpoint db")?;
        Ok(Self {
            encoder: Arc::new(FfmpegEncoder::default()),
            prober: Arc::new(FfprobeProber::default()),
            resources: Arc::new(ResourceSampler::new(work_dir.clone())),
            transfer: TransferEngine::new(store, db, cfg.transfer.clone()),
            pipeline: cfg.pipeline.clone(),
            key_prefix: cfg.storage.key_prefix.clone(),
            work_dir,
        })
    }
}

/// The configured destination: a local directory when `storage.local_root` is set, S3 otherwise.
pub async fn destination_store(cfg: &ReelConfig) -> Arc<dyn ObjectStore> {
    match &cfg.storage.local_root {
        Some(root) => Arc::new(LocalStore::new(root.clone())),
        None => Arc::new(S3Store::new(S3Settings::from_config(&cfg.storage)).await),
    }
}

/// Returned by [`Facade::process`] once the run is underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessStarted {
    pub jobs_count: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub gpu_available: bool,
    pub disk_space_gb: f64,
    pub max_concurrent_ffmpeg: usize,
    pub processing_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub processing_active: bool,
    #[serde(flatten)]
    pub totals: JobTotals,
}

pub struct Facade {
    jobs: Arc<JobStore>,
    bus: ProgressBus,
    cancel: Arc<CancelRegistry>,
    scheduler: Scheduler,
    resources: Arc<dyn ResourceSource>,
    active: Arc<AtomicBool>,
    run: Mutex<Option<JoinHandle<RunReport>>>,
}

impl Facade {
    pub fn new(c: Components) -> Self {
        let jobs = Arc::new(JobStore::new());
        let bus = ProgressBus::default();
        let cancel = Arc::new(CancelRegistry::new());
        let scheduler = Scheduler::new(PipelineContext {
            jobs: Arc::clone(&jobs),
            bus: bus.clone(),
            encoder: c.encoder,
            prober: c.prober,
            transfer: c.transfer,
            cancel: Arc::clone(&cancel),
            pipeline: c.pipeline,
            key_prefix: c.key_prefix,
            work_dir: c.work_dir,
        });
        Self {
            jobs,
            bus,
            cancel,
            scheduler,
            resources: c.resources,
            active: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
        }
    }

    pub fn create_job(&self, spec: JobSpec) -> Result<GameJob, JobStoreError> {
        self.jobs.create(spec)
    }

    pub fn list_jobs(&self) -> Vec<GameJob> {
        self.jobs.list()
    }

    pub fn get_job(&self, game_id: &str) -> Result<GameJob, JobStoreError> {
        self.jobs.get(game_id)
    }

    /// Only pending jobs can be deleted.
    pub fn delete_job(&self, game_id: &str) -> Result<GameJob, JobStoreError> {
        self.jobs.delete(game_id)
    }

    /// Queue every pending job and start a run in the background.
    pub async fn process(&self) -> Result<ProcessStarted, FacadeError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FacadeError::AlreadyProcessing);
        }
        let pending = self.jobs.pending();
        if pending.is_empty() {
            self.active.store(false, Ordering::SeqCst);
            return Err(JobStoreError::from(ValidationError::NothingPending).into());
        }

        let snapshot = self.resources.sample().await;
        let ctx = self.scheduler.context();
        let max_concurrent = concurrency_ceiling(&snapshot, &ctx.pipeline);
        if snapshot.disk_free_gb < ctx.pipeline.min_free_disk_gb {
            warn!(
                free_gb = snapshot.disk_free_gb,
                min_gb = ctx.pipeline.min_free_disk_gb,
                work_dir = %ctx.work_dir.display(),
                "low disk space under work dir"
            );
        }

        let queue = build_queue(&pending);
        let opts = RunOptions {
            max_concurrent,
            gpu_available: snapshot.gpu_available,
        };
        info!(jobs = pending.len(), angles = queue.len(), max_concurrent, "processing started");

        let scheduler = self.scheduler.clone();
        let active = Arc::clone(&self.active);
        let cancel = Arc::clone(&self.cancel);
        let handle = tokio::spawn(async move {
            let report = scheduler.run(queue, opts).await;
            // Requests made before the run started apply to it; none outlive it.
            cancel.reset();
            active.store(false, Ordering::SeqCst);
            report
        });
        *self.run.lock().await = Some(handle);

        Ok(ProcessStarted {
            jobs_count: pending.len(),
            max_concurrent,
        })
    }

    /// Wait for the current run, if any. Returns its report.
    pub async fn wait_idle(&self) -> Option<RunReport> {
        let handle = self.run.lock().await.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("processing run ended abnormally: {}", e);
                self.active.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    pub fn cancel(&self, target: CancelTarget) {
        self.cancel.cancel(&target);
    }

    /// Shared registry, for the control socket.
    pub fn cancel_registry(&self) -> Arc<CancelRegistry> {
        Arc::clone(&self.cancel)
    }

    pub fn is_processing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn health(&self) -> HealthSnapshot {
        let snapshot = self.resources.sample().await;
        HealthSnapshot {
            gpu_available: snapshot.gpu_available,
            disk_space_gb: snapshot.disk_free_gb,
            max_concurrent_ffmpeg: concurrency_ceiling(&snapshot, &self.scheduler.context().pipeline),
            processing_active: self.is_processing(),
        }
    }

    pub fn status_summary(&self) -> StatusSummary {
        StatusSummary {
            processing_active: self.is_processing(),
            totals: self.jobs.totals(),
        }
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        self.bus.subscribe()
    }
}

/// Sampled ceiling, unless the config pins one (still kept within `1..=4`).
pub fn concurrency_ceiling(snapshot: &ResourceSnapshot, pipeline: &PipelineConfig) -> usize {
    match pipeline.max_concurrent {
        Some(n) => n.clamp(1, MAX_CONCURRENT_CEILING),
        None => snapshot.max_concurrent(),
    }
}
