//! Whole processing runs through the façade with fake ffmpeg/ffprobe and a
//! directory-backed destination.

mod common;

use common::fakes::{FakeEncoder, FakeProber, FlakyStore};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use gamereel_core::config::{PipelineConfig, TransferConfig};
use gamereel_core::control::CancelTarget;
use gamereel_core::facade::{Components, Facade, FacadeError};
use gamereel_core::job_store::{
    Angle, AngleState, ClockTime, JobSpec, JobStatus, JobStoreError, ValidationError,
};
use gamereel_core::keys;
use gamereel_core::progress::{ProgressEvent, ProgressSubscription};
use gamereel_core::resources::{FixedResources, ResourceSnapshot};
use gamereel_core::transfer::TransferEngine;
use gamereel_core::transfer_db::TransferDb;

struct Harness {
    facade: Facade,
    encoder: Arc<FakeEncoder>,
    store: Arc<FlakyStore>,
    dir: TempDir,
}

fn snapshot(cpu_cores: usize, gpu_available: bool) -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_cores,
        ram_gb: 32.0,
        gpu_available,
        disk_free_gb: 500.0,
    }
}

async fn harness(resources: ResourceSnapshot, prober: FakeProber, pipeline: PipelineConfig) -> Harness {
    harness_with(resources, prober, pipeline, TransferConfig::default()).await
}

async fn harness_with(
    resources: ResourceSnapshot,
    prober: FakeProber,
    pipeline: PipelineConfig,
    transfer: TransferConfig,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let encoder = Arc::new(FakeEncoder::new());
    let store = Arc::new(FlakyStore::new(dir.path().join("bucket")));
    let db = TransferDb::open_at(dir.path().join("transfers.db")).await.unwrap();
    let facade = Facade::new(Components {
        encoder: encoder.clone(),
        prober: Arc::new(prober),
        resources: Arc::new(FixedResources(resources)),
        transfer: TransferEngine::new(store.clone(), db, transfer),
        pipeline,
        key_prefix: "Games".to_string(),
        work_dir: dir.path().join("work"),
    });
    Harness {
        facade,
        encoder,
        store,
        dir,
    }
}

fn job(game_number: u32, start: &str, end: &str, angles: &[Angle]) -> JobSpec {
    JobSpec {
        date: "10-02".to_string(),
        game_number,
        time_start: ClockTime::parse(start).unwrap(),
        time_end: ClockTime::parse(end).unwrap(),
        sources: angles
            .iter()
            .map(|a| (*a, PathBuf::from(format!("/recordings/{}.mp4", a.short_code()))))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn drain(sub: &mut ProgressSubscription) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Some(ev) = sub.try_recv() {
        out.push(ev);
    }
    out
}

async fn next_with_state(sub: &mut ProgressSubscription, state: AngleState) -> ProgressEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let ev = sub.recv().await.unwrap();
            if ev.new_state == state {
                return ev;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn four_angles_with_ceiling_two() {
    let h = harness(snapshot(2, false), FakeProber::hd(), PipelineConfig::default()).await;
    let created = h
        .facade
        .create_job(job(1, "00:05:30", "00:35:45", &Angle::ALL))
        .unwrap();
    assert_eq!(created.game_id, "10-02_game1");
    // The first two uploads only finish once both are in flight.
    h.store.gate_puts(2);
    let mut sub = h.facade.subscribe();

    let started = h.facade.process().await.unwrap();
    assert_eq!(started.jobs_count, 1);
    assert_eq!(started.max_concurrent, 2);
    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 0);

    let events = drain(&mut sub);
    assert!(events.iter().all(|e| e.counts.active <= 2));

    let mut started_angles: Vec<Angle> = Vec::new();
    let mut uploading: HashSet<Angle> = HashSet::new();
    for ev in &events {
        match ev.new_state {
            AngleState::Extracting => {
                started_angles.push(ev.angle);
                if started_angles.len() == 3 {
                    assert_eq!(uploading.len(), 2, "third angle admitted early");
                }
            }
            AngleState::Uploading => {
                uploading.insert(ev.angle);
            }
            _ => {}
        }
    }
    assert_eq!(started_angles, Angle::ALL.to_vec());

    let done = h.facade.get_job("10-02_game1").unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    for angle in Angle::ALL {
        let key = keys::destination_key("Games", &done, angle);
        assert!(key.starts_with("Games/10-02/Game-1/10-02_game1_"));
        assert!(h.store.local().object_path(&key).unwrap().exists(), "{}", key);
        assert!(!keys::segment_path(&h.dir.path().join("work"), &done, angle).exists());
    }
    assert!(h
        .encoder
        .calls()
        .iter()
        .all(|c| !c.starts_with("extract") || c.ends_with("00:05:30-00:35:45")));
    assert!(!h.facade.is_processing());
}

#[tokio::test]
async fn hardware_failure_falls_back_to_software() {
    let h = harness(snapshot(8, true), FakeProber::uhd(), PipelineConfig::default()).await;
    h.encoder.break_hardware();
    h.facade
        .create_job(job(1, "00:00:00", "00:20:00", &[Angle::FarLeft]))
        .unwrap();
    let mut sub = h.facade.subscribe();

    h.facade.process().await.unwrap();
    h.facade.wait_idle().await.unwrap();

    let states: Vec<String> = drain(&mut sub)
        .into_iter()
        .map(|e| e.new_state.label().to_string())
        .collect();
    assert_eq!(
        states,
        ["extracting", "checking_resolution", "compressing", "uploading", "completed"]
    );
    let transcodes: Vec<String> = h
        .encoder
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("transcode"))
        .collect();
    assert_eq!(transcodes, ["transcode hardware 1080", "transcode software 1080"]);
    assert_eq!(
        h.facade.get_job("10-02_game1").unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn hung_hardware_encode_falls_back_within_one_ceiling() {
    let pipeline = PipelineConfig {
        stage_timeout_factor: 0.0,
        min_stage_timeout_secs: 2,
        ..PipelineConfig::default()
    };
    let h = harness(snapshot(8, true), FakeProber::uhd(), pipeline).await;
    h.encoder.hang_hardware(Duration::from_secs(30));
    h.facade
        .create_job(job(1, "00:00:00", "00:20:00", &[Angle::FarRight]))
        .unwrap();
    let mut sub = h.facade.subscribe();

    h.facade.process().await.unwrap();
    let compressing = next_with_state(&mut sub, AngleState::Compressing).await;
    let uploading = next_with_state(&mut sub, AngleState::Uploading).await;
    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.completed, 1);

    let spent = (uploading.timestamp - compressing.timestamp).to_std().unwrap();
    assert!(spent < Duration::from_secs(2), "compressing took {:?}", spent);
    let transcodes: Vec<String> = h
        .encoder
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("transcode"))
        .collect();
    assert_eq!(transcodes, ["transcode hardware 1080", "transcode software 1080"]);
}

#[tokio::test]
async fn below_threshold_skips_compression() {
    let h = harness(snapshot(8, true), FakeProber::hd(), PipelineConfig::default()).await;
    h.facade
        .create_job(job(1, "00:00:00", "00:20:00", &[Angle::NearRight]))
        .unwrap();
    h.facade.process().await.unwrap();
    h.facade.wait_idle().await.unwrap();
    assert!(h.encoder.calls().iter().all(|c| !c.starts_with("transcode")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_angle_leaves_siblings_and_later_jobs_alone() {
    let h = harness(snapshot(2, false), FakeProber::hd(), PipelineConfig::default()).await;
    h.encoder.fail_extract_for("NL.mp4");
    h.facade
        .create_job(job(1, "00:00:00", "00:30:00", &Angle::ALL))
        .unwrap();
    h.facade
        .create_job(job(2, "00:30:00", "01:00:00", &[Angle::FarLeft]))
        .unwrap();

    h.facade.process().await.unwrap();
    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 1);

    let first = h.facade.get_job("10-02_game1").unwrap();
    match &first.angle_status[&Angle::NearLeft] {
        AngleState::Error(reason) => assert!(reason.starts_with("extract_failed"), "{}", reason),
        other => panic!("unexpected state {}", other),
    }
    for angle in [Angle::FarLeft, Angle::FarRight, Angle::NearRight] {
        assert_eq!(first.angle_status[&angle], AngleState::Completed);
    }
    assert_eq!(first.status, JobStatus::Error);
    assert_eq!(
        h.facade.get_job("10-02_game2").unwrap().status,
        JobStatus::Completed
    );

    let summary = h.facade.status_summary();
    assert_eq!(summary.totals.total_games, 2);
    assert_eq!(summary.totals.completed, 1);
    assert_eq!(summary.totals.error, 1);
}

#[tokio::test]
async fn delete_is_rejected_while_processing_but_pending_jobs_can_go() {
    let h = harness(snapshot(1, false), FakeProber::hd(), PipelineConfig::default()).await;
    h.encoder.set_extract_delay(Duration::from_millis(300));
    h.facade
        .create_job(job(1, "00:00:00", "00:10:00", &[Angle::FarLeft]))
        .unwrap();
    h.facade
        .create_job(job(2, "00:10:00", "00:20:00", &[Angle::FarLeft]))
        .unwrap();
    let mut sub = h.facade.subscribe();

    h.facade.process().await.unwrap();
    let first = next_with_state(&mut sub, AngleState::Extracting).await;
    assert_eq!(first.job_id, "10-02_game1");

    match h.facade.delete_job("10-02_game1") {
        Err(JobStoreError::InvalidState { status, .. }) => assert_eq!(status, JobStatus::Processing),
        other => panic!("expected InvalidState, got {:?}", other.map(|j| j.game_id)),
    }
    assert!(matches!(
        h.facade.process().await,
        Err(FacadeError::AlreadyProcessing)
    ));
    h.facade.delete_job("10-02_game2").unwrap();

    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.facade.list_jobs().len(), 1);
    assert_eq!(h.encoder.calls().iter().filter(|c| c.starts_with("extract")).count(), 1);

    assert!(matches!(
        h.facade.process().await,
        Err(FacadeError::Job(JobStoreError::Validation(
            ValidationError::NothingPending
        )))
    ));
}

#[tokio::test]
async fn cancelled_job_angles_end_in_error() {
    let h = harness(snapshot(1, false), FakeProber::hd(), PipelineConfig::default()).await;
    h.encoder.set_extract_delay(Duration::from_millis(300));
    h.facade
        .create_job(job(1, "00:00:00", "00:10:00", &[Angle::FarLeft]))
        .unwrap();
    h.facade
        .create_job(job(2, "00:10:00", "00:20:00", &[Angle::FarLeft, Angle::FarRight]))
        .unwrap();
    let mut sub = h.facade.subscribe();

    h.facade.process().await.unwrap();
    next_with_state(&mut sub, AngleState::Extracting).await;
    h.facade.cancel(CancelTarget::Job("10-02_game2".to_string()));

    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.cancelled, 2);
    let cancelled = h.facade.get_job("10-02_game2").unwrap();
    assert_eq!(cancelled.status, JobStatus::Error);
    assert!(cancelled
        .angle_status
        .values()
        .all(|s| *s == AngleState::Error("cancelled".to_string())));
}

#[tokio::test]
async fn cancel_before_process_applies_to_that_run_only() {
    let h = harness(snapshot(2, false), FakeProber::hd(), PipelineConfig::default()).await;
    h.facade
        .create_job(job(1, "00:00:00", "00:10:00", &[Angle::FarLeft, Angle::NearRight]))
        .unwrap();
    h.facade.cancel(CancelTarget::All);

    h.facade.process().await.unwrap();
    let first = h.facade.wait_idle().await.unwrap();
    assert_eq!(first.cancelled, 2);
    assert_eq!(first.admitted, 0);
    assert!(h.encoder.calls().is_empty());

    h.facade
        .create_job(job(2, "00:10:00", "00:20:00", &[Angle::FarLeft]))
        .unwrap();
    h.facade.process().await.unwrap();
    let second = h.facade.wait_idle().await.unwrap();
    assert_eq!(second.completed, 1);
    assert_eq!(second.cancelled, 0);
}

#[tokio::test]
async fn stuck_stage_times_out_and_cleans_up() {
    let pipeline = PipelineConfig {
        stage_timeout_factor: 0.0,
        min_stage_timeout_secs: 1,
        ..PipelineConfig::default()
    };
    let h = harness(snapshot(2, false), FakeProber::hd(), pipeline).await;
    h.encoder.set_extract_delay(Duration::from_secs(5));
    let created = h
        .facade
        .create_job(job(1, "00:00:00", "00:10:00", &[Angle::FarRight]))
        .unwrap();

    h.facade.process().await.unwrap();
    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.failed, 1);

    let after = h.facade.get_job(&created.game_id).unwrap();
    match &after.angle_status[&Angle::FarRight] {
        AngleState::Error(reason) => assert!(reason.starts_with("extract_timeout"), "{}", reason),
        other => panic!("unexpected state {}", other),
    }
    assert!(!keys::segment_path(&h.dir.path().join("work"), &after, Angle::FarRight).exists());
}

#[tokio::test]
async fn timed_out_upload_leaves_no_record_or_multipart_behind() {
    let pipeline = PipelineConfig {
        stage_timeout_factor: 0.0,
        min_stage_timeout_secs: 1,
        ..PipelineConfig::default()
    };
    let transfer = TransferConfig {
        chunk_size: 256,
        max_retries: 10,
        base_backoff_secs: 0.5,
        retry_cap_secs: 1,
        multipart_threshold: 512,
    };
    let h = harness_with(snapshot(2, false), FakeProber::hd(), pipeline, transfer).await;
    h.store.fail_parts_after(1);
    let created = h
        .facade
        .create_job(job(1, "00:00:00", "00:10:00", &[Angle::NearLeft]))
        .unwrap();

    h.facade.process().await.unwrap();
    let report = h.facade.wait_idle().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(h.store.part_calls() >= 2);

    let after = h.facade.get_job(&created.game_id).unwrap();
    match &after.angle_status[&Angle::NearLeft] {
        AngleState::Error(reason) => assert!(reason.starts_with("upload_timeout"), "{}", reason),
        other => panic!("unexpected state {}", other),
    }
    let db = TransferDb::open_at(h.dir.path().join("transfers.db")).await.unwrap();
    assert!(db.list().await.unwrap().is_empty());
    let staged = h.dir.path().join("bucket/.multipart");
    let leftover = std::fs::read_dir(&staged).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn health_reports_sampled_resources() {
    let h = harness(snapshot(3, false), FakeProber::hd(), PipelineConfig::default()).await;
    let health = h.facade.health().await;
    assert!(!health.gpu_available);
    assert_eq!(health.max_concurrent_ffmpeg, 3);
    assert_eq!(health.disk_space_gb, 500.0);
    assert!(!health.processing_active);
}
