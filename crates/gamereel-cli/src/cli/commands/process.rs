//! `gamereel run`: queue every game in a manifest and process it.

use anyhow::{bail, Result};
use gamereel_core::config::ReelConfig;
use gamereel_core::control::{default_control_socket_path, CancelTarget};
use gamereel_core::facade::{Components, Facade};
use gamereel_core::progress::ProgressEvent;
use std::path::Path;

use crate::cli::control_socket;
use crate::cli::manifest::Manifest;

pub async fn run_process(cfg: &ReelConfig, manifest_path: &Path, verbose: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let specs = manifest.job_specs(base)?;

    let facade = Facade::new(Components::from_config(cfg).await?);
    for spec in specs {
        for file in spec.sources.values().filter(|f| !f.exists()) {
            tracing::warn!(path = %file.display(), "recording not found");
            eprintln!("warning: recording not found: {}", file.display());
        }
        let job = facade.create_job(spec)?;
        println!("queued {} ({} angle(s))", job.game_id, job.angle_status.len());
    }

    let socket = default_control_socket_path().ok();
    let listener = match &socket {
        Some(path) => match control_socket::spawn_control_listener(facade.cancel_registry(), path) {
            Ok(h) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(h)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    let registry = facade.cancel_registry();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted: finishing running angles, skipping the rest");
            registry.cancel(&CancelTarget::All);
        }
    });

    let mut sub = facade.subscribe();
    let started = facade.process().await?;
    println!(
        "processing {} game(s), up to {} angle(s) at once",
        started.jobs_count, started.max_concurrent
    );

    let wait = facade.wait_idle();
    tokio::pin!(wait);
    let report = loop {
        tokio::select! {
            report = &mut wait => {
                while let Some(ev) = sub.try_recv() {
                    print_event(&ev, verbose);
                }
                break report;
            }
            Some(ev) = sub.recv() => print_event(&ev, verbose),
        }
    };

    interrupt.abort();
    if let Some(h) = listener {
        h.abort();
    }
    if let Some(path) = socket {
        let _ = std::fs::remove_file(path);
    }

    println!();
    println!("{:<16} {:<11} ANGLES", "GAME", "STATUS");
    for job in facade.list_jobs() {
        let angles: Vec<String> = job
            .angle_status
            .iter()
            .map(|(a, s)| format!("{}={}", a.short_code(), s))
            .collect();
        println!("{:<16} {:<11} {}", job.game_id, job.status, angles.join(" "));
    }

    let Some(report) = report else {
        bail!("processing run ended abnormally; see the log");
    };
    let unfinished = report.failed + report.cancelled;
    if unfinished > 0 {
        bail!(
            "{} of {} angle(s) did not complete",
            unfinished,
            report.completed + unfinished
        );
    }
    Ok(())
}

fn print_event(ev: &ProgressEvent, verbose: bool) {
    if verbose || ev.new_state.is_terminal() {
        println!("  {}", ev.summary());
    }
}
