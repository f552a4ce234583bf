//! `gamereel fetch` and `gamereel push`: one resumable transfer with a progress line.

use anyhow::Result;
use gamereel_core::config::ReelConfig;
use gamereel_core::facade::destination_store;
use gamereel_core::store::{HttpSource, ObjectStore};
use gamereel_core::transfer::{TransferEngine, TransferProgress, TransferRequest};
use gamereel_core::transfer_db::TransferDb;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_INTERVAL_MS: u128 = 500;

pub async fn run_fetch(cfg: &ReelConfig, source: &str, output: &Path) -> Result<()> {
    let store: Arc<dyn ObjectStore> = if is_http(source) {
        Arc::new(HttpSource::new())
    } else {
        destination_store(cfg).await
    };
    let engine = TransferEngine::new(store, TransferDb::open_default().await?, cfg.transfer.clone());
    run_with_progress(&engine, TransferRequest::download(source, output)).await
}

pub async fn run_push(cfg: &ReelConfig, file: &Path, key: &str) -> Result<()> {
    let engine = TransferEngine::new(
        destination_store(cfg).await,
        TransferDb::open_default().await?,
        cfg.transfer.clone(),
    );
    run_with_progress(&engine, TransferRequest::upload(file, key)).await
}

fn is_http(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn run_with_progress(engine: &TransferEngine, req: TransferRequest) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<TransferProgress>(16);
    let printer = tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        while let Some(p) = rx.recv().await {
            let due = last_print.map_or(true, |t| t.elapsed().as_millis() >= PROGRESS_INTERVAL_MS);
            if due || p.bytes_done >= p.total_bytes {
                println!("  {}", format_progress(&p));
                last_print = Some(Instant::now());
            }
        }
    });

    let result = engine.transfer(&req, Some(tx)).await;
    let _ = printer.await;
    let record = result?;
    println!(
        "{} {} -> {} ({} bytes)",
        record.direction, record.source, record.destination, record.total_bytes
    );
    Ok(())
}

fn format_progress(p: &TransferProgress) -> String {
    let mib = |b: u64| b as f64 / 1_048_576.0;
    let eta = p
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  part {}/{}  ETA {}",
        mib(p.bytes_done),
        mib(p.total_bytes),
        p.fraction() * 100.0,
        p.bytes_per_sec() / 1_048_576.0,
        p.chunks_done,
        p.chunk_count,
        eta
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_sources_are_recognised() {
        assert!(is_http("https://cams.example/FL.mp4"));
        assert!(!is_http("Games/10-02/Game-1/10-02_game1_farleft.mp4"));
    }

    #[test]
    fn progress_line() {
        let p = TransferProgress {
            bytes_done: 4 * 1_048_576,
            total_bytes: 8 * 1_048_576,
            elapsed_secs: 2.0,
            chunks_done: 1,
            chunk_count: 2,
        };
        assert_eq!(
            format_progress(&p),
            "4.0 / 8.0 MiB (50.0%)  2.00 MiB/s  part 1/2  ETA 2s"
        );
    }
}
