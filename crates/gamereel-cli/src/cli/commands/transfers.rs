//! `gamereel transfers`: unfinished transfers kept for resume.

use anyhow::Result;
use gamereel_core::config::ReelConfig;
use gamereel_core::facade::destination_store;
use gamereel_core::storage;
use gamereel_core::transfer_db::{Direction, TransferDb, TransferRecord};
use std::path::Path;

pub async fn run_transfers(cfg: &ReelConfig, prune: bool) -> Result<()> {
    let db = TransferDb::open_default().await?;
    let records = db.list().await?;
    if records.is_empty() {
        println!("No unfinished transfers.");
        return Ok(());
    }

    println!(
        "{:<5} {:<9} {:<7} {:>7} {:>8}  {}",
        "ID", "DIR", "STATE", "DONE", "ATTEMPTS", "SOURCE -> DESTINATION"
    );
    for r in &records {
        println!(
            "{:<5} {:<9} {:<7} {:>6.1}% {:>8}  {} -> {}",
            r.id,
            r.direction,
            r.state.as_str(),
            percent(r),
            r.attempt_count,
            r.source,
            r.destination
        );
        if let Some(err) = &r.last_error {
            println!("      last error: {}", err);
        }
    }

    if !prune {
        return Ok(());
    }
    let stale: Vec<&TransferRecord> = records.iter().filter(|r| r.prunable()).collect();
    if stale.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }
    let store = if stale
        .iter()
        .any(|r| r.direction == Direction::Upload && r.upload_id.is_some())
    {
        Some(destination_store(cfg).await)
    } else {
        None
    };
    for r in stale {
        match r.direction {
            Direction::Download => storage::discard_partial(Path::new(&r.destination))?,
            Direction::Upload => {
                if let (Some(store), Some(upload_id)) = (&store, &r.upload_id) {
                    if let Err(e) = store.abort_multipart(&r.destination, upload_id).await {
                        tracing::warn!(key = %r.destination, "abort multipart failed: {}", e);
                    }
                }
            }
        }
        db.remove(r.id).await?;
        println!("pruned {}", r.id);
    }
    Ok(())
}

fn percent(r: &TransferRecord) -> f64 {
    if r.total_bytes == 0 {
        return 100.0;
    }
    r.bytes_transferred as f64 * 100.0 / r.total_bytes as f64
}
