//! Byte-level progress for one transfer.
//!
//! Consumers derive rate = bytes_done / elapsed_secs and
//! ETA = (total_bytes - bytes_done) / rate.

use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub chunks_done: u32,
    pub chunk_count: u32,
}

impl TransferProgress {
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Seconds remaining, or None while the rate is unknown.
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Sends snapshots without ever blocking the transfer; a full channel drops the update.
pub(crate) struct ProgressReporter {
    tx: Option<mpsc::Sender<TransferProgress>>,
    started: Instant,
    total_bytes: u64,
    chunk_count: u32,
}

impl ProgressReporter {
    pub(crate) fn new(
        tx: Option<mpsc::Sender<TransferProgress>>,
        total_bytes: u64,
        chunk_count: u32,
    ) -> Self {
        Self {
            tx,
            started: Instant::now(),
            total_bytes,
            chunk_count,
        }
    }

    pub(crate) fn report(&self, bytes_done: u64, chunks_done: u32) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(TransferProgress {
                bytes_done,
                total_bytes: self.total_bytes,
                elapsed_secs: self.started.elapsed().as_secs_f64(),
                chunks_done,
                chunk_count: self.chunk_count,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(done: u64, total: u64, secs: f64) -> TransferProgress {
        TransferProgress {
            bytes_done: done,
            total_bytes: total,
            elapsed_secs: secs,
            chunks_done: 0,
            chunk_count: 0,
        }
    }

    #[test]
    fn rate_eta_fraction() {
        let s = p(500, 1000, 5.0);
        assert!((s.bytes_per_sec() - 100.0).abs() < 1e-9);
        assert!((s.eta_secs().unwrap() - 5.0).abs() < 1e-9);
        assert!((s.fraction() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn edge_cases() {
        assert_eq!(p(0, 1000, 0.0).eta_secs(), None);
        assert_eq!(p(1000, 1000, 2.0).eta_secs(), Some(0.0));
        assert_eq!(p(0, 0, 0.0).fraction(), 1.0);
    }

    #[tokio::test]
    async fn reporter_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let r = ProgressReporter::new(Some(tx), 100, 2);
        r.report(50, 1);
        r.report(100, 2);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.bytes_done, 50);
        assert!(rx.try_recv().is_err());
    }
}
