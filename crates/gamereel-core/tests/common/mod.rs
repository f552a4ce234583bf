#![allow(dead_code)]

pub mod fakes;
pub mod range_server;

use gamereel_core::config::TransferConfig;

/// Small chunks, two attempts, no backoff.
pub fn fast_transfer_config(chunk_size: u64) -> TransferConfig {
    TransferConfig {
        chunk_size,
        max_retries: 2,
        base_backoff_secs: 0.0,
        retry_cap_secs: 0,
        multipart_threshold: chunk_size * 2,
    }
}

/// Deterministic body that is not a repeating power of two.
pub fn body(len: usize) -> Vec<u8> {
    (0u8..251).cycle().take(len).collect()
}
