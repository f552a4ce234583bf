//! Host resource sampling and the concurrency ceiling derived from it.
//!
//! Sampling never fails: each probe that errors falls back to a conservative
//! value (GPU absent, no free disk, one core) and logs a warning.

mod sample;
mod tier;

pub use sample::{disk_free_gb, probe_gpu, ResourceSampler};
pub use tier::{recommended_concurrency, ResourceSnapshot, MAX_CONCURRENT_CEILING};

use async_trait::async_trait;

/// Anything that can produce a snapshot. The host sampler in production; a fixed value in tests.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn sample(&self) -> ResourceSnapshot;
}

/// Always reports the same snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FixedResources(pub ResourceSnapshot);

#[async_trait]
impl ResourceSource for FixedResources {
    async fn sample(&self) -> ResourceSnapshot {
        self.0
    }
}
