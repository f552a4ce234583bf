use serde::Serialize;

/// Upper bound on concurrent angle pipelines regardless of host size.
pub const MAX_CONCURRENT_CEILING: usize = 4;

/// Host resources at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub cpu_cores: usize,
    /// Available (not total) memory.
    pub ram_gb: f64,
    pub gpu_available: bool,
    /// Free space on the filesystem holding the work dir.
    pub disk_free_gb: f64,
}

impl ResourceSnapshot {
    /// Assumed when nothing can be probed: one core, no GPU, no known free disk.
    pub fn conservative() -> Self {
        Self {
            cpu_cores: 1,
            ram_gb: 0.0,
            gpu_available: false,
            disk_free_gb: 0.0,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        recommended_concurrency(self)
    }
}

/// Concurrency ceiling from a fixed tier table, always in `1..=4`.
///
/// | condition            | tier |
/// |----------------------|------|
/// | GPU present          | 4    |
/// | RAM < 6 GB           | 2    |
/// | cores <= 2           | 2    |
/// | cores <= 4           | 3    |
/// | otherwise            | 4    |
///
/// The tier is then capped by `min(cpu_cores, 4)`.
pub fn recommended_concurrency(s: &ResourceSnapshot) -> usize {
    let tier = if s.gpu_available {
        4
    } else if !(s.ram_gb >= 6.0) {
        // NaN lands here too.
        2
    } else if s.cpu_cores <= 2 {
        2
    } else if s.cpu_cores <= 4 {
        3
    } else {
        4
    };
    tier.min(s.cpu_cores.min(MAX_CONCURRENT_CEILING)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(cpu_cores: usize, ram_gb: f64, gpu_available: bool) -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_cores,
            ram_gb,
            gpu_available,
            disk_free_gb: 100.0,
        }
    }

    #[test]
    fn tier_table() {
        assert_eq!(recommended_concurrency(&snap(8, 2.0, true)), 4);
        assert_eq!(recommended_concurrency(&snap(8, 4.0, false)), 2);
        assert_eq!(recommended_concurrency(&snap(2, 16.0, false)), 2);
        assert_eq!(recommended_concurrency(&snap(4, 16.0, false)), 3);
        assert_eq!(recommended_concurrency(&snap(16, 64.0, false)), 4);
    }

    #[test]
    fn capped_by_core_count() {
        assert_eq!(recommended_concurrency(&snap(2, 32.0, true)), 2);
        assert_eq!(recommended_concurrency(&snap(3, 32.0, false)), 3);
        assert_eq!(recommended_concurrency(&snap(1, 32.0, true)), 1);
    }

    #[test]
    fn never_below_one_or_above_four() {
        let cases = [
            snap(0, 0.0, false),
            snap(0, 128.0, true),
            snap(usize::MAX, f64::INFINITY, true),
            snap(64, f64::NAN, false),
            snap(3, -1.0, false),
            ResourceSnapshot::conservative(),
        ];
        for s in cases {
            let c = recommended_concurrency(&s);
            assert!((1..=4).contains(&c), "{:?} -> {}", s, c);
            assert_eq!(c, recommended_concurrency(&s));
        }
    }

    #[test]
    fn exhaustive_small_grid_in_range() {
        for cores in 0..=12 {
            for ram in [0.0, 3.9, 5.99, 6.0, 8.0, 32.0] {
                for gpu in [false, true] {
                    let c = snap(cores, ram, gpu).max_concurrent();
                    assert!((1..=MAX_CONCURRENT_CEILING).contains(&c));
                }
            }
        }
    }
}
