// src/pool/stats.rs
//! Pool statistics snapshots.

/// Snapshot of a [`BinnedPool`](crate::pool::BinnedPool)'s counters.
///
/// Produced by `stats()`; all values are read under the pool lock, so a
/// single snapshot is internally consistent.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinnedPoolStats {
    /// Bytes checked out to callers, summed as class size × population.
    pub used: usize,
    /// Bytes idle in the per-class free lists.
    pub cached: usize,
    /// Blocks staged on the deferred-free queue (approximate).
    pub pending: usize,
    /// Bytes outstanding through the oversize bypass path.
    pub oversize: usize,
    /// Allocations satisfied from the cache.
    pub alloc_hits: usize,
    /// Successful native device allocations.
    pub device_allocs: usize,
    /// Blocks returned to the device by reclamation.
    pub evictions: usize,
    /// Bytes returned to the device by reclamation.
    pub evicted_bytes: usize,
    /// Host-side collections triggered by the ladder and by scans.
    pub collections: usize,
}

impl BinnedPoolStats {
    /// Percentage of pooled allocations served without touching the device.
    pub fn hit_rate(&self) -> f64 {
        let total = self.alloc_hits + self.device_allocs;
        if total == 0 {
            0.0
        } else {
            self.alloc_hits as f64 / total as f64 * 100.0
        }
    }
}

/// Snapshot of a [`SimplePool`](crate::pool::SimplePool)'s counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePoolStats {
    /// Bytes checked out to callers.
    pub used: usize,
    /// Bytes idle in the free set.
    pub cached: usize,
    /// Blocks staged on the deferred-free queue (approximate).
    pub pending: usize,
    /// Allocations satisfied from the cache.
    pub alloc_hits: usize,
    /// Successful native device allocations.
    pub device_allocs: usize,
    /// Blocks returned to the device by reclamation.
    pub evictions: usize,
    /// Bytes returned to the device by reclamation.
    pub evicted_bytes: usize,
    /// Host-side collections triggered by the ladder.
    pub collections: usize,
}

impl SimplePoolStats {
    /// Percentage of allocations served without touching the device.
    pub fn hit_rate(&self) -> f64 {
        let total = self.alloc_hits + self.device_allocs;
        if total == 0 {
            0.0
        } else {
            self.alloc_hits as f64 / total as f64 * 100.0
        }
    }
}
