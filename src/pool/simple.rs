// src/pool/simple.rs
//! Simple pool: one free set, bounded-oversize best-fit, no background
//! thread.
//!
//! The alternate pooling policy. Where the binned pool rounds every request
//! to a power of two, this one caches blocks at their exact requested size
//! and reuses a cached block for any request it oversizes by at most a
//! bounded slack. That trades bounded internal waste for much better reuse
//! on workloads with irregular sizes, and large blocks are not churned
//! through the device just because the request was a few bytes off.
//!
//! Eviction happens only under allocation pressure; there is no usage
//! tracking and no reclaimer thread.

use super::config::PoolConfig;
use super::stats::SimplePoolStats;
use crate::block::{Block, DevicePtr};
use crate::device::{DeviceAllocator, ManagedCollector};
use crate::queue::DeferredFreeQueue;
use crate::registry::{Handle, HandleRegistry};
use log::{debug, trace, warn};
use std::sync::{Arc, Mutex};

/// Requests at or below this reuse any larger cached block.
const UNBOUNDED_BELOW: usize = 1 << 20; // 1 MiB
/// Requests up to this tolerate 1 MiB of slack; above it, 4 MiB.
const MID_CUTOFF: usize = 1 << 25; // 32 MiB

/// Acceptable oversize for a request of `bytes`; `None` means unbounded.
fn max_oversize(bytes: usize) -> Option<usize> {
    if bytes <= UNBOUNDED_BELOW {
        None
    } else if bytes <= MID_CUTOFF {
        Some(1 << 20)
    } else {
        Some(1 << 22)
    }
}

struct Inner {
    /// Cached, unused blocks; sizes span the full range of past requests.
    available: Vec<Block>,
    used_bytes: usize,
    cached_bytes: usize,
    alloc_hits: usize,
    device_allocs: usize,
    evictions: usize,
    evicted_bytes: usize,
    collections: usize,
}

/// Single-bin device-memory pool with bounded-oversize matching.
///
/// Shares the [`BinnedPool`](crate::pool::BinnedPool) public contract and
/// collaborator seams; pick it for workloads with irregular allocation
/// sizes.
///
/// # Example
///
/// ```
/// use devpool::prelude::*;
/// use std::sync::Arc;
///
/// let pool = SimplePool::new(
///     PoolConfig::default(),
///     Arc::new(HostHeap::new()),
///     Arc::new(NopCollector),
/// );
///
/// let ptr = pool.alloc(1000).expect("host heap is unbounded");
/// assert_eq!(pool.used_memory(), 1000); // exact size, no rounding
/// pool.free(ptr);
/// ```
pub struct SimplePool {
    inner: Mutex<Inner>,
    freed: DeferredFreeQueue,
    registry: HandleRegistry,
    device: Arc<dyn DeviceAllocator>,
    collector: Arc<dyn ManagedCollector>,
}

impl SimplePool {
    /// Creates an empty pool. No background task is ever spawned; the
    /// `managed` flag of `config` is ignored by this policy.
    pub fn new(
        _config: PoolConfig,
        device: Arc<dyn DeviceAllocator>,
        collector: Arc<dyn ManagedCollector>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                available: Vec::new(),
                used_bytes: 0,
                cached_bytes: 0,
                alloc_hits: 0,
                device_allocs: 0,
                evictions: 0,
                evicted_bytes: 0,
                collections: 0,
            }),
            freed: DeferredFreeQueue::new(),
            registry: HandleRegistry::new(),
            device,
            collector,
        }
    }

    /// Returns a pointer to at least `bytes` bytes, or `None` once all
    /// three recovery phases fail.
    pub fn alloc(&self, bytes: usize) -> Option<DevicePtr> {
        let block = self.alloc_block(bytes)?;
        self.registry.insert(Handle::Pooled(block));
        Some(block.ptr())
    }

    /// [`alloc`](Self::alloc) with an error instead of an absent value.
    pub fn try_alloc(&self, bytes: usize) -> crate::Result<DevicePtr> {
        self.alloc(bytes)
            .ok_or(crate::PoolError::Exhausted { requested: bytes })
    }

    /// Returns a previously allocated pointer to the pool.
    ///
    /// Must be called exactly once per successful [`alloc`](Self::alloc).
    /// The block is staged on the deferred-free queue; it rejoins the cache
    /// at the next reclamation.
    pub fn free(&self, ptr: DevicePtr) {
        match self.registry.remove(ptr) {
            Some(handle) => self.freed.push(handle.block()),
            None => {
                // Programmer error: assert in debug builds, tolerate in release.
                if cfg!(debug_assertions) {
                    panic!("free of pointer not owned by the pool: {ptr:?}");
                }
                warn!("free of pointer not owned by the pool: {ptr:?}");
            }
        }
    }

    /// Bytes checked out to callers.
    pub fn used_memory(&self) -> usize {
        self.inner.lock().unwrap().used_bytes
    }

    /// Bytes idle in the free set.
    pub fn cached_memory(&self) -> usize {
        self.inner.lock().unwrap().cached_bytes
    }

    /// Returns a snapshot of pool statistics.
    pub fn stats(&self) -> SimplePoolStats {
        let inner = self.inner.lock().unwrap();
        SimplePoolStats {
            used: inner.used_bytes,
            cached: inner.cached_bytes,
            pending: self.freed.len(),
            alloc_hits: inner.alloc_hits,
            device_allocs: inner.device_allocs,
            evictions: inner.evictions,
            evicted_bytes: inner.evicted_bytes,
            collections: inner.collections,
        }
    }

    // -----------------------------------------------------------------------
    // Allocation ladder
    // -----------------------------------------------------------------------

    /// Three recovery phases, each escalating the host-side collection that
    /// precedes it: none, incremental, full.
    fn alloc_block(&self, bytes: usize) -> Option<Block> {
        if let Some(block) = self.phase(bytes) {
            return Some(block);
        }
        self.collect(false);
        if let Some(block) = self.phase(bytes) {
            return Some(block);
        }
        self.collect(true);
        if let Some(block) = self.phase(bytes) {
            return Some(block);
        }
        debug!("allocation of {bytes} bytes failed after full escalation");
        None
    }

    /// One phase: scan the cache, try the device, evict then try again.
    fn phase(&self, bytes: usize) -> Option<Block> {
        if let Some(block) = self.scan_cache(bytes) {
            return Some(block);
        }
        if let Some(block) = self.device_alloc(bytes) {
            return Some(block);
        }
        self.reclaim(Some(bytes));
        self.device_alloc(bytes)
    }

    /// Takes the first cached block that covers `bytes` without exceeding
    /// the bounded oversize. Scan order is arbitrary; the waste bound makes
    /// any match acceptable.
    fn scan_cache(&self, bytes: usize) -> Option<Block> {
        let mut inner = self.inner.lock().unwrap();
        let slack = max_oversize(bytes);
        let idx = inner.available.iter().position(|b| {
            b.size() >= bytes && slack.is_none_or(|slack| b.size() - bytes <= slack)
        })?;
        let block = inner.available.swap_remove(idx);
        inner.cached_bytes -= block.size();
        inner.used_bytes += block.size();
        inner.alloc_hits += 1;
        trace!("request of {bytes} bytes reuses cached block of {}", block.size());
        Some(block)
    }

    fn device_alloc(&self, bytes: usize) -> Option<Block> {
        let mut inner = self.inner.lock().unwrap();
        let ptr = self.device.actual_alloc(bytes)?;
        inner.used_bytes += bytes;
        inner.device_allocs += 1;
        Some(Block::new(ptr, bytes))
    }

    fn collect(&self, full: bool) {
        self.collector.collect(full);
        self.inner.lock().unwrap().collections += 1;
    }

    // -----------------------------------------------------------------------
    // Reclamation
    // -----------------------------------------------------------------------

    /// Drains the deferred-free queue into the cache, then evicts cached
    /// blocks (in no particular order) until `target` bytes are released or
    /// the cache is empty. No target means a full drain. Returns the bytes
    /// released.
    pub fn reclaim(&self, target: Option<usize>) -> usize {
        let victims = {
            let mut inner = self.inner.lock().unwrap();
            self.freed.drain(|block| {
                inner.used_bytes -= block.size();
                inner.cached_bytes += block.size();
                inner.available.push(block);
            });

            let mut victims: Vec<Block> = Vec::new();
            let mut freed_bytes = 0usize;
            while !target.is_some_and(|t| freed_bytes >= t) {
                let Some(block) = inner.available.pop() else {
                    break;
                };
                inner.cached_bytes -= block.size();
                freed_bytes += block.size();
                victims.push(block);
            }
            inner.evictions += victims.len();
            inner.evicted_bytes += freed_bytes;
            victims
        };

        let mut freed_bytes = 0;
        for block in victims {
            freed_bytes += block.size();
            self.device.actual_free(block.ptr());
        }
        if freed_bytes > 0 {
            debug!("reclaimed {freed_bytes} bytes back to the device");
        }
        freed_bytes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HostHeap, NopCollector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MIB: usize = 1 << 20;

    #[derive(Default)]
    struct CountingCollector {
        incremental: AtomicUsize,
        full: AtomicUsize,
    }

    impl ManagedCollector for CountingCollector {
        fn collect(&self, full: bool) {
            if full {
                self.full.fetch_add(1, Ordering::Relaxed);
            } else {
                self.incremental.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn pool_with(heap: &Arc<HostHeap>) -> SimplePool {
        SimplePool::new(
            PoolConfig::default(),
            Arc::clone(heap) as _,
            Arc::new(NopCollector),
        )
    }

    /// Allocates and frees a block of `bytes`, then drains it into the
    /// cache.
    fn seed_cached_block(pool: &SimplePool, bytes: usize) {
        let p = pool.alloc(bytes).unwrap();
        pool.free(p);
        // A zero-byte reclaim target drains the queue but evicts nothing.
        pool.reclaim(Some(0));
    }

    #[test]
    fn test_max_oversize_thresholds() {
        assert_eq!(max_oversize(4096), None);
        assert_eq!(max_oversize(MIB), None);
        assert_eq!(max_oversize(MIB + 1), Some(MIB));
        assert_eq!(max_oversize(32 * MIB), Some(MIB));
        assert_eq!(max_oversize(32 * MIB + 1), Some(4 * MIB));
        assert_eq!(max_oversize(256 * MIB), Some(4 * MIB));
    }

    #[test]
    fn test_exact_size_no_rounding() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        let p = pool.alloc(1000).unwrap();
        assert_eq!(pool.used_memory(), 1000);
        assert_eq!(heap.outstanding(), 1000);
        pool.free(p);
    }

    #[test]
    fn test_small_request_reuses_any_larger_block() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        seed_cached_block(&pool, 8 * MIB);

        // 4 KiB is under the unbounded cutoff: the 8 MiB block is fine.
        let p = pool.alloc(4096).unwrap();
        assert_eq!(heap.alloc_calls(), 1);
        assert_eq!(pool.used_memory(), 8 * MIB);
        assert_eq!(pool.stats().alloc_hits, 1);
        pool.free(p);
    }

    #[test]
    fn test_bounded_oversize_rejects_wasteful_match() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        seed_cached_block(&pool, 4 * MIB);

        // 2 MiB request tolerates only 1 MiB slack; the 4 MiB block would
        // waste 2 MiB, so a fresh device allocation happens instead.
        let p = pool.alloc(2 * MIB).unwrap();
        assert_eq!(heap.alloc_calls(), 2);
        assert_eq!(pool.cached_memory(), 4 * MIB);
        pool.free(p);
    }

    #[test]
    fn test_oversize_within_slack_matches() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        seed_cached_block(&pool, 2 * MIB);

        // 2 MiB - 1.5 MiB = 0.5 MiB of waste, within the 1 MiB bound.
        let p = pool.alloc(3 * MIB / 2).unwrap();
        assert_eq!(heap.alloc_calls(), 1);
        assert_eq!(pool.stats().alloc_hits, 1);
        pool.free(p);
    }

    #[test]
    fn test_undersized_block_never_matches() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        seed_cached_block(&pool, 512);

        let p = pool.alloc(1024).unwrap();
        assert_eq!(heap.alloc_calls(), 2);
        pool.free(p);
    }

    #[test]
    fn test_exhaustion_runs_three_phases() {
        let heap = Arc::new(HostHeap::with_limit(0));
        let collector = Arc::new(CountingCollector::default());
        let pool = SimplePool::new(
            PoolConfig::default(),
            Arc::clone(&heap) as _,
            Arc::clone(&collector) as _,
        );

        assert!(pool.alloc(4096).is_none());
        // Two device attempts per phase (direct, then reclaim-then-alloc).
        assert_eq!(heap.alloc_calls(), 6);
        assert_eq!(collector.incremental.load(Ordering::Relaxed), 1);
        assert_eq!(collector.full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reclaim_until_target() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);
        for bytes in [1024, 2048, 4096] {
            seed_cached_block(&pool, bytes);
        }
        assert_eq!(pool.cached_memory(), 7168);

        let freed = pool.reclaim(Some(3000));
        assert!(freed >= 3000);
        assert_eq!(pool.cached_memory(), 7168 - freed);

        let rest = pool.reclaim(None);
        assert_eq!(pool.cached_memory(), 0);
        assert_eq!(freed + rest, 7168);
        assert_eq!(heap.outstanding(), 0);
    }

    #[test]
    fn test_accounting_across_lifecycle() {
        let heap = Arc::new(HostHeap::new());
        let pool = pool_with(&heap);

        let p = pool.alloc(4096).unwrap();
        assert_eq!((pool.used_memory(), pool.cached_memory()), (4096, 0));

        pool.free(p);
        // Deferred: still accounted used until a reclaim drains it.
        assert_eq!((pool.used_memory(), pool.cached_memory()), (4096, 0));

        pool.reclaim(Some(0));
        assert_eq!((pool.used_memory(), pool.cached_memory()), (0, 4096));

        pool.reclaim(None);
        assert_eq!((pool.used_memory(), pool.cached_memory()), (0, 0));
        assert_eq!(heap.outstanding(), 0);
    }
}
