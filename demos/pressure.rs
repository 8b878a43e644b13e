// demos/pressure.rs
//! Allocation under device-memory pressure
//!
//! Runs the pool against a deliberately tiny device so the escalation
//! ladder has to work for its allocations: cached blocks get evicted to
//! make room, and true exhaustion surfaces as an absent value.

use devpool::prelude::*;
use std::sync::Arc;

const MIB: usize = 1 << 20;

fn main() {
    // An 8 MiB "device".
    let heap = Arc::new(HostHeap::with_limit(8 * MIB));
    let pool = BinnedPool::new(
        PoolConfig {
            managed: false,
            ..PoolConfig::default()
        },
        Arc::clone(&heap) as _,
        Arc::new(NopCollector),
    );

    // Fill the device through the pool, then return everything to cache.
    let blocks: Vec<_> = (0..8).map(|_| pool.alloc(MIB).unwrap()).collect();
    println!("device full: outstanding={} MiB", heap.outstanding() / MIB);
    for p in blocks {
        pool.free(p);
    }
    pool.reclaim(None, false);
    println!(
        "all cached: cached={} MiB, device still holds {} MiB",
        pool.cached_memory() / MIB,
        heap.outstanding() / MIB
    );

    // A larger class can't reuse those 1 MiB blocks, and the device is
    // full; the ladder's reclaim step evicts cache to make room.
    match pool.alloc(4 * MIB) {
        Some(p) => {
            let stats = pool.stats();
            println!(
                "4 MiB allocation rescued by eviction: evicted={} blocks ({} MiB)",
                stats.evictions,
                stats.evicted_bytes / MIB
            );
            pool.free(p);
        }
        None => println!("4 MiB allocation failed"),
    }

    // Ask for more than the device can ever hold: exhaustion is a value,
    // not a panic.
    match pool.alloc(64 * MIB) {
        Some(_) => unreachable!("the device is 8 MiB"),
        None => println!("64 MiB allocation correctly reported exhaustion"),
    }

    let stats = pool.stats();
    println!(
        "final: device_allocs={} hits={} collections={} evicted={} MiB",
        stats.device_allocs,
        stats.alloc_hits,
        stats.collections,
        stats.evicted_bytes / MIB
    );
}
