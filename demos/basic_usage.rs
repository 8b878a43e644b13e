// demos/basic_usage.rs
//! Basic usage of the device-memory pool

use devpool::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Binned Pool Usage ===\n");

    // The host-memory backend stands in for a real device allocator.
    let heap = Arc::new(HostHeap::new());
    let pool = BinnedPool::new(
        PoolConfig {
            managed: false, // no background thread for this walkthrough
            ..PoolConfig::default()
        },
        Arc::clone(&heap) as _,
        Arc::new(NopCollector),
    );

    // 1. Requests are rounded up to their power-of-two class.
    let p = pool.try_alloc(1000)?;
    println!("requested 1000 bytes, pool accounts {}", pool.used_memory());

    // 2. Freed blocks are staged, then cached at the next reclaim.
    pool.free(p);
    println!(
        "after free: used={} cached={} (free is deferred)",
        pool.used_memory(),
        pool.cached_memory()
    );
    pool.reclaim(None, false);
    println!(
        "after drain: used={} cached={}",
        pool.used_memory(),
        pool.cached_memory()
    );

    // 3. The next same-class request never touches the device.
    let q = pool.try_alloc(600)?;
    let stats = pool.stats();
    println!(
        "re-allocation: device_allocs={} alloc_hits={} hit_rate={:.1}%",
        stats.device_allocs,
        stats.alloc_hits,
        stats.hit_rate()
    );
    pool.free(q);

    println!("\n=== Policy Selection ===\n");

    // The simple pool shares the same contract; pick one at startup.
    let pool: Arc<dyn DevicePool> = devpool::init(
        PoolPolicy::Simple,
        PoolConfig::from_env(),
        Arc::new(HostHeap::new()),
        Arc::new(NopCollector),
    );
    let p = pool.alloc(900_000).expect("host heap is unbounded");
    println!("simple pool tracks exact sizes: used={}", pool.used_memory());
    pool.free(p);

    Ok(())
}
