// src/lib.rs
//! # Binned Device-Memory Pool
//!
//! A caching layer over an expensive native allocation primitive (GPU
//! device memory, or any externally managed opaque region). Freed blocks
//! are cached and handed back to later requests, amortizing the native
//! allocator's cost; periodic usage-driven reclamation keeps the cache
//! from growing without bound.
//!
//! Features:
//! - Two swappable pooling policies behind one trait: size-binned with a
//!   background reclaimer, or a simpler single free set with bounded
//!   oversize matching
//! - Multi-phase allocation with escalating recovery (cache, device,
//!   host collections, targeted eviction, full drain)
//! - Lock-free deferred-free staging so `free` is safe from native
//!   finalizer callbacks
//! - Age-weighted eviction driven by per-class usage high-water marks
//! - Host-memory reference backend with secure zeroing of released regions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod device;
pub mod error;
pub mod pool;

mod queue;
mod registry;

// Re-export main types
pub use block::{Block, DevicePtr, MAX_POOL, USAGE_WINDOW};
pub use device::{DeviceAllocator, HostHeap, ManagedCollector, NopCollector};
pub use error::{PoolError, Result};
pub use pool::{
    BinnedPool, BinnedPoolStats, DevicePool, PoolConfig, PoolPolicy, SimplePool, SimplePoolStats,
    init,
};

/// Commonly used imports.
pub mod prelude {
    pub use crate::block::{Block, DevicePtr};
    pub use crate::device::{DeviceAllocator, HostHeap, ManagedCollector, NopCollector};
    pub use crate::error::{PoolError, Result};
    pub use crate::pool::{
        BinnedPool, BinnedPoolStats, DevicePool, PoolConfig, PoolPolicy, SimplePool,
        SimplePoolStats,
    };
}
