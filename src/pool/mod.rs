// src/pool/mod.rs
//! Pooling policies and the capability set they share.
//!
//! Two interchangeable strategies sit on top of the same collaborator
//! contract: [`BinnedPool`] (power-of-two size classes, background
//! reclamation) and [`SimplePool`] (single free set, bounded-oversize
//! matching, pressure-driven eviction only). An application links exactly
//! one, chosen at process initialization via [`init`].

mod binned;
mod config;
mod simple;
mod stats;

pub use binned::BinnedPool;
pub use config::PoolConfig;
pub use simple::SimplePool;
pub use stats::{BinnedPoolStats, SimplePoolStats};

use crate::block::DevicePtr;
use crate::device::{DeviceAllocator, ManagedCollector};
use std::sync::Arc;

/// The capability set both pooling policies expose.
///
/// All methods are callable from any thread at any time. Allocation
/// failure is an absent value, never a panic; see the policy types for the
/// per-call contracts.
pub trait DevicePool: Send + Sync {
    /// Returns a pointer to at least `bytes` bytes, or `None` on
    /// exhaustion.
    fn alloc(&self, bytes: usize) -> Option<DevicePtr>;
    /// Returns a previously allocated pointer to the pool. Must be called
    /// exactly once per successful [`alloc`](Self::alloc).
    fn free(&self, ptr: DevicePtr);
    /// Bytes currently checked out to callers.
    fn used_memory(&self) -> usize;
    /// Bytes currently cached and reusable.
    fn cached_memory(&self) -> usize;
}

impl DevicePool for BinnedPool {
    fn alloc(&self, bytes: usize) -> Option<DevicePtr> {
        BinnedPool::alloc(self, bytes)
    }

    fn free(&self, ptr: DevicePtr) {
        BinnedPool::free(self, ptr)
    }

    fn used_memory(&self) -> usize {
        BinnedPool::used_memory(self)
    }

    fn cached_memory(&self) -> usize {
        BinnedPool::cached_memory(self)
    }
}

impl DevicePool for SimplePool {
    fn alloc(&self, bytes: usize) -> Option<DevicePtr> {
        SimplePool::alloc(self, bytes)
    }

    fn free(&self, ptr: DevicePtr) {
        SimplePool::free(self, ptr)
    }

    fn used_memory(&self) -> usize {
        SimplePool::used_memory(self)
    }

    fn cached_memory(&self) -> usize {
        SimplePool::cached_memory(self)
    }
}

/// Which pooling policy [`init`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPolicy {
    /// Power-of-two size classes with usage-driven background reclamation.
    Binned,
    /// Single free set with bounded-oversize matching; no background task.
    Simple,
}

/// Builds the selected pooling policy over the given collaborators.
///
/// This is the one-time process initialization: for the binned policy with
/// `config.managed` set it also spawns the background reclaimer. Callers
/// invoke it once and share the returned handle.
///
/// ```
/// use devpool::prelude::*;
/// use std::sync::Arc;
///
/// let pool = devpool::init(
///     PoolPolicy::Binned,
///     PoolConfig::from_env(),
///     Arc::new(HostHeap::new()),
///     Arc::new(NopCollector),
/// );
/// let ptr = pool.alloc(4096).expect("host heap is unbounded");
/// pool.free(ptr);
/// ```
pub fn init(
    policy: PoolPolicy,
    config: PoolConfig,
    device: Arc<dyn DeviceAllocator>,
    collector: Arc<dyn ManagedCollector>,
) -> Arc<dyn DevicePool> {
    match policy {
        PoolPolicy::Binned => BinnedPool::new(config, device, collector),
        PoolPolicy::Simple => Arc::new(SimplePool::new(config, device, collector)),
    }
}
