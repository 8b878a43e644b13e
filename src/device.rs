// src/device.rs
//! External collaborator interfaces: the native device allocator and the
//! host-side managed-memory collector.
//!
//! The pool itself never touches device memory; it only shuttles opaque
//! pointers obtained through [`DeviceAllocator`]. The real CUDA/ROCm/Metal
//! primitive lives behind this trait in the embedding application.
//! [`HostHeap`] is a host-memory reference implementation used by the test
//! suite, the benches, and hosts that want a working default.

use crate::block::DevicePtr;
use std::collections::HashMap;
use std::sync::Mutex;
use zeroize::Zeroize;

/// The expensive native allocation primitive the pool amortizes.
///
/// # Contract
///
/// - [`actual_alloc`](Self::actual_alloc) returns `None` under memory
///   pressure and must not panic on pressure.
/// - [`actual_free`](Self::actual_free) is infallible. A release failure is
///   not recoverable at the pool layer; implementations that can fail must
///   treat it as fatal themselves.
pub trait DeviceAllocator: Send + Sync {
    /// Attempts a native device allocation of `bytes` bytes.
    fn actual_alloc(&self, bytes: usize) -> Option<DevicePtr>;

    /// Releases a native allocation previously produced by
    /// [`actual_alloc`](Self::actual_alloc).
    fn actual_free(&self, ptr: DevicePtr);
}

/// Host-side garbage collection trigger.
///
/// The allocation ladder asks the host to collect (incrementally first,
/// fully later) so that finalizers holding device blocks get a chance to
/// run and push their blocks into the deferred-free queue. Both forms are
/// synchronous, and the pool always calls them with its lock released.
pub trait ManagedCollector: Send + Sync {
    /// Requests an incremental (`full = false`) or full (`full = true`)
    /// collection.
    fn collect(&self, full: bool);
}

/// A [`ManagedCollector`] that does nothing.
///
/// The right choice for hosts without a managed runtime: the escalation
/// ladder still works, it just degrades to cache-then-reclaim-then-device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCollector;

impl ManagedCollector for NopCollector {
    fn collect(&self, _full: bool) {}
}

struct Region {
    data: Box<[u8]>,
    bytes: usize,
}

struct HostHeapInner {
    regions: HashMap<usize, Region>,
    limit: usize,
    outstanding: usize,
    alloc_calls: usize,
    free_calls: usize,
    failed_allocs: usize,
}

/// Host-memory reference implementation of [`DeviceAllocator`].
///
/// Each allocation is a boxed byte slice; its address doubles as the opaque
/// device pointer. Released regions are securely zeroed (via `zeroize`)
/// before being dropped, so recycled memory never carries a previous
/// tenant's data back to the host allocator.
///
/// The heap counts every call and tracks outstanding bytes, which is what
/// the instrumented stress tests key their accounting invariants off. An
/// optional byte limit makes exhaustion reproducible:
///
/// ```
/// use devpool::device::{DeviceAllocator, HostHeap};
///
/// let heap = HostHeap::with_limit(4096);
/// assert!(heap.actual_alloc(4096).is_some());
/// assert!(heap.actual_alloc(1).is_none());
/// ```
pub struct HostHeap {
    inner: Mutex<HostHeapInner>,
}

impl Default for HostHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostHeap {
    /// Creates an unbounded host heap.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Creates a heap that fails allocations once `limit` bytes are
    /// outstanding. `with_limit(0)` fails every allocation.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(HostHeapInner {
                regions: HashMap::new(),
                limit,
                outstanding: 0,
                alloc_calls: 0,
                free_calls: 0,
                failed_allocs: 0,
            }),
        }
    }

    /// Bytes currently allocated and not yet released.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().unwrap().outstanding
    }

    /// Total calls to [`actual_alloc`](DeviceAllocator::actual_alloc),
    /// including failed ones.
    pub fn alloc_calls(&self) -> usize {
        self.inner.lock().unwrap().alloc_calls
    }

    /// Total calls to [`actual_free`](DeviceAllocator::actual_free).
    pub fn free_calls(&self) -> usize {
        self.inner.lock().unwrap().free_calls
    }

    /// Allocation attempts rejected by the byte limit.
    pub fn failed_allocs(&self) -> usize {
        self.inner.lock().unwrap().failed_allocs
    }
}

impl DeviceAllocator for HostHeap {
    fn actual_alloc(&self, bytes: usize) -> Option<DevicePtr> {
        let mut heap = self.inner.lock().unwrap();
        heap.alloc_calls += 1;
        if heap.outstanding.saturating_add(bytes) > heap.limit {
            heap.failed_allocs += 1;
            return None;
        }
        // A zero-byte region still needs a stable, unique address.
        let data = vec![0u8; bytes.max(1)].into_boxed_slice();
        let addr = data.as_ptr() as usize;
        let ptr = DevicePtr::new(addr)?;
        heap.outstanding += bytes;
        heap.regions.insert(addr, Region { data, bytes });
        Some(ptr)
    }

    fn actual_free(&self, ptr: DevicePtr) {
        let mut heap = self.inner.lock().unwrap();
        heap.free_calls += 1;
        let mut region = heap
            .regions
            .remove(&ptr.addr())
            .unwrap_or_else(|| panic!("released pointer not owned by this heap: {ptr:?}"));
        region.data.zeroize();
        heap.outstanding -= region.bytes;
    }
}
