// src/registry.rs
//! Handle registry: opaque pointer → owning block record.
//!
//! Populated on every successful `alloc`, consulted and emptied on `free`.
//! Its existence lets `free` take a bare pointer; callers never need to
//! remember the size they requested.
//!
//! The registry has its own lock, separate from the pool state, and the
//! lock is never held across any collaborator call. Together with the
//! deferred-free queue this keeps `free` safe to call from finalizer
//! contexts that must not re-enter pool bookkeeping.

use crate::block::{Block, DevicePtr};
use std::collections::HashMap;
use std::sync::Mutex;

/// How a registered block is tracked by its pool.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Handle {
    /// Lives in a size class; `free` stages it on the deferred-free queue.
    Pooled(Block),
    /// Bypassed the cache; `free` releases it to the device immediately.
    Oversize(Block),
}

impl Handle {
    pub(crate) fn block(&self) -> Block {
        match self {
            Handle::Pooled(b) | Handle::Oversize(b) => *b,
        }
    }
}

pub(crate) struct HandleRegistry {
    inner: Mutex<HashMap<DevicePtr, Handle>>,
}

impl HandleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, handle: Handle) {
        let block = handle.block();
        let previous = self.inner.lock().unwrap().insert(block.ptr(), handle);
        debug_assert!(
            previous.is_none(),
            "pointer handed out twice: {:?}",
            block.ptr()
        );
    }

    /// Removes and returns the record for `ptr`, or `None` for a pointer
    /// the pool never handed out (an invalid free).
    pub(crate) fn remove(&self, ptr: DevicePtr) -> Option<Handle> {
        self.inner.lock().unwrap().remove(&ptr)
    }

}
