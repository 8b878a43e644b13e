// src/queue.rs
//! Deferred-free staging queue.
//!
//! `free` may be invoked from finalizer callbacks of the host's memory
//! manager. Mutating the per-class sets (or taking the pool lock at all)
//! inside such a callback risks deadlock, so `free` only stages the block
//! here; the next reclamation pass drains the queue into the free lists
//! under the pool lock.
//!
//! The API is deliberately one-way: producers `push`, and the single
//! consumer (a reclamation pass) empties the whole queue through `drain`.
//! Nothing ever takes blocks back out one at a time, so there is no pop
//! surface to misuse from the wrong side of the lock.

use crate::block::Block;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free staging area between `free` and cache insertion.
pub(crate) struct DeferredFreeQueue {
    staged: crossbeam::queue::SegQueue<Block>,
    /// Monotonic producer/consumer tallies. Staging depth is their
    /// difference; both are relaxed, so the derived value can lag under
    /// concurrency and feeds statistics only, never correctness decisions.
    pushed: AtomicUsize,
    drained: AtomicUsize,
}

impl DeferredFreeQueue {
    pub(crate) fn new() -> Self {
        Self {
            staged: crossbeam::queue::SegQueue::new(),
            pushed: AtomicUsize::new(0),
            drained: AtomicUsize::new(0),
        }
    }

    /// Stages a freed block. Safe to call from any context; takes no lock.
    #[inline]
    pub(crate) fn push(&self, block: Block) {
        self.staged.push(block);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Empties the queue, handing each staged block to `sink`.
    ///
    /// Blocks pushed concurrently while the drain runs are taken as well;
    /// the caller holds whatever lock its own bookkeeping needs, which is
    /// fine because staging itself never contends for it.
    pub(crate) fn drain(&self, mut sink: impl FnMut(Block)) {
        let mut taken = 0;
        while let Some(block) = self.staged.pop() {
            taken += 1;
            sink(block);
        }
        if taken > 0 {
            self.drained.fetch_add(taken, Ordering::Relaxed);
        }
    }

    /// Approximate number of staged blocks; may be briefly stale.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        let pushed = self.pushed.load(Ordering::Relaxed);
        let drained = self.drained.load(Ordering::Relaxed);
        pushed.saturating_sub(drained)
    }
}
