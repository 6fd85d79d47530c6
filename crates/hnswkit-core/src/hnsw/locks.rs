//! Lock discipline for concurrent graph mutation.
//!
//! # Acquisition order
//!
//! 1. arena `RwLock` (shared for insert/search/delete, exclusive for resize
//!    and snapshots)
//! 2. label stripe (one per operation)
//! 3. entry-point promotion lock
//! 4. registry mutex (free list, fresh allocation; released immediately)
//! 5. slot link locks, ascending slot index ([`lock_links_pair`],
//!    [`LinkGuards`])
//! 6. slot vector locks, ascending slot index
//!
//! A thread never acquires a lock of a lower rank while holding a higher one.
//! Search only ever holds a single link read lock, long enough to copy one
//! neighbor list.

use super::store::{Links, NodeId, SlotArena};
use parking_lot::{Mutex, MutexGuard, RwLockWriteGuard};
use std::time::Duration;

/// Number of label stripes. Power of two so the stripe is a mask.
const LABEL_STRIPES: usize = 1024;

/// Global and striped locks of one index instance.
#[derive(Debug)]
pub(crate) struct ConcurrencyController {
    label_locks: Box<[Mutex<()>]>,
    entry_lock: Mutex<()>,
    resize_timeout: Duration,
}

impl ConcurrencyController {
    pub(crate) fn new(resize_timeout: Duration) -> Self {
        Self {
            label_locks: (0..LABEL_STRIPES).map(|_| Mutex::new(())).collect(),
            entry_lock: Mutex::new(()),
            resize_timeout,
        }
    }

    /// Serializes operations on the same label.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn lock_label(&self, label: u64) -> MutexGuard<'_, ()> {
        // Fibonacci hashing spreads sequential labels across stripes
        let stripe = (label.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 54) as usize;
        self.label_locks[stripe & (LABEL_STRIPES - 1)].lock()
    }

    /// Held by an insert whose point may become the new entry point.
    pub(crate) fn lock_entry(&self) -> MutexGuard<'_, ()> {
        self.entry_lock.lock()
    }

    pub(crate) fn resize_timeout(&self) -> Duration {
        self.resize_timeout
    }

    pub(crate) fn set_resize_timeout(&mut self, timeout: Duration) {
        self.resize_timeout = timeout;
    }
}

/// Write-locks the adjacency lists of two distinct slots, lower index first.
///
/// Guards are returned in argument order: `(a, b)`.
pub(crate) fn lock_links_pair(
    arena: &SlotArena,
    a: NodeId,
    b: NodeId,
) -> (RwLockWriteGuard<'_, Links>, RwLockWriteGuard<'_, Links>) {
    debug_assert_ne!(a, b, "a slot cannot be paired with itself");
    if a < b {
        let guard_a = arena.slot(a).links.write();
        let guard_b = arena.slot(b).links.write();
        (guard_a, guard_b)
    } else {
        let guard_b = arena.slot(b).links.write();
        let guard_a = arena.slot(a).links.write();
        (guard_a, guard_b)
    }
}

/// Write guards over the adjacency lists of a set of slots, acquired in
/// ascending slot order.
pub(crate) struct LinkGuards<'a> {
    guards: Vec<(NodeId, RwLockWriteGuard<'a, Links>)>,
}

impl<'a> LinkGuards<'a> {
    /// Locks every distinct slot in `slots`.
    pub(crate) fn lock(arena: &'a SlotArena, slots: &[NodeId]) -> Self {
        let mut ids = slots.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let guards = ids
            .into_iter()
            .map(|id| (id, arena.slot(id).links.write()))
            .collect();
        Self { guards }
    }

    /// Neighbor list of a held slot on `layer`.
    pub(crate) fn layer_mut(&mut self, slot: NodeId, layer: usize) -> Option<&mut Vec<NodeId>> {
        self.guards
            .iter_mut()
            .find(|(id, _)| *id == slot)
            .and_then(|(_, links)| links.get_mut(layer))
    }
}
