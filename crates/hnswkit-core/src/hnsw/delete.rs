//! Tombstoning.
//!
//! Deleted points stay in the graph as hops; they are skipped in results
//! and, when slot reuse is enabled, queued for takeover by new labels.

use super::graph::HnswGraph;
use super::store::{NodeId, SlotArena};
use crate::error::{Error, Result};
use tracing::trace;

impl HnswGraph {
    /// Slot currently owned by `label`, tombstoned or not.
    pub(crate) fn bound_slot(&self, arena: &SlotArena, label: u64) -> Option<NodeId> {
        self.store
            .slot_of(label)
            .filter(|&slot| arena.slot(slot).label() == label)
    }

    /// Tombstones the point bound to `label`. Already deleted points are left
    /// as they are.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no point carries `label`.
    pub(crate) fn mark_deleted(&self, label: u64) -> Result<()> {
        let arena = self.store.arena.read();
        let _label_guard = self.locks.lock_label(label);

        let slot = self
            .bound_slot(&arena, label)
            .ok_or(Error::NotFound(label))?;

        if arena.slot(slot).set_deleted(true) {
            return Ok(());
        }
        self.store.note_deleted();
        if self.params.allow_replace_deleted {
            self.store.push_free_slot(slot);
        }
        trace!(label, slot, "marked deleted");
        Ok(())
    }

    /// Clears the tombstone of `label`. Unknown, live, or reused labels are
    /// ignored.
    pub(crate) fn unmark_deleted(&self, label: u64) {
        let arena = self.store.arena.read();
        let _label_guard = self.locks.lock_label(label);

        let Some(slot) = self.bound_slot(&arena, label) else {
            return;
        };
        let node = arena.slot(slot);
        if !node.is_deleted() {
            return;
        }
        // A slot missing from the free list is being taken over by a new label
        if self.params.allow_replace_deleted && !self.store.remove_free_slot(slot) {
            return;
        }

        node.set_deleted(false);
        self.store.note_revived();
        trace!(label, slot, "unmarked deleted");
    }
}
