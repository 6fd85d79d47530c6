//! Point insertion, label upsert and slot reuse.
//!
//! Every path ends in [`HnswGraph::link`], which runs the full construction
//! algorithm for one slot: greedy descent to the slot's top layer, then a beam
//! search plus neighbor selection on each layer it occupies.
//!
//! Links are always bidirectional. An edge is added or removed on both
//! endpoints while both link locks are held. When a chosen neighbor's list is
//! full, the list is re-pruned and the edge to the member it drops is removed
//! from both sides in the same critical section. A member is never dropped if
//! that edge is its last one on the layer.
//!
//! Updating a label or reusing a tombstoned slot first detaches the slot from
//! its previous neighbors and then relinks it. The slot keeps the top layer
//! drawn when it was first allocated.

use super::candidate::Candidate;
use super::graph::HnswGraph;
use super::locks::{lock_links_pair, LinkGuards};
use super::store::{EntryPoint, Links, NodeId, SlotArena};
use crate::error::{Error, Result};
use std::iter;
use tracing::{debug, trace, warn};

/// Rounds of re-reading a neighbor list that changed under a pending swap.
const CONNECT_ATTEMPTS: usize = 8;

/// Result of trying to swap a new edge in for an evicted one.
enum Exchange {
    Done,
    Refused,
    Stale,
}

impl HnswGraph {
    /// Inserts `vector` under `label`, or updates the point already bound to
    /// `label`.
    ///
    /// With `replace_deleted`, a new label takes over a tombstoned slot when
    /// one is free. Returns the slot the point lives in.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when `replace_deleted` is requested on a graph
    ///   built without slot reuse, or when the vector is invalid
    /// - [`Error::DimensionMismatch`] on a wrong vector length
    /// - [`Error::Capacity`] when no slot is left
    pub(crate) fn upsert(&self, label: u64, vector: &[f32], replace_deleted: bool) -> Result<NodeId> {
        if replace_deleted && !self.params.allow_replace_deleted {
            return Err(Error::Config(
                "replace_deleted requires an index created with allow_replace_deleted".to_string(),
            ));
        }
        let vector = self.prepare(vector)?;

        let arena = self.store.arena.read();
        let _label_guard = self.locks.lock_label(label);

        if let Some(slot) = self.store.slot_of(label) {
            if let Some(was_deleted) = self.claim_existing(&arena, label, slot) {
                let node = arena.slot(slot);
                node.set_vector(vector);
                self.link(&arena, slot, true);
                if was_deleted {
                    node.set_deleted(false);
                    self.store.note_revived();
                }
                trace!(label, slot, revived = was_deleted, "updated point");
                return Ok(slot);
            }
        }

        if replace_deleted {
            if let Some(slot) = self.store.take_free_slot() {
                self.reuse_slot(&arena, label, slot, vector);
                return Ok(slot);
            }
        }

        let slot = self.store.allocate_fresh(&arena)?;
        let level = self.levels.next_level();
        arena.slot(slot).init(vector, label, level);
        self.store.bind_label(label, slot);
        self.link(&arena, slot, false);
        trace!(label, slot, level, "inserted point");
        Ok(slot)
    }

    /// Checks that `slot` still belongs to `label` and can be updated in
    /// place. Returns whether the slot was tombstoned, or `None` when the
    /// binding is stale or a concurrent reuse already took the slot.
    fn claim_existing(&self, arena: &SlotArena, label: u64, slot: NodeId) -> Option<bool> {
        let node = arena.slot(slot);
        if node.label() != label {
            return None;
        }
        if !node.is_deleted() {
            return Some(false);
        }
        if self.params.allow_replace_deleted && !self.store.remove_free_slot(slot) {
            return None;
        }
        Some(true)
    }

    /// Moves a tombstoned slot over to `label`.
    fn reuse_slot(&self, arena: &SlotArena, label: u64, slot: NodeId, vector: Vec<f32>) {
        let node = arena.slot(slot);
        let old_label = node.label();

        self.store.unbind_label(old_label, slot);
        node.set_label(label);
        node.set_vector(vector);
        self.store.bind_label(label, slot);

        self.link(arena, slot, true);

        if node.set_deleted(false) {
            self.store.note_revived();
        }
        debug!(label, old_label, slot, "reused tombstoned slot");
    }

    /// Links `slot` into every layer it occupies.
    fn link(&self, arena: &SlotArena, slot: NodeId, relink: bool) {
        let node = arena.slot(slot);
        let level = node.level();
        let query = node.vector().clone();

        let old_links = if relink {
            self.detach(arena, slot)
        } else {
            Links::new()
        };

        let mut entry = self.store.entry_point();
        let entry_guard = match entry {
            Some(ep) if level <= ep.level => None,
            _ => {
                let guard = self.locks.lock_entry();
                entry = self.store.entry_point();
                Some(guard)
            }
        };

        let Some(ep) = entry else {
            self.store.set_entry_point(EntryPoint { slot, level });
            debug!(slot, level, "installed first entry point");
            return;
        };

        let start = Candidate::new(self.store.distance_to(arena, &query, ep.slot), ep.slot);
        let mut nearest = self.greedy_descent(arena, &query, start, ep.level, level);
        let ef = self.params.effective_ef_construction();

        for layer in (0..=level.min(ep.level)).rev() {
            let mut entries = vec![nearest];
            if let Some(previous) = old_links.get(layer) {
                entries.extend(
                    previous
                        .iter()
                        .filter(|&&n| n != slot)
                        .map(|&n| Candidate::new(self.store.distance_to(arena, &query, n), n)),
                );
            }

            let found = self.search_layer(arena, &query, &entries, ef, layer, |n| n != slot);
            if let Some(closest) = found.first() {
                nearest = *closest;
            }

            let selected = self.select_neighbors(arena, &found, self.params.cap_for_layer(layer));
            for &neighbor in &selected {
                self.connect(arena, slot, neighbor, layer, false);
            }
            if node.neighbors(layer).is_empty() {
                // Every neighbor preferred its current links
                for &neighbor in &selected {
                    if self.connect(arena, slot, neighbor, layer, true) {
                        break;
                    }
                }
            }
        }

        if level > ep.level {
            self.store.set_entry_point(EntryPoint { slot, level });
            debug!(slot, level, previous_level = ep.level, "promoted entry point");
        }
        drop(entry_guard);
    }

    /// Chooses link targets among construction candidates, skipping
    /// tombstoned slots unless nothing else was found.
    fn select_neighbors(&self, arena: &SlotArena, found: &[Candidate], cap: usize) -> Vec<NodeId> {
        let live: Vec<Candidate> = found
            .iter()
            .filter(|c| !arena.slot(c.slot).is_deleted())
            .copied()
            .collect();

        let pool = if live.is_empty() && !found.is_empty() {
            warn!(
                candidates = found.len(),
                "only tombstoned candidates found, linking to them"
            );
            found
        } else {
            &live
        };

        self.selector
            .select(pool, cap, |a, b| self.store.distance_between(arena, a, b))
    }

    /// Links `slot` and `neighbor` on `layer`. Returns whether the edge exists
    /// afterwards.
    ///
    /// When `neighbor` is full its list is re-pruned over its members plus
    /// `slot`, and the edge to the dropped member is swapped out. With
    /// `force`, `slot` is kept and the farthest member that can spare the
    /// edge is dropped instead.
    fn connect(
        &self,
        arena: &SlotArena,
        slot: NodeId,
        neighbor: NodeId,
        layer: usize,
        force: bool,
    ) -> bool {
        let cap = self.params.cap_for_layer(layer);

        for _ in 0..CONNECT_ATTEMPTS {
            let (snapshot, evictions) = {
                let (mut own_links, mut their_links) = lock_links_pair(arena, slot, neighbor);
                let (Some(own), Some(theirs)) =
                    (own_links.get_mut(layer), their_links.get_mut(layer))
                else {
                    return false;
                };
                if own.contains(&neighbor) {
                    return true;
                }
                if own.len() >= cap {
                    return false;
                }
                if theirs.len() < cap {
                    own.push(neighbor);
                    theirs.push(slot);
                    return true;
                }

                let evictions = self.eviction_order(arena, slot, neighbor, theirs, cap, force);
                if evictions.is_empty() {
                    return false;
                }
                (theirs.clone(), evictions)
            };

            match self.exchange(arena, slot, neighbor, layer, &snapshot, &evictions) {
                Exchange::Done => return true,
                Exchange::Refused => return false,
                Exchange::Stale => {}
            }
        }

        trace!(slot, neighbor, layer, "neighbor list kept changing, edge skipped");
        false
    }

    /// Members of `neighbor`'s full list that may make room for `slot`, in
    /// the order they should be tried. Empty when pruning keeps the list as
    /// it is.
    fn eviction_order(
        &self,
        arena: &SlotArena,
        slot: NodeId,
        neighbor: NodeId,
        members: &[NodeId],
        cap: usize,
        force: bool,
    ) -> Vec<NodeId> {
        if force {
            let mut farthest: Vec<Candidate> = members
                .iter()
                .map(|&n| Candidate::new(self.store.distance_between(arena, neighbor, n), n))
                .collect();
            farthest.sort_by(|a, b| b.cmp(a));
            return farthest.into_iter().map(|c| c.slot).collect();
        }

        let candidates: Vec<Candidate> = members
            .iter()
            .copied()
            .chain(iter::once(slot))
            .map(|n| Candidate::new(self.store.distance_between(arena, neighbor, n), n))
            .collect();
        let kept = self
            .selector
            .select(&candidates, cap, |a, b| self.store.distance_between(arena, a, b));
        if !kept.contains(&slot) {
            return Vec::new();
        }
        members
            .iter()
            .copied()
            .filter(|n| !kept.contains(n))
            .collect()
    }

    /// Replaces the first evictable member of `neighbor`'s list with `slot`,
    /// holding the link locks of all three slots.
    fn exchange(
        &self,
        arena: &SlotArena,
        slot: NodeId,
        neighbor: NodeId,
        layer: usize,
        snapshot: &[NodeId],
        evictions: &[NodeId],
    ) -> Exchange {
        let cap = self.params.cap_for_layer(layer);

        for &evicted in evictions {
            let mut held = LinkGuards::lock(arena, &[slot, neighbor, evicted]);

            if held.layer_mut(neighbor, layer).map(|l| l.as_slice()) != Some(snapshot) {
                return Exchange::Stale;
            }
            let own_open = held
                .layer_mut(slot, layer)
                .is_some_and(|l| l.len() < cap && !l.contains(&neighbor));
            if !own_open {
                return Exchange::Stale;
            }
            let spare = held
                .layer_mut(evicted, layer)
                .is_some_and(|l| l.len() > 1 && l.contains(&neighbor));
            if !spare {
                continue;
            }

            if let Some(list) = held.layer_mut(evicted, layer) {
                list.retain(|&n| n != neighbor);
            }
            if let Some(list) = held.layer_mut(neighbor, layer) {
                for member in list.iter_mut().filter(|m| **m == evicted) {
                    *member = slot;
                }
            }
            if let Some(list) = held.layer_mut(slot, layer) {
                list.push(neighbor);
            }
            return Exchange::Done;
        }

        Exchange::Refused
    }

    /// Removes the edges of `slot` on both endpoints, except an edge that is
    /// its neighbor's last one on that layer. Returns the lists as they were.
    fn detach(&self, arena: &SlotArena, slot: NodeId) -> Links {
        let old = arena.slot(slot).links.read().clone();

        for (layer, neighbors) in old.iter().enumerate() {
            for &neighbor in neighbors {
                if neighbor == slot {
                    continue;
                }
                let (mut own, mut theirs) = lock_links_pair(arena, slot, neighbor);
                let Some(list) = theirs.get_mut(layer) else {
                    continue;
                };
                if list.len() > 1 || !list.contains(&slot) {
                    list.retain(|&n| n != slot);
                    if let Some(forward) = own.get_mut(layer) {
                        forward.retain(|&n| n != neighbor);
                    }
                }
            }
        }

        old
    }
}
