//! Slot arena holding vectors, labels and per-layer adjacency lists.
//!
//! Points live in a flat arena of preallocated slots addressed by dense
//! [`NodeId`]s. Adjacency lists store slot indices only, so the bidirectional
//! graph never needs shared ownership between nodes.
//!
//! # Locking
//!
//! Each slot guards its vector and its adjacency lists with separate
//! `RwLock`s. Vector locks are leaves: code holding one acquires nothing
//! but another vector lock of a higher slot. See [`super::locks`] for the
//! full acquisition order.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use roaring::RoaringBitmap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Dense slot index of a point.
pub type NodeId = usize;

/// Adjacency lists of one slot, indexed by layer (`0..=top_layer`).
pub(crate) type Links = Vec<Vec<NodeId>>;

/// One point's storage.
#[derive(Debug)]
pub(crate) struct Slot {
    vector: RwLock<Vec<f32>>,
    pub(crate) links: RwLock<Links>,
    label: AtomicU64,
    level: AtomicUsize,
    deleted: AtomicBool,
}

impl Slot {
    fn empty() -> Self {
        Self {
            vector: RwLock::new(Vec::new()),
            links: RwLock::new(Vec::new()),
            label: AtomicU64::new(0),
            level: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    /// Builds a fully populated slot (used when decoding snapshots).
    pub(crate) fn restored(
        vector: Vec<f32>,
        label: u64,
        links: Links,
        deleted: bool,
    ) -> Self {
        let level = links.len().saturating_sub(1);
        Self {
            vector: RwLock::new(vector),
            links: RwLock::new(links),
            label: AtomicU64::new(label),
            level: AtomicUsize::new(level),
            deleted: AtomicBool::new(deleted),
        }
    }

    /// Initializes a freshly allocated slot.
    pub(crate) fn init(&self, vector: Vec<f32>, label: u64, level: usize) {
        *self.vector.write() = vector;
        *self.links.write() = vec![Vec::new(); level + 1];
        self.label.store(label, Ordering::Release);
        self.level.store(level, Ordering::Release);
        self.deleted.store(false, Ordering::Release);
    }

    pub(crate) fn label(&self) -> u64 {
        self.label.load(Ordering::Acquire)
    }

    pub(crate) fn set_label(&self, label: u64) {
        self.label.store(label, Ordering::Release);
    }

    /// Top layer this slot participates in. Fixed once the slot is allocated.
    pub(crate) fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Sets the tombstone flag, returning the previous value.
    pub(crate) fn set_deleted(&self, deleted: bool) -> bool {
        self.deleted.swap(deleted, Ordering::AcqRel)
    }

    pub(crate) fn vector(&self) -> RwLockReadGuard<'_, Vec<f32>> {
        self.vector.read()
    }

    pub(crate) fn set_vector(&self, vector: Vec<f32>) {
        *self.vector.write() = vector;
    }

    /// Point-in-time copy of the neighbor list at `layer`; empty above the
    /// slot's top layer.
    pub(crate) fn neighbors(&self, layer: usize) -> Vec<NodeId> {
        self.links.read().get(layer).cloned().unwrap_or_default()
    }
}

/// Fixed-capacity arena of slots. Replaced wholesale by resize.
#[derive(Debug)]
pub(crate) struct SlotArena {
    slots: Vec<Slot>,
    allocated: AtomicUsize,
}

impl SlotArena {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Builds an arena from decoded slots, padding up to `capacity`.
    pub(crate) fn from_slots(mut slots: Vec<Slot>, capacity: usize) -> Self {
        let allocated = slots.len();
        slots.extend((allocated..capacity).map(|_| Slot::empty()));
        Self {
            slots,
            allocated: AtomicUsize::new(allocated),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots handed out so far (live plus tombstoned).
    pub(crate) fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    pub(crate) fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id]
    }

    /// Slots handed out so far.
    pub(crate) fn allocated_slots(&self) -> &[Slot] {
        &self.slots[..self.allocated()]
    }

    /// Changes capacity. Requires exclusive access.
    pub(crate) fn resize(&mut self, new_capacity: usize) -> Result<()> {
        let allocated = self.allocated();
        if new_capacity < allocated {
            return Err(Error::Capacity {
                requested: allocated,
                capacity: new_capacity,
            });
        }
        if new_capacity > self.slots.len() {
            self.slots.reserve_exact(new_capacity - self.slots.len());
            self.slots
                .extend((self.slots.len()..new_capacity).map(|_| Slot::empty()));
        } else {
            self.slots.truncate(new_capacity);
            self.slots.shrink_to_fit();
        }
        Ok(())
    }
}

/// Current descent starting point: a slot on the highest occupied layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryPoint {
    pub slot: NodeId,
    pub level: usize,
}

/// Tombstoned slots eligible for reuse.
#[derive(Debug, Default)]
pub(crate) struct FreeSlots {
    bitmap: RoaringBitmap,
}

impl FreeSlots {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn push(&mut self, slot: NodeId) {
        self.bitmap.insert(slot as u32);
    }

    /// Removes `slot`, returning whether it was present.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn remove(&mut self, slot: NodeId) -> bool {
        self.bitmap.remove(slot as u32)
    }

    /// Takes the lowest free slot.
    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        let slot = self.bitmap.min()?;
        self.bitmap.remove(slot);
        Some(slot as NodeId)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn len(&self) -> usize {
        self.bitmap.len() as usize
    }
}

/// Owner of all graph state: arena, label map, free list and entry point.
#[derive(Debug)]
pub(crate) struct GraphStore {
    pub(crate) dimension: usize,
    pub(crate) metric: DistanceMetric,
    /// Shared by every operation, exclusive for resize and snapshots.
    pub(crate) arena: RwLock<SlotArena>,
    /// Label -> slot for live and tombstoned points.
    labels: DashMap<u64, NodeId>,
    /// Coarse lock for the free list and fresh-slot allocation.
    registry: Mutex<FreeSlots>,
    entry: ArcSwapOption<EntryPoint>,
    deleted: AtomicUsize,
}

impl GraphStore {
    pub(crate) fn new(dimension: usize, metric: DistanceMetric, capacity: usize) -> Self {
        Self {
            dimension,
            metric,
            arena: RwLock::new(SlotArena::with_capacity(capacity)),
            labels: DashMap::with_capacity(capacity.min(1 << 16)),
            registry: Mutex::new(FreeSlots::default()),
            entry: ArcSwapOption::empty(),
            deleted: AtomicUsize::new(0),
        }
    }

    /// Rebuilds a store from decoded state. Label uniqueness and the entry
    /// point must already be validated by the caller.
    pub(crate) fn restore(
        dimension: usize,
        metric: DistanceMetric,
        arena: SlotArena,
        entry: Option<EntryPoint>,
        track_free_slots: bool,
    ) -> Self {
        let labels = DashMap::with_capacity(arena.allocated());
        let mut free = FreeSlots::default();
        let mut deleted = 0;
        for (id, slot) in arena.allocated_slots().iter().enumerate() {
            labels.insert(slot.label(), id);
            if slot.is_deleted() {
                deleted += 1;
                if track_free_slots {
                    free.push(id);
                }
            }
        }
        Self {
            dimension,
            metric,
            arena: RwLock::new(arena),
            labels,
            registry: Mutex::new(free),
            entry: ArcSwapOption::new(entry.map(Arc::new)),
            deleted: AtomicUsize::new(deleted),
        }
    }

    /// Distance from `query` to the vector stored in `slot`.
    #[inline]
    pub(crate) fn distance_to(&self, arena: &SlotArena, query: &[f32], slot: NodeId) -> f32 {
        let vector = arena.slot(slot).vector();
        self.metric.distance(query, &vector)
    }

    /// Distance between two stored slots. Both vector locks are taken in
    /// ascending slot order.
    #[inline]
    pub(crate) fn distance_between(&self, arena: &SlotArena, a: NodeId, b: NodeId) -> f32 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let v_lo = arena.slot(lo).vector();
        if lo == hi {
            return self.metric.distance(&v_lo, &v_lo);
        }
        let v_hi = arena.slot(hi).vector();
        self.metric.distance(&v_lo, &v_hi)
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    /// Hands out the next never-used slot.
    pub(crate) fn allocate_fresh(&self, arena: &SlotArena) -> Result<NodeId> {
        let _registry = self.registry.lock();
        let next = arena.allocated();
        if next >= arena.capacity() {
            return Err(Error::Capacity {
                requested: next + 1,
                capacity: arena.capacity(),
            });
        }
        arena.allocated.store(next + 1, Ordering::Release);
        Ok(next)
    }

    /// Takes a tombstoned slot off the free list.
    pub(crate) fn take_free_slot(&self) -> Option<NodeId> {
        self.registry.lock().pop()
    }

    pub(crate) fn push_free_slot(&self, slot: NodeId) {
        self.registry.lock().push(slot);
    }

    pub(crate) fn remove_free_slot(&self, slot: NodeId) -> bool {
        self.registry.lock().remove(slot)
    }

    pub(crate) fn free_slot_count(&self) -> usize {
        self.registry.lock().len()
    }

    // ---------------------------------------------------------------------
    // Labels
    // ---------------------------------------------------------------------

    pub(crate) fn slot_of(&self, label: u64) -> Option<NodeId> {
        self.labels.get(&label).map(|entry| *entry.value())
    }

    pub(crate) fn bind_label(&self, label: u64, slot: NodeId) {
        self.labels.insert(label, slot);
    }

    /// Removes `label` only if it still points at `slot`.
    pub(crate) fn unbind_label(&self, label: u64, slot: NodeId) {
        self.labels.remove_if(&label, |_, bound| *bound == slot);
    }

    pub(crate) fn labels(&self) -> Vec<(u64, NodeId)> {
        self.labels.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    // ---------------------------------------------------------------------
    // Tombstones
    // ---------------------------------------------------------------------

    pub(crate) fn deleted_count(&self) -> usize {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn note_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn note_revived(&self) {
        self.deleted.fetch_sub(1, Ordering::AcqRel);
    }

    // ---------------------------------------------------------------------
    // Entry point
    // ---------------------------------------------------------------------

    pub(crate) fn entry_point(&self) -> Option<EntryPoint> {
        self.entry.load_full().map(|ep| *ep)
    }

    pub(crate) fn set_entry_point(&self, entry: EntryPoint) {
        self.entry.store(Some(Arc::new(entry)));
    }
}
