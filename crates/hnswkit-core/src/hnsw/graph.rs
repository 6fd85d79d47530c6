//! HNSW graph: storage, construction parameters and lock state of one index.
//!
//! Implements the hierarchical navigable small world graph described in
//! Malkov & Yashunin (2016). The search, insertion and deletion paths live in
//! sibling modules as further `impl HnswGraph` blocks.

use super::level::LevelGenerator;
use super::locks::ConcurrencyController;
use super::params::HnswParams;
use super::select::NeighborSelector;
use super::store::GraphStore;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Default time a resize waits for in-flight operations to drain.
pub const DEFAULT_RESIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Graph state plus the machinery that mutates it.
#[derive(Debug)]
pub(crate) struct HnswGraph {
    pub(crate) store: GraphStore,
    pub(crate) params: HnswParams,
    pub(super) levels: LevelGenerator,
    pub(super) selector: NeighborSelector,
    pub(crate) locks: ConcurrencyController,
}

impl HnswGraph {
    /// Creates an empty graph with `params.max_elements` preallocated slots.
    pub(crate) fn new(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        Self::from_store(
            GraphStore::new(dimension, metric, params.max_elements),
            params,
        )
    }

    /// Wraps an existing store (fresh or decoded).
    pub(crate) fn from_store(store: GraphStore, params: HnswParams) -> Self {
        Self {
            store,
            levels: LevelGenerator::new(params.random_seed, params.level_multiplier()),
            selector: NeighborSelector::new(params.alpha),
            locks: ConcurrencyController::new(DEFAULT_RESIZE_TIMEOUT),
            params,
        }
    }

    pub(crate) fn dimension(&self) -> usize {
        self.store.dimension
    }

    pub(crate) fn metric(&self) -> DistanceMetric {
        self.store.metric
    }

    /// Validates and normalizes an incoming vector for this graph's metric.
    pub(crate) fn prepare(&self, vector: &[f32]) -> Result<Vec<f32>> {
        self.store.metric.prepare(vector, self.store.dimension)
    }

    /// Slots in use, live plus tombstoned.
    pub(crate) fn current_count(&self) -> usize {
        self.store.arena.read().allocated()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.store.arena.read().capacity()
    }

    /// Live (non-tombstoned) points.
    pub(crate) fn live_count(&self) -> usize {
        self.current_count()
            .saturating_sub(self.store.deleted_count())
    }

    /// Changes slot capacity.
    ///
    /// Waits up to the configured resize timeout for in-flight operations to
    /// release the arena.
    pub(crate) fn resize(&self, new_max: usize) -> Result<()> {
        if new_max > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max_elements {new_max} exceeds the 32-bit slot space"
            )));
        }

        let timeout = self.locks.resize_timeout();
        let Some(mut arena) = self.store.arena.try_write_for(timeout) else {
            warn!(new_max, ?timeout, "resize timed out waiting for in-flight operations");
            return Err(Error::Busy(format!(
                "resize to {new_max} could not acquire the index within {timeout:?}"
            )));
        };

        let old_capacity = arena.capacity();
        arena.resize(new_max)?;
        info!(old_capacity, new_capacity = new_max, "resized index");
        Ok(())
    }
}
