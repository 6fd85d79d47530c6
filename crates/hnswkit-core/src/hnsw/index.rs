//! HNSW index: the public entry point.
//!
//! [`HnswIndex`] wraps one proximity graph and exposes batched insertion and
//! search, tombstoning, capacity management and persistence.
//!
//! # Recommended Parameters by Vector Dimension
//!
//! | Dimension     | M     | ef_construction | ef (search) |
//! |---------------|-------|-----------------|-------------|
//! | d ≤ 256       | 12-16 | 100-200         | 64-128      |
//! | 256 < d ≤ 768 | 16-24 | 200-400         | 128-256     |
//! | d > 768       | 24-32 | 300-600         | 256-512     |

use super::graph::HnswGraph;
use super::integrity::IntegrityReport;
use super::params::{HnswParams, SearchQuality, DEFAULT_EF};
use super::search::SearchResult;
use crate::config::HnswKitConfig;
use crate::distance::{validate_vector, DistanceMetric};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Approximate nearest-neighbor index over fixed-dimension `f32` vectors.
///
/// All methods take `&self`; inserts, searches and deletions may run
/// concurrently from any number of threads.
///
/// # Example
///
/// ```rust
/// use hnswkit_core::{DistanceMetric, HnswIndex, HnswParams};
///
/// let index = HnswIndex::with_params(4, DistanceMetric::L2, HnswParams::custom(16, 200, 100))?;
/// index.insert(1, &[0.0, 0.0, 0.0, 0.0])?;
/// index.insert(2, &[1.0, 0.0, 0.0, 0.0])?;
///
/// let hits = index.search_with_ef(&[0.0, 0.0, 0.0, 0.0], 1, 10)?;
/// assert_eq!(hits[0].label, 1);
/// # Ok::<(), hnswkit_core::Error>(())
/// ```
pub struct HnswIndex {
    graph: HnswGraph,
    /// Default query-time beam width.
    ef: AtomicUsize,
    /// Default fan-out for batch calls (0 = rayon global pool).
    concurrency: AtomicUsize,
}

impl HnswIndex {
    /// Creates an index with default parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `dimension` is 0.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::with_params(dimension, metric, HnswParams::default())
    }

    /// Creates an index with custom parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `dimension` is 0 or `params` are out of
    /// range.
    pub fn with_params(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        check_shape(dimension, &params)?;

        info!(
            dimension,
            %metric,
            m = params.max_connections,
            ef_construction = params.ef_construction,
            max_elements = params.max_elements,
            allow_replace_deleted = params.allow_replace_deleted,
            "created HNSW index"
        );
        Ok(Self::from_graph(HnswGraph::new(dimension, metric, params)))
    }

    /// Creates an index from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn from_config(config: &HnswKitConfig) -> Result<Self> {
        config.validate()?;

        let mut index = Self::with_params(
            config.index.dimension,
            config.index.metric,
            config.index_params(),
        )?;
        index.set_ef(config.search.ef)?;
        index.set_concurrency(config.search.concurrency);
        index.set_resize_timeout(config.runtime.resize_timeout());
        Ok(index)
    }

    fn from_graph(graph: HnswGraph) -> Self {
        Self {
            graph,
            ef: AtomicUsize::new(DEFAULT_EF),
            concurrency: AtomicUsize::new(0),
        }
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts one point, updating it in place if `label` already exists.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] / [`Error::Config`] for invalid vectors
    /// - [`Error::Capacity`] when the index is full
    pub fn insert(&self, label: u64, vector: &[f32]) -> Result<()> {
        self.upsert(label, vector, false)
    }

    /// Inserts or updates one point.
    ///
    /// With `replace_deleted`, a new label may take over a tombstoned slot
    /// instead of consuming fresh capacity. This requires an index created
    /// with `allow_replace_deleted`.
    ///
    /// # Errors
    ///
    /// Same as [`HnswIndex::insert`], plus [`Error::Config`] when
    /// `replace_deleted` is not allowed on this index.
    pub fn upsert(&self, label: u64, vector: &[f32], replace_deleted: bool) -> Result<()> {
        self.graph.upsert(label, vector, replace_deleted).map(|_| ())
    }

    /// Inserts a batch of points, pairing `vectors[i]` with `labels[i]`.
    ///
    /// Every vector is validated before anything is written. If an item fails
    /// afterwards, remaining items are abandoned and the error reports the
    /// smallest failing position; points inserted before that stay.
    ///
    /// `concurrency`: `0` uses the global rayon pool, `1` runs on the calling
    /// thread, `n > 1` uses a dedicated pool of `n` threads.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for an empty batch, mismatched lengths or a
    ///   disallowed `replace_deleted`
    /// - [`Error::Batch`] wrapping the first failing item's error
    pub fn add_points(
        &self,
        vectors: &[Vec<f32>],
        labels: &[u64],
        concurrency: usize,
        replace_deleted: bool,
    ) -> Result<()> {
        if vectors.is_empty() {
            return Err(Error::Config("empty batch".to_string()));
        }
        if vectors.len() != labels.len() {
            return Err(Error::Config(format!(
                "{} vectors but {} labels",
                vectors.len(),
                labels.len()
            )));
        }
        if replace_deleted && !self.allow_replace_deleted() {
            return Err(Error::Config(
                "replace_deleted requires an index created with allow_replace_deleted".to_string(),
            ));
        }
        for (index, vector) in vectors.iter().enumerate() {
            validate_vector(vector, self.dimension()).map_err(|e| e.in_batch(index))?;
        }

        run_batch(vectors.len(), concurrency, |i| {
            self.graph
                .upsert(labels[i], &vectors[i], replace_deleted)
                .map(|_| ())
        })?;

        debug!(count = vectors.len(), concurrency, "batch insert complete");
        Ok(())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Finds the `k` nearest live points using the index default `ef`
    /// (raised to `k` when smaller).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for `k == 0` or an invalid query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, k, None, |_| true)
    }

    /// Finds the `k` nearest live points with an explicit beam width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for `k == 0`, `ef < k` or an invalid query.
    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, k, Some(ef), |_| true)
    }

    /// Finds the `k` nearest live points with a quality profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for `k == 0` or an invalid query.
    pub fn search_with_quality(
        &self,
        query: &[f32],
        k: usize,
        quality: SearchQuality,
    ) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, k, Some(quality.ef_search(k)), |_| true)
    }

    /// Finds the `k` nearest live points whose label passes `filter`.
    ///
    /// The graph is traversed through every point; `filter` only restricts
    /// what is returned. Very selective filters need a larger `ef`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for `k == 0`, `ef < k` or an invalid query.
    pub fn search_filtered<F>(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: F,
    ) -> Result<Vec<SearchResult>>
    where
        F: Fn(u64) -> bool,
    {
        let ef = self.resolve_ef(k, ef)?;
        let query = self.graph.prepare(query)?;
        Ok(self.graph.knn(&query, k, ef, filter))
    }

    /// Runs one k-NN query per entry of `queries`.
    ///
    /// Queries are validated up front; results come back in query order.
    /// `concurrency` has the same meaning as in [`HnswIndex::add_points`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for `k == 0` or `ef < k`
    /// - [`Error::Batch`] naming the first invalid query
    pub fn search_batch(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        ef: Option<usize>,
        concurrency: usize,
    ) -> Result<Vec<Vec<SearchResult>>> {
        let ef = self.resolve_ef(k, ef)?;
        let prepared = queries
            .iter()
            .enumerate()
            .map(|(i, q)| self.graph.prepare(q).map_err(|e| e.in_batch(i)))
            .collect::<Result<Vec<_>>>()?;

        run_batch(prepared.len(), concurrency, |i| {
            Ok(self.graph.knn(&prepared[i], k, ef, |_| true))
        })
    }

    fn resolve_ef(&self, k: usize, ef: Option<usize>) -> Result<usize> {
        if k == 0 {
            return Err(Error::Config("k must be >= 1".to_string()));
        }
        match ef {
            Some(ef) if ef < k => Err(Error::Config(format!(
                "ef ({ef}) must be >= k ({k})"
            ))),
            Some(ef) => Ok(ef),
            None => Ok(self.ef().max(k)),
        }
    }

    /// Sets the default query-time `ef`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `ef` is 0.
    pub fn set_ef(&self, ef: usize) -> Result<()> {
        if ef == 0 {
            return Err(Error::Config("ef must be >= 1".to_string()));
        }
        self.ef.store(ef, Ordering::Relaxed);
        Ok(())
    }

    /// Default query-time `ef`.
    #[must_use]
    pub fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    /// Sets the default batch fan-out reported by [`HnswIndex::concurrency`].
    pub fn set_concurrency(&self, concurrency: usize) {
        self.concurrency.store(concurrency, Ordering::Relaxed);
    }

    /// Default batch fan-out, for callers that do not pick their own.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Tombstones
    // =========================================================================

    /// Excludes `label` from search results. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `label` was never inserted.
    pub fn mark_deleted(&self, label: u64) -> Result<()> {
        self.graph.mark_deleted(label)
    }

    /// Restores a tombstoned `label`. Does nothing for unknown, live or
    /// reused labels.
    pub fn unmark_deleted(&self, label: u64) {
        self.graph.unmark_deleted(label);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Slots in use, including tombstoned points.
    #[must_use]
    pub fn current_count(&self) -> usize {
        self.graph.current_count()
    }

    /// Slot capacity.
    #[must_use]
    pub fn max_elements(&self) -> usize {
        self.graph.capacity()
    }

    /// Number of live (searchable) points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.live_count()
    }

    /// Returns true if no live point exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned points.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.graph.store.deleted_count()
    }

    /// Returns true if `label` is present and not tombstoned.
    #[must_use]
    pub fn contains(&self, label: u64) -> bool {
        let arena = self.graph.store.arena.read();
        self.graph
            .bound_slot(&arena, label)
            .is_some_and(|slot| !arena.slot(slot).is_deleted())
    }

    /// Live labels, ascending.
    #[must_use]
    pub fn labels(&self) -> Vec<u64> {
        let arena = self.graph.store.arena.read();
        let mut labels: Vec<u64> = self
            .graph
            .store
            .labels()
            .into_iter()
            .filter(|&(label, slot)| {
                let node = arena.slot(slot);
                node.label() == label && !node.is_deleted()
            })
            .map(|(label, _)| label)
            .collect();
        labels.sort_unstable();
        labels
    }

    /// Stored vector of a live point. Cosine indexes return the normalized
    /// form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `label` is unknown or tombstoned.
    pub fn get_vector(&self, label: u64) -> Result<Vec<f32>> {
        let arena = self.graph.store.arena.read();
        let slot = self
            .graph
            .bound_slot(&arena, label)
            .ok_or(Error::NotFound(label))?;
        let node = arena.slot(slot);
        if node.is_deleted() {
            return Err(Error::NotFound(label));
        }
        let vector = node.vector().clone();
        Ok(vector)
    }

    /// Whether inserts may take over tombstoned slots.
    #[must_use]
    pub fn allow_replace_deleted(&self) -> bool {
        self.graph.params.allow_replace_deleted
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.graph.dimension()
    }

    /// Distance metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.graph.metric()
    }

    /// Construction parameters, with `max_elements` reporting the current
    /// capacity.
    #[must_use]
    pub fn params(&self) -> HnswParams {
        HnswParams {
            max_elements: self.max_elements(),
            ..self.graph.params
        }
    }

    /// Verifies graph invariants (link ranges, caps, layers, entry point).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] describing the first violation.
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        self.graph.check_integrity()
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    /// Changes capacity. Blocks new operations and waits for in-flight ones
    /// up to the resize timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Capacity`] if `new_max` is below the slots in use
    /// - [`Error::Busy`] if in-flight operations did not drain in time
    pub fn resize(&self, new_max: usize) -> Result<()> {
        self.graph.resize(new_max)
    }

    /// Sets how long [`HnswIndex::resize`] waits for in-flight operations.
    pub fn set_resize_timeout(&mut self, timeout: Duration) {
        self.graph.locks.set_resize_timeout(timeout);
    }

    /// Current resize timeout.
    #[must_use]
    pub fn resize_timeout(&self) -> Duration {
        self.graph.locks.resize_timeout()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes a snapshot to `path`, returning its size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        self.graph.save(path.as_ref())
    }

    /// Loads a snapshot written by [`HnswIndex::save`].
    ///
    /// `dimension` and `metric` must match the snapshot. M and
    /// `ef_construction` are taken from the snapshot; seed, slot reuse and
    /// alpha from `params`. Capacity is at least the stored slot count.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Format`] for corrupt or mismatched data
    pub fn load<P: AsRef<Path>>(
        path: P,
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
    ) -> Result<Self> {
        check_shape(dimension, &params)?;
        HnswGraph::load(path.as_ref(), dimension, metric, params).map(Self::from_graph)
    }

    /// Encodes the index into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a field exceeds its on-disk width.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.graph.to_bytes()
    }

    /// Decodes a snapshot produced by [`HnswIndex::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] for corrupt or mismatched data.
    pub fn from_bytes(
        data: &[u8],
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
    ) -> Result<Self> {
        check_shape(dimension, &params)?;
        HnswGraph::from_bytes(data, dimension, metric, params).map(Self::from_graph)
    }

    /// Size in bytes of a snapshot taken now.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        self.graph.serialized_size()
    }
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension())
            .field("metric", &self.metric())
            .field("params", &self.graph.params)
            .field("current_count", &self.current_count())
            .field("deleted", &self.deleted_count())
            .field("ef", &self.ef())
            .finish()
    }
}

fn check_shape(dimension: usize, params: &HnswParams) -> Result<()> {
    if dimension == 0 {
        return Err(Error::Config("dimension must be >= 1".to_string()));
    }
    if dimension > u32::MAX as usize {
        return Err(Error::Config(format!(
            "dimension {dimension} exceeds the 32-bit range"
        )));
    }
    params.validate()
}

/// Runs `op` for every index in `0..len`, stopping early on failure.
///
/// Returns outputs in index order, or the failure with the smallest index.
/// Every item before that index has run; items after it may have run too
/// when the batch fans out.
fn run_batch<T, F>(len: usize, concurrency: usize, op: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        if concurrency != 1 && len > 1 {
            return run_batch_parallel(len, concurrency, op);
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = concurrency;

    (0..len)
        .map(|i| op(i).map_err(|e| e.in_batch(i)))
        .collect()
}

#[cfg(feature = "parallel")]
fn run_batch_parallel<T, F>(len: usize, concurrency: usize, op: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    use parking_lot::Mutex;
    use rayon::prelude::*;

    // Smallest failing index so far; only items past it are skipped
    let first_failure = AtomicUsize::new(usize::MAX);
    let failure: Mutex<Option<(usize, Error)>> = Mutex::new(None);

    let work = || -> Vec<Option<T>> {
        (0..len)
            .into_par_iter()
            .map(|i| {
                if i > first_failure.load(Ordering::Acquire) {
                    return None;
                }
                match op(i) {
                    Ok(output) => Some(output),
                    Err(err) => {
                        first_failure.fetch_min(i, Ordering::AcqRel);
                        let mut slot = failure.lock();
                        if slot.as_ref().map_or(true, |(first, _)| i < *first) {
                            *slot = Some((i, err));
                        }
                        None
                    }
                }
            })
            .collect()
    };

    let outputs = if concurrency == 0 {
        work()
    } else {
        rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build thread pool: {e}")))?
            .install(work)
    };

    if let Some((index, err)) = failure.into_inner() {
        return Err(err.in_batch(index));
    }
    Ok(outputs.into_iter().flatten().collect())
}
