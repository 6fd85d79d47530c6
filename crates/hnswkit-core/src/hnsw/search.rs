//! Layered beam search.
//!
//! Upper layers are crossed with a greedy single-path descent; layer 0 (and
//! every layer during construction) runs a bounded beam search of width `ef`.

use super::candidate::Candidate;
use super::graph::HnswGraph;
use super::store::{NodeId, SlotArena};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One hit of a k-NN query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// External label of the point.
    pub label: u64,
    /// Distance to the query under the index metric (smaller is closer).
    pub distance: f32,
}

impl SearchResult {
    /// Creates a new search result.
    #[must_use]
    pub const fn new(label: u64, distance: f32) -> Self {
        Self { label, distance }
    }
}

impl HnswGraph {
    /// Greedy descent from `start` through layers `start_level` down to
    /// `target_level + 1`, always moving to the strictly closer neighbor.
    pub(super) fn greedy_descent(
        &self,
        arena: &SlotArena,
        query: &[f32],
        start: Candidate,
        start_level: usize,
        target_level: usize,
    ) -> Candidate {
        let mut best = start;

        for layer in (target_level + 1..=start_level).rev() {
            loop {
                let mut improved = false;
                for neighbor in arena.slot(best.slot).neighbors(layer) {
                    let distance = self.store.distance_to(arena, query, neighbor);
                    if distance < best.distance {
                        best = Candidate::new(distance, neighbor);
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        best
    }

    /// Beam search of width `ef` on one layer.
    ///
    /// Only slots passing `accept` enter the result set; every visited slot
    /// may still be expanded. With a restrictive predicate the loop keeps
    /// going until `ef` accepted slots are held or the frontier runs dry.
    ///
    /// Returns accepted candidates sorted closest first.
    pub(super) fn search_layer<F>(
        &self,
        arena: &SlotArena,
        query: &[f32],
        entries: &[Candidate],
        ef: usize,
        layer: usize,
        accept: F,
    ) -> Vec<Candidate>
    where
        F: Fn(NodeId) -> bool,
    {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef + 1);

        for &entry in entries {
            if !visited.insert(entry.slot) {
                continue;
            }
            frontier.push(Reverse(entry));
            if accept(entry.slot) {
                results.push(entry);
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(Reverse(current)) = frontier.pop() {
            let worst = results.peek().map_or(f32::MAX, |c| c.distance);
            if current.distance > worst && results.len() >= ef {
                break;
            }

            for neighbor in arena.slot(current.slot).neighbors(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let distance = self.store.distance_to(arena, query, neighbor);
                let worst = results.peek().map_or(f32::MAX, |c| c.distance);
                if results.len() < ef || distance < worst {
                    let candidate = Candidate::new(distance, neighbor);
                    frontier.push(Reverse(candidate));
                    if accept(neighbor) {
                        results.push(candidate);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// k-NN over live points whose label passes `filter`.
    ///
    /// `query` must already be prepared for the metric. `ef` is the beam
    /// width at layer 0 and is raised to `k` when smaller.
    pub(crate) fn knn<F>(&self, query: &[f32], k: usize, ef: usize, filter: F) -> Vec<SearchResult>
    where
        F: Fn(u64) -> bool,
    {
        let arena = self.store.arena.read();
        let Some(entry) = self.store.entry_point() else {
            return Vec::new();
        };

        let start = Candidate::new(
            self.store.distance_to(&arena, query, entry.slot),
            entry.slot,
        );
        let nearest = self.greedy_descent(&arena, query, start, entry.level, 0);

        let accept = |slot: NodeId| {
            let node = arena.slot(slot);
            !node.is_deleted() && filter(node.label())
        };
        let found = self.search_layer(&arena, query, &[nearest], ef.max(k), 0, accept);

        found
            .into_iter()
            .take(k)
            .map(|c| SearchResult::new(arena.slot(c.slot).label(), c.distance))
            .collect()
    }
}
