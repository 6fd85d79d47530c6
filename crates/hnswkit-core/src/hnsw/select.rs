//! Diversity-aware neighbor selection.
//!
//! Naive top-M linking lets dense clusters absorb all of a point's links and
//! turns the graph into mutually redundant hubs. The heuristic accepts a
//! candidate only when it is closer to the reference point than to every
//! neighbor accepted so far, then backfills with the closest rejected
//! candidates so a point never ends up with fewer links than it could have.
//!
//! With `alpha > 1.0` the test becomes `alpha * d(c, ref) < d(c, s)`, which
//! favors spread-out neighbors (the DiskANN/Vamana relaxation).

use super::candidate::Candidate;
use super::store::NodeId;

/// Neighbor selection heuristic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NeighborSelector {
    alpha: f32,
}

impl NeighborSelector {
    pub(crate) const fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    /// Picks up to `max` neighbors among `candidates`.
    ///
    /// `candidates` carry their distance to the reference point, in any
    /// order. `distance_between(a, b)` returns the distance between two
    /// candidate slots. Candidate sets no larger than `max` are returned
    /// whole, closest first.
    pub(crate) fn select<F>(
        &self,
        candidates: &[Candidate],
        max: usize,
        mut distance_between: F,
    ) -> Vec<NodeId>
    where
        F: FnMut(NodeId, NodeId) -> f32,
    {
        if max == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let mut sorted = candidates.to_vec();
        sorted.sort();
        sorted.dedup_by(|a, b| a.slot == b.slot);

        if sorted.len() <= max {
            return sorted.into_iter().map(|c| c.slot).collect();
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(max);
        let mut rejected: Vec<Candidate> = Vec::new();

        for candidate in sorted {
            if selected.len() >= max {
                break;
            }
            let diverse = selected.iter().all(|kept| {
                self.alpha * candidate.distance < distance_between(candidate.slot, kept.slot)
            });
            if diverse {
                selected.push(candidate);
            } else {
                rejected.push(candidate);
            }
        }

        // Backfill from rejects, closest first
        let missing = max.saturating_sub(selected.len());
        selected.extend(rejected.into_iter().take(missing));

        selected.into_iter().map(|c| c.slot).collect()
    }
}
