//! Scored slot used by the search heaps.
//!
//! Ordering is IEEE 754 total order on the distance (`f32::total_cmp`), then
//! slot index, so heaps stay consistent even with NaN and ties resolve the
//! same way on every run.

use super::store::NodeId;
use std::cmp::Ordering;

/// A slot paired with its distance to the current query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub slot: NodeId,
}

impl Candidate {
    pub(crate) const fn new(distance: f32, slot: NodeId) -> Self {
        Self { distance, slot }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}
