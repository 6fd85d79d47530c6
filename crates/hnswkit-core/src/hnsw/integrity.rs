//! Structural self-check of the graph.

use super::graph::HnswGraph;
use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Summary produced by a successful integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Allocated slots (live plus tombstoned).
    pub slots: usize,
    /// Tombstoned slots.
    pub tombstoned: usize,
    /// Highest occupied layer.
    pub max_layer: usize,
    /// Total directed links per layer. Each edge counts once per endpoint.
    pub links_per_layer: Vec<usize>,
}

impl HnswGraph {
    /// Walks every slot and link, holding the arena exclusively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on the first structural violation found.
    pub(crate) fn check_integrity(&self) -> Result<IntegrityReport> {
        let arena = self.store.arena.write();
        let allocated = arena.allocated();
        let mut report = IntegrityReport {
            slots: allocated,
            ..IntegrityReport::default()
        };

        for (id, slot) in arena.allocated_slots().iter().enumerate() {
            let level = slot.level();
            let links = slot.links.read();
            if links.len() != level + 1 {
                return Err(Error::Internal(format!(
                    "slot {id} has {} adjacency lists for top layer {level}",
                    links.len()
                )));
            }
            if slot.is_deleted() {
                report.tombstoned += 1;
            }
            if self.store.slot_of(slot.label()) != Some(id) {
                return Err(Error::Internal(format!(
                    "label {} of slot {id} is not bound to it",
                    slot.label()
                )));
            }

            report.max_layer = report.max_layer.max(level);
            if report.links_per_layer.len() <= level {
                report.links_per_layer.resize(level + 1, 0);
            }

            for (layer, neighbors) in links.iter().enumerate() {
                let cap = self.params.cap_for_layer(layer);
                if neighbors.len() > cap {
                    return Err(Error::Internal(format!(
                        "slot {id} has {} links on layer {layer}, cap is {cap}",
                        neighbors.len()
                    )));
                }

                let mut seen = FxHashSet::default();
                for &neighbor in neighbors {
                    if neighbor >= allocated {
                        return Err(Error::Internal(format!(
                            "slot {id} links to unallocated slot {neighbor} on layer {layer}"
                        )));
                    }
                    if neighbor == id {
                        return Err(Error::Internal(format!(
                            "slot {id} links to itself on layer {layer}"
                        )));
                    }
                    if !seen.insert(neighbor) {
                        return Err(Error::Internal(format!(
                            "slot {id} lists {neighbor} twice on layer {layer}"
                        )));
                    }
                    let target = arena.slot(neighbor);
                    if target.level() < layer {
                        return Err(Error::Internal(format!(
                            "slot {id} links to {neighbor} on layer {layer}, above its top layer {}",
                            target.level()
                        )));
                    }
                    if !target.neighbors(layer).contains(&id) {
                        return Err(Error::Internal(format!(
                            "slot {id} links to {neighbor} on layer {layer} but not back"
                        )));
                    }
                }
                report.links_per_layer[layer] += neighbors.len();
            }
        }

        match self.store.entry_point() {
            None if allocated > 0 => {
                return Err(Error::Internal(format!(
                    "{allocated} slots but no entry point"
                )));
            }
            Some(ep) if ep.slot >= allocated || ep.level != report.max_layer => {
                return Err(Error::Internal(format!(
                    "entry point {} on layer {} does not sit on the highest layer {}",
                    ep.slot, ep.level, report.max_layer
                )));
            }
            _ => {}
        }

        Ok(report)
    }
}
