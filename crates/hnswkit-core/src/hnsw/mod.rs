//! HNSW (Hierarchical Navigable Small World) index implementation.
//!
//! # Module Organization
//!
//! - `params`: Construction parameters and search quality profiles
//! - `store`: Slot arena, label map, free-slot registry, entry point
//! - `locks`: Lock acquisition order and striped label locks
//! - `level`: Seeded top-layer generator
//! - `select`: Diversity-aware neighbor selection
//! - `candidate`: Heap ordering of (distance, slot) pairs
//! - `search`: Greedy descent and layer beam search
//! - `insert`, `delete`: Mutation paths
//! - `persistence`: Binary snapshot codec
//! - `integrity`: Structural self-check
//! - `index`: Public `HnswIndex` facade
//!
//! # References
//!
//! - Paper: "Efficient and robust approximate nearest neighbor search
//!   using Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016)
//! - arXiv: <https://arxiv.org/abs/1603.09320>

// ============================================================================
// Core modules
// ============================================================================
mod candidate;
mod delete;
mod graph;
mod index;
mod insert;
mod integrity;
mod level;
mod locks;
mod params;
mod persistence;
mod search;
mod select;
mod store;

#[cfg(test)]
mod index_tests;

// ============================================================================
// Public API
// ============================================================================
pub use graph::DEFAULT_RESIZE_TIMEOUT;
pub use index::HnswIndex;
pub use integrity::IntegrityReport;
pub use params::{HnswParams, SearchQuality, DEFAULT_EF};
pub use search::SearchResult;
pub use store::NodeId;
