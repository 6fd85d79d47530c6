//! # `hnswkit` Core
//!
//! Approximate nearest-neighbor search over dense `f32` vectors, built on a
//! hierarchical navigable small world (HNSW) proximity graph.
//!
//! ## Features
//!
//! - **3 Distance Metrics**: squared L2, inner product, cosine
//! - **Concurrent**: inserts, searches and deletions from any number of threads
//! - **Tombstones**: soft deletion with optional slot reuse
//! - **Snapshots**: single-blob little-endian binary format
//! - **SIMD**: portable 8-lane distance kernels via `wide`
//!
//! ## Quick Start
//!
//! ```rust
//! use hnswkit_core::{DistanceMetric, HnswIndex, HnswParams};
//!
//! let params = HnswParams::custom(16, 200, 1_000);
//! let index = HnswIndex::with_params(4, DistanceMetric::L2, params)?;
//!
//! index.add_points(
//!     &[vec![0.0, 0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
//!     &[1, 2, 3],
//!     1,
//!     false,
//! )?;
//!
//! let hits = index.search_with_ef(&[0.0, 0.0, 0.0, 0.0], 1, 10)?;
//! assert_eq!(hits[0].label, 1);
//! assert_eq!(hits[0].distance, 0.0);
//! # Ok::<(), hnswkit_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // Acceptable for f32/f64 conversions
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod distance;
pub mod error;
pub mod hnsw;
pub mod simd;

pub use config::{ConfigError, HnswKitConfig, IndexConfig, RuntimeConfig, SearchConfig};
pub use distance::DistanceMetric;
pub use error::{Error, ErrorKind, Result};
pub use hnsw::{HnswIndex, HnswParams, IntegrityReport, SearchQuality, SearchResult};
