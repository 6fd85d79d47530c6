//! HNSW construction parameters and search quality profiles.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default query-time `ef` for a freshly built or loaded index.
pub const DEFAULT_EF: usize = 10;

/// HNSW construction parameters.
///
/// Dimension and metric are passed separately to the index constructor so the
/// same parameter set can be reused across collections of different shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Number of bi-directional links per node on upper layers (M).
    /// Layer 0 allows `2 * M`.
    pub max_connections: usize,
    /// Beam width while linking new points.
    pub ef_construction: usize,
    /// Slot capacity (live plus tombstoned points).
    pub max_elements: usize,
    /// Seed for the layer generator.
    pub random_seed: u64,
    /// Lets inserts overwrite tombstoned slots.
    pub allow_replace_deleted: bool,
    /// Diversity factor for neighbor selection; 1.0 is the classic heuristic.
    pub alpha: f32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            max_elements: 10_000,
            random_seed: 100,
            allow_replace_deleted: false,
            alpha: 1.0,
        }
    }
}

impl HnswParams {
    /// Creates custom parameters with the default seed and slot reuse off.
    #[must_use]
    pub fn custom(max_connections: usize, ef_construction: usize, max_elements: usize) -> Self {
        Self {
            max_connections,
            ef_construction,
            max_elements,
            ..Self::default()
        }
    }

    /// Sets the layer generator seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Enables or disables tombstoned slot reuse.
    #[must_use]
    pub fn with_slot_reuse(mut self, allow: bool) -> Self {
        self.allow_replace_deleted = allow;
        self
    }

    /// Sets the neighbor diversity factor.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections < 2 {
            return Err(Error::Config(format!(
                "max_connections must be >= 2, got {}",
                self.max_connections
            )));
        }
        if self.ef_construction == 0 {
            return Err(Error::Config("ef_construction must be >= 1".to_string()));
        }
        if self.max_elements > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max_elements {} exceeds the 32-bit slot space",
                self.max_elements
            )));
        }
        if !(self.alpha >= 1.0 && self.alpha.is_finite()) {
            return Err(Error::Config(format!(
                "alpha must be a finite value >= 1.0, got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    /// Neighbor cap on upper layers.
    #[must_use]
    pub const fn max_connections_upper(&self) -> usize {
        self.max_connections
    }

    /// Neighbor cap on layer 0.
    #[must_use]
    pub const fn max_connections_base(&self) -> usize {
        self.max_connections * 2
    }

    /// Neighbor cap for `layer`.
    #[must_use]
    pub const fn cap_for_layer(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_connections_base()
        } else {
            self.max_connections_upper()
        }
    }

    /// `ef_construction`, never below M.
    #[must_use]
    pub fn effective_ef_construction(&self) -> usize {
        self.ef_construction.max(self.max_connections)
    }

    /// Level normalization constant `1 / ln(M)`.
    #[must_use]
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.max_connections as f64).ln()
    }
}

/// Search quality profile controlling the recall/latency tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchQuality {
    /// `ef = max(32, 2k)`.
    Fast,
    /// `ef = max(64, 4k)`.
    #[default]
    Balanced,
    /// `ef = max(128, 8k)`.
    Accurate,
    /// `ef = max(512, 32k)`.
    HighRecall,
    /// Explicit `ef`, raised to `k` when smaller.
    Custom(usize),
}

impl SearchQuality {
    /// Returns the `ef` value for this profile at the given `k`.
    #[must_use]
    pub fn ef_search(&self, k: usize) -> usize {
        match self {
            Self::Fast => 32.max(k * 2),
            Self::Balanced => 64.max(k * 4),
            Self::Accurate => 128.max(k * 8),
            Self::HighRecall => 512.max(k * 32),
            Self::Custom(ef) => (*ef).max(k),
        }
    }
}
