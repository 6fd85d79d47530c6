//! Distance metrics for the proximity graph.
//!
//! Lower is always closer. The inner-product metrics use `1 - <a, b>` so that
//! a unit vector sits at distance 0 from itself and ranking matches plain
//! negative inner product.

use crate::error::{Error, Result};
use crate::simd;
use serde::{Deserialize, Serialize};

/// Distance metric selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    L2,
    /// Inner product, reported as `1 - <a, b>`.
    #[serde(rename = "ip")]
    InnerProduct,
    /// Cosine distance. Vectors are normalized on ingestion, so distance is
    /// `1 - <a, b>` over stored unit vectors.
    Cosine,
}

impl DistanceMetric {
    /// Computes the distance between two stored (already prepared) vectors.
    ///
    /// # Panics
    ///
    /// Panics if vectors have different dimensions.
    #[must_use]
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => simd::squared_l2(a, b),
            Self::InnerProduct | Self::Cosine => 1.0 - simd::dot_product(a, b),
        }
    }

    /// Returns true when ingested vectors are normalized before storage.
    #[must_use]
    pub const fn normalizes(&self) -> bool {
        matches!(self, Self::Cosine)
    }

    /// Validates `vector` against `dimension` and returns the form the graph
    /// stores and compares against.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the length differs from `dimension`
    /// - [`Error::Config`] if any component is NaN or infinite
    pub fn prepare(&self, vector: &[f32], dimension: usize) -> Result<Vec<f32>> {
        validate_vector(vector, dimension)?;
        let mut prepared = vector.to_vec();
        if self.normalizes() {
            simd::normalize_in_place(&mut prepared);
        }
        Ok(prepared)
    }

    /// Stable on-disk identifier.
    #[must_use]
    pub const fn id(&self) -> u8 {
        match self {
            Self::L2 => 0,
            Self::InnerProduct => 1,
            Self::Cosine => 2,
        }
    }

    /// Inverse of [`DistanceMetric::id`].
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::L2),
            1 => Some(Self::InnerProduct),
            2 => Some(Self::Cosine),
            _ => None,
        }
    }
}

/// Checks length and finiteness of an incoming vector.
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] if the length differs from `dimension`
/// - [`Error::Config`] if any component is NaN or infinite
pub fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(Error::Config(format!(
            "vector component {pos} is not finite"
        )));
    }
    Ok(())
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "ip" | "inner_product" | "dot" => Ok(Self::InnerProduct),
            "cosine" => Ok(Self::Cosine),
            other => Err(Error::Config(format!("unknown metric '{other}'"))),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::L2 => "l2",
            Self::InnerProduct => "ip",
            Self::Cosine => "cosine",
        })
    }
}
