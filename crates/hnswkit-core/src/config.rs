//! `hnswkit` Configuration Module
//!
//! Provides configuration file support via `hnswkit.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (fields assigned after loading)
//! 2. Environment variables (`HNSWKIT_*`, sections separated by `__`,
//!    e.g. `HNSWKIT_INDEX__MAX_ELEMENTS=50000`)
//! 3. Configuration file (`hnswkit.toml`)
//! 4. Default values

use crate::distance::DistanceMetric;
use crate::hnsw::{HnswParams, DEFAULT_EF};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },

    /// Explicitly requested configuration file is missing.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Index construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Vector dimension.
    pub dimension: usize,
    /// Distance metric (`l2`, `ip`, `cosine`).
    pub metric: DistanceMetric,
    /// Slot capacity.
    pub max_elements: usize,
    /// Links per node on upper layers (M).
    pub m: usize,
    /// Beam width while linking.
    pub ef_construction: usize,
    /// Layer generator seed.
    pub random_seed: u64,
    /// Lets inserts take over tombstoned slots.
    pub allow_replace_deleted: bool,
    /// Neighbor diversity factor.
    pub alpha: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let params = HnswParams::default();
        Self {
            dimension: 128,
            metric: DistanceMetric::L2,
            max_elements: params.max_elements,
            m: params.max_connections,
            ef_construction: params.ef_construction,
            random_seed: params.random_seed,
            allow_replace_deleted: params.allow_replace_deleted,
            alpha: params.alpha,
        }
    }
}

/// Query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default query-time beam width.
    pub ef: usize,
    /// Default batch fan-out (0 = rayon global pool, 1 = inline).
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ef: DEFAULT_EF,
            concurrency: 0,
        }
    }
}

/// Lock and timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long a resize waits for in-flight operations, in milliseconds.
    pub resize_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            resize_timeout_ms: 5_000,
        }
    }
}

impl RuntimeConfig {
    /// Resize timeout as a [`Duration`].
    #[must_use]
    pub fn resize_timeout(&self) -> Duration {
        Duration::from_millis(self.resize_timeout_ms)
    }
}

/// Main `hnswkit` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HnswKitConfig {
    /// Index construction configuration.
    pub index: IndexConfig,
    /// Search configuration.
    pub search: SearchConfig,
    /// Runtime configuration.
    pub runtime: RuntimeConfig,
}

impl HnswKitConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < `hnswkit.toml` (if present) < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file("hnswkit.toml"))
                .merge(Self::env()),
        )
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(path))
                .merge(Self::env()),
        )
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::string(toml_str)),
        )
    }

    fn env() -> Env {
        Env::prefixed("HNSWKIT_").split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = &self.index;

        if index.dimension == 0 {
            return Err(invalid("index.dimension", "value must be >= 1".to_string()));
        }
        if index.m < 2 {
            return Err(invalid(
                "index.m",
                format!("value {} must be >= 2", index.m),
            ));
        }
        if index.ef_construction == 0 {
            return Err(invalid(
                "index.ef_construction",
                "value must be >= 1".to_string(),
            ));
        }
        if index.max_elements > u32::MAX as usize {
            return Err(invalid(
                "index.max_elements",
                format!("value {} exceeds {}", index.max_elements, u32::MAX),
            ));
        }
        if !(index.alpha >= 1.0 && index.alpha.is_finite()) {
            return Err(invalid(
                "index.alpha",
                format!("value {} must be a finite number >= 1.0", index.alpha),
            ));
        }
        if self.search.ef == 0 {
            return Err(invalid("search.ef", "value must be >= 1".to_string()));
        }

        Ok(())
    }

    /// Construction parameters described by the `[index]` section.
    #[must_use]
    pub fn index_params(&self) -> HnswParams {
        HnswParams {
            max_connections: self.index.m,
            ef_construction: self.index.ef_construction,
            max_elements: self.index.max_elements,
            random_seed: self.index.random_seed,
            allow_replace_deleted: self.index.allow_replace_deleted,
            alpha: self.index.alpha,
        }
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}
