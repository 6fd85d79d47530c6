//! Error types for `hnswkit`.
//!
//! Every fallible operation returns [`Error`]. Variants carry a stable code
//! (`HNSW-XXX`) so bindings can map them without parsing messages.

use thiserror::Error;

/// Result type alias for `hnswkit` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, independent of the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad construction or query parameters.
    Config,
    /// No free slot left.
    Capacity,
    /// Corrupt or mismatched persisted data.
    Format,
    /// Exclusive operation contended with in-flight work.
    Busy,
    /// Unknown label.
    NotFound,
    /// Underlying IO failure.
    Io,
    /// Broken internal invariant.
    Internal,
}

/// Errors that can occur in `hnswkit` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter (HNSW-001).
    #[error("[HNSW-001] Configuration error: {0}")]
    Config(String),

    /// Vector length does not match the index dimension (HNSW-002).
    #[error("[HNSW-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Index dimension.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// Index is full (HNSW-003).
    #[error("[HNSW-003] Capacity exceeded: requested {requested}, capacity {capacity}")]
    Capacity {
        /// Slot count the operation needed.
        requested: usize,
        /// Current capacity.
        capacity: usize,
    },

    /// Persisted data is corrupt or belongs to another index shape (HNSW-004).
    #[error("[HNSW-004] Format error: {0}")]
    Format(String),

    /// Exclusive operation could not pause in-flight work (HNSW-005).
    #[error("[HNSW-005] Index busy: {0}")]
    Busy(String),

    /// Label not present in the index (HNSW-006).
    #[error("[HNSW-006] Label '{0}' not found")]
    NotFound(u64),

    /// IO error (HNSW-007).
    #[error("[HNSW-007] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch item failed; earlier items stay committed (HNSW-008).
    #[error("[HNSW-008] Batch aborted at item {index}: {source}")]
    Batch {
        /// Position of the first failing item.
        index: usize,
        /// Failure of that item.
        #[source]
        source: Box<Error>,
    },

    /// Internal error (HNSW-009).
    ///
    /// Indicates a broken graph invariant. Please report if encountered.
    #[error("[HNSW-009] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "HNSW-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "HNSW-001",
            Self::DimensionMismatch { .. } => "HNSW-002",
            Self::Capacity { .. } => "HNSW-003",
            Self::Format(_) => "HNSW-004",
            Self::Busy(_) => "HNSW-005",
            Self::NotFound(_) => "HNSW-006",
            Self::Io(_) => "HNSW-007",
            Self::Batch { .. } => "HNSW-008",
            Self::Internal(_) => "HNSW-009",
        }
    }

    /// Returns the category of this error. Batch errors report the kind of
    /// the item that failed.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::DimensionMismatch { .. } => ErrorKind::Config,
            Self::Capacity { .. } => ErrorKind::Capacity,
            Self::Format(_) => ErrorKind::Format,
            Self::Busy(_) => ErrorKind::Busy,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Batch { source, .. } => source.kind(),
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// Corrupt snapshots and internal errors are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Format | ErrorKind::Internal)
    }

    pub(crate) fn in_batch(self, index: usize) -> Self {
        Self::Batch {
            index,
            source: Box::new(self),
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
