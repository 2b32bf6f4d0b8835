//! Error types for index construction and KNN joins.
//!
//! Only structural problems are errors. A query that runs out of ring or time
//! budget is reported through [`SearchState::Exhausted`](crate::SearchState)
//! on its own result, and an empty candidate set produces vacuously saturated
//! results rather than a failure.

use crate::types::PointId;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KnnError>;

#[derive(Debug, Error)]
pub enum KnnError {
    /// A point carried NaN/infinite or out-of-range coordinates.
    ///
    /// Rejected at ingestion; the rest of the batch is unaffected.
    #[error("invalid coordinate for point {id}: {reason}")]
    InvalidCoordinate { id: PointId, reason: String },

    /// `k` must be at least 1.
    #[error("k must be a positive integer, got {0}")]
    InvalidK(usize),

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KnnError {
    fn from(err: serde_json::Error) -> Self {
        KnnError::Serialization(err.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for KnnError {
    fn from(err: toml::de::Error) -> Self {
        KnnError::Serialization(err.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::ser::Error> for KnnError {
    fn from(err: toml::ser::Error) -> Self {
        KnnError::Serialization(err.to_string())
    }
}
