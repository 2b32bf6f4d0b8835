//! Exact K-nearest-neighbor spatial joins by verified ring expansion.
//!
//! Candidate points are bucketed into cells once; each query point then walks
//! outward ring by ring until the distance to every unexplored cell provably
//! exceeds its K-th neighbor, or a ring/time budget runs out and the result is
//! flagged as exhausted.
//!
//! ```rust
//! use spatio_knn::prelude::*;
//!
//! let hydrants = CoordinateStore::try_new(vec![
//!     Point::new(1, -73.9857, 40.7484),
//!     Point::new(2, -73.9851, 40.7480),
//!     Point::new(3, -73.9680, 40.7851),
//! ])?;
//! let buildings = CoordinateStore::try_new(vec![Point::new(100, -73.9855, 40.7483)])?;
//!
//! let index = PartitionIndex::build(hydrants, Tessellation::Grid { step: 0.002 })?;
//! let engine = KnnJoinBuilder::new().k(2).build()?;
//! let result = engine.join(&buildings, &index)?;
//!
//! assert!(result.is_complete());
//! assert_eq!(result.get(100).unwrap().candidate_ids(), vec![1, 2]);
//! # Ok::<(), spatio_knn::KnnError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod error;
pub mod types;

pub use builder::KnnJoinBuilder;
pub use config::{Config, ExpansionPolicy, IndexConfig, JoinConfig};
pub use error::{KnnError, Result};

pub use compute::join::{KnnJoin, knn_join};
pub use compute::metric::{Geodesic, Haversine, Metric, MetricKind, Planar, Rhumb};
pub use compute::report::{CandidateStats, CompletenessReport, DistanceStats};
pub use compute::spatial::{
    CandidateExpander, CellKey, IndexHandle, IndexStats, PartitionIndex, RingBudgetExceeded,
    Tessellation, build_index,
};
pub use compute::store::{CoordinateStore, Ingested};
pub use compute::topk::TopKAccumulator;
pub use compute::validation::CoordinateSpace;
pub use compute::verify::{Mismatch, VerificationReport, brute_force_knn, verify_sample};

pub use types::{
    ExhaustionReason, JoinResult, Point, PointId, QueryResult, ResultEntry, SearchState,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{KnnError, KnnJoin, KnnJoinBuilder, Result};

    pub use crate::{CoordinateStore, PartitionIndex, Point, Tessellation, build_index, knn_join};

    pub use crate::{JoinResult, QueryResult, SearchState};

    pub use crate::{Config, ExpansionPolicy, IndexConfig, JoinConfig};

    pub use crate::{Metric, MetricKind};

    pub use std::time::Duration;
}
