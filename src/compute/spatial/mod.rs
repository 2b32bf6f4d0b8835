//! Spatial partitioning: tessellations, the bucketed index and ring expansion.

mod expander;
mod geohash;
mod hex;
mod index;
mod lattice;
mod tessellation;

pub use expander::{CandidateExpander, RingBudgetExceeded};
pub use index::{IndexHandle, IndexStats, PartitionIndex, build_index};
pub use tessellation::{CellKey, Tessellation};
