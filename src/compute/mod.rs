//! Compute layer: point stores, metrics, spatial partitioning and the join.
//!
//! Everything here is pure CPU work over immutable inputs. Loading point data
//! and presenting results belong to the caller.

pub mod join;
pub mod metric;
pub mod report;
pub mod spatial;
pub mod store;
pub mod topk;
pub mod validation;
pub mod verify;
