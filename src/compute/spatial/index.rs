//! The partition index: candidate points bucketed by cell.
//!
//! # Memory Layout
//!
//! ```text
//! PartitionIndex
//! ├─ points:  [p7, p2, p9 | p4 | p1, p5, ...]   sorted by (cell, id)
//! ├─ buckets: FxHashMap<CellKey, Bucket>
//! │  ├─ Grid(-37002, 20356) -> 0..3
//! │  ├─ Grid(-37001, 20356) -> 3..4
//! │  └─ ...
//! └─ extent:  bounding box of occupied cells, for ring reach
//! ```
//!
//! The index is immutable once built. Rebuilding through [`IndexHandle`] is the
//! only way to change the candidate set.

use super::tessellation::{CellExtent, CellKey, Tessellation};
use crate::compute::store::CoordinateStore;
use crate::compute::validation::CoordinateSpace;
use crate::config::IndexConfig;
use crate::error::{KnnError, Result};
use crate::types::Point;
use geo::{Coord, Rect};
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Contiguous run of `points` belonging to one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    start: u32,
    end: u32,
}

impl Bucket {
    #[inline]
    fn range(self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Statistics for a built index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub tessellation: Tessellation,
    /// Number of non-empty cells
    pub cell_count: usize,
    pub point_count: usize,
    /// Average points per non-empty cell
    pub mean_bucket: f64,
    pub max_bucket: usize,
}

/// Candidate points bucketed by cell under one tessellation.
///
/// # Examples
///
/// ```
/// use spatio_knn::{CoordinateStore, PartitionIndex, Point, Tessellation};
///
/// let store = CoordinateStore::try_new(vec![
///     Point::new(1, -74.0010, 40.7100),
///     Point::new(2, -74.0011, 40.7101),
///     Point::new(3, -73.9000, 40.8000),
/// ])?;
/// let index = PartitionIndex::build(store, Tessellation::Grid { step: 0.002 })?;
///
/// let cell = index.tessellation().cell_of(geo::coord! { x: -74.0010, y: 40.7100 });
/// assert_eq!(index.lookup(cell, 0).count(), 2);
/// # Ok::<(), spatio_knn::KnnError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PartitionIndex {
    tessellation: Tessellation,
    space: CoordinateSpace,
    points: Vec<Point>,
    buckets: FxHashMap<CellKey, Bucket>,
    extent: Option<CellExtent>,
}

impl PartitionIndex {
    /// Bucket every point of `store` under `tessellation`.
    ///
    /// Deterministic: the same point set yields the same index regardless of
    /// input order. An empty store is a valid index whose every lookup is
    /// empty.
    pub fn build(store: CoordinateStore, tessellation: Tessellation) -> Result<Self> {
        tessellation.validate()?;

        let space = store.space();
        if tessellation.requires_geographic() && space == CoordinateSpace::Projected {
            return Err(KnnError::InvalidConfig(
                "Geohash tessellation requires geographic coordinates".to_string(),
            ));
        }

        let extent = match space {
            CoordinateSpace::Geographic => Some(Rect::new(
                Coord {
                    x: -180.0,
                    y: -90.0,
                },
                Coord { x: 180.0, y: 90.0 },
            )),
            CoordinateSpace::Projected => store.bounding_rect(),
        };
        if let Some(extent) = extent {
            tessellation.check_extent(&extent)?;
        }

        let points = store.into_points();
        if points.len() > u32::MAX as usize {
            return Err(KnnError::InvalidConfig(format!(
                "Index holds at most {} points, got {}",
                u32::MAX,
                points.len()
            )));
        }

        let mut keyed: Vec<(CellKey, Point)> = points
            .into_par_iter()
            .map(|p| (tessellation.cell_of(p.coord()), p))
            .collect();

        keyed.par_sort_unstable_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then(a.id.cmp(&b.id))
                .then(a.lon.total_cmp(&b.lon))
                .then(a.lat.total_cmp(&b.lat))
        });

        let mut buckets: FxHashMap<CellKey, Bucket> = FxHashMap::default();
        let mut points = Vec::with_capacity(keyed.len());
        let mut start = 0u32;
        let mut current: Option<CellKey> = None;

        for (idx, (key, point)) in keyed.into_iter().enumerate() {
            let idx = idx as u32;
            if current != Some(key) {
                if let Some(prev) = current {
                    buckets.insert(prev, Bucket { start, end: idx });
                }
                current = Some(key);
                start = idx;
            }
            points.push(point);
        }
        if let Some(prev) = current {
            buckets.insert(
                prev,
                Bucket {
                    start,
                    end: points.len() as u32,
                },
            );
        }

        let extent = CellExtent::from_keys(buckets.keys().copied());
        let index = Self {
            tessellation,
            space,
            points,
            buckets,
            extent,
        };

        let stats = index.stats();
        log::debug!(
            "Built partition index: {:?}, {} points in {} cells (mean {:.2}, max {})",
            stats.tessellation,
            stats.point_count,
            stats.cell_count,
            stats.mean_bucket,
            stats.max_bucket
        );

        Ok(index)
    }

    pub fn from_config(store: CoordinateStore, config: &IndexConfig) -> Result<Self> {
        Self::build(store, config.tessellation)
    }

    pub fn tessellation(&self) -> Tessellation {
        self.tessellation
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All indexed points, ordered by (cell, id).
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn cell_count(&self) -> usize {
        self.buckets.len()
    }

    /// Points in exactly `cell`, ordered by id.
    pub fn bucket(&self, cell: CellKey) -> &[Point] {
        match self.buckets.get(&cell) {
            Some(bucket) => &self.points[bucket.range()],
            None => &[],
        }
    }

    /// Points in every cell of `NeighborRing(cell, ring)`.
    ///
    /// Each point appears once. Results for ring `r + 1` are a superset of
    /// ring `r`.
    pub fn lookup(&self, cell: CellKey, ring: u32) -> impl Iterator<Item = &Point> + '_ {
        self.tessellation
            .neighbor_ring(cell, ring)
            .into_iter()
            .flat_map(move |c| self.bucket(c).iter())
    }

    /// `(nearest, reach)` rings from `cell`: no point lives closer than
    /// `nearest` rings, and ring `reach` covers every point. `None` for an
    /// empty index.
    pub fn ring_span(&self, cell: CellKey) -> Option<(u32, u32)> {
        self.extent
            .as_ref()
            .map(|extent| self.tessellation.ring_span(cell, extent))
    }

    pub fn stats(&self) -> IndexStats {
        let cell_count = self.buckets.len();
        let max_bucket = self
            .buckets
            .values()
            .map(|b| (b.end - b.start) as usize)
            .max()
            .unwrap_or(0);
        let mean_bucket = if cell_count > 0 {
            self.points.len() as f64 / cell_count as f64
        } else {
            0.0
        };

        IndexStats {
            tessellation: self.tessellation,
            cell_count,
            point_count: self.points.len(),
            mean_bucket,
            max_bucket,
        }
    }

    #[inline]
    pub(crate) fn point_at(&self, slot: u32) -> &Point {
        &self.points[slot as usize]
    }

    /// Append the slots of every point at ring distance `lo..=hi` from
    /// `origin`, in (cell, id) order.
    ///
    /// Walks the shells when they hold fewer cells than the index has buckets,
    /// and scans the bucket table otherwise.
    pub(crate) fn collect_shells(
        &self,
        origin: CellKey,
        lo: u32,
        hi: u32,
        scratch: &mut Vec<CellKey>,
        out: &mut Vec<u32>,
    ) {
        if lo > hi || self.buckets.is_empty() {
            return;
        }
        let start = out.len();

        let mut shell_cells = 0usize;
        let mut walk = true;
        for ring in lo..=hi {
            shell_cells = shell_cells.saturating_add(self.tessellation.shell_len(ring));
            if shell_cells > self.buckets.len() {
                walk = false;
                break;
            }
        }

        if walk {
            for ring in lo..=hi {
                scratch.clear();
                self.tessellation.shell_into(origin, ring, scratch);
                for cell in scratch.iter() {
                    if let Some(bucket) = self.buckets.get(cell) {
                        out.extend(bucket.start..bucket.end);
                    }
                }
            }
        } else {
            for (cell, bucket) in &self.buckets {
                let d = self.tessellation.ring_distance(origin, *cell);
                if (lo..=hi).contains(&d) {
                    out.extend(bucket.start..bucket.end);
                }
            }
        }

        out[start..].sort_unstable();
    }
}

/// Build a geographic index from raw points.
///
/// Fails with [`KnnError::InvalidCoordinate`] on the first NaN or out-of-range
/// point. Use [`CoordinateStore::ingest`] to skip bad points instead.
pub fn build_index(points: Vec<Point>, tessellation: Tessellation) -> Result<PartitionIndex> {
    PartitionIndex::build(CoordinateStore::try_new(points)?, tessellation)
}

/// Shared, swappable index.
///
/// Readers take an [`Arc`] snapshot and keep using it for the whole join, so a
/// concurrent [`rebuild`](IndexHandle::rebuild) never changes the index under
/// an in-flight query.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<PartitionIndex>>,
}

impl IndexHandle {
    pub fn new(index: PartitionIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn snapshot(&self) -> Arc<PartitionIndex> {
        self.current.read().clone()
    }

    /// Swap in `index`, returning the previous one.
    pub fn replace(&self, index: PartitionIndex) -> Arc<PartitionIndex> {
        let next = Arc::new(index);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Build a new index from `store` and swap it in. The lock is held only
    /// for the swap.
    pub fn rebuild(
        &self,
        store: CoordinateStore,
        tessellation: Tessellation,
    ) -> Result<Arc<PartitionIndex>> {
        let index = PartitionIndex::build(store, tessellation)?;
        Ok(self.replace(index))
    }
}
