//! Immutable coordinate stores for query and candidate point sets.

use super::validation::{CoordinateSpace, validate_point, validate_points};
use crate::error::{KnnError, Result};
use crate::types::Point;
use geo::{BoundingRect, MultiPoint, Rect};

/// An immutable, validated array of `(id, lon, lat)` points.
///
/// # Examples
///
/// ```
/// use spatio_knn::{CoordinateStore, Point};
///
/// let ingested = CoordinateStore::ingest(vec![
///     Point::new(1, -74.0, 40.7),
///     Point::new(2, f64::NAN, 40.7),
/// ]);
/// assert_eq!(ingested.store.len(), 1);
/// assert_eq!(ingested.rejected.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoordinateStore {
    points: Vec<Point>,
    space: CoordinateSpace,
}

/// Outcome of a lenient ingestion: the accepted store plus every rejection.
#[derive(Debug)]
pub struct Ingested {
    pub store: CoordinateStore,
    pub rejected: Vec<KnnError>,
}

impl Ingested {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl CoordinateStore {
    /// Build a geographic store, failing on the first invalid point.
    pub fn try_new(points: Vec<Point>) -> Result<Self> {
        Self::try_new_in(points, CoordinateSpace::Geographic)
    }

    pub fn try_new_in(points: Vec<Point>, space: CoordinateSpace) -> Result<Self> {
        validate_points(&points, space)?;
        Ok(Self { points, space })
    }

    /// Build a geographic store, skipping invalid points.
    pub fn ingest<I: IntoIterator<Item = Point>>(points: I) -> Ingested {
        Self::ingest_in(points, CoordinateSpace::Geographic)
    }

    pub fn ingest_in<I: IntoIterator<Item = Point>>(points: I, space: CoordinateSpace) -> Ingested {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for point in points {
            match validate_point(&point, space) {
                Ok(()) => accepted.push(point),
                Err(err) => rejected.push(err),
            }
        }

        if !rejected.is_empty() {
            log::warn!(
                "Rejected {} of {} points at ingestion",
                rejected.len(),
                rejected.len() + accepted.len()
            );
        }

        Ingested {
            store: Self {
                points: accepted,
                space,
            },
            rejected,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    #[inline]
    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Point> {
        self.points.get(idx)
    }

    /// Points whose ids are in `ids`, in store order.
    pub fn subset(&self, ids: &[crate::types::PointId]) -> Self {
        let wanted: rustc_hash::FxHashSet<_> = ids.iter().copied().collect();
        Self {
            points: self
                .points
                .iter()
                .filter(|p| wanted.contains(&p.id))
                .copied()
                .collect(),
            space: self.space,
        }
    }

    /// Bounding rectangle of all points, `None` when empty.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let multi_point: MultiPoint<f64> = self.points.iter().map(Point::to_geo).collect();
        multi_point.bounding_rect()
    }

    pub(crate) fn into_points(self) -> Vec<Point> {
        self.points
    }
}

impl<'a> IntoIterator for &'a CoordinateStore {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
