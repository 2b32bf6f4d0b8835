//! Distance metrics and their region lower bounds.
//!
//! A [`Metric`] does two jobs for the join: it measures candidate distances,
//! and it bounds from below the distance from a query to anything outside the
//! rectangle already explored by ring expansion. The second job is what makes
//! the stopping rule exact, so a metric and its bound must agree: for every
//! point `p` outside `explored`, `distance(q, p) >= lower_bound_outside(q,
//! explored)`.

use geo::{Coord, Distance, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Mean Earth radius in meters, as used by `geo`'s haversine.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// Relative slack absorbing rounding between a distance and its bound.
const BOUND_SLACK: f64 = 1e-9;

// Ellipsoidal distances can undercut the mean-radius sphere by ~0.56%
// (meridian arcs at the equator).
const GEODESIC_BOUND_FACTOR: f64 = 0.99;

/// A distance function usable by the join.
pub trait Metric: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Symmetric, non-negative distance; zero for identical coordinates.
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64;

    /// A lower bound on `distance(query, p)` for every `p` outside `explored`.
    ///
    /// `explored` contains `query`. Returns `f64::INFINITY` when nothing lies
    /// outside it.
    fn lower_bound_outside(&self, query: Coord<f64>, explored: &Rect<f64>) -> f64;
}

/// Great-circle distance on the mean-radius sphere. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Haversine;

/// Karney geodesic distance on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Geodesic;

/// Loxodrome distance. Never shorter than the great-circle distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rhumb;

/// Euclidean distance in coordinate units, for pre-projected input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planar;

impl Metric for Haversine {
    fn name(&self) -> &'static str {
        "haversine"
    }

    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        geo::Haversine.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn lower_bound_outside(&self, query: Coord<f64>, explored: &Rect<f64>) -> f64 {
        spherical_lower_bound(query, explored) * (1.0 - BOUND_SLACK)
    }
}

impl Metric for Geodesic {
    fn name(&self) -> &'static str {
        "geodesic"
    }

    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        geo::Geodesic.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn lower_bound_outside(&self, query: Coord<f64>, explored: &Rect<f64>) -> f64 {
        spherical_lower_bound(query, explored) * GEODESIC_BOUND_FACTOR
    }
}

impl Metric for Rhumb {
    fn name(&self) -> &'static str {
        "rhumb"
    }

    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        geo::Rhumb.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn lower_bound_outside(&self, query: Coord<f64>, explored: &Rect<f64>) -> f64 {
        spherical_lower_bound(query, explored) * (1.0 - BOUND_SLACK)
    }
}

impl Metric for Planar {
    fn name(&self) -> &'static str {
        "planar"
    }

    #[inline]
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        geo::Euclidean.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn lower_bound_outside(&self, query: Coord<f64>, explored: &Rect<f64>) -> f64 {
        let (min, max) = (explored.min(), explored.max());
        let gap = (query.x - min.x)
            .min(max.x - query.x)
            .min(query.y - min.y)
            .min(max.y - query.y)
            .max(0.0);
        gap * (1.0 - BOUND_SLACK)
    }
}

/// Built-in metric selector for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Haversine,
    Geodesic,
    Rhumb,
    Planar,
}

impl MetricKind {
    pub fn metric(self) -> Arc<dyn Metric> {
        match self {
            MetricKind::Haversine => Arc::new(Haversine),
            MetricKind::Geodesic => Arc::new(Geodesic),
            MetricKind::Rhumb => Arc::new(Rhumb),
            MetricKind::Planar => Arc::new(Planar),
        }
    }
}

/// Great-circle lower bound (meters) from `query` to the part of the globe
/// outside a lon/lat rectangle.
///
/// Latitude gaps translate directly into meridian arc length. A longitude gap
/// of `dλ` can be crossed no faster than the distance from the query to the
/// nearest meridian at that offset, `asin(cos φ · sin dλ)`, saturating at
/// the distance to the pole once `dλ` reaches 90°. Longitude gaps are measured
/// around the antimeridian.
pub fn spherical_lower_bound(query: Coord<f64>, explored: &Rect<f64>) -> f64 {
    let (min, max) = (explored.min(), explored.max());

    let mut lat_gap = f64::INFINITY;
    if max.y < 90.0 {
        lat_gap = lat_gap.min(max.y - query.y);
    }
    if min.y > -90.0 {
        lat_gap = lat_gap.min(query.y - min.y);
    }

    let mut lon_gap = f64::INFINITY;
    if min.x > -180.0 {
        lon_gap = lon_gap.min(circular_gap(query.x, -180.0, min.x));
    }
    if max.x < 180.0 {
        lon_gap = lon_gap.min(circular_gap(query.x, max.x, 180.0));
    }

    let lat_bound = if lat_gap.is_finite() {
        EARTH_RADIUS_M * lat_gap.max(0.0).to_radians()
    } else {
        f64::INFINITY
    };

    let lon_bound = if lon_gap.is_finite() {
        let sin_gap = lon_gap.clamp(0.0, 90.0).to_radians().sin();
        let cos_lat = query.y.clamp(-90.0, 90.0).to_radians().cos().max(0.0);
        EARTH_RADIUS_M * (cos_lat * sin_gap).clamp(0.0, 1.0).asin()
    } else {
        f64::INFINITY
    };

    lat_bound.min(lon_bound)
}

/// Smallest angular longitude difference from `x` to the interval `[a, b]`.
fn circular_gap(x: f64, a: f64, b: f64) -> f64 {
    circular_delta(x, a).min(circular_delta(x, b))
}

fn circular_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}
