//! Validation for ingested coordinates.

use crate::error::{KnnError, Result};
use crate::types::Point;
use serde::{Deserialize, Serialize};

/// How the coordinates of a store are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Longitude/latitude degrees, range checked.
    #[default]
    Geographic,
    /// Pre-projected planar coordinates; only finiteness is checked.
    Projected,
}

/// Validates a point has finite, in-range longitude and latitude.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
///
/// # Examples
///
/// ```
/// use spatio_knn::compute::validation::validate_geographic_point;
/// use spatio_knn::Point;
///
/// assert!(validate_geographic_point(&Point::new(1, -74.0060, 40.7128)).is_ok());
/// assert!(validate_geographic_point(&Point::new(2, 200.0, 40.0)).is_err());
/// assert!(validate_geographic_point(&Point::new(3, -74.0, f64::NAN)).is_err());
/// ```
pub fn validate_geographic_point(point: &Point) -> Result<()> {
    validate_finite(point)?;

    if !(-180.0..=180.0).contains(&point.lon) {
        return Err(invalid(
            point,
            format!("Longitude out of range [-180.0, 180.0]: {}", point.lon),
        ));
    }

    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(invalid(
            point,
            format!("Latitude out of range [-90.0, 90.0]: {}", point.lat),
        ));
    }

    Ok(())
}

/// Validates both coordinates are finite.
pub fn validate_finite(point: &Point) -> Result<()> {
    if !point.lon.is_finite() {
        return Err(invalid(
            point,
            format!("Longitude must be finite, got: {}", point.lon),
        ));
    }

    if !point.lat.is_finite() {
        return Err(invalid(
            point,
            format!("Latitude must be finite, got: {}", point.lat),
        ));
    }

    Ok(())
}

/// Validates a point for the given coordinate space.
pub fn validate_point(point: &Point, space: CoordinateSpace) -> Result<()> {
    match space {
        CoordinateSpace::Geographic => validate_geographic_point(point),
        CoordinateSpace::Projected => validate_finite(point),
    }
}

/// Validates multiple points, stopping at the first invalid one.
pub fn validate_points(points: &[Point], space: CoordinateSpace) -> Result<()> {
    points.iter().try_for_each(|p| validate_point(p, space))
}

fn invalid(point: &Point, reason: String) -> KnnError {
    KnnError::InvalidCoordinate {
        id: point.id,
        reason,
    }
}
