//! Tessellations: point → cell mapping, rings, and explored extents.

use super::geohash::{self, MAX_PRECISION, MIN_PRECISION};
use super::hex::{HexLayout, hex_distance, hex_shell};
use super::lattice::{Lattice, MAX_CELL_INDEX, chebyshev_distance};
use crate::compute::store::CoordinateStore;
use crate::error::{KnnError, Result};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Discrete spatial bucket key.
///
/// The mapping from coordinates to a key is a pure function of the
/// coordinates and the tessellation's resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CellKey {
    /// `(⌊lon/step⌋, ⌊lat/step⌋)`.
    Grid { gx: i64, gy: i64 },
    /// Axial hexagon coordinates.
    Hex { q: i64, r: i64 },
    /// Lattice position of a geohash cell at the index precision.
    Geohash { ix: i64, iy: i64 },
}

impl CellKey {
    #[inline]
    pub(crate) fn axes(&self) -> (i64, i64) {
        match *self {
            CellKey::Grid { gx, gy } => (gx, gy),
            CellKey::Hex { q, r } => (q, r),
            CellKey::Geohash { ix, iy } => (ix, iy),
        }
    }
}

/// How the plane is cut into cells.
///
/// The resolution is an operating parameter: pick it so a ring holds a
/// handful of candidates (see [`Tessellation::suggest_grid`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tessellation {
    /// Square cells of `step` coordinate units; rings by Chebyshev distance.
    Grid { step: f64 },
    /// Pointy-top hexagons of circumradius `size`; rings by hex distance.
    Hex { size: f64 },
    /// Geohash cells at `precision` (1-12); rings by Chebyshev distance on
    /// the geohash lattice.
    Geohash { precision: usize },
}

impl Default for Tessellation {
    fn default() -> Self {
        // ~220m cells at NYC latitude
        Tessellation::Grid { step: 0.002 }
    }
}

/// Bounding box of occupied cells along each cube axis (`x`, `y`, `-x-y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellExtent {
    min: [i64; 3],
    max: [i64; 3],
}

impl CellExtent {
    pub(crate) fn from_keys<I: IntoIterator<Item = CellKey>>(keys: I) -> Option<Self> {
        let mut extent: Option<Self> = None;
        for key in keys {
            let axes = cube(key.axes());
            match extent.as_mut() {
                Some(e) => {
                    for i in 0..3 {
                        e.min[i] = e.min[i].min(axes[i]);
                        e.max[i] = e.max[i].max(axes[i]);
                    }
                }
                None => {
                    extent = Some(Self {
                        min: axes,
                        max: axes,
                    })
                }
            }
        }
        extent
    }

    /// `(nearest, farthest)` ring bounds over `axis_count` axes: no occupied
    /// cell is closer than `nearest`, none farther than `farthest`.
    fn ring_span(&self, key: CellKey, axis_count: usize) -> (u32, u32) {
        let axes = cube(key.axes());
        let mut nearest = 0u64;
        let mut farthest = 0u64;
        for i in 0..axis_count {
            let (lo, hi, v) = (self.min[i], self.max[i], axes[i]);
            let gap = if v < lo {
                lo.abs_diff(v)
            } else if v > hi {
                v.abs_diff(hi)
            } else {
                0
            };
            nearest = nearest.max(gap);
            farthest = farthest.max(v.abs_diff(lo)).max(v.abs_diff(hi));
        }
        (
            u32::try_from(nearest).unwrap_or(u32::MAX),
            u32::try_from(farthest).unwrap_or(u32::MAX),
        )
    }
}

#[inline]
fn cube((x, y): (i64, i64)) -> [i64; 3] {
    [x, y, -x - y]
}

impl Tessellation {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Tessellation::Grid { step } if !(step.is_finite() && step > 0.0) => Err(
                KnnError::InvalidResolution(format!("Grid step must be positive, got {}", step)),
            ),
            Tessellation::Hex { size } if !(size.is_finite() && size > 0.0) => Err(
                KnnError::InvalidResolution(format!("Hex size must be positive, got {}", size)),
            ),
            Tessellation::Geohash { precision }
                if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) =>
            {
                Err(KnnError::InvalidResolution(format!(
                    "Geohash precision must be between {} and {}, got {}",
                    MIN_PRECISION, MAX_PRECISION, precision
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether this tessellation only makes sense for lon/lat input.
    pub fn requires_geographic(&self) -> bool {
        matches!(self, Tessellation::Geohash { .. })
    }

    /// Largest `|x|` or `|y|` that still maps to its own cell. Coordinates
    /// beyond it share the outermost cells.
    pub fn max_coordinate(&self) -> f64 {
        let limit = MAX_CELL_INDEX as f64;
        match *self {
            Tessellation::Grid { step } => limit * step,
            // |q| and |r| are at most ~0.91 · max(|x|, |y|) / size.
            Tessellation::Hex { size } => limit * size / 2.0,
            Tessellation::Geohash { .. } => f64::INFINITY,
        }
    }

    /// Whether `c` is within [`max_coordinate`](Tessellation::max_coordinate)
    /// on both axes.
    pub fn in_cell_range(&self, c: Coord<f64>) -> bool {
        let max = self.max_coordinate();
        c.x.abs() <= max && c.y.abs() <= max
    }

    /// Fails with [`KnnError::InvalidResolution`] when the cells are too fine
    /// to key every coordinate in `extent`.
    pub fn check_extent(&self, extent: &Rect<f64>) -> Result<()> {
        let reach = [extent.min(), extent.max()]
            .iter()
            .map(|c| c.x.abs().max(c.y.abs()))
            .fold(0.0, f64::max);
        if reach > self.max_coordinate() {
            return Err(KnnError::InvalidResolution(format!(
                "{:?} is too fine for coordinates up to {}",
                self, reach
            )));
        }
        Ok(())
    }

    /// The cell containing `c`.
    ///
    /// # Examples
    ///
    /// ```
    /// use spatio_knn::{CellKey, Tessellation};
    /// use geo::coord;
    ///
    /// let grid = Tessellation::Grid { step: 0.002 };
    /// let cell = grid.cell_of(coord! { x: -74.0031, y: 40.7128 });
    /// assert_eq!(cell, CellKey::Grid { gx: -37002, gy: 20356 });
    /// ```
    pub fn cell_of(&self, c: Coord<f64>) -> CellKey {
        match *self {
            Tessellation::Grid { step } => {
                let (gx, gy) = Lattice::unbounded(step).key(c);
                CellKey::Grid { gx, gy }
            }
            Tessellation::Hex { size } => {
                let (q, r) = HexLayout::new(size).key(c);
                CellKey::Hex { q, r }
            }
            Tessellation::Geohash { precision } => {
                let (ix, iy) = geohash::lattice(precision).key(c);
                CellKey::Geohash { ix, iy }
            }
        }
    }

    /// Ring distance between two cells of this tessellation.
    #[inline]
    pub fn ring_distance(&self, a: CellKey, b: CellKey) -> u32 {
        match self {
            Tessellation::Hex { .. } => hex_distance(a.axes(), b.axes()),
            _ => chebyshev_distance(a.axes(), b.axes()),
        }
    }

    /// Number of cells at exactly `ring` (before clipping at lattice bounds).
    pub fn shell_len(&self, ring: u32) -> usize {
        if ring == 0 {
            return 1;
        }
        let per_ring = match self {
            Tessellation::Hex { .. } => 6,
            _ => 8,
        };
        per_ring * ring as usize
    }

    /// Append the cells at exactly `ring` from `center`.
    pub fn shell_into(&self, center: CellKey, ring: u32, out: &mut Vec<CellKey>) {
        let mut axes = Vec::with_capacity(self.shell_len(ring));
        match *self {
            Tessellation::Grid { step } => {
                Lattice::unbounded(step).shell_into(center.axes(), ring, &mut axes);
                out.extend(axes.into_iter().map(|(gx, gy)| CellKey::Grid { gx, gy }));
            }
            Tessellation::Hex { .. } => {
                hex_shell(center.axes(), ring, &mut axes);
                out.extend(axes.into_iter().map(|(q, r)| CellKey::Hex { q, r }));
            }
            Tessellation::Geohash { precision } => {
                geohash::lattice(precision).shell_into(center.axes(), ring, &mut axes);
                out.extend(axes.into_iter().map(|(ix, iy)| CellKey::Geohash { ix, iy }));
            }
        }
    }

    /// All cells within `ring` of `center` (`NeighborRing(center, ring)`).
    pub fn neighbor_ring(&self, center: CellKey, ring: u32) -> Vec<CellKey> {
        let mut cells = Vec::new();
        for r in 0..=ring {
            self.shell_into(center, r, &mut cells);
        }
        cells
    }

    /// Axis-aligned rectangle around `query` that rings `0..=ring` of its
    /// cell `center` fully cover. Anything outside it lives in an unexplored
    /// cell or nowhere.
    pub fn explored_extent(&self, query: Coord<f64>, center: CellKey, ring: u32) -> Rect<f64> {
        match *self {
            Tessellation::Grid { step } => Lattice::unbounded(step).block_rect(center.axes(), ring),
            Tessellation::Hex { size } => {
                HexLayout::new(size).explored_rect(query, center.axes(), ring)
            }
            Tessellation::Geohash { precision } => {
                geohash::lattice(precision).block_rect(center.axes(), ring)
            }
        }
    }

    /// `(nearest, farthest)` rings from `center` that can hold occupied cells.
    pub(crate) fn ring_span(&self, center: CellKey, extent: &CellExtent) -> (u32, u32) {
        let axis_count = match self {
            Tessellation::Hex { .. } => 3,
            _ => 2,
        };
        extent.ring_span(center, axis_count)
    }

    /// Human-readable cell id; the geohash string for geohash cells.
    pub fn cell_id(&self, key: CellKey) -> Result<String> {
        match (*self, key) {
            (Tessellation::Geohash { precision }, CellKey::Geohash { ix, iy }) => {
                geohash::encode_cell(precision, (ix, iy))
            }
            (_, CellKey::Grid { gx, gy }) => Ok(format!("{}:{}", gx, gy)),
            (_, CellKey::Hex { q, r }) => Ok(format!("{}:{}", q, r)),
            (_, CellKey::Geohash { ix, iy }) => Ok(format!("{}:{}", ix, iy)),
        }
    }

    /// Cell key of a geohash string, with the tessellation it belongs to.
    pub fn from_geohash(hash: &str) -> Result<(Tessellation, CellKey)> {
        let (precision, (ix, iy)) = geohash::decode_cell(hash)?;
        Ok((
            Tessellation::Geohash { precision },
            CellKey::Geohash { ix, iy },
        ))
    }

    /// Grid step giving roughly `target_per_cell` points per occupied cell,
    /// assuming the store is spread evenly over its bounding box.
    ///
    /// Returns `None` for an empty store or one whose points coincide.
    pub fn suggest_grid(store: &CoordinateStore, target_per_cell: usize) -> Option<Tessellation> {
        let area = area_per_point(store, target_per_cell)?;
        Some(Tessellation::Grid { step: area.sqrt() })
    }

    /// Hex size giving roughly `target_per_cell` points per occupied cell.
    pub fn suggest_hex(store: &CoordinateStore, target_per_cell: usize) -> Option<Tessellation> {
        let area = area_per_point(store, target_per_cell)?;
        // Hexagon area is 3√3/2 · size².
        Some(Tessellation::Hex {
            size: (area * 2.0 / (3.0 * 3f64.sqrt())).sqrt(),
        })
    }
}

/// Area (coordinate units²) a cell needs to hold `target_per_cell` points.
fn area_per_point(store: &CoordinateStore, target_per_cell: usize) -> Option<f64> {
    let bbox = store.bounding_rect()?;
    let n = store.len() as f64;
    let target = target_per_cell.max(1) as f64;
    let (w, h) = (bbox.width(), bbox.height());
    if w > 0.0 && h > 0.0 {
        return Some(w * h * target / n);
    }
    // Collinear input: treat the extent as a strip one cell wide.
    let extent = w.max(h);
    (extent > 0.0).then(|| {
        let side = extent * target / n;
        side * side
    })
}
