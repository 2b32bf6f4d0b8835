//! Rectangular lattices shared by the grid and geohash tessellations.

use geo::{Coord, Rect};

/// Largest cell index on either axis. Keys stay this far inside `i64` so
/// ring and cube arithmetic on them cannot overflow.
pub(crate) const MAX_CELL_INDEX: i64 = 1 << 52;

/// Truncate an already-floored cell index into `±MAX_CELL_INDEX`.
#[inline]
pub(crate) fn clamp_index(index: f64) -> i64 {
    (index as i64).clamp(-MAX_CELL_INDEX, MAX_CELL_INDEX)
}

/// Axis-aligned lattice of `step`-sized cells anchored at `origin`.
///
/// When `bounds` is set the lattice is finite (`nx × ny` cells) and keys are
/// clamped into it, which keeps the closed upper edge (e.g. lon = 180) inside
/// the last cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Lattice {
    origin: Coord<f64>,
    step: Coord<f64>,
    bounds: Option<(i64, i64)>,
}

impl Lattice {
    pub(crate) fn unbounded(step: f64) -> Self {
        Self {
            origin: Coord { x: 0.0, y: 0.0 },
            step: Coord { x: step, y: step },
            bounds: None,
        }
    }

    pub(crate) fn bounded(origin: Coord<f64>, step: Coord<f64>, nx: i64, ny: i64) -> Self {
        Self {
            origin,
            step,
            bounds: Some((nx, ny)),
        }
    }

    #[inline]
    pub(crate) fn key(&self, c: Coord<f64>) -> (i64, i64) {
        let ix = clamp_index(((c.x - self.origin.x) / self.step.x).floor());
        let iy = clamp_index(((c.y - self.origin.y) / self.step.y).floor());
        match self.bounds {
            Some((nx, ny)) => (ix.clamp(0, nx - 1), iy.clamp(0, ny - 1)),
            None => (ix, iy),
        }
    }

    #[inline]
    pub(crate) fn contains_key(&self, (ix, iy): (i64, i64)) -> bool {
        match self.bounds {
            Some((nx, ny)) => (0..nx).contains(&ix) && (0..ny).contains(&iy),
            None => true,
        }
    }

    pub(crate) fn cell_rect(&self, key: (i64, i64)) -> Rect<f64> {
        self.block_rect(key, 0)
    }

    /// Rectangle covered by all cells within Chebyshev distance `ring`.
    pub(crate) fn block_rect(&self, (cx, cy): (i64, i64), ring: u32) -> Rect<f64> {
        let r = ring as i64;
        let min = Coord {
            x: self.origin.x + (cx - r) as f64 * self.step.x,
            y: self.origin.y + (cy - r) as f64 * self.step.y,
        };
        let max = Coord {
            x: self.origin.x + (cx + r + 1) as f64 * self.step.x,
            y: self.origin.y + (cy + r + 1) as f64 * self.step.y,
        };
        Rect::new(min, max)
    }

    /// Append the cells at exactly Chebyshev distance `ring`.
    pub(crate) fn shell_into(&self, center: (i64, i64), ring: u32, out: &mut Vec<(i64, i64)>) {
        let start = out.len();
        chebyshev_shell(center, ring, out);
        if self.bounds.is_some() {
            let mut idx = start;
            while idx < out.len() {
                if self.contains_key(out[idx]) {
                    idx += 1;
                } else {
                    out.swap_remove(idx);
                }
            }
            out[start..].sort_unstable();
        }
    }
}

#[inline]
pub(crate) fn chebyshev_distance(a: (i64, i64), b: (i64, i64)) -> u32 {
    let d = a.0.abs_diff(b.0).max(a.1.abs_diff(b.1));
    u32::try_from(d).unwrap_or(u32::MAX)
}

/// Cells at Chebyshev distance exactly `ring` from `center`: `8 * ring` of
/// them, or the center itself for ring 0.
pub(crate) fn chebyshev_shell(center: (i64, i64), ring: u32, out: &mut Vec<(i64, i64)>) {
    let (cx, cy) = center;
    let r = ring as i64;
    if r == 0 {
        out.push(center);
        return;
    }
    for x in cx - r..=cx + r {
        out.push((x, cy - r));
        out.push((x, cy + r));
    }
    for y in cy - r + 1..cy + r {
        out.push((cx - r, y));
        out.push((cx + r, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_key_floors() {
        let lattice = Lattice::unbounded(0.002);
        let c = Coord {
            x: 0.0031,
            y: -0.0001,
        };
        assert_eq!(lattice.key(c), (1, -1));
        assert_eq!(lattice.key(Coord { x: -0.0031, y: 0.0 }), (-2, 0));
    }

    #[test]
    fn test_extreme_keys_are_clamped() {
        let lattice = Lattice::unbounded(1e-17);
        let far = Coord {
            x: 100.0,
            y: -1e300,
        };
        let (ix, iy) = lattice.key(far);
        assert_eq!((ix, iy), (MAX_CELL_INDEX, -MAX_CELL_INDEX));

        let rect = lattice.block_rect((ix, iy), u32::MAX);
        assert!(rect.min().x < rect.max().x);

        let mut out = Vec::new();
        chebyshev_shell((ix, iy), 1, &mut out);
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_shell_sizes() {
        let mut out = Vec::new();
        for ring in 0..6u32 {
            out.clear();
            chebyshev_shell((3, -2), ring, &mut out);
            let expected = if ring == 0 { 1 } else { 8 * ring as usize };
            assert_eq!(out.len(), expected);
            assert!(out.iter().all(|&k| chebyshev_distance((3, -2), k) == ring));

            let mut dedup = out.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), out.len());
        }
    }

    #[test]
    fn test_block_rect_contains_block() {
        let lattice = Lattice::unbounded(1.0);
        let rect = lattice.block_rect((0, 0), 2);
        assert_eq!(rect.min(), Coord { x: -2.0, y: -2.0 });
        assert_eq!(rect.max(), Coord { x: 3.0, y: 3.0 });
    }

    #[test]
    fn test_bounded_lattice_clamps_and_filters() {
        let origin = Coord {
            x: -180.0,
            y: -90.0,
        };
        let lattice = Lattice::bounded(origin, Coord { x: 45.0, y: 45.0 }, 8, 4);
        assert_eq!(lattice.key(Coord { x: 180.0, y: 90.0 }), (7, 3));
        assert_eq!(lattice.key(origin), (0, 0));

        let mut out = Vec::new();
        lattice.shell_into((0, 0), 1, &mut out);
        assert_eq!(out, vec![(0, 1), (1, 0), (1, 1)]);
    }
}
