//! Pointy-top hexagonal cells on the lon/lat plane, in axial coordinates.

use super::lattice::clamp_index;
use geo::{Coord, Rect};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Axial neighbor offsets, walked in order to trace a ring.
const DIRECTIONS: [(i64, i64); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// Hexagon layout with circumradius `size` (coordinate units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HexLayout {
    size: f64,
}

impl HexLayout {
    pub(crate) fn new(size: f64) -> Self {
        Self { size }
    }

    /// Axial `(q, r)` of the hexagon containing `c`.
    pub(crate) fn key(&self, c: Coord<f64>) -> (i64, i64) {
        let q = (SQRT_3 / 3.0 * c.x - c.y / 3.0) / self.size;
        let r = (2.0 / 3.0 * c.y) / self.size;
        axial_round(q, r)
    }

    pub(crate) fn center(&self, (q, r): (i64, i64)) -> Coord<f64> {
        Coord {
            x: self.size * SQRT_3 * (q as f64 + r as f64 / 2.0),
            y: self.size * 1.5 * r as f64,
        }
    }

    /// Square around `query` covered by rings `0..=ring` of its cell `key`.
    ///
    /// Any cell at hex distance `d` has its center at least `1.5 * d * size`
    /// from the origin cell's center, and every point lies within `size` of
    /// its own center. So everything closer to the query than
    /// `1.5 * (ring + 1) * size - size - |query - center|` is explored; the
    /// square inscribed in that disk is returned.
    pub(crate) fn explored_rect(&self, query: Coord<f64>, key: (i64, i64), ring: u32) -> Rect<f64> {
        let center = self.center(key);
        let offset = (query.x - center.x).hypot(query.y - center.y);
        let radius = (1.5 * (ring as f64 + 1.0) - 1.0) * self.size - offset;
        let half = radius.max(0.0) / std::f64::consts::SQRT_2;
        Rect::new(
            Coord {
                x: query.x - half,
                y: query.y - half,
            },
            Coord {
                x: query.x + half,
                y: query.y + half,
            },
        )
    }
}

#[inline]
pub(crate) fn hex_distance(a: (i64, i64), b: (i64, i64)) -> u32 {
    let dq = a.0 - b.0;
    let dr = a.1 - b.1;
    let d = (dq.unsigned_abs() + dr.unsigned_abs() + (dq + dr).unsigned_abs()) / 2;
    u32::try_from(d).unwrap_or(u32::MAX)
}

/// Cells at hex distance exactly `ring`: `6 * ring` of them, or the center
/// itself for ring 0.
pub(crate) fn hex_shell(center: (i64, i64), ring: u32, out: &mut Vec<(i64, i64)>) {
    if ring == 0 {
        out.push(center);
        return;
    }
    let r = ring as i64;
    let (mut q, mut s) = (center.0 + DIRECTIONS[4].0 * r, center.1 + DIRECTIONS[4].1 * r);
    for (dq, dr) in DIRECTIONS {
        for _ in 0..r {
            out.push((q, s));
            q += dq;
            s += dr;
        }
    }
}

fn axial_round(q: f64, r: f64) -> (i64, i64) {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (clamp_index(rq), clamp_index(rr))
}
