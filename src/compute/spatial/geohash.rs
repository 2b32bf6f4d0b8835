//! Geohash cells as a finite lattice.
//!
//! A geohash of precision `p` has `5p` bits interleaved longitude-first, so
//! at a fixed precision the cells form a regular `2^ceil(5p/2) × 2^floor(5p/2)`
//! lattice over the globe. Ring expansion happens on lattice indices; the
//! `geohash` crate supplies the textual cell ids.

use super::lattice::Lattice;
use crate::error::{KnnError, Result};
use geo::Coord;

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

pub(crate) fn lattice(precision: usize) -> Lattice {
    let bits = 5 * precision as u32;
    let lon_bits = bits.div_ceil(2);
    let lat_bits = bits / 2;
    let nx = 1i64 << lon_bits;
    let ny = 1i64 << lat_bits;
    Lattice::bounded(
        Coord {
            x: -180.0,
            y: -90.0,
        },
        Coord {
            x: 360.0 / nx as f64,
            y: 180.0 / ny as f64,
        },
        nx,
        ny,
    )
}

/// Geohash string of the lattice cell `key`.
pub(crate) fn encode_cell(precision: usize, key: (i64, i64)) -> Result<String> {
    let center = lattice(precision).cell_rect(key).center();
    geohash::encode(center, precision).map_err(|e| KnnError::InvalidResolution(e.to_string()))
}

/// Precision and lattice cell of a geohash string.
pub(crate) fn decode_cell(hash: &str) -> Result<(usize, (i64, i64))> {
    let precision = hash.len();
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(KnnError::InvalidResolution(format!(
            "Geohash precision must be between {} and {}, got {}",
            MIN_PRECISION, MAX_PRECISION, precision
        )));
    }
    let bbox =
        geohash::decode_bbox(hash).map_err(|e| KnnError::InvalidResolution(e.to_string()))?;
    Ok((precision, lattice(precision).key(bbox.center())))
}
