//! Per-query ring expansion over a [`PartitionIndex`].

use super::index::PartitionIndex;
use super::tessellation::CellKey;
use crate::types::Point;
use geo::Rect;
use std::ops::Range;
use thiserror::Error;

/// A ring beyond the configured `max_ring` was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ring {requested} exceeds max ring {max_ring}")]
pub struct RingBudgetExceeded {
    pub requested: u32,
    pub max_ring: u32,
}

/// Walks increasing rings around one query point.
///
/// Candidates are cached across calls: advancing from ring `r` to `r'` only
/// collects the shells `r+1..=r'`, so callers evaluate each candidate once.
///
/// # Examples
///
/// ```
/// use spatio_knn::{CandidateExpander, Point, Tessellation, build_index};
///
/// let index = build_index(
///     vec![Point::new(1, 0.5, 0.5), Point::new(2, 2.5, 0.5)],
///     Tessellation::Grid { step: 1.0 },
/// )?;
/// let mut expander = CandidateExpander::new(&index, Point::new(0, 0.1, 0.1), Some(3));
///
/// assert_eq!(expander.candidates_at(0).unwrap().len(), 1);
/// assert_eq!(expander.candidates_at(2).unwrap().len(), 2);
/// assert!(expander.candidates_at(4).is_err());
/// # Ok::<(), spatio_knn::KnnError>(())
/// ```
#[derive(Debug)]
pub struct CandidateExpander<'a> {
    index: &'a PartitionIndex,
    query: Point,
    origin: CellKey,
    max_ring: Option<u32>,
    span: Option<(u32, u32)>,
    explored: Option<u32>,
    slots: Vec<u32>,
    scratch: Vec<CellKey>,
}

impl<'a> CandidateExpander<'a> {
    pub fn new(index: &'a PartitionIndex, query: Point, max_ring: Option<u32>) -> Self {
        let origin = index.tessellation().cell_of(query.coord());
        Self {
            index,
            query,
            origin,
            max_ring,
            span: index.ring_span(origin),
            explored: None,
            slots: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn query(&self) -> &Point {
        &self.query
    }

    /// Cell containing the query point.
    pub fn origin(&self) -> CellKey {
        self.origin
    }

    /// Highest ring collected so far.
    pub fn explored_ring(&self) -> Option<u32> {
        self.explored
    }

    /// First ring that can contain a candidate; rings before it are empty.
    pub fn first_productive_ring(&self) -> u32 {
        self.span.map_or(0, |(nearest, _)| nearest)
    }

    /// Ring at which every indexed point has been collected.
    pub fn reach(&self) -> Option<u32> {
        self.span.map(|(_, reach)| reach)
    }

    /// Whether every indexed point has been collected.
    pub fn covers_all(&self) -> bool {
        match (self.span, self.explored) {
            (None, _) => true,
            (Some((_, reach)), Some(explored)) => explored >= reach,
            (Some(_), None) => false,
        }
    }

    /// Extend the search to `ring`, returning the range of newly collected
    /// candidates (see [`points`](Self::points)). Advancing to a ring already
    /// explored yields an empty range.
    pub fn advance_to(&mut self, ring: u32) -> Result<Range<usize>, RingBudgetExceeded> {
        if let Some(max_ring) = self.max_ring
            && ring > max_ring
        {
            return Err(RingBudgetExceeded {
                requested: ring,
                max_ring,
            });
        }

        let start = self.slots.len();
        if self.explored.is_some_and(|explored| explored >= ring) {
            return Ok(start..start);
        }

        let lo = self.explored.map_or(0, |explored| explored + 1);
        if let Some((nearest, reach)) = self.span {
            let lo = lo.max(nearest);
            let hi = ring.min(reach);
            self.index
                .collect_shells(self.origin, lo, hi, &mut self.scratch, &mut self.slots);
        }
        self.explored = Some(ring);

        Ok(start..self.slots.len())
    }

    /// Candidates collected in `range`, as returned by
    /// [`advance_to`](Self::advance_to).
    pub fn points(&self, range: Range<usize>) -> impl Iterator<Item = &'a Point> + '_ {
        let index = self.index;
        self.slots[range]
            .iter()
            .map(move |&slot| index.point_at(slot))
    }

    /// Every candidate collected so far.
    pub fn cumulative(&self) -> impl Iterator<Item = &'a Point> + '_ {
        self.points(0..self.slots.len())
    }

    /// The cumulative candidate set for rings `0..=ring`.
    ///
    /// Expands if needed; asking for a ring below the explored one filters the
    /// cache instead of shrinking it.
    pub fn candidates_at(&mut self, ring: u32) -> Result<Vec<&'a Point>, RingBudgetExceeded> {
        self.advance_to(ring)?;
        if self.explored == Some(ring) {
            return Ok(self.cumulative().collect());
        }

        let tessellation = self.index.tessellation();
        let origin = self.origin;
        let within = |p: &&Point| {
            let cell = tessellation.cell_of(p.coord());
            tessellation.ring_distance(origin, cell) <= ring
        };
        Ok(self.cumulative().filter(within).collect())
    }

    /// Rectangle around the query covered by the explored rings.
    pub fn explored_extent(&self) -> Option<Rect<f64>> {
        self.explored.map(|ring| {
            self.index
                .tessellation()
                .explored_extent(self.query.coord(), self.origin, ring)
        })
    }
}
