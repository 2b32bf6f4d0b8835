//! Core value types: input points, ranked neighbors and join results.

use crate::error::Result;
use geo::Coord;
use serde::{Deserialize, Serialize};

/// Identifier of a query or candidate point.
pub type PointId = u64;

/// An identified coordinate.
///
/// `lon`/`lat` are degrees for geographic stores, or projected units when the
/// owning [`CoordinateStore`](crate::CoordinateStore) is projected.
///
/// # Examples
///
/// ```
/// use spatio_knn::Point;
///
/// let hydrant = Point::new(7, -74.0060, 40.7128);
/// assert_eq!(hydrant.id, 7);
/// assert_eq!(hydrant.coord().x, -74.0060);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    #[inline]
    pub fn new(id: PointId, lon: f64, lat: f64) -> Self {
        Self { id, lon, lat }
    }

    /// The point as a `geo` coordinate (`x` = lon, `y` = lat).
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    #[inline]
    pub fn to_geo(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

/// One ranked neighbor of a query point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub query_id: PointId,
    pub candidate_id: PointId,
    /// Metric distance, meters for the geographic metrics.
    pub distance: f64,
}

/// Why a search stopped before it could prove its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// `max_ring` was reached.
    RingBudget,
    /// The per-query wall-clock budget elapsed.
    TimeBudget,
    /// The metric returned NaN for some candidates, so they could not be
    /// ranked.
    UnrankedDistance,
}

/// Terminal state of one query's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// The result holds `min(k, |B|)` entries and no unexplored cell can
    /// improve it.
    Saturated,
    /// A distance cap was set and fewer than `min(k, |B|)` candidates lie
    /// within it. The entries are exactly the neighbors inside the cap.
    Capped,
    /// The search stopped on a budget or could not rank every candidate; the
    /// result may be short or may have an unverified suffix.
    Exhausted(ExhaustionReason),
}

/// The ranked neighbors of a single query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: PointId,
    /// Sorted by non-decreasing distance, ties by ascending candidate id.
    pub entries: Vec<ResultEntry>,
    pub state: SearchState,
    /// Last ring whose cells were fully evaluated.
    pub rings_explored: u32,
    /// Number of candidate distances computed for this query.
    pub candidates_evaluated: usize,
}

impl QueryResult {
    #[inline]
    pub fn saturated(&self) -> bool {
        self.state == SearchState::Saturated
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, SearchState::Exhausted(_))
    }

    /// The ring at which an unsaturated search stopped.
    pub fn stop_ring(&self) -> Option<u32> {
        (!self.saturated()).then_some(self.rings_explored)
    }

    /// Distance of the last (farthest) entry.
    pub fn max_distance(&self) -> Option<f64> {
        self.entries.last().map(|e| e.distance)
    }

    pub fn candidate_ids(&self) -> Vec<PointId> {
        self.entries.iter().map(|e| e.candidate_id).collect()
    }
}

/// Per-query results of one join invocation.
///
/// Results are kept sorted by query id so that identical inputs serialize to
/// identical bytes regardless of input order or scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResult {
    k: usize,
    candidate_count: usize,
    results: Vec<QueryResult>,
}

impl JoinResult {
    pub(crate) fn new(k: usize, candidate_count: usize, mut results: Vec<QueryResult>) -> Self {
        results.sort_by_key(|r| r.query_id);
        Self {
            k,
            candidate_count,
            results,
        }
    }

    /// The `k` this join was run with.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of candidate points in the index the join ran against.
    pub fn candidate_count(&self) -> usize {
        self.candidate_count
    }

    /// Expected result length for a saturated query: `min(k, |B|)`.
    pub fn expected_len(&self) -> usize {
        self.k.min(self.candidate_count)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, query_id: PointId) -> Option<&QueryResult> {
        self.results
            .binary_search_by_key(&query_id, |r| r.query_id)
            .ok()
            .map(|idx| &self.results[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryResult> {
        self.results.iter()
    }

    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    /// `true` when no query ran out of budget.
    pub fn is_complete(&self) -> bool {
        !self.results.iter().any(QueryResult::is_exhausted)
    }

    /// Ids of queries whose search was exhausted, ascending.
    pub fn exhausted_ids(&self) -> Vec<PointId> {
        self.results
            .iter()
            .filter(|r| r.is_exhausted())
            .map(|r| r.query_id)
            .collect()
    }

    /// Replace results for the queries present in `updates`.
    pub(crate) fn merge(&mut self, updates: Vec<QueryResult>) {
        for update in updates {
            match self
                .results
                .binary_search_by_key(&update.query_id, |r| r.query_id)
            {
                Ok(idx) => self.results[idx] = update,
                Err(idx) => self.results.insert(idx, update),
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'a> IntoIterator for &'a JoinResult {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(query_id: PointId, state: SearchState) -> QueryResult {
        QueryResult {
            query_id,
            entries: vec![ResultEntry {
                query_id,
                candidate_id: 1,
                distance: 10.0,
            }],
            state,
            rings_explored: 2,
            candidates_evaluated: 4,
        }
    }

    #[test]
    fn test_results_sorted_by_query_id() {
        let join = JoinResult::new(
            1,
            10,
            vec![
                result(3, SearchState::Saturated),
                result(1, SearchState::Saturated),
                result(2, SearchState::Saturated),
            ],
        );
        let ids: Vec<_> = join.iter().map(|r| r.query_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(join.get(2).map(|r| r.query_id), Some(2));
        assert!(join.get(9).is_none());
    }

    #[test]
    fn test_stop_ring_only_when_unsaturated() {
        let done = result(1, SearchState::Saturated);
        assert_eq!(done.stop_ring(), None);

        let partial = result(2, SearchState::Exhausted(ExhaustionReason::RingBudget));
        assert_eq!(partial.stop_ring(), Some(2));
        assert!(partial.is_exhausted());
    }

    #[test]
    fn test_completeness_and_merge() {
        let mut join = JoinResult::new(
            1,
            10,
            vec![
                result(1, SearchState::Saturated),
                result(2, SearchState::Exhausted(ExhaustionReason::TimeBudget)),
            ],
        );
        assert!(!join.is_complete());
        assert_eq!(join.exhausted_ids(), vec![2]);

        join.merge(vec![result(2, SearchState::Saturated)]);
        assert!(join.is_complete());
        assert_eq!(join.len(), 2);
    }

    #[test]
    fn test_json_round_trip_keeps_state() {
        let join = JoinResult::new(
            1,
            3,
            vec![result(5, SearchState::Exhausted(ExhaustionReason::RingBudget))],
        );
        let json = join.to_json().unwrap();
        assert!(json.contains("ring_budget"));
        let back = JoinResult::from_json(&json).unwrap();
        assert_eq!(back, join);
    }
}
