//! Brute-force checks of join results.
//!
//! An `O(n·m)` scan is the ground truth the ring search must reproduce. It is
//! meant for tests and for spot-checking a sample of a production join.

use super::metric::Metric;
use super::store::CoordinateStore;
use super::topk::TopKAccumulator;
use crate::types::{JoinResult, Point, PointId, ResultEntry};
use rustc_hash::FxHashMap;

/// Exact K nearest `candidates` of `query`, ties by ascending id.
///
/// Candidates farther than `max_distance` are ignored when a cap is given.
pub fn brute_force_knn(
    query: &Point,
    candidates: &[Point],
    k: usize,
    metric: &dyn Metric,
    max_distance: Option<f64>,
) -> Vec<ResultEntry> {
    let mut acc = TopKAccumulator::new(query.id, k);
    let q = query.coord();
    for candidate in candidates {
        let distance = metric.distance(q, candidate.coord());
        if max_distance.is_none_or(|cap| distance <= cap) {
            acc.offer(candidate.id, distance);
        }
    }
    acc.into_sorted()
}

/// A query whose joined neighbors differ from the brute-force answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub query_id: PointId,
    pub expected: Vec<ResultEntry>,
    pub actual: Vec<ResultEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    /// Queries compared against brute force.
    pub checked: usize,
    /// Sampled queries skipped because their search was exhausted.
    pub skipped: usize,
    pub mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare up to `sample` non-exhausted queries of `result` against brute
/// force.
///
/// Queries are picked at an even stride over the id-ordered results, so the
/// same inputs always check the same queries. Exhausted queries make no
/// exactness claim and are counted as skipped.
pub fn verify_sample(
    result: &JoinResult,
    queries: &CoordinateStore,
    candidates: &CoordinateStore,
    metric: &dyn Metric,
    max_distance: Option<f64>,
    sample: usize,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    if sample == 0 || result.is_empty() {
        return report;
    }

    let by_id: FxHashMap<PointId, &Point> = queries.iter().map(|p| (p.id, p)).collect();
    let stride = result.len().div_ceil(sample).max(1);

    for query_result in result.iter().step_by(stride) {
        if query_result.is_exhausted() {
            report.skipped += 1;
            continue;
        }
        let Some(query) = by_id.get(&query_result.query_id) else {
            log::warn!(
                "Query {} not found in query store; skipping verification",
                query_result.query_id
            );
            report.skipped += 1;
            continue;
        };

        let expected = brute_force_knn(
            query,
            candidates.as_slice(),
            result.k(),
            metric,
            max_distance,
        );
        report.checked += 1;
        if expected != query_result.entries {
            report.mismatches.push(Mismatch {
                query_id: query_result.query_id,
                expected,
                actual: query_result.entries.clone(),
            });
        }
    }

    if !report.is_clean() {
        log::warn!(
            "{} of {} sampled queries differ from brute force",
            report.mismatches.len(),
            report.checked
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::metric::Planar;

    fn candidates() -> Vec<Point> {
        vec![
            Point::new(4, 2.0, 0.0),
            Point::new(2, 1.0, 0.0),
            Point::new(3, -1.0, 0.0),
            Point::new(1, 0.0, 3.0),
        ]
    }

    #[test]
    fn test_brute_force_orders_ties_by_id() {
        let query = Point::new(0, 0.0, 0.0);
        let result = brute_force_knn(&query, &candidates(), 3, &Planar, None);
        let ids: Vec<_> = result.iter().map(|e| e.candidate_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_brute_force_respects_cap() {
        let query = Point::new(0, 0.0, 0.0);
        let result = brute_force_knn(&query, &candidates(), 4, &Planar, Some(1.5));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_verify_sample_flags_mismatch() {
        use crate::types::{QueryResult, SearchState};

        let queries = CoordinateStore::try_new(vec![Point::new(0, 0.0, 0.0)]).unwrap();
        let candidates = CoordinateStore::try_new(candidates()).unwrap();
        let wrong = QueryResult {
            query_id: 0,
            entries: vec![ResultEntry {
                query_id: 0,
                candidate_id: 4,
                distance: 2.0,
            }],
            state: SearchState::Saturated,
            rings_explored: 0,
            candidates_evaluated: 1,
        };
        let result = JoinResult::new(1, 4, vec![wrong]);

        let report = verify_sample(&result, &queries, &candidates, &Planar, None, 10);
        assert_eq!(report.checked, 1);
        assert!(!report.is_clean());
        assert_eq!(report.mismatches[0].expected[0].candidate_id, 2);
    }
}
