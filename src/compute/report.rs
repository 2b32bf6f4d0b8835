//! Completeness reporting for join results.

use crate::types::{JoinResult, PointId, SearchState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distribution of candidates evaluated per query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub min: usize,
    pub mean: f64,
    pub max: usize,
    pub p95: usize,
}

/// Distribution of the K-th neighbor distance over queries holding K entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Summary of how many queries were answered exactly.
///
/// The `Display` impl always distinguishes a fully correct join from one where
/// some queries ran out of budget:
///
/// ```text
/// complete: 1000 queries, 1000 saturated (k=5)
/// INCOMPLETE: 12 of 1000 queries exhausted, 988 saturated (k=5)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub k: usize,
    pub total: usize,
    pub saturated: usize,
    /// Queries that found every neighbor within the distance cap, but fewer
    /// than `min(k, |B|)` of them.
    pub capped: usize,
    pub exhausted: usize,
    /// Ids of exhausted queries, ascending.
    pub exhausted_ids: Vec<PointId>,
    /// Queries holding fewer than `k` entries, for any reason.
    pub fewer_than_k: usize,
    pub candidates: Option<CandidateStats>,
    pub kth_distance: Option<DistanceStats>,
}

impl CompletenessReport {
    pub fn from_result(result: &JoinResult) -> Self {
        let k = result.k();
        let mut report = Self {
            k,
            total: result.len(),
            saturated: 0,
            capped: 0,
            exhausted: 0,
            exhausted_ids: Vec::new(),
            fewer_than_k: 0,
            candidates: None,
            kth_distance: None,
        };

        let mut evaluated = Vec::with_capacity(result.len());
        let mut kth = Vec::new();

        for query in result {
            match query.state {
                SearchState::Saturated => report.saturated += 1,
                SearchState::Capped => report.capped += 1,
                SearchState::Exhausted(_) => {
                    report.exhausted += 1;
                    report.exhausted_ids.push(query.query_id);
                }
            }
            if query.entries.len() < k {
                report.fewer_than_k += 1;
            } else if let Some(entry) = k.checked_sub(1).and_then(|i| query.entries.get(i)) {
                kth.push(entry.distance);
            }
            evaluated.push(query.candidates_evaluated);
        }

        report.candidates = candidate_stats(&mut evaluated);
        report.kth_distance = distance_stats(&kth);
        report
    }

    /// `true` when no query ran out of budget.
    pub fn is_complete(&self) -> bool {
        self.exhausted == 0
    }

    /// Log the summary: `info` when complete, `warn` otherwise.
    pub fn log_summary(&self) {
        if self.is_complete() {
            log::info!("{}", self);
        } else {
            log::warn!("{}", self);
        }
    }
}

fn candidate_stats(values: &mut [usize]) -> Option<CandidateStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let n = values.len();
    let sum: usize = values.iter().sum();
    // Nearest-rank percentile.
    let rank = (0.95 * n as f64).ceil() as usize;
    Some(CandidateStats {
        min: values[0],
        mean: sum as f64 / n as f64,
        max: values[n - 1],
        p95: values[rank.clamp(1, n) - 1],
    })
}

fn distance_stats(values: &[f64]) -> Option<DistanceStats> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(DistanceStats { min, mean, max })
}

impl fmt::Display for CompletenessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complete() {
            write!(
                f,
                "complete: {} queries, {} saturated",
                self.total, self.saturated
            )?;
        } else {
            write!(
                f,
                "INCOMPLETE: {} of {} queries exhausted, {} saturated",
                self.exhausted, self.total, self.saturated
            )?;
        }
        if self.capped > 0 {
            write!(f, ", {} capped", self.capped)?;
        }
        write!(f, " (k={})", self.k)?;

        if self.fewer_than_k > 0 {
            write!(f, "; {} with fewer than k results", self.fewer_than_k)?;
        }
        if let Some(c) = &self.candidates {
            write!(
                f,
                "; candidates/query min {} mean {:.1} max {} p95 {}",
                c.min, c.mean, c.max, c.p95
            )?;
        }
        if let Some(d) = &self.kth_distance {
            write!(
                f,
                "; k-th distance min {:.1} mean {:.1} max {:.1}",
                d.min, d.mean, d.max
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExhaustionReason, QueryResult, ResultEntry};

    fn query(id: PointId, distances: &[f64], state: SearchState, evaluated: usize) -> QueryResult {
        QueryResult {
            query_id: id,
            entries: distances
                .iter()
                .enumerate()
                .map(|(i, &distance)| ResultEntry {
                    query_id: id,
                    candidate_id: i as PointId,
                    distance,
                })
                .collect(),
            state,
            rings_explored: 1,
            candidates_evaluated: evaluated,
        }
    }

    #[test]
    fn test_complete_report() {
        let result = JoinResult::new(
            2,
            10,
            vec![
                query(1, &[1.0, 4.0], SearchState::Saturated, 5),
                query(2, &[2.0, 6.0], SearchState::Saturated, 7),
            ],
        );
        let report = CompletenessReport::from_result(&result);

        assert!(report.is_complete());
        assert_eq!(report.saturated, 2);
        assert_eq!(report.fewer_than_k, 0);
        assert_eq!(
            report.kth_distance,
            Some(DistanceStats {
                min: 4.0,
                mean: 5.0,
                max: 6.0
            })
        );
        assert!(report.to_string().starts_with("complete: 2 queries"));
    }

    #[test]
    fn test_incomplete_report_names_exhausted() {
        let ring_budget = SearchState::Exhausted(ExhaustionReason::RingBudget);
        let result = JoinResult::new(
            3,
            10,
            vec![
                query(5, &[1.0], ring_budget, 1),
                query(1, &[1.0, 2.0, 3.0], SearchState::Saturated, 9),
                query(3, &[1.0], SearchState::Capped, 2),
            ],
        );
        let report = CompletenessReport::from_result(&result);

        assert!(!report.is_complete());
        assert_eq!(report.exhausted_ids, vec![5]);
        assert_eq!(report.capped, 1);
        assert_eq!(report.fewer_than_k, 2);
        let text = report.to_string();
        assert!(text.starts_with("INCOMPLETE: 1 of 3 queries exhausted"), "{text}");
        assert!(text.contains("1 capped"));
    }

    #[test]
    fn test_candidate_percentile() {
        let mut values: Vec<usize> = (1..=100).collect();
        let stats = candidate_stats(&mut values).unwrap();
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 100);
        assert_eq!(stats.p95, 95);
        assert!((stats.mean - 50.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_result() {
        let report = CompletenessReport::from_result(&JoinResult::new(1, 0, Vec::new()));
        assert!(report.is_complete());
        assert!(report.candidates.is_none());
        assert!(report.kth_distance.is_none());
    }
}
