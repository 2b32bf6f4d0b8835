//! Verified ring-expansion KNN join.
//!
//! Each query point runs a small state machine:
//!
//! ```text
//! Initial ──► Expanding ──┬──► Saturated   (K best proven, or every candidate seen)
//!                 ▲       ├──► Capped      (everything within max_distance seen)
//!                 └───────┴──► Exhausted   (budget hit, or a distance was NaN)
//! ```
//!
//! A ring is only trusted once the metric's lower bound on the distance to
//! anything outside the explored rings is strictly greater than the current
//! K-th distance. Having K candidates is never enough on its own: a closer
//! point can sit just across an unexplored cell boundary.

use super::metric::Metric;
use super::report::CompletenessReport;
use super::spatial::{CandidateExpander, PartitionIndex};
use super::store::CoordinateStore;
use super::topk::TopKAccumulator;
use super::validation::validate_point;
use super::verify::{self, VerificationReport};
use crate::builder::KnnJoinBuilder;
use crate::config::JoinConfig;
use crate::error::{KnnError, Result};
use crate::types::{ExhaustionReason, JoinResult, Point, QueryResult, SearchState};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// KNN join engine: a validated [`JoinConfig`] plus the metric it runs with.
///
/// The engine holds no per-join state and can be shared across threads and
/// reused against any number of indexes.
#[derive(Debug, Clone)]
pub struct KnnJoin {
    config: JoinConfig,
    metric: Arc<dyn Metric>,
}

impl KnnJoin {
    /// Engine using the config's built-in metric.
    pub fn new(config: JoinConfig) -> Result<Self> {
        let metric = config.metric.metric();
        Self::with_metric(config, metric)
    }

    /// Engine using an injected metric; `config.metric` is ignored.
    pub fn with_metric(config: JoinConfig, metric: Arc<dyn Metric>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, metric })
    }

    pub fn builder() -> KnnJoinBuilder {
        KnnJoinBuilder::new()
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn metric(&self) -> &Arc<dyn Metric> {
        &self.metric
    }

    /// Join every query point against `index`.
    ///
    /// Fails with [`KnnError::InvalidCoordinate`] when a query point is not
    /// valid in the index's coordinate space. Per-query budget exhaustion is
    /// reported on that query's result and in the logged
    /// [`CompletenessReport`]; it never fails the join.
    pub fn join(&self, queries: &CoordinateStore, index: &PartitionIndex) -> Result<JoinResult> {
        validate_queries(queries.as_slice(), index)?;
        let result = self.run(queries.as_slice(), index);
        CompletenessReport::from_result(&result).log_summary();
        Ok(result)
    }

    /// Re-run only the exhausted queries of `previous` with a wider ring
    /// budget, and merge the new results in.
    ///
    /// `max_ring` of `None` removes the ring budget entirely.
    pub fn retry_exhausted(
        &self,
        previous: &JoinResult,
        queries: &CoordinateStore,
        index: &PartitionIndex,
        max_ring: Option<u32>,
    ) -> Result<JoinResult> {
        if previous.k() != self.config.k {
            return Err(KnnError::InvalidConfig(format!(
                "Cannot retry a k={} join with k={}",
                previous.k(),
                self.config.k
            )));
        }

        let exhausted = previous.exhausted_ids();
        if exhausted.is_empty() {
            return Ok(previous.clone());
        }

        let widened = Self::with_metric(
            self.config.with_max_ring(max_ring),
            Arc::clone(&self.metric),
        )?;
        log::debug!(
            "Retrying {} exhausted queries with max_ring {:?}",
            exhausted.len(),
            max_ring
        );

        let retry_queries = queries.subset(&exhausted);
        validate_queries(retry_queries.as_slice(), index)?;
        let retried = widened.run(retry_queries.as_slice(), index);

        let mut merged = previous.clone();
        merged.merge(retried.results().to_vec());
        CompletenessReport::from_result(&merged).log_summary();
        Ok(merged)
    }

    /// Compare up to `sample` queries of `result` against a brute-force scan
    /// of `candidates` under this engine's metric and distance cap.
    pub fn verify_sample(
        &self,
        result: &JoinResult,
        queries: &CoordinateStore,
        candidates: &CoordinateStore,
        sample: usize,
    ) -> VerificationReport {
        verify::verify_sample(
            result,
            queries,
            candidates,
            self.metric.as_ref(),
            self.config.max_distance_m,
            sample,
        )
    }

    fn run(&self, queries: &[Point], index: &PartitionIndex) -> JoinResult {
        log::debug!(
            "Join: {} queries x {} candidates, k={}, rings {}..{:?}, {:?}, metric {}",
            queries.len(),
            index.len(),
            self.config.k,
            self.config.initial_ring,
            self.config.max_ring,
            self.config.expansion,
            self.metric.name()
        );

        let results: Vec<QueryResult> = if self.config.parallel {
            queries.par_iter().map(|q| self.expand(q, index)).collect()
        } else {
            queries.iter().map(|q| self.expand(q, index)).collect()
        };

        JoinResult::new(self.config.k, index.len(), results)
    }

    /// Run the expand → evaluate → check loop for one query point.
    ///
    /// Fails with [`KnnError::InvalidCoordinate`] when the index cannot place
    /// `query`.
    pub fn search(&self, query: &Point, index: &PartitionIndex) -> Result<QueryResult> {
        validate_query(query, index)?;
        Ok(self.expand(query, index))
    }

    fn expand(&self, query: &Point, index: &PartitionIndex) -> QueryResult {
        let k = self.config.k;
        let cap = self.config.max_distance_m;
        let expected = k.min(index.len());
        let deadline = self
            .config
            .time_budget()
            .map(|budget| Instant::now() + budget);
        let max_ring = self.config.max_ring.unwrap_or(u32::MAX);

        let mut expander = CandidateExpander::new(index, *query, self.config.max_ring);
        let mut acc = TopKAccumulator::new(query.id, k);
        let q = query.coord();
        let mut evaluated = 0usize;
        let mut unranked = 0usize;

        let mut ring = self
            .config
            .initial_ring
            .max(expander.first_productive_ring())
            .min(max_ring);

        let state = loop {
            let delta = match expander.advance_to(ring) {
                Ok(delta) => delta,
                Err(err) => {
                    log::trace!("Query {}: {}", query.id, err);
                    break SearchState::Exhausted(ExhaustionReason::RingBudget);
                }
            };

            for candidate in expander.points(delta) {
                evaluated += 1;
                let distance = self.metric.distance(q, candidate.coord());
                if distance.is_nan() {
                    unranked += 1;
                } else if cap.is_none_or(|cap| distance <= cap) {
                    acc.offer(candidate.id, distance);
                }
            }

            if expander.covers_all() || evaluated == index.len() {
                break if acc.len() == expected {
                    SearchState::Saturated
                } else if cap.is_some() {
                    SearchState::Capped
                } else {
                    SearchState::Exhausted(ExhaustionReason::UnrankedDistance)
                };
            }

            let bound = expander
                .explored_extent()
                .map_or(0.0, |rect| self.metric.lower_bound_outside(q, &rect));

            if acc.is_full() && bound > acc.kth_distance() {
                break SearchState::Saturated;
            }
            if let Some(cap) = cap
                && bound > cap
            {
                break SearchState::Capped;
            }
            if ring >= max_ring {
                break SearchState::Exhausted(ExhaustionReason::RingBudget);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break SearchState::Exhausted(ExhaustionReason::TimeBudget);
            }

            let mut next = self.config.expansion.next_ring(ring).min(max_ring);
            if let Some(reach) = expander.reach() {
                next = next.min(reach);
            }
            log::trace!(
                "Query {}: ring {} -> {}, {} held, k-th {:.3}, bound {:.3}",
                query.id,
                ring,
                next,
                acc.len(),
                acc.kth_distance(),
                bound
            );
            ring = next;
        };

        // A candidate that could not be ranked may belong in the result.
        let state = if unranked > 0 && !matches!(state, SearchState::Exhausted(_)) {
            log::warn!(
                "Query {}: metric {} returned NaN for {} candidates",
                query.id,
                self.metric.name(),
                unranked
            );
            SearchState::Exhausted(ExhaustionReason::UnrankedDistance)
        } else {
            state
        };

        log::trace!(
            "Query {}: {:?} at ring {} after {} candidates",
            query.id,
            state,
            ring,
            evaluated
        );

        QueryResult {
            query_id: query.id,
            entries: acc.into_sorted(),
            state,
            rings_explored: expander.explored_ring().unwrap_or(0),
            candidates_evaluated: evaluated,
        }
    }
}

/// One-shot KNN join of `queries` against `index` with default settings for
/// everything but the ring window and metric.
///
/// Fails with [`KnnError::InvalidK`] when `k` is zero, and with
/// [`KnnError::InvalidCoordinate`] on the first query point that is NaN, out
/// of range, or outside the cell range of the index.
///
/// # Examples
///
/// ```
/// use spatio_knn::{Point, Tessellation, build_index, knn_join, MetricKind};
///
/// let index = build_index(
///     vec![
///         Point::new(10, -74.0010, 40.7100),
///         Point::new(11, -74.0050, 40.7130),
///         Point::new(12, -73.9000, 40.8000),
///     ],
///     Tessellation::Grid { step: 0.002 },
/// )?;
/// let queries = vec![Point::new(1, -74.0020, 40.7110)];
///
/// let result = knn_join(&queries, &index, 2, 0, None, MetricKind::Haversine.metric())?;
/// let nearest = result.get(1).unwrap();
/// assert!(nearest.saturated());
/// assert_eq!(nearest.candidate_ids(), vec![10, 11]);
/// # Ok::<(), spatio_knn::KnnError>(())
/// ```
pub fn knn_join(
    queries: &[Point],
    index: &PartitionIndex,
    k: usize,
    initial_ring: u32,
    max_ring: Option<u32>,
    metric: Arc<dyn Metric>,
) -> Result<JoinResult> {
    let config = JoinConfig::default()
        .with_k(k)
        .with_initial_ring(initial_ring)
        .with_max_ring(max_ring);
    let engine = KnnJoin::with_metric(config, metric)?;
    validate_queries(queries, index)?;
    let result = engine.run(queries, index);
    CompletenessReport::from_result(&result).log_summary();
    Ok(result)
}

/// Rejects a query point the index cannot place: invalid for the index's
/// coordinate space, or beyond the cell range of its tessellation.
fn validate_query(query: &Point, index: &PartitionIndex) -> Result<()> {
    validate_point(query, index.space())?;
    if !index.tessellation().in_cell_range(query.coord()) {
        return Err(KnnError::InvalidCoordinate {
            id: query.id,
            reason: format!(
                "({}, {}) is beyond the cell range of {:?}",
                query.lon,
                query.lat,
                index.tessellation()
            ),
        });
    }
    Ok(())
}

fn validate_queries(queries: &[Point], index: &PartitionIndex) -> Result<()> {
    queries.iter().try_for_each(|q| validate_query(q, index))
}
