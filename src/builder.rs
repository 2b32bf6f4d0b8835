//! Builder for KNN join engines.
//!
//! Collects join settings, an optional injected metric, and validates them
//! once at [`build`](KnnJoinBuilder::build).

use crate::compute::join::KnnJoin;
use crate::compute::metric::{Metric, MetricKind};
use crate::config::{ExpansionPolicy, JoinConfig};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`KnnJoin`].
///
/// # Examples
///
/// ```
/// use spatio_knn::{ExpansionPolicy, KnnJoinBuilder, MetricKind};
///
/// let engine = KnnJoinBuilder::new()
///     .k(5)
///     .max_ring(8)
///     .expansion(ExpansionPolicy::Doubling)
///     .metric_kind(MetricKind::Geodesic)
///     .build()?;
/// assert_eq!(engine.config().k, 5);
/// assert_eq!(engine.metric().name(), "geodesic");
/// # Ok::<(), spatio_knn::KnnError>(())
/// ```
#[derive(Debug, Default)]
pub struct KnnJoinBuilder {
    config: JoinConfig,
    metric: Option<Arc<dyn Metric>>,
}

impl KnnJoinBuilder {
    /// Start from [`JoinConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all settings with `config`.
    pub fn config(mut self, config: JoinConfig) -> Self {
        self.config = config;
        self
    }

    pub fn k(mut self, k: usize) -> Self {
        self.config = self.config.with_k(k);
        self
    }

    pub fn initial_ring(mut self, ring: u32) -> Self {
        self.config = self.config.with_initial_ring(ring);
        self
    }

    pub fn max_ring(mut self, ring: u32) -> Self {
        self.config = self.config.with_max_ring(Some(ring));
        self
    }

    /// Expand until saturation with no ring budget.
    pub fn unbounded(mut self) -> Self {
        self.config = self.config.with_max_ring(None);
        self
    }

    pub fn expansion(mut self, policy: ExpansionPolicy) -> Self {
        self.config = self.config.with_expansion(policy);
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config = self.config.with_time_budget(Some(budget));
        self
    }

    /// Only consider candidates within `meters` of the query.
    pub fn max_distance(mut self, meters: f64) -> Self {
        self.config = self.config.with_max_distance(Some(meters));
        self
    }

    /// Use a built-in metric. Clears any injected metric.
    pub fn metric_kind(mut self, kind: MetricKind) -> Self {
        self.config = self.config.with_metric(kind);
        self.metric = None;
        self
    }

    /// Inject a custom metric. Its lower bound must hold for the
    /// tessellation it is used with.
    pub fn metric(mut self, metric: Arc<dyn Metric>) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config = self.config.with_parallel(parallel);
        self
    }

    pub fn build(self) -> Result<KnnJoin> {
        match self.metric {
            Some(metric) => KnnJoin::with_metric(self.config, metric),
            None => KnnJoin::new(self.config),
        }
    }
}
