//! Configuration for index construction and KNN joins.
//!
//! Configs are plain serde structs. Unknown fields are rejected and every
//! field has a default, so a config file only needs the settings it changes:
//!
//! ```json
//! {
//!   "index": { "tessellation": { "kind": "hex", "size": 0.002 } },
//!   "join": { "k": 5, "max_ring": 8, "max_distance_m": 1000.0 }
//! }
//! ```

use crate::compute::metric::MetricKind;
use crate::compute::spatial::Tessellation;
use crate::error::{KnnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How the search ring grows between verification checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionPolicy {
    /// `r → r + 1`
    #[default]
    Linear,
    /// `r → 2r` (`0 → 1`). Fewer checks when the initial ring under-collects,
    /// at the cost of evaluating up to one over-wide shell.
    Doubling,
}

impl ExpansionPolicy {
    #[inline]
    pub fn next_ring(self, ring: u32) -> u32 {
        match self {
            ExpansionPolicy::Linear => ring.saturating_add(1),
            ExpansionPolicy::Doubling => ring.saturating_mul(2).max(ring.saturating_add(1)),
        }
    }
}

/// Partition index settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default)]
    pub tessellation: Tessellation,
}

impl IndexConfig {
    pub fn with_tessellation(mut self, tessellation: Tessellation) -> Self {
        self.tessellation = tessellation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.tessellation.validate()
    }
}

/// Per-join search settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinConfig {
    /// Neighbors per query point.
    #[serde(default = "JoinConfig::default_k")]
    pub k: usize,

    /// Ring the search starts from. Rings below the nearest occupied cell are
    /// skipped regardless.
    #[serde(default)]
    pub initial_ring: u32,

    /// Ring budget per query; `None` expands until saturation.
    #[serde(default)]
    pub max_ring: Option<u32>,

    #[serde(default)]
    pub expansion: ExpansionPolicy,

    /// Wall-clock budget per query in milliseconds.
    #[serde(default)]
    pub time_budget_ms: Option<u64>,

    /// Ignore candidates farther than this (metric units).
    #[serde(default)]
    pub max_distance_m: Option<f64>,

    #[serde(default)]
    pub metric: MetricKind,

    /// Search queries on the rayon pool.
    #[serde(default = "JoinConfig::default_parallel")]
    pub parallel: bool,
}

impl JoinConfig {
    const fn default_k() -> usize {
        1
    }

    const fn default_parallel() -> bool {
        true
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_initial_ring(mut self, ring: u32) -> Self {
        self.initial_ring = ring;
        self
    }

    pub fn with_max_ring(mut self, max_ring: Option<u32>) -> Self {
        self.max_ring = max_ring;
        self
    }

    pub fn with_expansion(mut self, expansion: ExpansionPolicy) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget_ms = budget.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_max_distance(mut self, meters: Option<f64>) -> Self {
        self.max_distance_m = meters;
        self
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(KnnError::InvalidK(self.k));
        }

        if let Some(max_ring) = self.max_ring
            && self.initial_ring > max_ring
        {
            return Err(KnnError::InvalidConfig(format!(
                "initial_ring ({}) must be <= max_ring ({})",
                self.initial_ring, max_ring
            )));
        }

        if let Some(cap) = self.max_distance_m
            && !(cap.is_finite() && cap >= 0.0)
        {
            return Err(KnnError::InvalidConfig(format!(
                "max_distance_m must be a finite non-negative number, got {}",
                cap
            )));
        }

        if self.time_budget_ms == Some(0) {
            return Err(KnnError::InvalidConfig(
                "time_budget_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            k: Self::default_k(),
            initial_ring: 0,
            max_ring: None,
            expansion: ExpansionPolicy::default(),
            time_budget_ms: None,
            max_distance_m: None,
            metric: MetricKind::default(),
            parallel: Self::default_parallel(),
        }
    }
}

/// Combined index and join configuration, as loaded from a file.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub join: JoinConfig,
}

impl Config {
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    pub fn with_join(mut self, join: JoinConfig) -> Self {
        self.join = join;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.index.validate()?;
        self.join.validate()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file, picking the format from the extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml(&contents),
            other => Err(KnnError::InvalidConfig(format!(
                "Unsupported config file extension: {:?}",
                other
            ))),
        }
    }
}
