//! Index configuration.
//!
//! Values come from defaults, optionally overlaid by a TOML file and then by
//! `IVFDB_*` environment variables (env > file > defaults).

use crate::constants;
use crate::error::{IvfError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a query does when a selected partition segment cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPartitionPolicy {
    /// Log the omission and keep scanning the remaining partitions.
    #[default]
    Skip,
    /// Fail the whole query with `MissingPartition`.
    Abort,
}

/// How inserted records reach the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Re-read the whole store and re-cluster on every insert batch.
    #[default]
    FullRebuild,
    /// Append new records to the partition of their nearest existing
    /// centroid without re-clustering. Centroids drift from the data over
    /// time; a full rebuild happens whenever the partition count implied
    /// by the store size changes.
    AssignToNearest,
}

/// Configuration for building and querying an IVF index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding dimension shared by every record.
    pub dimension: usize,
    /// Maximum Lloyd iterations per build.
    pub max_iterations: usize,
    /// Early-stop threshold on mean squared centroid movement.
    pub convergence_threshold: f32,
    /// Probe count factor: `ceil(probe_factor * sqrt(P))` partitions per query.
    pub probe_factor: f32,
    /// Seed for centroid initialization and reseeding. `None` uses entropy.
    pub seed: Option<u64>,
    /// Behavior when a partition segment is unreadable at query time.
    pub missing_partition: MissingPartitionPolicy,
    /// Behavior of `VectorDatabase::insert_records`.
    pub update_strategy: UpdateStrategy,
    /// Superseded builds kept on disk after a new build goes live.
    pub retain_builds: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: constants::record::DEFAULT_DIMENSION,
            max_iterations: constants::kmeans::DEFAULT_MAX_ITERATIONS,
            convergence_threshold: constants::kmeans::CONVERGENCE_THRESHOLD,
            probe_factor: constants::search::PROBE_FACTOR,
            seed: None,
            missing_partition: MissingPartitionPolicy::default(),
            update_strategy: UpdateStrategy::default(),
            retain_builds: constants::layout::DEFAULT_RETAIN_BUILDS,
        }
    }
}

impl IndexConfig {
    /// Create a default configuration for the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Set the maximum number of k-means iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the probe factor.
    pub fn with_probe_factor(mut self, probe_factor: f32) -> Self {
        self.probe_factor = probe_factor;
        self
    }

    /// Fix the clustering seed for reproducible builds.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the missing-partition policy.
    pub fn with_missing_partition(mut self, policy: MissingPartitionPolicy) -> Self {
        self.missing_partition = policy;
        self
    }

    /// Set the insert update strategy.
    pub fn with_update_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.update_strategy = strategy;
        self
    }

    /// Set how many superseded builds stay on disk.
    pub fn with_retain_builds(mut self, retain_builds: usize) -> Self {
        self.retain_builds = retain_builds;
        self
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(IvfError::config("dimension must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(IvfError::config("max_iterations must be >= 1"));
        }
        if !(self.probe_factor.is_finite() && self.probe_factor > 0.0) {
            return Err(IvfError::config(format!(
                "probe_factor must be a positive number, got {}",
                self.probe_factor
            )));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return Err(IvfError::config(format!(
                "convergence_threshold must be >= 0, got {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }

    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| IvfError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    IvfError::config(format!("failed to read config file {}: {e}", p.display()))
                })?;
                toml::from_str(&content)
                    .map_err(|e| IvfError::config(format!("failed to parse config: {e}")))?
            }
            None => IndexConfig::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("IVFDB_DIMENSION") {
            self.dimension = v;
        }
        if let Some(v) = env_parse("IVFDB_MAX_ITERATIONS") {
            self.max_iterations = v;
        }
        if let Some(v) = env_parse("IVFDB_PROBE_FACTOR") {
            self.probe_factor = v;
        }
        if let Some(v) = env_parse("IVFDB_SEED") {
            self.seed = Some(v);
        }
        if let Some(v) = env_parse("IVFDB_RETAIN_BUILDS") {
            self.retain_builds = v;
        }
        if let Ok(v) = std::env::var("IVFDB_MISSING_PARTITION") {
            match v.to_ascii_lowercase().as_str() {
                "skip" => self.missing_partition = MissingPartitionPolicy::Skip,
                "abort" => self.missing_partition = MissingPartitionPolicy::Abort,
                other => tracing::warn!(value = other, "ignoring unknown IVFDB_MISSING_PARTITION"),
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
