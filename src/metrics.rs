//! Statistics for index monitoring.
//!
//! [`IndexStatistics`] describes a published build: how many records it
//! covers and how evenly k-means spread them over partitions. A very uneven
//! spread means some probes scan far more rows than others.
//!
//! ```ignore
//! let stats = db.statistics().expect("index built");
//! println!("{}", stats.summary());
//! // IndexStatistics:
//! //   Build: 01J9Z3...
//! //   Records: 1000, Dimension: 70
//! //   Partitions: 32 (min=25, max=38, mean=31.3, std=3.2, empty=0)
//! //   Probes per query: 9
//! ```
//!
//! [`SearchStatistics`] profiles a single query:
//!
//! ```ignore
//! let (results, stats) = db.query_with_stats(&query, 10)?;
//! println!("took {:.3}ms, scanned {} records", stats.query_time_ms(), stats.vectors_scanned);
//! ```

use crate::index::{probe_count, IvfIndex};
use crate::types::BuildId;
use std::time::Duration;

/// Statistics about one published IVF build.
#[derive(Clone, Debug)]
pub struct IndexStatistics {
    /// Build the statistics describe.
    pub build_id: BuildId,
    /// Total number of indexed records.
    pub num_records: usize,
    /// Number of partitions.
    pub num_partitions: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Smallest partition.
    pub partition_size_min: usize,
    /// Largest partition.
    pub partition_size_max: usize,
    /// Mean partition size.
    pub partition_size_mean: f32,
    /// Standard deviation of partition sizes.
    pub partition_size_std: f32,
    /// Partitions that hold no records.
    pub empty_partitions: usize,
    /// Partitions probed by a default query.
    pub probes: usize,
    /// Lloyd iterations the build ran.
    pub kmeans_iterations: usize,
}

impl IndexStatistics {
    /// Compute statistics from an index snapshot's manifest.
    pub fn from_index(index: &IvfIndex) -> Self {
        let sizes = &index.manifest().partition_sizes;
        let n = sizes.len().max(1) as f32;
        let mean = sizes.iter().sum::<usize>() as f32 / n;
        let variance = sizes
            .iter()
            .map(|&s| {
                let d = s as f32 - mean;
                d * d
            })
            .sum::<f32>()
            / n;

        Self {
            build_id: index.build_id(),
            num_records: index.len(),
            num_partitions: index.num_partitions(),
            dimension: index.dimension(),
            partition_size_min: sizes.iter().copied().min().unwrap_or(0),
            partition_size_max: sizes.iter().copied().max().unwrap_or(0),
            partition_size_mean: mean,
            partition_size_std: variance.sqrt(),
            empty_partitions: sizes.iter().filter(|&&s| s == 0).count(),
            probes: probe_count(index.num_partitions(), index.probe_factor()),
            kmeans_iterations: index.manifest().kmeans_iterations,
        }
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "IndexStatistics:\n  \
             Build: {}\n  \
             Records: {}, Dimension: {}\n  \
             Partitions: {} (min={}, max={}, mean={:.1}, std={:.1}, empty={})\n  \
             Probes per query: {}\n  \
             k-means iterations: {}",
            self.build_id,
            self.num_records,
            self.dimension,
            self.num_partitions,
            self.partition_size_min,
            self.partition_size_max,
            self.partition_size_mean,
            self.partition_size_std,
            self.empty_partitions,
            self.probes,
            self.kmeans_iterations
        )
    }
}

/// Statistics about a single search operation.
#[derive(Clone, Debug, Default)]
pub struct SearchStatistics {
    /// Total query execution time.
    pub query_time: Duration,
    /// Number of partitions probed.
    pub partitions_probed: usize,
    /// Number of records scored.
    pub vectors_scanned: usize,
    /// Probed partitions whose segment could not be read.
    pub skipped_partitions: Vec<usize>,
}

impl SearchStatistics {
    /// Get query time in milliseconds.
    pub fn query_time_ms(&self) -> f32 {
        self.query_time.as_secs_f32() * 1000.0
    }

    /// True when every probed partition was scanned.
    pub fn is_complete(&self) -> bool {
        self.skipped_partitions.is_empty()
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "SearchStatistics:\n  \
             Time: {:.3}ms\n  \
             Partitions probed: {}\n  \
             Vectors scanned: {}\n  \
             Partitions skipped: {:?}",
            self.query_time_ms(),
            self.partitions_probed,
            self.vectors_scanned,
            self.skipped_partitions
        )
    }
}

/// Builder for collecting search statistics during a search operation.
#[derive(Default)]
pub struct SearchStatsBuilder {
    stats: SearchStatistics,
}

impl SearchStatsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the number of partitions probed.
    pub fn partitions_probed(&mut self, count: usize) {
        self.stats.partitions_probed = count;
    }

    /// Add to the count of vectors scanned.
    pub fn add_vectors_scanned(&mut self, count: usize) {
        self.stats.vectors_scanned += count;
    }

    /// Record a probed partition that was skipped.
    pub fn add_skipped(&mut self, partition: usize) {
        self.stats.skipped_partitions.push(partition);
    }

    /// Set the query execution time.
    pub fn set_query_time(&mut self, duration: Duration) {
        self.stats.query_time = duration;
    }

    /// Build the final statistics.
    pub fn build(mut self) -> SearchStatistics {
        self.stats.skipped_partitions.sort_unstable();
        self.stats
    }
}
