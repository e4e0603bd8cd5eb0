//! Query-time retrieval over an [`IvfIndex`] snapshot.
//!
//! 1. Rank centroids by Euclidean distance to the query and keep the
//!    nearest `ceil(probe_factor * sqrt(P))`.
//! 2. Read those partitions' segments and score every member by cosine
//!    similarity.
//! 3. Merge into one ranking: descending score, ties to the lower id.
//!
//! Only probed partitions are scanned, so results are the true top-K of the
//! probed candidates, not of the whole store.

use super::ivf::IvfIndex;
use super::traits::{SearchResult, VectorIndex};
use crate::config::MissingPartitionPolicy;
use crate::distance::{cosine_similarity, rank_centroids};
use crate::error::{IvfError, Result};
use crate::metrics::{SearchStatistics, SearchStatsBuilder};
use crate::types::RecordId;
use crate::vector::Record;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::{debug, warn};

/// A record id with its similarity to the query, used for heap operations.
///
/// Ordered so that the *worse* candidate compares greater: lower score,
/// then higher id. A `BinaryHeap` of these keeps the current worst on top.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoredRecord {
    pub id: RecordId,
    pub score: f32,
}

impl PartialEq for ScoredRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredRecord {}

impl PartialOrd for ScoredRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.id.cmp(&other.id))
    }
}

/// Bounded collector of the best `k` scored records.
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<ScoredRecord>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, candidate: ScoredRecord) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Score every record in `records` against `query`.
    pub fn scan(&mut self, query: &[f32], records: &[Record]) {
        for record in records {
            self.push(ScoredRecord {
                id: record.id,
                score: cosine_similarity(query, &record.embedding),
            });
        }
    }

    pub fn merge(&mut self, other: TopK) {
        for candidate in other.heap {
            self.push(candidate);
        }
    }

    /// Best first.
    pub fn into_results(self) -> Vec<SearchResult> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| SearchResult {
                id: s.id,
                score: s.score,
            })
            .collect()
    }
}

/// Number of partitions probed per query: `ceil(probe_factor * sqrt(P))`,
/// clamped to `[1, P]`.
pub fn probe_count(num_partitions: usize, probe_factor: f32) -> usize {
    let k = (probe_factor as f64 * (num_partitions as f64).sqrt()).ceil() as usize;
    k.clamp(1, num_partitions.max(1))
}

/// Reject queries the index cannot answer.
pub(crate) fn validate_query(query: &[f32], dimension: usize, top_k: usize) -> Result<()> {
    if query.len() != dimension {
        return Err(IvfError::dimension_mismatch(dimension, query.len()));
    }
    if top_k == 0 {
        return Err(IvfError::invalid_input("top_k must be >= 1"));
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(IvfError::invalid_input("query has a non-finite component"));
    }
    Ok(())
}

impl IvfIndex {
    /// Partitions probed per query with this index's probe factor.
    pub fn default_probes(&self) -> usize {
        probe_count(self.num_partitions(), self.probe_factor())
    }

    /// Ids of the `top_k` most similar records among the probed partitions.
    ///
    /// Returns fewer than `top_k` ids when the probed partitions hold fewer
    /// records.
    pub fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<RecordId>> {
        let (results, _) = self.search_with_probes(query, top_k, self.default_probes())?;
        Ok(results.into_iter().map(|r| r.id).collect())
    }

    /// Like [`IvfIndex::query`], also returning scores and statistics.
    pub fn search_with_stats(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatistics)> {
        self.search_with_probes(query, top_k, self.default_probes())
    }

    /// Search probing the `n_probe` nearest partitions (clamped to `[1, P]`).
    ///
    /// Unreadable segments are skipped with a warning under
    /// [`MissingPartitionPolicy::Skip`] and fail the query with
    /// [`IvfError::MissingPartition`] under [`MissingPartitionPolicy::Abort`].
    pub fn search_with_probes(
        &self,
        query: &[f32],
        top_k: usize,
        n_probe: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatistics)> {
        let start = Instant::now();
        validate_query(query, self.dimension(), top_k)?;
        if self.num_partitions() == 0 {
            return Err(IvfError::EmptyIndex);
        }

        let n_probe = n_probe.clamp(1, self.num_partitions());
        let probes = rank_centroids(query, self.centroids(), n_probe);

        // Scan partitions in parallel, each into its own bounded heap.
        let scanned: Vec<(usize, Result<(TopK, usize)>)> = probes
            .par_iter()
            .map(|&p| {
                let result = self.read_partition(p).map(|records| {
                    let mut local = TopK::new(top_k);
                    local.scan(query, &records);
                    (local, records.len())
                });
                (p, result)
            })
            .collect();

        let mut stats = SearchStatsBuilder::new();
        stats.partitions_probed(probes.len());
        let mut top = TopK::new(top_k);

        for (partition, result) in scanned {
            match result {
                Ok((local, count)) => {
                    stats.add_vectors_scanned(count);
                    top.merge(local);
                }
                Err(e) => match self.missing_partition_policy() {
                    MissingPartitionPolicy::Skip => {
                        warn!(
                            build_id = %self.build_id(),
                            partition,
                            error = %e,
                            "skipping unreadable partition"
                        );
                        stats.add_skipped(partition);
                    }
                    MissingPartitionPolicy::Abort => {
                        return Err(IvfError::missing_partition(partition, e));
                    }
                },
            }
        }

        let results = top.into_results();
        stats.set_query_time(start.elapsed());
        let stats = stats.build();
        debug!(
            probed = stats.partitions_probed,
            scanned = stats.vectors_scanned,
            returned = results.len(),
            "query complete"
        );
        Ok((results, stats))
    }
}

impl VectorIndex for IvfIndex {
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.search_with_stats(query, top_k).map(|(results, _)| results)
    }

    fn len(&self) -> usize {
        IvfIndex::len(self)
    }

    fn dimension(&self) -> usize {
        IvfIndex::dimension(self)
    }
}
