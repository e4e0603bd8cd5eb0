//! Dataset utilities for generating and evaluating vector search.

use crate::error::Result;
use crate::index::{BruteForceIndex, VectorIndex};
use crate::types::RecordId;
use crate::vector::Record;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// A dataset containing records, queries, and ground truth for evaluation.
pub struct Dataset {
    pub records: Vec<Record>,
    pub queries: Vec<Vec<f32>>,
    pub ground_truth: Vec<Vec<RecordId>>,
}

impl Dataset {
    /// Generate a random synthetic dataset.
    ///
    /// Creates `n_records` records with ids `0..n_records` and `n_queries`
    /// query vectors, components uniform in `[-1, 1)`. The same `seed`
    /// always yields the same dataset.
    pub fn generate(n_records: usize, n_queries: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let records: Vec<Record> = (0..n_records as u64)
            .map(|i| Record::random_with(i, dim, &mut rng))
            .collect();
        let queries: Vec<Vec<f32>> = (0..n_queries)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();

        Self {
            records,
            queries,
            ground_truth: Vec::new(),
        }
    }

    /// Generate records scattered around `n_clusters` random centers.
    ///
    /// Each component of a record is its center's plus uniform noise in
    /// `[-spread, spread)`. Queries are drawn the same way, which gives IVF
    /// probing the locality it relies on.
    pub fn generate_clustered(
        n_records: usize,
        n_queries: usize,
        dim: usize,
        n_clusters: usize,
        spread: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let centers: Vec<Vec<f32>> = (0..n_clusters.max(1))
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();

        let spread = spread.abs();
        let sample = |rng: &mut StdRng| -> Vec<f32> {
            let center = &centers[rng.gen_range(0..centers.len())];
            center
                .iter()
                .map(|&c| if spread > 0.0 { c + rng.gen_range(-spread..spread) } else { c })
                .collect()
        };

        let records = (0..n_records as u64)
            .map(|i| Record::new(i, sample(&mut rng)))
            .collect();
        let queries = (0..n_queries).map(|_| sample(&mut rng)).collect();

        Self {
            records,
            queries,
            ground_truth: Vec::new(),
        }
    }

    /// Compute exact top-`k` neighbors of every query by brute force.
    pub fn compute_ground_truth(&mut self, k: usize) -> Result<()> {
        let dim = self.records.first().map_or(0, |r| r.dim());
        let index = BruteForceIndex::from_records(dim, self.records.clone());

        self.ground_truth = self
            .queries
            .iter()
            .map(|query| index.query(query, k))
            .collect::<Result<_>>()?;
        Ok(())
    }
}

/// Compute recall@k between predicted and ground truth results.
///
/// Recall is the fraction of true nearest neighbors that were found.
/// Returns a value between 0.0 and 1.0.
pub fn recall_at_k(predicted: &[RecordId], ground_truth: &[RecordId], k: usize) -> f32 {
    if k == 0 {
        return 0.0;
    }
    let pred_set: HashSet<RecordId> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<RecordId> = ground_truth.iter().take(k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f32 / k as f32
}
