//! K-Means clustering for IVF index partitioning.
//!
//! Implements Lloyd's algorithm with k-means++ initialization for
//! high-quality centroid placement. Used to partition vectors into
//! clusters for inverted file indexing.
//!
//! Empty clusters are reseeded with the vector farthest from its assigned
//! centroid, so whenever there are at least as many vectors as clusters
//! every cluster ends up non-empty and every centroid is the mean of its
//! members.

use crate::constants;
use crate::distance::{euclidean_distance_squared, nearest_centroid};
use crate::error::{IvfError, Result};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

/// Number of partitions for a store of `n` records: `round(sqrt(n))`, at least 1.
pub fn partition_count(n: usize) -> usize {
    ((n as f64).sqrt().round() as usize).max(1)
}

/// Cluster `vectors` into `num_partitions` groups with default settings.
///
/// Returns the centroids and, for every input vector, the index of the
/// partition it belongs to.
pub fn partition<V: AsRef<[f32]> + Sync>(
    vectors: &[V],
    num_partitions: usize,
    max_iterations: usize,
) -> Result<Partitioning> {
    KMeans::new(num_partitions, max_iterations).fit(vectors)
}

/// Assign each vector to its nearest centroid.
///
/// Returns one centroid index per input vector.
pub fn assign_to_nearest<V, C>(vectors: &[V], centroids: &[C]) -> Vec<usize>
where
    V: AsRef<[f32]> + Sync,
    C: AsRef<[f32]> + Sync,
{
    vectors
        .par_iter()
        .map(|v| nearest_centroid(v.as_ref(), centroids).unwrap_or(0))
        .collect()
}

/// Output of a clustering run.
#[derive(Debug, Clone)]
pub struct Partitioning {
    /// One centroid per partition, each of the input dimension.
    pub centroids: Vec<Vec<f32>>,
    /// Partition index for each input vector, in input order.
    pub assignments: Vec<usize>,
    /// Lloyd iterations performed.
    pub iterations: usize,
    /// Whether training stopped before the iteration limit.
    pub converged: bool,
}

impl Partitioning {
    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.centroids.len()
    }

    /// Members of each partition as input indices.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.centroids.len()];
        for (i, &p) in self.assignments.iter().enumerate() {
            members[p].push(i);
        }
        members
    }
}

/// Progress report handed to the observer after every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Vectors whose partition changed in this iteration.
    pub reassigned: usize,
    /// Clusters that were empty and got reseeded.
    pub reseeded: usize,
    /// Mean squared centroid movement.
    pub shift: f32,
}

/// K-Means clustering algorithm.
///
/// Uses k-means++ initialization for better convergence and
/// parallel assignment steps for performance.
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations before stopping.
    max_iters: usize,
    convergence_threshold: f32,
    seed: Option<u64>,
}

impl KMeans {
    /// Create a new K-Means instance.
    ///
    /// # Arguments
    /// * `k` - Number of clusters
    /// * `max_iters` - Maximum iterations for convergence
    pub fn new(k: usize, max_iters: usize) -> Self {
        Self {
            k,
            max_iters,
            convergence_threshold: constants::kmeans::CONVERGENCE_THRESHOLD,
            seed: None,
        }
    }

    /// Seed initialization and reseeding for reproducible results.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set the mean squared centroid movement below which training stops.
    pub fn with_convergence_threshold(mut self, threshold: f32) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Fit the model to the given vectors.
    pub fn fit<V: AsRef<[f32]> + Sync>(&self, vectors: &[V]) -> Result<Partitioning> {
        self.fit_with(vectors, |_| ControlFlow::Continue(()))
    }

    /// Fit the model, reporting to `observer` after every iteration.
    ///
    /// Returning `ControlFlow::Break` from the observer stops training with
    /// [`IvfError::Cancelled`].
    pub fn fit_with<V, F>(&self, vectors: &[V], mut observer: F) -> Result<Partitioning>
    where
        V: AsRef<[f32]> + Sync,
        F: FnMut(&IterationStats) -> ControlFlow<()>,
    {
        let dim = self.validate(vectors)?;
        let n = vectors.len();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        if self.k > n {
            warn!(
                k = self.k,
                n, "more partitions than vectors, some partitions will stay empty"
            );
        }

        let mut centroids = if self.k > constants::kmeans::KMEANSPP_THRESHOLD {
            self.random_init(vectors, &mut rng)
        } else {
            self.kmeans_plus_plus_init(vectors, &mut rng)
        };

        info!(n, k = self.k, dim, "starting k-means");

        let mut assignments: Vec<usize> = vec![usize::MAX; n];
        let mut iterations = 0;
        let mut converged = false;

        for iter in 1..=self.max_iters {
            iterations = iter;

            let mut next = assign_to_nearest(vectors, &centroids);
            let reseeded = self.reseed_empty(vectors, &mut centroids, &mut next);

            let reassigned = next
                .iter()
                .zip(assignments.iter())
                .filter(|(a, b)| a != b)
                .count();
            assignments = next;

            let shift = if reassigned == 0 {
                0.0
            } else {
                let new_centroids = self.update_centroids(vectors, &assignments, &centroids, dim);
                let shift = mean_shift(&centroids, &new_centroids);
                centroids = new_centroids;
                shift
            };

            let stats = IterationStats {
                iteration: iter,
                reassigned,
                reseeded,
                shift,
            };
            debug!(
                iteration = iter,
                reassigned, reseeded, shift, "k-means iteration complete"
            );

            if observer(&stats).is_break() {
                info!(iteration = iter, "k-means cancelled by observer");
                return Err(IvfError::Cancelled { iteration: iter });
            }

            if reassigned == 0 || shift < self.convergence_threshold {
                converged = true;
                break;
            }
        }

        if converged {
            info!(iterations, "k-means converged");
        } else {
            warn!(
                max_iters = self.max_iters,
                "k-means did not converge within iteration limit, using current centroids"
            );
        }

        Ok(Partitioning {
            centroids,
            assignments,
            iterations,
            converged,
        })
    }

    /// Check arguments and return the shared dimension.
    fn validate<V: AsRef<[f32]>>(&self, vectors: &[V]) -> Result<usize> {
        if vectors.is_empty() {
            return Err(IvfError::invalid_input("cannot cluster an empty vector set"));
        }
        if self.k < 1 {
            return Err(IvfError::invalid_input("num_partitions must be >= 1"));
        }
        if self.max_iters < 1 {
            return Err(IvfError::invalid_input("max_iterations must be >= 1"));
        }

        let dim = vectors[0].as_ref().len();
        if dim == 0 {
            return Err(IvfError::invalid_input("vector dimension must be > 0"));
        }
        if let Some(v) = vectors.iter().find(|v| v.as_ref().len() != dim) {
            return Err(IvfError::dimension_mismatch(dim, v.as_ref().len()));
        }
        Ok(dim)
    }

    /// Pick `k` distinct input vectors uniformly (k-means++ is O(k²n), too slow for large k).
    fn random_init<V: AsRef<[f32]>>(&self, vectors: &[V], rng: &mut StdRng) -> Vec<Vec<f32>> {
        let n = vectors.len();
        let mut centroids: Vec<Vec<f32>> = index::sample(rng, n, self.k.min(n))
            .into_iter()
            .map(|i| vectors[i].as_ref().to_vec())
            .collect();
        while centroids.len() < self.k {
            if let Some(v) = vectors.choose(rng) {
                centroids.push(v.as_ref().to_vec());
            }
        }
        centroids
    }

    /// Initialize centroids using k-means++ algorithm.
    ///
    /// Selects initial centroids with probability proportional to
    /// squared distance from existing centroids, leading to better
    /// spread and faster convergence.
    fn kmeans_plus_plus_init<V: AsRef<[f32]> + Sync>(
        &self,
        vectors: &[V],
        rng: &mut StdRng,
    ) -> Vec<Vec<f32>> {
        let n = vectors.len();
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(self.k);

        // Choose first centroid randomly
        centroids.push(vectors[rng.gen_range(0..n)].as_ref().to_vec());

        // Distance from each point to the nearest centroid chosen so far.
        let mut min_dists = vec![f32::MAX; n];

        while centroids.len() < self.k {
            let last = &centroids[centroids.len() - 1];
            min_dists
                .par_iter_mut()
                .zip(vectors.par_iter())
                .for_each(|(d, v)| *d = d.min(euclidean_distance_squared(v.as_ref(), last)));

            let total: f64 = min_dists.iter().map(|&d| d as f64).sum();

            if total <= 0.0 {
                // All vectors are at centroid locations, pick randomly
                let i = rng.gen_range(0..n);
                centroids.push(vectors[i].as_ref().to_vec());
                continue;
            }

            // Select next centroid with probability proportional to distance squared
            let threshold = rng.gen_range(0.0..total);
            let mut cumulative = 0.0f64;
            let mut chosen = n - 1;
            for (i, &d) in min_dists.iter().enumerate() {
                cumulative += d as f64;
                if cumulative > threshold {
                    chosen = i;
                    break;
                }
            }

            centroids.push(vectors[chosen].as_ref().to_vec());
        }

        centroids
    }

    /// Give every empty cluster a member.
    ///
    /// Each empty cluster takes the vector farthest from its assigned
    /// centroid, drawn from a cluster that keeps at least one member, and
    /// moves its centroid onto that vector. Returns the number of clusters
    /// reseeded.
    fn reseed_empty<V: AsRef<[f32]> + Sync>(
        &self,
        vectors: &[V],
        centroids: &mut [Vec<f32>],
        assignments: &mut [usize],
    ) -> usize {
        let mut counts = vec![0usize; centroids.len()];
        for &a in assignments.iter() {
            counts[a] += 1;
        }
        if counts.iter().all(|&c| c > 0) {
            return 0;
        }

        let mut dists: Vec<f32> = vectors
            .par_iter()
            .zip(assignments.par_iter())
            .map(|(v, &a)| euclidean_distance_squared(v.as_ref(), &centroids[a]))
            .collect();

        let mut reseeded = 0;
        for c in 0..centroids.len() {
            if counts[c] > 0 {
                continue;
            }

            let donor = dists
                .iter()
                .enumerate()
                .filter(|&(i, _)| counts[assignments[i]] > 1)
                .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
                .map(|(i, _)| i);

            let Some(i) = donor else {
                // Fewer vectors than clusters; the centroid keeps its last position.
                continue;
            };

            counts[assignments[i]] -= 1;
            counts[c] = 1;
            assignments[i] = c;
            centroids[c] = vectors[i].as_ref().to_vec();
            dists[i] = 0.0;
            reseeded += 1;
        }

        if reseeded > 0 {
            warn!(reseeded, "reseeded empty clusters");
        }
        reseeded
    }

    /// Update centroids to be the mean of assigned vectors.
    ///
    /// Empty clusters retain their old centroid.
    fn update_centroids<V: AsRef<[f32]>>(
        &self,
        vectors: &[V],
        assignments: &[usize],
        previous: &[Vec<f32>],
        dim: usize,
    ) -> Vec<Vec<f32>> {
        let mut sums = vec![vec![0.0f64; dim]; previous.len()];
        let mut counts = vec![0usize; previous.len()];

        for (v, &a) in vectors.iter().zip(assignments.iter()) {
            counts[a] += 1;
            for (s, &x) in sums[a].iter_mut().zip(v.as_ref().iter()) {
                *s += x as f64;
            }
        }

        sums.into_iter()
            .zip(counts)
            .zip(previous.iter())
            .map(|((sum, count), old)| {
                if count == 0 {
                    old.clone()
                } else {
                    sum.into_iter().map(|s| (s / count as f64) as f32).collect()
                }
            })
            .collect()
    }
}

/// Mean squared movement between two centroid sets.
fn mean_shift(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    let total: f32 = old
        .iter()
        .zip(new.iter())
        .map(|(o, n)| euclidean_distance_squared(o, n))
        .sum();
    total / old.len().max(1) as f32
}
