//! Distance and similarity functions.
//!
//! Partition assignment and centroid ranking use squared Euclidean distance;
//! records are scored against a query with cosine similarity.

pub mod scalar;

pub use scalar::{cosine_similarity, dot_product, euclidean_distance_squared, norm};

/// Index of the centroid nearest to `v` by squared Euclidean distance.
///
/// Ties resolve to the lower centroid index. Returns `None` when there are
/// no centroids.
#[inline]
pub fn nearest_centroid<C: AsRef<[f32]>>(v: &[f32], centroids: &[C]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, c) in centroids.iter().enumerate() {
        let d = euclidean_distance_squared(v, c.as_ref());
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Centroid indices ordered by ascending distance to `query`, truncated to `k`.
///
/// Equal distances keep ascending centroid order.
pub fn rank_centroids<C: AsRef<[f32]>>(query: &[f32], centroids: &[C], k: usize) -> Vec<usize> {
    let mut distances: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, euclidean_distance_squared(query, c.as_ref())))
        .collect();

    distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    distances.truncate(k);
    distances.into_iter().map(|(idx, _)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_centroid() {
        let centroids = vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![5.0, 10.0]];
        assert_eq!(nearest_centroid(&[9.0, 1.0], &centroids), Some(1));
        assert_eq!(nearest_centroid(&[0.1, 0.1], &centroids), Some(0));

        let empty: Vec<Vec<f32>> = Vec::new();
        assert_eq!(nearest_centroid(&[0.0, 0.0], &empty), None);
    }

    #[test]
    fn test_nearest_centroid_tie_prefers_lower_index() {
        let centroids = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        assert_eq!(nearest_centroid(&[0.0, 0.0], &centroids), Some(0));
    }

    #[test]
    fn test_rank_centroids() {
        let centroids = vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![5.0, 10.0]];
        let ranked = rank_centroids(&[0.1, 0.1], &centroids, 2);
        assert_eq!(ranked, vec![0, 2]);

        let all = rank_centroids(&[10.0, 0.0], &centroids, 10);
        assert_eq!(all, vec![1, 2, 0]);
    }
}
