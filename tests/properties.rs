//! Property-based tests for partitioning and index builds.
//!
//! These hold for any input:
//! - Partition count is `round(sqrt(N))`, never below 1
//! - k-means assigns every vector to a valid partition
//! - A build partitions the store exactly (no overlaps, no omissions)
//! - Probe counts stay within `[1, P]`

use ivfdb::index::probe_count;
use ivfdb::kmeans::{partition, partition_count};
use ivfdb::{IndexBuilder, IndexConfig, MemoryVectorStore, Record, RecordId, VectorStore};
use proptest::prelude::*;
use std::collections::HashSet;

prop_compose! {
    fn arb_vectors(dim: usize, max_len: usize)
        (vectors in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, dim), 1..max_len))
        -> Vec<Vec<f32>>
    {
        vectors
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn partition_count_is_rounded_sqrt(n in 0usize..1_000_000) {
        let p = partition_count(n);
        prop_assert!(p >= 1);
        if n > 0 {
            prop_assert_eq!(p, ((n as f64).sqrt().round() as usize).max(1));
        }
    }

    #[test]
    fn probe_count_within_bounds(p in 1usize..10_000, factor in 0.1f32..4.0) {
        let k = probe_count(p, factor);
        prop_assert!(k >= 1 && k <= p, "probe count {} outside [1, {}]", k, p);
    }

    #[test]
    fn kmeans_assignments_are_valid(
        vectors in arb_vectors(6, 80),
        extra in 0usize..4,
    ) {
        let k = partition_count(vectors.len()) + extra;
        let result = partition(&vectors, k, 10).unwrap();

        prop_assert_eq!(result.centroids.len(), k);
        prop_assert!(result.centroids.iter().all(|c| c.len() == 6));
        prop_assert!(result.centroids.iter().flatten().all(|v| v.is_finite()));
        prop_assert_eq!(result.assignments.len(), vectors.len());
        prop_assert!(result.assignments.iter().all(|&a| a < k));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn build_partitions_store_exactly(vectors in arb_vectors(5, 150), seed in any::<u64>()) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryVectorStore::new(5);
        let records: Vec<Record> = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| Record::new(i as u64 * 3, v))
            .collect();
        store.append(&records).unwrap();

        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(5).with_seed(seed));
        let index = builder.build(&store).unwrap();
        prop_assert_eq!(index.num_partitions(), partition_count(records.len()));

        let mut seen = HashSet::new();
        for ids in index.partition_ids().unwrap() {
            for id in ids {
                prop_assert!(seen.insert(id), "{} in two partitions", id);
            }
        }
        let expected: HashSet<RecordId> = records.iter().map(|r| r.id).collect();
        prop_assert_eq!(seen, expected);
    }
}
