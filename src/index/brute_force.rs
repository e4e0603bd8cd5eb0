//! Brute force index for exact nearest neighbor search.
//!
//! This implementation serves as the ground truth baseline for the IVF
//! index. It scores every record against the query with the same cosine
//! similarity and tie-break the IVF query engine uses, so the two rankings
//! agree exactly on any record both of them see.

use super::search::{validate_query, TopK};
use super::traits::{SearchResult, VectorIndex};
use crate::error::Result;
use crate::vector::Record;
use rayon::prelude::*;

/// Chunk size for parallel scans.
const CHUNK_SIZE: usize = 1000;

/// Brute force index that performs exact search over all records.
pub struct BruteForceIndex {
    records: Vec<Record>,
    dimension: usize,
}

impl BruteForceIndex {
    /// Create a new empty brute force index.
    pub fn new(dimension: usize) -> Self {
        Self {
            records: Vec::new(),
            dimension,
        }
    }

    /// Create an index over the given records.
    pub fn from_records(dimension: usize, records: Vec<Record>) -> Self {
        Self { records, dimension }
    }

    /// Add a record to the index.
    pub fn add(&mut self, record: Record) {
        self.records.push(record);
    }
}

impl VectorIndex for BruteForceIndex {
    /// Exact top-K, scanning chunks in parallel and merging their heaps.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        validate_query(query, self.dimension, top_k)?;

        let top = self
            .records
            .par_chunks(CHUNK_SIZE)
            .map(|chunk| {
                let mut local = TopK::new(top_k);
                local.scan(query, chunk);
                local
            })
            .reduce(
                || TopK::new(top_k),
                |mut a, b| {
                    a.merge(b);
                    a
                },
            );

        Ok(top.into_results())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
