use crate::types::RecordId;
use rand::Rng;
use std::sync::Arc;

/// A stored record: a caller-assigned id and its embedding.
/// The embedding is stored in an Arc for cheap cloning.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub embedding: Arc<[f32]>,
}

impl Record {
    /// Create a new record with the given id and embedding.
    pub fn new(id: impl Into<RecordId>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding: embedding.into(),
        }
    }

    /// Create a random record with components uniformly distributed in [-1.0, 1.0].
    pub fn random(id: impl Into<RecordId>, dim: usize) -> Self {
        Self::random_with(id, dim, &mut rand::thread_rng())
    }

    /// Like [`Record::random`], drawing from the given generator.
    pub fn random_with<R: Rng + ?Sized>(id: impl Into<RecordId>, dim: usize, rng: &mut R) -> Self {
        let embedding: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self::new(id, embedding)
    }

    /// Return the dimensionality of this record's embedding.
    pub fn dim(&self) -> usize {
        self.embedding.len()
    }
}

/// Build a `dim`-long embedding from a prefix, zero-padding the rest.
pub fn padded(prefix: &[f32], dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    let n = prefix.len().min(dim);
    v[..n].copy_from_slice(&prefix[..n]);
    v
}
