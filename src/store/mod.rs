//! Append-only record stores.
//!
//! The store is the source of truth for every embedding. Indexes are derived
//! from a snapshot of [`VectorStore::all`] and can always be rebuilt from it.

mod file;
mod memory;

pub use file::FileVectorStore;
pub use memory::MemoryVectorStore;

use crate::error::{IvfError, Result};
use crate::types::RecordId;
use crate::vector::Record;
use std::collections::HashSet;

/// Append-only collection of `(id, embedding)` records with a fixed dimension.
pub trait VectorStore: Send + Sync {
    /// Embedding dimension every record must have.
    fn dimension(&self) -> usize;

    /// Append a batch of records.
    ///
    /// The batch is validated as a whole before anything is written: a
    /// wrong dimension or an id already present (in the store or earlier
    /// in the batch) rejects the entire batch.
    fn append(&mut self, records: &[Record]) -> Result<()>;

    /// Every record, in append order.
    fn all(&self) -> Result<Vec<Record>>;

    /// Number of records.
    fn count(&self) -> usize;

    /// Return true if the store holds no records.
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Check a batch against the store dimension and the ids already present.
pub(crate) fn validate_batch(
    records: &[Record],
    dim: usize,
    existing: &HashSet<RecordId>,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.dim() != dim {
            return Err(IvfError::dimension_mismatch(dim, record.dim()));
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Err(IvfError::invalid_input(format!(
                "record {} has a non-finite component",
                record.id.as_u64()
            )));
        }
        if existing.contains(&record.id) || !seen.insert(record.id) {
            return Err(IvfError::DuplicateId(record.id.as_u64()));
        }
    }
    Ok(())
}
