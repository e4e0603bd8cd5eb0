use super::{validate_batch, VectorStore};
use crate::error::Result;
use crate::types::RecordId;
use crate::vector::Record;
use std::collections::HashSet;

/// In-memory record store, for tests and ephemeral databases.
#[derive(Debug, Clone)]
pub struct MemoryVectorStore {
    dimension: usize,
    records: Vec<Record>,
    ids: HashSet<RecordId>,
}

impl MemoryVectorStore {
    /// Create an empty store for the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn append(&mut self, records: &[Record]) -> Result<()> {
        validate_batch(records, self.dimension, &self.ids)?;
        self.ids.extend(records.iter().map(|r| r.id));
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn all(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn count(&self) -> usize {
        self.records.len()
    }
}
