//! Common traits for index implementations.
//!
//! Both the IVF index and the exhaustive baseline answer queries through
//! [`VectorIndex`], which lets recall tests compare them generically.

use crate::error::Result;
use crate::types::RecordId;

/// A search result: a record id and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// The ID of the matched record.
    pub id: RecordId,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

impl SearchResult {
    /// Create a new SearchResult.
    #[inline]
    pub fn new(id: impl Into<RecordId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }

    /// Convert to a raw (u64, f32) tuple.
    #[inline]
    pub fn to_tuple(self) -> (u64, f32) {
        (self.id.0, self.score)
    }
}

impl From<(u64, f32)> for SearchResult {
    fn from(tuple: (u64, f32)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

/// Common interface for indexes that rank records against a query.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; searches take `&self` and may run
/// from many threads at once.
pub trait VectorIndex: Send + Sync {
    /// Up to `top_k` records ordered by descending similarity, ties broken
    /// by ascending id.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Return the number of records in the index.
    fn len(&self) -> usize;

    /// Return true if the index contains no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the dimensionality of records in this index.
    fn dimension(&self) -> usize;

    /// Ids of the top `top_k` records.
    fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<RecordId>> {
        Ok(self
            .search(query, top_k)?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }
}
