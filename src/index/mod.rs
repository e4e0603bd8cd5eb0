//! Index implementations for vector search.
//!
//! [`IndexBuilder`] clusters the store and publishes an immutable
//! [`IvfIndex`] build; [`BruteForceIndex`] is the exact baseline used to
//! measure recall.

pub mod brute_force;
pub mod builder;
pub mod ivf;
pub mod search;
pub mod traits;

pub use brute_force::BruteForceIndex;
pub use builder::IndexBuilder;
pub use ivf::{BuildKind, IvfIndex, Manifest};
pub use search::probe_count;
pub use traits::{SearchResult, VectorIndex};
