//! ivfdb: an Inverted-File (IVF) approximate nearest neighbor index.
//!
//! Records are grouped into `round(sqrt(N))` partitions by k-means. A query
//! ranks the partition centroids by distance, scans only the nearest
//! `ceil(1.5 * sqrt(P))` partitions and returns the top-K ids by cosine
//! similarity. Results are the best among the probed candidates, not a
//! guaranteed global top-K.
//!
//! # Features
//!
//! - **Full rebuild per insert batch**: queries always see an index built
//!   from a complete snapshot of the store
//! - **Versioned builds**: segments are written under a fresh build id and
//!   published with an atomic pointer swap, so readers never mix builds
//! - **Degraded queries**: unreadable partitions are skipped and reported
//!   instead of failing the query (configurable)
//! - **Parallel work**: k-means assignment and partition scans run on Rayon
//!
//! # Example
//!
//! ```no_run
//! use ivfdb::{padded, IndexConfig, Record, RecordId, VectorDatabase};
//!
//! # fn main() -> ivfdb::Result<()> {
//! let db = VectorDatabase::open("/tmp/ivfdb", IndexConfig::new(70))?;
//! db.insert_records(&[
//!     Record::new(1u64, padded(&[1.0], 70)),
//!     Record::new(2u64, padded(&[0.0, 1.0], 70)),
//!     Record::new(3u64, padded(&[0.9, 0.1], 70)),
//! ])?;
//!
//! let ids = db.query(&padded(&[1.0], 70), 2)?;
//! assert_eq!(ids, vec![RecordId(1), RecordId(3)]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod kmeans;
pub mod metrics;
pub mod persistence;
pub mod store;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use config::{IndexConfig, MissingPartitionPolicy, UpdateStrategy};
pub use database::VectorDatabase;
pub use dataset::{recall_at_k, Dataset};
pub use error::{IvfError, Result};
pub use index::{BruteForceIndex, IndexBuilder, IvfIndex, SearchResult, VectorIndex};
pub use kmeans::{KMeans, Partitioning};
pub use metrics::{IndexStatistics, SearchStatistics};
pub use store::{FileVectorStore, MemoryVectorStore, VectorStore};
pub use types::{BuildId, Dimension, RecordId};
pub use vector::{padded, Record};
