//! Record store plus the live index snapshot.
//!
//! [`VectorDatabase`] owns a [`VectorStore`] and the [`IvfIndex`] built
//! from it. Every insert batch appends to the store and then publishes a
//! new build; queries run against whichever snapshot was live when they
//! started.
//!
//! # Concurrency
//!
//! - Writers (`insert_records`, `rebuild`) serialize on the store mutex.
//! - The live index sits behind `RwLock<Option<Arc<IvfIndex>>>`. Readers
//!   hold the read lock only long enough to clone the `Arc`, so a build in
//!   progress never blocks queries, and a query keeps using its snapshot
//!   even after a newer build is swapped in.
//!
//! # Cost
//!
//! With [`UpdateStrategy::FullRebuild`] every insert batch re-reads the
//! whole store and re-clusters it: `O(N * D * P * iterations)`. Batch
//! inserts accordingly; this API is not meant for frequent small inserts.

use crate::config::{IndexConfig, UpdateStrategy};
use crate::constants::layout;
use crate::error::{IvfError, Result};
use crate::index::{IndexBuilder, IvfIndex, SearchResult};
use crate::kmeans;
use crate::metrics::{IndexStatistics, SearchStatistics};
use crate::store::{FileVectorStore, VectorStore};
use crate::types::RecordId;
use crate::vector::Record;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A vector store with an IVF index kept in step with it.
pub struct VectorDatabase<S: VectorStore = FileVectorStore> {
    store: Mutex<S>,
    index: RwLock<Option<Arc<IvfIndex>>>,
    builder: IndexBuilder,
}

impl VectorDatabase<FileVectorStore> {
    /// Open the database in `dir`, creating it if needed.
    ///
    /// Records go to `dir/records.bin` and builds under `dir/index`. If the
    /// live build does not cover every stored record (for instance after a
    /// crash between append and publish) the index is rebuilt.
    pub fn open(dir: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let store = FileVectorStore::open_or_create(dir.join(layout::STORE_FILE), config.dimension)?;
        let root = dir.join(layout::INDEX_DIR);
        let index = match IvfIndex::open(&root, &config) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "live build unreadable, will rebuild");
                None
            }
        };

        let db = Self::from_parts(store, IndexBuilder::new(root, config), index);
        db.reconcile()?;
        Ok(db)
    }

    /// Create an empty database in `dir`, discarding any records and
    /// builds already there.
    pub fn create(dir: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let root = dir.join(layout::INDEX_DIR);
        match std::fs::remove_dir_all(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let store = FileVectorStore::create(dir.join(layout::STORE_FILE), config.dimension)?;
        Ok(Self::from_parts(store, IndexBuilder::new(root, config), None))
    }
}

impl<S: VectorStore> VectorDatabase<S> {
    /// Wrap an existing store, writing index builds under `index_root`.
    ///
    /// A build already published under `index_root` is kept only if it
    /// covers exactly the store's records; otherwise the index is rebuilt
    /// from the store, or dropped when the store is empty.
    pub fn with_store(store: S, index_root: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        if store.dimension() != config.dimension {
            return Err(IvfError::dimension_mismatch(config.dimension, store.dimension()));
        }
        let root = index_root.as_ref().to_path_buf();
        let index = IvfIndex::open(&root, &config)?;
        let db = Self::from_parts(store, IndexBuilder::new(root, config), index);
        db.reconcile()?;
        Ok(db)
    }

    /// Bring the live snapshot in line with the store after loading.
    fn reconcile(&self) -> Result<()> {
        let store = self.store.lock();
        let indexed = self.snapshot().map(|index| index.len());
        match indexed {
            Some(n) if n == store.count() => {}
            None if store.is_empty() => {}
            Some(n) if store.is_empty() => {
                warn!(indexed = n, "published build has no backing records, ignoring it");
                *self.index.write() = None;
            }
            _ => {
                info!(
                    records = store.count(),
                    indexed = indexed.unwrap_or(0),
                    "index out of date with store, rebuilding"
                );
                let index = self.builder.build(&*store)?;
                self.publish(index);
            }
        }
        Ok(())
    }

    fn from_parts(store: S, builder: IndexBuilder, index: Option<IvfIndex>) -> Self {
        Self {
            store: Mutex::new(store),
            index: RwLock::new(index.map(Arc::new)),
            builder,
        }
    }

    /// Database configuration.
    pub fn config(&self) -> &IndexConfig {
        self.builder.config()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.config().dimension
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.store.lock().count()
    }

    /// The live index snapshot, if a build has been published.
    pub fn snapshot(&self) -> Option<Arc<IvfIndex>> {
        self.index.read().clone()
    }

    /// Append `records` to the store and publish an index covering them.
    ///
    /// The batch is validated as a whole: a wrong dimension or a duplicate
    /// id rejects it without touching the store or the index. If the store
    /// append succeeds but the build fails, the records stay stored, the
    /// previous index stays live, and the error is returned; the next
    /// insert or [`VectorDatabase::rebuild`] picks them up.
    pub fn insert_records(&self, records: &[Record]) -> Result<Arc<IvfIndex>> {
        if records.is_empty() {
            return Err(IvfError::invalid_input("insert batch is empty"));
        }
        let mut store = self.store.lock();
        store.append(records)?;
        debug!(added = records.len(), total = store.count(), "appended records");

        let index = match self.config().update_strategy {
            UpdateStrategy::FullRebuild => self.builder.build(&*store)?,
            UpdateStrategy::AssignToNearest => self.extend_or_rebuild(&*store, records)?,
        };
        Ok(self.publish(index))
    }

    /// Rebuild the index from every stored record.
    pub fn rebuild(&self) -> Result<Arc<IvfIndex>> {
        let store = self.store.lock();
        let index = self.builder.build(&*store)?;
        Ok(self.publish(index))
    }

    fn extend_or_rebuild(&self, store: &S, records: &[Record]) -> Result<IvfIndex> {
        let Some(current) = self.snapshot() else {
            return self.builder.build(store);
        };
        // Records stored by a batch whose build failed are not in `current`.
        if current.len() + records.len() != store.count() {
            info!(
                indexed = current.len(),
                stored = store.count(),
                "index missing stored records, re-clustering"
            );
            return self.builder.build(store);
        }
        let wanted = kmeans::partition_count(store.count());
        if wanted != current.num_partitions() {
            info!(
                current = current.num_partitions(),
                wanted, "partition count drifted, re-clustering"
            );
            return self.builder.build(store);
        }
        self.builder.extend(&current, records)
    }

    fn publish(&self, index: IvfIndex) -> Arc<IvfIndex> {
        let index = Arc::new(index);
        *self.index.write() = Some(Arc::clone(&index));
        index
    }

    fn live_index(&self, query: &[f32]) -> Result<Arc<IvfIndex>> {
        if query.len() != self.dimension() {
            return Err(IvfError::dimension_mismatch(self.dimension(), query.len()));
        }
        self.snapshot().ok_or(IvfError::EmptyIndex)
    }

    /// Ids of the `top_k` records most similar to `query`, best first.
    ///
    /// Only the partitions nearest the query are scanned, so this is the
    /// top-K among probed candidates rather than a guaranteed global top-K.
    pub fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<RecordId>> {
        self.live_index(query)?.query(query, top_k)
    }

    /// Like [`VectorDatabase::query`], also returning scores and statistics.
    pub fn query_with_stats(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatistics)> {
        self.live_index(query)?.search_with_stats(query, top_k)
    }

    /// Query probing exactly `n_probe` partitions (clamped to `[1, P]`).
    pub fn query_with_probes(
        &self,
        query: &[f32],
        top_k: usize,
        n_probe: usize,
    ) -> Result<Vec<SearchResult>> {
        self.live_index(query)?
            .search_with_probes(query, top_k, n_probe)
            .map(|(results, _)| results)
    }

    /// Statistics of the live build.
    pub fn statistics(&self) -> Option<IndexStatistics> {
        self.snapshot().map(|index| IndexStatistics::from_index(&index))
    }

    /// Every stored record.
    pub fn records(&self) -> Result<Vec<Record>> {
        self.store.lock().all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVectorStore;
    use crate::vector::padded;

    fn memory_db(dir: &Path, dim: usize) -> VectorDatabase<MemoryVectorStore> {
        VectorDatabase::with_store(
            MemoryVectorStore::new(dim),
            dir,
            IndexConfig::new(dim).with_seed(7),
        )
        .unwrap()
    }

    #[test]
    fn test_query_before_build() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db(dir.path(), 4);
        assert!(matches!(
            db.query(&[1.0, 0.0, 0.0, 0.0], 1),
            Err(IvfError::EmptyIndex)
        ));
        assert!(db.statistics().is_none());
    }

    #[test]
    fn test_insert_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db(dir.path(), 70);
        db.insert_records(&[
            Record::new(1u64, padded(&[1.0], 70)),
            Record::new(2u64, padded(&[0.0, 1.0], 70)),
            Record::new(3u64, padded(&[0.9, 0.1], 70)),
        ])
        .unwrap();

        let ids = db.query(&padded(&[1.0], 70), 2).unwrap();
        assert_eq!(ids, vec![RecordId(1), RecordId(3)]);
    }

    #[test]
    fn test_rejected_batch_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db(dir.path(), 2);
        let first = db.insert_records(&[Record::new(1u64, vec![1.0, 0.0])]).unwrap();

        let result = db.insert_records(&[
            Record::new(2u64, vec![0.0, 1.0]),
            Record::new(3u64, vec![0.0, 1.0, 0.0]),
        ]);
        assert!(matches!(result, Err(IvfError::DimensionMismatch { .. })));
        assert!(matches!(
            db.insert_records(&[Record::new(1u64, vec![0.5, 0.5])]),
            Err(IvfError::DuplicateId(1))
        ));
        assert!(matches!(db.insert_records(&[]), Err(IvfError::InvalidInput(_))));

        assert_eq!(db.count(), 1);
        assert_eq!(db.snapshot().unwrap().build_id(), first.build_id());
    }

    #[test]
    fn test_old_snapshot_survives_swap() {
        let dir = tempfile::tempdir().unwrap();
        let db = memory_db(dir.path(), 3);
        db.insert_records(&[Record::new(1u64, vec![1.0, 0.0, 0.0])]).unwrap();
        let old = db.snapshot().unwrap();

        db.insert_records(&[Record::new(2u64, vec![0.0, 1.0, 0.0])]).unwrap();
        let new = db.snapshot().unwrap();

        assert_ne!(old.build_id(), new.build_id());
        // retain_builds = 1 keeps the previous build readable.
        assert_eq!(old.query(&[0.0, 1.0, 0.0], 5).unwrap(), vec![RecordId(1)]);
        assert_eq!(new.len(), 2);
    }

    #[test]
    fn test_assign_to_nearest_keeps_centroids() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(4)
            .with_seed(11)
            .with_update_strategy(UpdateStrategy::AssignToNearest);
        let db = VectorDatabase::with_store(MemoryVectorStore::new(4), dir.path(), config).unwrap();

        let batch: Vec<Record> = (0..100u64).map(|i| Record::random(i, 4)).collect();
        let base = db.insert_records(&batch).unwrap();
        assert_eq!(base.num_partitions(), 10);

        // 101 records still round to 10 partitions.
        let extended = db.insert_records(&[Record::random(500u64, 4)]).unwrap();
        assert_eq!(extended.centroids(), base.centroids());
        assert_eq!(extended.len(), 101);

        // 121 records round to 11 partitions: full re-cluster.
        let more: Vec<Record> = (600..620u64).map(|i| Record::random(i, 4)).collect();
        let rebuilt = db.insert_records(&more).unwrap();
        assert_eq!(rebuilt.num_partitions(), 11);
    }

    #[test]
    fn test_assign_to_nearest_recovers_failed_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(4)
            .with_seed(11)
            .with_update_strategy(UpdateStrategy::AssignToNearest);
        let db = VectorDatabase::with_store(MemoryVectorStore::new(4), dir.path(), config).unwrap();
        let batch: Vec<Record> = (0..100u64).map(|i| Record::random(i, 4)).collect();
        db.insert_records(&batch).unwrap();

        // A non-empty directory at CURRENT makes publishing fail.
        let current = dir.path().join(layout::CURRENT_FILE);
        std::fs::remove_file(&current).unwrap();
        std::fs::create_dir(&current).unwrap();
        std::fs::write(current.join("blocker"), b"x").unwrap();
        let result = db.insert_records(&[Record::random(500u64, 4)]);
        assert!(matches!(result, Err(IvfError::Io(_))));
        assert_eq!(db.count(), 101);
        assert_eq!(db.snapshot().unwrap().len(), 100);

        std::fs::remove_dir_all(&current).unwrap();
        let index = db.insert_records(&[Record::random(501u64, 4)]).unwrap();
        assert_eq!(index.len(), 102);
        let ids: Vec<RecordId> = index.partition_ids().unwrap().into_iter().flatten().collect();
        assert!(ids.contains(&RecordId(500)));
        assert!(ids.contains(&RecordId(501)));
    }

    #[test]
    fn test_with_store_reconciles_published_build() {
        let dir = tempfile::tempdir().unwrap();
        let built = {
            let db = memory_db(dir.path(), 4);
            let batch: Vec<Record> = (0..50u64).map(|i| Record::random(i, 4)).collect();
            db.insert_records(&batch).unwrap()
        };

        // An empty store must not serve the old build's records.
        let db = memory_db(dir.path(), 4);
        assert!(db.snapshot().is_none());
        assert!(matches!(
            db.query(&[1.0, 0.0, 0.0, 0.0], 1),
            Err(IvfError::EmptyIndex)
        ));

        // A store with different contents gets a fresh build.
        let mut store = MemoryVectorStore::new(4);
        let other: Vec<Record> = (900..930u64).map(|i| Record::random(i, 4)).collect();
        store.append(&other).unwrap();
        let db = VectorDatabase::with_store(store, dir.path(), IndexConfig::new(4).with_seed(7)).unwrap();
        let live = db.snapshot().unwrap();
        assert_ne!(live.build_id(), built.build_id());
        assert_eq!(live.len(), 30);
        let ids: Vec<RecordId> = live.partition_ids().unwrap().into_iter().flatten().collect();
        assert!(ids.iter().all(|id| id.0 >= 900));
    }

    #[test]
    fn test_file_database_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(3).with_seed(5);
        let build_id = {
            let db = VectorDatabase::open(dir.path(), config.clone()).unwrap();
            db.insert_records(&[
                Record::new(10u64, vec![1.0, 0.0, 0.0]),
                Record::new(20u64, vec![0.0, 1.0, 0.0]),
            ])
            .unwrap()
            .build_id()
        };

        let db = VectorDatabase::open(dir.path(), config).unwrap();
        assert_eq!(db.count(), 2);
        assert_eq!(db.snapshot().unwrap().build_id(), build_id);
        assert_eq!(db.query(&[0.0, 1.0, 0.0], 1).unwrap(), vec![RecordId(20)]);
    }

    #[test]
    fn test_create_discards_existing() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(2);
        {
            let db = VectorDatabase::open(dir.path(), config.clone()).unwrap();
            db.insert_records(&[Record::new(1u64, vec![1.0, 0.0])]).unwrap();
        }
        let db = VectorDatabase::create(dir.path(), config).unwrap();
        assert_eq!(db.count(), 0);
        assert!(db.snapshot().is_none());
    }
}
