//! Build phase for IVF indexes.
//!
//! Pipeline: read the whole store -> train `round(sqrt(N))` centroids ->
//! group records by partition -> write segments, centroids and manifest
//! into a fresh build directory -> point `CURRENT` at it -> prune old builds.
//!
//! Every build is a full rebuild: cost is `O(N * D * P * iterations)` per
//! insert batch, so the API suits bulk loads, not frequent small inserts.
//! [`IndexBuilder::extend`] is the cheaper approximate alternative.
//!
//! A build that fails part way leaves `CURRENT` untouched; the previous
//! build stays live and the partial directory is removed.

use super::ivf::{self, BuildKind, IvfIndex, Manifest};
use crate::config::IndexConfig;
use crate::constants::layout;
use crate::error::{IvfError, Result};
use crate::kmeans::{self, IterationStats, KMeans};
use crate::persistence::{self, FileKind};
use crate::store::VectorStore;
use crate::types::BuildId;
use crate::vector::Record;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Writes IVF builds under an index root directory.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    root: PathBuf,
    config: IndexConfig,
}

impl IndexBuilder {
    /// Create a builder writing under `root`.
    pub fn new(root: impl Into<PathBuf>, config: IndexConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Index root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builder configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Fully rebuild the index from every record in `store` and publish it.
    pub fn build<S: VectorStore + ?Sized>(&self, store: &S) -> Result<IvfIndex> {
        self.build_with(store, |_| ControlFlow::Continue(()))
    }

    /// Like [`IndexBuilder::build`], reporting clustering progress to
    /// `observer` after each iteration. Breaking from the observer abandons
    /// the build with [`IvfError::Cancelled`].
    pub fn build_with<S, F>(&self, store: &S, observer: F) -> Result<IvfIndex>
    where
        S: VectorStore + ?Sized,
        F: FnMut(&IterationStats) -> ControlFlow<()>,
    {
        if store.dimension() != self.config.dimension {
            return Err(IvfError::dimension_mismatch(
                self.config.dimension,
                store.dimension(),
            ));
        }
        let records = store.all()?;
        self.build_from_records(&records, observer)
    }

    /// Cluster `records` and publish them as a new build.
    pub fn build_from_records<F>(&self, records: &[Record], observer: F) -> Result<IvfIndex>
    where
        F: FnMut(&IterationStats) -> ControlFlow<()>,
    {
        self.config.validate()?;
        if records.is_empty() {
            return Err(IvfError::EmptyStore);
        }
        let dim = self.config.dimension;
        if let Some(r) = records.iter().find(|r| r.dim() != dim) {
            return Err(IvfError::dimension_mismatch(dim, r.dim()));
        }

        let start = Instant::now();
        let num_partitions = kmeans::partition_count(records.len());
        let build_id = BuildId::generate();
        info!(
            build_id = %build_id,
            n = records.len(),
            dim,
            partitions = num_partitions,
            "building IVF index"
        );

        let embeddings: Vec<&[f32]> = records.iter().map(|r| &r.embedding[..]).collect();
        let partitioning = KMeans::new(num_partitions, self.config.max_iterations)
            .with_seed(self.config.seed)
            .with_convergence_threshold(self.config.convergence_threshold)
            .fit_with(&embeddings, observer)?;

        let mut partitions: Vec<Vec<&Record>> = vec![Vec::new(); num_partitions];
        for (record, &p) in records.iter().zip(partitioning.assignments.iter()) {
            partitions[p].push(record);
        }

        let manifest = Manifest {
            build_id,
            dimension: dim,
            num_records: records.len(),
            partition_sizes: partitions.iter().map(|p| p.len()).collect(),
            kind: BuildKind::Full,
            kmeans_iterations: partitioning.iterations,
            created_at_ms: now_ms(),
        };

        let index = self.write_build(manifest, partitioning.centroids, &partitions)?;
        info!(
            build_id = %build_id,
            iterations = partitioning.iterations,
            converged = partitioning.converged,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "IVF index build complete"
        );
        Ok(index)
    }

    /// Approximate update: append `new_records` to the partition of their
    /// nearest existing centroid, without re-clustering.
    ///
    /// The result is a new build sharing `current`'s centroids. Centroids
    /// are not recomputed, so partition quality degrades as data drifts
    /// away from the original clustering.
    pub fn extend(&self, current: &IvfIndex, new_records: &[Record]) -> Result<IvfIndex> {
        if current.dimension() != self.config.dimension {
            return Err(IvfError::dimension_mismatch(
                self.config.dimension,
                current.dimension(),
            ));
        }
        if let Some(r) = new_records.iter().find(|r| r.dim() != self.config.dimension) {
            return Err(IvfError::dimension_mismatch(self.config.dimension, r.dim()));
        }

        let build_id = BuildId::generate();
        let mut existing: Vec<Vec<Record>> = (0..current.num_partitions())
            .map(|p| current.read_partition(p))
            .collect::<Result<_>>()?;

        let embeddings: Vec<&[f32]> = new_records.iter().map(|r| &r.embedding[..]).collect();
        let assignments = kmeans::assign_to_nearest(&embeddings, current.centroids());
        for (record, &p) in new_records.iter().zip(assignments.iter()) {
            existing[p].push(record.clone());
        }

        let partitions: Vec<Vec<&Record>> = existing.iter().map(|p| p.iter().collect()).collect();
        let manifest = Manifest {
            build_id,
            dimension: self.config.dimension,
            num_records: current.len() + new_records.len(),
            partition_sizes: partitions.iter().map(|p| p.len()).collect(),
            kind: BuildKind::Incremental {
                parent: current.build_id(),
            },
            kmeans_iterations: 0,
            created_at_ms: now_ms(),
        };

        info!(
            build_id = %build_id,
            parent = %current.build_id(),
            added = new_records.len(),
            "extending IVF index without re-clustering"
        );
        self.write_build(manifest, current.centroids().to_vec(), &partitions)
    }

    /// Write all files of a build, then publish it.
    fn write_build(
        &self,
        manifest: Manifest,
        centroids: Vec<Vec<f32>>,
        partitions: &[Vec<&Record>],
    ) -> Result<IvfIndex> {
        let build_id = manifest.build_id;
        let dir = ivf::build_dir(&self.root, build_id);

        if let Err(e) = self.write_files(&dir, &manifest, &centroids, partitions) {
            warn!(build_id = %build_id, error = %e, "build failed, discarding partial files");
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        let current = self.root.join(layout::CURRENT_FILE);
        if let Err(e) = persistence::write_atomic_text(&current, &build_id.to_string()) {
            // Keep the files only if the pointer swap landed anyway.
            if !matches!(ivf::current_build(&self.root), Ok(Some(id)) if id == build_id) {
                warn!(build_id = %build_id, error = %e, "publish failed, discarding build");
                let _ = fs::remove_dir_all(&dir);
            }
            return Err(e);
        }
        debug!(build_id = %build_id, "published build");

        if let Err(e) = self.prune(build_id) {
            warn!(error = %e, "failed to prune old builds");
        }

        Ok(IvfIndex::from_parts(dir, manifest, centroids, &self.config))
    }

    fn write_files(
        &self,
        dir: &Path,
        manifest: &Manifest,
        centroids: &[Vec<f32>],
        partitions: &[Vec<&Record>],
    ) -> Result<()> {
        let dim = manifest.dimension;
        fs::create_dir_all(dir)?;

        for (i, members) in partitions.iter().enumerate() {
            let data = ivf::serialize_partition(manifest.build_id, i, members);
            persistence::write_with_header(ivf::partition_path(dir, i), FileKind::Partition, dim, &data)?;
            debug!(partition = i, count = members.len(), "wrote partition segment");
        }

        let data = ivf::serialize_centroids(manifest.build_id, centroids);
        persistence::write_with_header(dir.join(layout::CENTROIDS_FILE), FileKind::Centroids, dim, &data)?;

        // Manifest last: a build directory without one is incomplete.
        let data = bincode::serialize(manifest)?;
        persistence::write_with_header(dir.join(layout::MANIFEST_FILE), FileKind::Manifest, dim, &data)?;
        Ok(())
    }

    /// Remove superseded builds beyond `retain_builds`, newest kept first.
    fn prune(&self, live: BuildId) -> Result<()> {
        let builds_dir = self.root.join(layout::BUILDS_DIR);
        let mut builds: Vec<BuildId> = fs::read_dir(&builds_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<BuildId>().ok())
            .filter(|id| *id != live)
            .collect();

        builds.sort_unstable_by(|a, b| b.cmp(a));
        for old in builds.into_iter().skip(self.config.retain_builds) {
            debug!(build_id = %old, "removing superseded build");
            fs::remove_dir_all(ivf::build_dir(&self.root, old))?;
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVectorStore;
    use crate::types::RecordId;
    use std::collections::HashSet;

    fn store_with(n: u64, dim: usize) -> MemoryVectorStore {
        let mut store = MemoryVectorStore::new(dim);
        let records: Vec<Record> = (0..n).map(|i| Record::random(i, dim)).collect();
        store.append(&records).unwrap();
        store
    }

    #[test]
    fn test_build_covers_every_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(200, 8);
        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(8).with_seed(1));

        let index = builder.build(&store).unwrap();
        assert_eq!(index.num_partitions(), 14);
        assert_eq!(index.len(), 200);

        let mut seen = HashSet::new();
        for ids in index.partition_ids().unwrap() {
            for id in ids {
                assert!(seen.insert(id), "{id} appears in two partitions");
            }
        }
        let expected: HashSet<RecordId> = (0..200).map(RecordId).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_build_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(4).with_seed(2);
        let store = store_with(50, 4);
        let built = IndexBuilder::new(dir.path(), config.clone()).build(&store).unwrap();

        let loaded = IvfIndex::open(dir.path(), &config).unwrap().unwrap();
        assert_eq!(loaded.build_id(), built.build_id());
        assert_eq!(loaded.centroids(), built.centroids());
        assert_eq!(loaded.manifest(), built.manifest());
    }

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryVectorStore::new(4);
        let result = IndexBuilder::new(dir.path(), IndexConfig::new(4)).build(&store);
        assert!(matches!(result, Err(IvfError::EmptyStore)));
    }

    #[test]
    fn test_store_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(10, 4);
        let result = IndexBuilder::new(dir.path(), IndexConfig::new(8)).build(&store);
        assert!(matches!(result, Err(IvfError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_rebuild_prunes_old_builds() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(30, 4);
        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(4).with_retain_builds(1));

        let first = builder.build(&store).unwrap();
        let second = builder.build(&store).unwrap();
        let third = builder.build(&store).unwrap();

        assert!(!first.dir().exists());
        assert!(second.dir().exists());
        assert!(third.dir().exists());
        assert_eq!(ivf::current_build(dir.path()).unwrap(), Some(third.build_id()));
    }

    #[test]
    fn test_cancelled_build_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(30, 4);
        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(4));
        let live = builder.build(&store).unwrap();

        let result = builder.build_with(&store, |_| ControlFlow::Break(()));
        assert!(matches!(result, Err(IvfError::Cancelled { .. })));
        assert_eq!(ivf::current_build(dir.path()).unwrap(), Some(live.build_id()));
    }

    #[test]
    fn test_failed_segment_write_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(30, 4);
        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(4));
        let live = builder.build(&store).unwrap();

        let records = store.all().unwrap();
        let build_id = BuildId::generate();
        let build_dir = ivf::build_dir(dir.path(), build_id);
        // A directory where segment 1 should go makes its rename fail.
        fs::create_dir_all(ivf::partition_path(&build_dir, 1)).unwrap();

        let partitions: Vec<Vec<&Record>> = vec![
            records.iter().take(10).collect(),
            records.iter().skip(10).collect(),
        ];
        let manifest = Manifest {
            build_id,
            dimension: 4,
            num_records: 30,
            partition_sizes: vec![10, 20],
            kind: BuildKind::Full,
            kmeans_iterations: 1,
            created_at_ms: 0,
        };
        let centroids = vec![vec![0.0; 4], vec![1.0; 4]];

        let result = builder.write_build(manifest, centroids, &partitions);
        assert!(matches!(result, Err(IvfError::Io(_))));
        assert!(!build_dir.exists());
        assert_eq!(ivf::current_build(dir.path()).unwrap(), Some(live.build_id()));

        let reopened = IvfIndex::open(dir.path(), builder.config()).unwrap().unwrap();
        assert_eq!(reopened.build_id(), live.build_id());
        assert_eq!(reopened.len(), 30);
    }

    #[test]
    fn test_failed_publish_discards_build() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(20, 4);
        let builder = IndexBuilder::new(dir.path(), IndexConfig::new(4));
        let live = builder.build(&store).unwrap();

        // A non-empty directory at CURRENT cannot be replaced by a rename.
        let current = dir.path().join(layout::CURRENT_FILE);
        fs::remove_file(&current).unwrap();
        fs::create_dir(&current).unwrap();
        fs::write(current.join("blocker"), b"x").unwrap();

        assert!(matches!(builder.build(&store), Err(IvfError::Io(_))));
        let builds: Vec<_> = fs::read_dir(dir.path().join(layout::BUILDS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(builds, vec![std::ffi::OsString::from(live.build_id().to_string())]);
    }

    #[test]
    fn test_extend_assigns_to_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(4).with_seed(3);
        let store = store_with(40, 4);
        let builder = IndexBuilder::new(dir.path(), config);
        let base = builder.build(&store).unwrap();

        let extra = vec![Record::new(1000u64, base.centroids()[2].clone())];
        let extended = builder.extend(&base, &extra).unwrap();

        assert_eq!(extended.len(), 41);
        assert_eq!(extended.centroids(), base.centroids());
        assert_eq!(
            extended.manifest().kind,
            BuildKind::Incremental {
                parent: base.build_id()
            }
        );
        let ids = &extended.partition_ids().unwrap()[2];
        assert!(ids.contains(&RecordId(1000)));
    }
}
