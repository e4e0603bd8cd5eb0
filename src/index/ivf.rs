//! Inverted File (IVF) index snapshots.
//!
//! An [`IvfIndex`] is an immutable view of one build: its manifest, its
//! centroid matrix and the location of its partition segments. Segments
//! are read from disk on demand at query time.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/CURRENT                          build id of the live build
//! <root>/builds/<build id>/manifest.bin   bincode Manifest
//! <root>/builds/<build id>/centroids.bin  [BUILD 16B][P u32][f32 * P * D]
//! <root>/builds/<build id>/partition-<i>.seg
//!                                         [BUILD 16B][PARTITION u32][COUNT u32][rows]
//! ```
//!
//! Every file carries the checksummed header from [`crate::persistence`].
//! Centroids and segments embed their build id and are rejected when it
//! does not match the manifest, so one snapshot never reads another
//! build's data.

use crate::config::{IndexConfig, MissingPartitionPolicy};
use crate::constants::layout;
use crate::error::{IvfError, Result};
use crate::persistence::{self, FileKind};
use crate::types::{BuildId, RecordId};
use crate::vector::Record;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use ulid::Ulid;

/// How a build was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildKind {
    /// Re-clustered from the full store.
    Full,
    /// Previous centroids kept, new records appended to their nearest partition.
    Incremental {
        /// Build whose centroids were reused.
        parent: BuildId,
    },
}

/// Description of one build, written after all of its segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Build identifier.
    pub build_id: BuildId,
    /// Embedding dimension.
    pub dimension: usize,
    /// Records covered by the build.
    pub num_records: usize,
    /// Record count of every partition, indexed by partition number.
    pub partition_sizes: Vec<usize>,
    /// How the build was produced.
    pub kind: BuildKind,
    /// Lloyd iterations run (0 for incremental builds).
    pub kmeans_iterations: usize,
    /// Build completion time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
}

impl Manifest {
    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.partition_sizes.len()
    }
}

/// Directory holding the files of one build.
pub fn build_dir(root: &Path, build_id: BuildId) -> PathBuf {
    root.join(layout::BUILDS_DIR).join(build_id.to_string())
}

/// Path of the segment for partition `partition` of a build.
pub fn partition_path(build_dir: &Path, partition: usize) -> PathBuf {
    build_dir.join(format!("partition-{partition:05}.seg"))
}

/// Read the live build id from `<root>/CURRENT`, if any.
pub fn current_build(root: &Path) -> Result<Option<BuildId>> {
    let path = root.join(layout::CURRENT_FILE);
    match fs::read_to_string(&path) {
        Ok(s) => s
            .parse()
            .map(Some)
            .map_err(|e| IvfError::invalid_format(format!("bad CURRENT file: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

fn build_id_bytes(id: BuildId) -> [u8; 16] {
    id.0.to_bytes()
}

fn read_build_id(data: &[u8]) -> Result<BuildId> {
    let bytes: [u8; 16] = data
        .get(..16)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| IvfError::invalid_format("missing build id"))?;
    Ok(BuildId(Ulid::from_bytes(bytes)))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| IvfError::invalid_format("truncated header field"))
}

pub(crate) fn serialize_centroids(build_id: BuildId, centroids: &[Vec<f32>]) -> Vec<u8> {
    let dim = centroids.first().map_or(0, |c| c.len());
    let mut buf = Vec::with_capacity(20 + centroids.len() * dim * 4);
    buf.extend_from_slice(&build_id_bytes(build_id));
    buf.extend_from_slice(&(centroids.len() as u32).to_le_bytes());
    for centroid in centroids {
        for &val in centroid {
            buf.extend_from_slice(&val.to_le_bytes());
        }
    }
    buf
}

pub(crate) fn deserialize_centroids(
    data: &[u8],
    build_id: BuildId,
    dim: usize,
) -> Result<Vec<Vec<f32>>> {
    if dim == 0 {
        return Err(IvfError::invalid_input("dimension must be > 0"));
    }
    let found = read_build_id(data)?;
    if found != build_id {
        return Err(IvfError::invalid_format(format!(
            "centroids belong to build {found}, expected {build_id}"
        )));
    }
    let count = read_u32(data, 16)? as usize;
    let body = &data[20..];
    if body.len() != count * dim * 4 {
        return Err(IvfError::invalid_format(format!(
            "centroids size mismatch: expected {} bytes, got {}",
            count * dim * 4,
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(dim * 4)
        .map(|row| {
            row.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
        .collect())
}

pub(crate) fn serialize_partition(build_id: BuildId, partition: usize, records: &[&Record]) -> Vec<u8> {
    let dim = records.first().map_or(0, |r| r.dim());
    let mut buf = Vec::with_capacity(24 + records.len() * persistence::row_size(dim));
    buf.extend_from_slice(&build_id_bytes(build_id));
    buf.extend_from_slice(&(partition as u32).to_le_bytes());
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        persistence::encode_row(&mut buf, record);
    }
    buf
}

pub(crate) fn deserialize_partition(
    data: &[u8],
    build_id: BuildId,
    partition: usize,
    dim: usize,
) -> Result<Vec<Record>> {
    let found = read_build_id(data)?;
    if found != build_id {
        return Err(IvfError::invalid_format(format!(
            "segment belongs to build {found}, expected {build_id}"
        )));
    }
    let found_partition = read_u32(data, 16)? as usize;
    if found_partition != partition {
        return Err(IvfError::invalid_format(format!(
            "segment holds partition {found_partition}, expected {partition}"
        )));
    }
    let count = read_u32(data, 20)? as usize;
    let records = persistence::decode_rows(&data[24..], dim)?;
    if records.len() != count {
        return Err(IvfError::invalid_format(format!(
            "segment row count mismatch: header says {count}, found {}",
            records.len()
        )));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Index snapshot
// ---------------------------------------------------------------------------

/// Immutable snapshot of one IVF build.
///
/// Cheap to share behind an `Arc`; queries take `&self`.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    dir: PathBuf,
    manifest: Manifest,
    centroids: Vec<Vec<f32>>,
    probe_factor: f32,
    missing_partition: MissingPartitionPolicy,
}

impl IvfIndex {
    pub(crate) fn from_parts(
        dir: PathBuf,
        manifest: Manifest,
        centroids: Vec<Vec<f32>>,
        config: &IndexConfig,
    ) -> Self {
        Self {
            dir,
            manifest,
            centroids,
            probe_factor: config.probe_factor,
            missing_partition: config.missing_partition,
        }
    }

    /// Load the build named by `<root>/CURRENT`. Returns `None` when no
    /// build has been published yet.
    pub fn open(root: impl AsRef<Path>, config: &IndexConfig) -> Result<Option<Self>> {
        let root = root.as_ref();
        match current_build(root)? {
            Some(id) => Self::load(root, id, config).map(Some),
            None => Ok(None),
        }
    }

    /// Load a specific build.
    pub fn load(root: impl AsRef<Path>, build_id: BuildId, config: &IndexConfig) -> Result<Self> {
        let dir = build_dir(root.as_ref(), build_id);
        let dim = config.dimension;

        let manifest_bytes =
            persistence::read_verified(dir.join(layout::MANIFEST_FILE), FileKind::Manifest, dim)?;
        let manifest: Manifest = bincode::deserialize(&manifest_bytes)?;
        if manifest.build_id != build_id {
            return Err(IvfError::invalid_format(format!(
                "manifest names build {}, expected {build_id}",
                manifest.build_id
            )));
        }

        let centroid_bytes =
            persistence::read_verified(dir.join(layout::CENTROIDS_FILE), FileKind::Centroids, dim)?;
        let centroids = deserialize_centroids(&centroid_bytes, build_id, dim)?;
        if centroids.len() != manifest.num_partitions() {
            return Err(IvfError::invalid_format(format!(
                "manifest lists {} partitions but {} centroids were stored",
                manifest.num_partitions(),
                centroids.len()
            )));
        }

        debug!(build_id = %build_id, partitions = centroids.len(), "loaded index");
        Ok(Self::from_parts(dir, manifest, centroids, config))
    }

    /// Build identifier of this snapshot.
    pub fn build_id(&self) -> BuildId {
        self.manifest.build_id
    }

    /// Build manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Centroid of each partition.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Number of partitions (centroids).
    pub fn num_partitions(&self) -> usize {
        self.centroids.len()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    /// Total number of indexed records.
    pub fn len(&self) -> usize {
        self.manifest.num_records
    }

    /// Return true if the index covers no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directory holding this build's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn probe_factor(&self) -> f32 {
        self.probe_factor
    }

    pub(crate) fn missing_partition_policy(&self) -> MissingPartitionPolicy {
        self.missing_partition
    }

    /// Read the records of one partition from its segment.
    pub fn read_partition(&self, partition: usize) -> Result<Vec<Record>> {
        if partition >= self.num_partitions() {
            return Err(IvfError::invalid_input(format!(
                "partition {partition} out of range (index has {})",
                self.num_partitions()
            )));
        }
        let data = persistence::read_verified(
            partition_path(&self.dir, partition),
            FileKind::Partition,
            self.dimension(),
        )?;
        deserialize_partition(&data, self.build_id(), partition, self.dimension())
    }

    /// Ids of every partition, read from disk.
    pub fn partition_ids(&self) -> Result<Vec<Vec<RecordId>>> {
        (0..self.num_partitions())
            .map(|p| Ok(self.read_partition(p)?.into_iter().map(|r| r.id).collect()))
            .collect()
    }
}
