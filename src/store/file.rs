use super::{validate_batch, VectorStore};
use crate::error::{IvfError, Result};
use crate::persistence::{self, FileHeader, FileKind};
use crate::types::RecordId;
use crate::vector::Record;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Record store backed by a single append-only file.
///
/// Layout: a [`FileHeader`] of kind `RecordStore` followed by fixed-width
/// rows. The header checksum is unused since rows are appended after it.
/// A trailing partial row (torn append) is truncated away on open.
#[derive(Debug)]
pub struct FileVectorStore {
    path: PathBuf,
    dimension: usize,
    file: File,
    ids: HashSet<RecordId>,
    count: usize,
}

impl FileVectorStore {
    /// Create a new, empty store at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IvfError::invalid_input("dimension must be > 0"));
        }
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&FileHeader::new(FileKind::RecordStore, dimension, 0).to_bytes())?;
        file.sync_all()?;

        info!(path = %path.display(), dimension, "created record store");
        Ok(Self {
            path,
            dimension,
            file,
            ids: HashSet::new(),
            count: 0,
        })
    }

    /// Open an existing store, restoring its id set.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.len() < FileHeader::SIZE {
            return Err(IvfError::invalid_format("record store too small for header"));
        }
        FileHeader::from_bytes(&data[..FileHeader::SIZE])?.verify(FileKind::RecordStore, dimension)?;

        let row = persistence::row_size(dimension);
        let body = data.len() - FileHeader::SIZE;
        let whole = body - body % row;
        if whole != body {
            warn!(
                path = %path.display(),
                dropped_bytes = body - whole,
                "truncating partial trailing row"
            );
            file.set_len((FileHeader::SIZE + whole) as u64)?;
            file.sync_all()?;
        }

        let records = persistence::decode_rows(&data[FileHeader::SIZE..FileHeader::SIZE + whole], dimension)?;
        let ids: HashSet<RecordId> = records.iter().map(|r| r.id).collect();
        if ids.len() != records.len() {
            return Err(IvfError::invalid_format("record store contains duplicate ids"));
        }

        info!(path = %path.display(), records = records.len(), "opened record store");
        Ok(Self {
            path,
            dimension,
            file,
            count: records.len(),
            ids,
        })
    }

    /// Open the store at `path` if it exists, otherwise create it.
    pub fn open_or_create(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, dimension)
        } else {
            Self::create(path, dimension)
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VectorStore for FileVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn append(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        validate_batch(records, self.dimension, &self.ids)?;

        let mut buf = Vec::with_capacity(records.len() * persistence::row_size(self.dimension));
        for record in records {
            persistence::encode_row(&mut buf, record);
        }

        let end = (FileHeader::SIZE + self.count * persistence::row_size(self.dimension)) as u64;
        if let Err(e) = write_at_end(&mut self.file, &buf) {
            // Drop whatever part of the batch reached the file.
            let _ = self.file.set_len(end);
            return Err(e.into());
        }

        self.ids.extend(records.iter().map(|r| r.id));
        self.count += records.len();
        debug!(appended = records.len(), total = self.count, "appended records");
        Ok(())
    }

    fn all(&self) -> Result<Vec<Record>> {
        let data = std::fs::read(&self.path)?;
        if data.len() < FileHeader::SIZE {
            return Err(IvfError::invalid_format("record store too small for header"));
        }
        let end = FileHeader::SIZE + self.count * persistence::row_size(self.dimension);
        if data.len() < end {
            return Err(IvfError::invalid_format(format!(
                "record store truncated: expected {} bytes, found {}",
                end,
                data.len()
            )));
        }
        persistence::decode_rows(&data[FileHeader::SIZE..end], self.dimension)
    }

    fn count(&self) -> usize {
        self.count
    }
}

fn write_at_end(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::End(0))?;
    file.write_all(buf)?;
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");

        {
            let mut store = FileVectorStore::create(&path, 3).unwrap();
            store.append(&[Record::new(10u64, vec![1.0, 2.0, 3.0])]).unwrap();
            store
                .append(&[Record::new(11u64, vec![-1.0, 0.5, 0.0]), Record::new(12u64, vec![0.0; 3])])
                .unwrap();
            assert_eq!(store.count(), 3);
        }

        let mut store = FileVectorStore::open(&path, 3).unwrap();
        assert_eq!(store.count(), 3);
        let all = store.all().unwrap();
        assert_eq!(all[0], Record::new(10u64, vec![1.0, 2.0, 3.0]));
        assert_eq!(all[2].id, RecordId(12));

        let result = store.append(&[Record::new(11u64, vec![0.0; 3])]);
        assert!(matches!(result, Err(IvfError::DuplicateId(11))));
    }

    #[test]
    fn test_create_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");

        let mut store = FileVectorStore::create(&path, 2).unwrap();
        store.append(&[Record::new(1u64, vec![1.0, 1.0])]).unwrap();
        drop(store);

        let store = FileVectorStore::create(&path, 2).unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_open_with_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");
        FileVectorStore::create(&path, 4).unwrap();

        let result = FileVectorStore::open(&path, 70);
        assert!(matches!(result, Err(IvfError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_open_truncates_torn_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");
        {
            let mut store = FileVectorStore::create(&path, 2).unwrap();
            store.append(&[Record::new(1u64, vec![1.0, 1.0])]).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 5]).unwrap();
        drop(file);

        let mut store = FileVectorStore::open(&path, 2).unwrap();
        assert_eq!(store.count(), 1);
        store.append(&[Record::new(2u64, vec![0.0, 1.0])]).unwrap();

        let ids: Vec<u64> = store.all().unwrap().iter().map(|r| r.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");
        let mut store = FileVectorStore::open_or_create(&path, 2).unwrap();
        store.append(&[Record::new(1u64, vec![1.0, 1.0])]).unwrap();
        drop(store);

        let store = FileVectorStore::open_or_create(&path, 2).unwrap();
        assert_eq!(store.count(), 1);
    }
}
