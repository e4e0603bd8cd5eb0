//! Persistence layer shared by the record store and index builds.
//!
//! # File Format
//!
//! ```text
//! [MAGIC 8B "IVFDB\0\0\0"][VERSION u32][KIND u32][DIMENSION u32][CHECKSUM u32]
//! [DATA section (kind-specific)]
//! ```
//!
//! Records use one fixed-width row encoding everywhere they are stored:
//!
//! ```text
//! [ID u64 LE][COMPONENT f32 LE] * DIMENSION
//! ```

mod format;

pub use format::{FileHeader, FileKind, FORMAT_VERSION, MAGIC};

use crate::error::{IvfError, Result};
use crate::vector::Record;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Size in bytes of one encoded record row.
#[inline]
pub const fn row_size(dim: usize) -> usize {
    8 + dim * 4
}

/// Append the row encoding of `record` to `buf`.
pub fn encode_row(buf: &mut Vec<u8>, record: &Record) {
    buf.extend_from_slice(&record.id.as_u64().to_le_bytes());
    for &val in record.embedding.iter() {
        buf.extend_from_slice(&val.to_le_bytes());
    }
}

/// Decode a buffer of consecutive rows.
///
/// Fails if the buffer length is not a whole number of rows.
pub fn decode_rows(data: &[u8], dim: usize) -> Result<Vec<Record>> {
    let size = row_size(dim);
    if data.len() % size != 0 {
        return Err(IvfError::invalid_format(format!(
            "row data length {} is not a multiple of row size {}",
            data.len(),
            size
        )));
    }

    Ok(data.chunks_exact(size).map(|row| decode_row(row, dim)).collect())
}

/// Decode one row. `row` must be exactly `row_size(dim)` bytes.
fn decode_row(row: &[u8], dim: usize) -> Record {
    let mut id = [0u8; 8];
    id.copy_from_slice(&row[..8]);
    let embedding: Vec<f32> = row[8..8 + dim * 4]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Record::new(u64::from_le_bytes(id), embedding)
}

/// Verify file header and return the data section.
pub(crate) fn verify_header(data: &[u8], kind: FileKind, dim: usize) -> Result<&[u8]> {
    if data.len() < FileHeader::SIZE {
        return Err(IvfError::invalid_format("file too small for header"));
    }

    let header = FileHeader::from_bytes(&data[..FileHeader::SIZE])?;
    header.verify(kind, dim)?;

    let data_section = &data[FileHeader::SIZE..];
    let computed_checksum = crc32fast::hash(data_section);

    if computed_checksum != header.checksum {
        return Err(IvfError::ChecksumMismatch);
    }

    Ok(data_section)
}

/// Read a whole file and return its verified data section.
pub(crate) fn read_verified(path: impl AsRef<Path>, kind: FileKind, dim: usize) -> Result<Vec<u8>> {
    let mut data = fs::read(path)?;
    verify_header(&data, kind, dim)?;
    Ok(data.split_off(FileHeader::SIZE))
}

/// Write header and data to file.
///
/// The bytes go to a sibling temp file that is synced and then renamed over
/// `path`, so readers see either the old file or the complete new one.
pub(crate) fn write_with_header(
    path: impl AsRef<Path>,
    kind: FileKind,
    dim: usize,
    data: &[u8],
) -> Result<()> {
    let path = path.as_ref();
    let checksum = crc32fast::hash(data);
    let header = FileHeader::new(kind, dim, checksum);

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&header.to_bytes())?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path)?;

    Ok(())
}

/// Replace a small text file atomically.
pub(crate) fn write_atomic_text(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path)?;
    Ok(())
}

/// Flush directory metadata so a rename survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}
