//! File format definitions for ivfdb persistence.

use crate::error::{IvfError, Result};

/// Magic bytes identifying an ivfdb file: "IVFDB\0\0\0"
pub const MAGIC: [u8; 8] = *b"IVFDB\0\0\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// File kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileKind {
    /// Append-only record log.
    RecordStore = 1,
    /// Centroid matrix of one build.
    Centroids = 2,
    /// Records of one partition of one build.
    Partition = 3,
    /// Build manifest.
    Manifest = 4,
}

impl FileKind {
    /// Convert from u32.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::RecordStore),
            2 => Some(Self::Centroids),
            3 => Some(Self::Partition),
            4 => Some(Self::Manifest),
            _ => None,
        }
    }
}

/// File header structure.
///
/// Total size: 24 bytes
/// ```text
/// [MAGIC 8B][VERSION u32][KIND u32][DIMENSION u32][CHECKSUM u32]
/// ```
///
/// The record store is appended to after its header is written, so its
/// checksum field is always zero and unchecked.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Magic bytes (must be MAGIC)
    pub magic: [u8; 8],
    /// Format version
    pub version: u32,
    /// File kind
    pub kind: FileKind,
    /// Embedding dimension of the rows or centroids in the file
    pub dimension: u32,
    /// CRC32 checksum of the data section (everything after header)
    pub checksum: u32,
}

impl FileHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 24;

    /// Create a new header.
    pub fn new(kind: FileKind, dimension: usize, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            kind,
            dimension: dimension as u32,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&(self.kind as u32).to_le_bytes());
        bytes[16..20].copy_from_slice(&self.dimension.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(IvfError::invalid_format("header too small"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        if magic != MAGIC {
            return Err(IvfError::invalid_format("invalid magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let kind_raw = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let dimension = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let checksum = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);

        let kind = FileKind::from_u32(kind_raw)
            .ok_or_else(|| IvfError::invalid_format("unknown file kind"))?;

        Ok(Self {
            magic,
            version,
            kind,
            dimension,
            checksum,
        })
    }

    /// Verify the header is valid and matches the expected kind and dimension.
    pub fn verify(&self, expected_kind: FileKind, expected_dim: usize) -> Result<()> {
        if self.magic != MAGIC {
            return Err(IvfError::invalid_format("invalid magic bytes"));
        }

        if self.version > FORMAT_VERSION {
            return Err(IvfError::invalid_format(format!(
                "unsupported version {} (max supported: {})",
                self.version, FORMAT_VERSION
            )));
        }

        if self.kind != expected_kind {
            return Err(IvfError::invalid_format(format!(
                "file kind mismatch: expected {:?}, got {:?}",
                expected_kind, self.kind
            )));
        }

        if self.dimension as usize != expected_dim {
            return Err(IvfError::dimension_mismatch(
                expected_dim,
                self.dimension as usize,
            ));
        }

        Ok(())
    }
}
