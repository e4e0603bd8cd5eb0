//! Core newtypes for type-safe index operations.
//!
//! These types keep record identifiers, dimensions and build identifiers
//! from being mixed up with plain integers and strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use ulid::{Generator, Ulid};

/// A caller-assigned, unique identifier for a record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Create a new RecordId.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl From<u64> for RecordId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for u64 {
    #[inline]
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// The dimensionality of embeddings in a database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Dimension(pub usize);

impl Dimension {
    /// Create a new Dimension.
    #[inline]
    pub const fn new(dim: usize) -> Self {
        Self(dim)
    }

    /// Get the raw usize value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Dimension {
    #[inline]
    fn from(dim: usize) -> Self {
        Self(dim)
    }
}

/// Identifier of one index build.
///
/// Every build writes its centroids and partition segments under its own
/// id, so a reader can never pair segments from two different builds.
/// ULIDs sort by creation time, which makes the newest build easy to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BuildId(pub Ulid);

impl BuildId {
    /// Generate a fresh build id, strictly greater than any previously
    /// generated by this process.
    pub fn generate() -> Self {
        static GENERATOR: OnceLock<parking_lot::Mutex<Generator>> = OnceLock::new();
        let mut generator = GENERATOR
            .get_or_init(|| parking_lot::Mutex::new(Generator::new()))
            .lock();
        // Overflow only happens after 2^80 ids in one millisecond.
        generator.generate().map(Self).unwrap_or_else(|_| Self(Ulid::new()))
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BuildId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ulid::from_string(s.trim()).map(Self)
    }
}
