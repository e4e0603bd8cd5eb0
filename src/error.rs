//! Error types for ivfdb operations.
//!
//! One taxonomy covers the whole crate: argument validation, operations
//! attempted before any data or build exists, dimension checks, persistence
//! failures and unreadable partition segments.

use std::io;
use thiserror::Error;

/// Result type alias using [`IvfError`].
pub type Result<T> = std::result::Result<T, IvfError>;

/// Errors that can occur during ivfdb operations.
#[derive(Error, Debug)]
pub enum IvfError {
    /// Malformed or empty arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A build was requested but the store holds no records.
    #[error("empty store: at least one record is required to build an index")]
    EmptyStore,

    /// A query was issued before any index build completed.
    #[error("empty index: build the index before querying")]
    EmptyIndex,

    /// Vector dimensions do not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected vector dimension.
        expected: usize,
        /// Actual vector dimension provided.
        actual: usize,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A partition segment selected for a query could not be read.
    #[error("partition {partition} unreadable: {reason}")]
    MissingPartition {
        /// Partition number within the build.
        partition: usize,
        /// Underlying failure.
        reason: String,
    },

    /// A record id was appended twice.
    #[error("duplicate record id: {0}")]
    DuplicateId(u64),

    /// Checksum verification failed while loading a file.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// File has an invalid or unrecognized format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Clustering was stopped by its iteration observer.
    #[error("clustering cancelled after iteration {iteration}")]
    Cancelled {
        /// Number of completed iterations.
        iteration: usize,
    },
}

impl IvfError {
    /// Creates a new `InvalidInput` error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `MissingPartition` error.
    pub fn missing_partition(partition: usize, reason: impl ToString) -> Self {
        Self::MissingPartition {
            partition,
            reason: reason.to_string(),
        }
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<bincode::Error> for IvfError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
