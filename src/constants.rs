//! Named constants for configuration values.
//!
//! This module centralizes magic numbers and default values used throughout
//! the codebase, making them easier to find, document, and tune.

/// Constants for the record layout.
pub mod record {
    /// Embedding dimension of the reference deployment.
    pub const DEFAULT_DIMENSION: usize = 70;
}

/// Constants for k-means clustering.
pub mod kmeans {
    /// Threshold for switching from k-means++ to random initialization.
    /// k-means++ has O(k²n) complexity, which becomes expensive for large k.
    pub const KMEANSPP_THRESHOLD: usize = 64;

    /// Centroid movement below which training stops even if some
    /// assignments are still flipping between equidistant centroids.
    pub const CONVERGENCE_THRESHOLD: f32 = 1e-6;

    /// Default number of Lloyd iterations per build.
    pub const DEFAULT_MAX_ITERATIONS: usize = 32;
}

/// Constants for query-time probing.
pub mod search {
    /// Candidate partitions probed per query: `ceil(PROBE_FACTOR * sqrt(P))`.
    pub const PROBE_FACTOR: f32 = 1.5;
}

/// Constants for on-disk layout.
pub mod layout {
    /// File under the index root naming the live build.
    pub const CURRENT_FILE: &str = "CURRENT";

    /// Directory under the index root holding one subdirectory per build.
    pub const BUILDS_DIR: &str = "builds";

    /// Build manifest file name.
    pub const MANIFEST_FILE: &str = "manifest.bin";

    /// Centroid matrix file name.
    pub const CENTROIDS_FILE: &str = "centroids.bin";

    /// Record store file name under a database root.
    pub const STORE_FILE: &str = "records.bin";

    /// Index directory name under a database root.
    pub const INDEX_DIR: &str = "index";

    /// Number of superseded builds kept on disk after a new one goes live.
    pub const DEFAULT_RETAIN_BUILDS: usize = 1;
}
