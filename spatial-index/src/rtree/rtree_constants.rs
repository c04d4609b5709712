//! Constants for the R-tree engine.

/// Default number of dimensions
pub const DEFAULT_DIMENSION: usize = 2;

/// Default maximum fan-out of index and leaf nodes
pub const DEFAULT_CAPACITY: usize = 100;

/// Smallest capacity that still allows a split into two valid halves
pub const MIN_CAPACITY: usize = 3;

/// Default minimum occupancy as a fraction of the capacity
pub const DEFAULT_FILL_FACTOR: f64 = 0.4;

/// Default number of candidates re-ranked by overlap in R* subtree selection
pub const DEFAULT_NEAR_MINIMUM_OVERLAP_FACTOR: usize = 32;

/// Magic number of the persisted tree header
pub const HEADER_MAGIC: u32 = 0x5254_5245; // "RTRE"

/// Tree header format version
pub const HEADER_VERSION: u32 = 1;
