//! # Spatial Index - Embeddable R-Tree over Pluggable Storage
//!
//! This crate stores multidimensional points and axis-aligned regions tagged
//! with identifiers and answers containment, intersection, point-location,
//! nearest-neighbor and self-join queries.
//!
//! ## Features
//!
//! - **Balanced R-Tree**: Linear, quadratic and R* split heuristics
//! - **Pluggable Storage**: Trees are written against a byte-array storage contract
//! - **Page-Based Disk Store**: Arrays span fixed-size pages with a persistent free list
//! - **Eviction Buffer**: Write-through or write-back caching with random or LRU eviction
//! - **Visitors and Commands**: Query results and node events are pushed to callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spatial_index::{
//!     BufferConfig, BufferedStorageManager, Data, DiskStorageConfig, DiskStorageManager,
//!     IndexConfig, Point, RTree, Region, SpatialIndex,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let disk = DiskStorageManager::create("places", DiskStorageConfig::default())?;
//! let buffer = Arc::new(BufferedStorageManager::new(disk, BufferConfig::new().capacity(256))?);
//!
//! let mut tree = RTree::create(buffer.clone(), IndexConfig::new().capacity(64))?;
//! tree.insert_data(Some(b"cafe"), &Point::new(vec![2.35, 48.85]), 1)?;
//! tree.insert_data(None, &Region::new_2d(2.0, 48.0, 3.0, 49.0), 2)?;
//!
//! let mut nearest = Vec::new();
//! tree.nearest_neighbor_query(1, &Point::new(vec![2.3, 48.8]), &mut |data: &Data| {
//!     nearest.push(data.id)
//! })?;
//!
//! let header_id = tree.header_id();
//! tree.flush()?;
//! # let _ = header_id;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod rtree;
pub mod shape;
pub mod spatial_index;
pub mod storage;

pub use config::{IndexConfig, PropertySet, PropertyValue, TreeVariant};
pub use errors::{Id, SpatialError, SpatialResult};
pub use rtree::{ChildEntry, Node, RTree, Statistics};
pub use shape::{Point, Region, Shape};
pub use spatial_index::{
    Command, CommandType, Data, EuclideanComparator, NearestNeighborComparator, QueryStrategy,
    SpatialIndex, Visitor,
};
pub use storage::{
    Buffer, BufferConfig, BufferedStorageManager, DiskStorageConfig, DiskStorageManager,
    EvictionPolicy, LruEviction, MemoryStorageManager, RandomEviction, StorageManager,
};
