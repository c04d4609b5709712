//! R-tree engine over a pluggable storage manager.
//!
//! Nodes live in the storage manager as encoded byte arrays and are fetched
//! by identifier on demand:
//! - Insertion descends with an explicit path stack and propagates splits upward
//! - Deletion condenses underfull nodes and reinserts their children at their level
//! - Queries report matching entries to a caller-supplied visitor

pub mod rtree_constants;
pub mod rtree_types;
mod rtree_impl;
mod rtree_query;
mod rtree_split;

pub use rtree_impl::RTree;
pub use rtree_types::{ChildEntry, Node, Statistics};
