//! Core types of the R-tree engine.
//!
//! This module defines:
//! - Node and child entry types, with their storage encoding
//! - The persisted tree header
//! - Statistics snapshots and the runtime counters behind them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::rtree_constants::{HEADER_MAGIC, HEADER_VERSION};
use crate::config::IndexConfig;
use crate::errors::{decode, encode, Id, SpatialError, SpatialResult};
use crate::shape::Region;
use crate::spatial_index::Data;

// ============================================================================
// Node Types
// ============================================================================

/// A slot of a node.
///
/// In an index node `id` is the child node identifier and `region` its MBR.
/// In a leaf `id` is the entry identifier, `region` the entry MBR and `data`
/// the optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub id: Id,
    pub region: Region,
    pub data: Option<Vec<u8>>,
}

impl ChildEntry {
    pub fn new(id: Id, region: Region, data: Option<Vec<u8>>) -> ChildEntry {
        ChildEntry { id, region, data }
    }

    /// Reference to a child node.
    pub fn node_ref(id: Id, region: Region) -> ChildEntry {
        ChildEntry {
            id,
            region,
            data: None,
        }
    }

    pub fn to_data(&self) -> Data {
        Data {
            id: self.id,
            region: self.region.clone(),
            payload: self.data.clone(),
        }
    }
}

/// A tree vertex. Level 0 is a leaf.
///
/// The identifier is the storage key of the node. It is not part of the
/// encoded bytes; it is assigned when the node is first stored and restored
/// when the node is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(skip)]
    identifier: Option<Id>,
    level: u32,
    children: Vec<ChildEntry>,
}

impl Node {
    pub(crate) fn new(level: u32) -> Node {
        Node {
            identifier: None,
            level,
            children: Vec::new(),
        }
    }

    pub(crate) fn with_children(level: u32, children: Vec<ChildEntry>) -> Node {
        Node {
            identifier: None,
            level,
            children,
        }
    }

    /// Storage key, `None` until the node is stored.
    pub fn identifier(&self) -> Option<Id> {
        self.identifier
    }

    pub(crate) fn set_identifier(&mut self, id: Id) {
        self.identifier = Some(id);
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    pub fn is_index(&self) -> bool {
        self.level > 0
    }

    pub fn children(&self) -> &[ChildEntry] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<ChildEntry> {
        &mut self.children
    }

    pub(crate) fn take_children(&mut self) -> Vec<ChildEntry> {
        std::mem::take(&mut self.children)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Minimal region covering every child, `None` for an empty node.
    pub fn mbr(&self) -> Option<Region> {
        let (first, rest) = self.children.split_first()?;
        let mut mbr = first.region.clone();
        for child in rest {
            mbr.combine(&child.region);
        }
        Some(mbr)
    }

    /// Slot holding the child with identifier `id`.
    pub fn child_index(&self, id: Id) -> Option<usize> {
        self.children.iter().position(|child| child.id == id)
    }

    pub(crate) fn to_bytes(&self) -> SpatialResult<Vec<u8>> {
        encode(self)
    }

    pub(crate) fn from_bytes(id: Id, bytes: &[u8]) -> SpatialResult<Node> {
        let mut node: Node = decode(bytes)?;
        node.identifier = Some(id);
        Ok(node)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier {
            Some(id) => write!(f, "Node {}", id)?,
            None => write!(f, "Node <unstored>")?,
        }
        write!(f, " level {} with {} children", self.level, self.children.len())
    }
}

// ============================================================================
// Tree Header
// ============================================================================

/// Persisted description of a tree, stored under its own identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TreeHeader {
    pub magic: u32,
    pub version: u32,
    pub root: Id,
    pub config: IndexConfig,
    pub data_count: u64,
    /// Node count per level, leaves first. Its length is the tree height.
    pub nodes_per_level: Vec<u64>,
}

impl TreeHeader {
    pub fn new(root: Id, config: IndexConfig) -> TreeHeader {
        TreeHeader {
            magic: HEADER_MAGIC,
            version: HEADER_VERSION,
            root,
            config,
            data_count: 0,
            nodes_per_level: vec![1],
        }
    }

    pub fn height(&self) -> u32 {
        self.nodes_per_level.len() as u32
    }

    pub fn node_count(&self) -> u64 {
        self.nodes_per_level.iter().sum()
    }

    pub fn node_created(&mut self, level: u32) {
        let level = level as usize;
        if self.nodes_per_level.len() <= level {
            self.nodes_per_level.resize(level + 1, 0);
        }
        self.nodes_per_level[level] += 1;
    }

    pub fn node_deleted(&mut self, level: u32) {
        if let Some(count) = self.nodes_per_level.get_mut(level as usize) {
            *count = count.saturating_sub(1);
        }
        while self.nodes_per_level.len() > 1 && self.nodes_per_level.last() == Some(&0) {
            self.nodes_per_level.pop();
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != HEADER_MAGIC {
            return Err(SpatialError::corrupted("Invalid tree header (bad magic)"));
        }
        if self.version != HEADER_VERSION {
            return Err(SpatialError::corrupted(format!(
                "Unsupported tree header version {}",
                self.version
            )));
        }
        if self.nodes_per_level.is_empty() {
            return Err(SpatialError::corrupted("Tree header records no levels"));
        }
        self.config
            .validate()
            .map_err(|e| SpatialError::corrupted(format!("Invalid persisted configuration: {}", e)))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of tree statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    /// Node loads from the storage manager
    pub reads: u64,
    /// Node stores to the storage manager
    pub writes: u64,
    pub splits: u64,
    /// Parent MBR updates caused by insertions and deletions
    pub adjustments: u64,
    pub queries: u64,
    /// Entries reported to visitors
    pub query_results: u64,
    pub node_count: u64,
    pub data_count: u64,
    pub height: u32,
    /// Node count per level, leaves first
    pub nodes_per_level: Vec<u64>,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reads: {}", self.reads)?;
        writeln!(f, "Writes: {}", self.writes)?;
        writeln!(f, "Splits: {}", self.splits)?;
        writeln!(f, "Adjustments: {}", self.adjustments)?;
        writeln!(f, "Queries: {}", self.queries)?;
        writeln!(f, "Query results: {}", self.query_results)?;
        writeln!(f, "Nodes: {}", self.node_count)?;
        writeln!(f, "Data: {}", self.data_count)?;
        writeln!(f, "Height: {}", self.height)?;
        for (level, count) in self.nodes_per_level.iter().enumerate() {
            writeln!(f, "Level {} nodes: {}", level, count)?;
        }
        Ok(())
    }
}

/// Runtime counters, updated from `&self` query paths.
#[derive(Debug, Default)]
pub(crate) struct TreeCounters {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub splits: AtomicU64,
    pub adjustments: AtomicU64,
    pub queries: AtomicU64,
    pub query_results: AtomicU64,
}

impl TreeCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, header: &TreeHeader) -> Statistics {
        Statistics {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            adjustments: self.adjustments.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            query_results: self.query_results.load(Ordering::Relaxed),
            node_count: header.node_count(),
            data_count: header.data_count,
            height: header.height(),
            nodes_per_level: header.nodes_per_level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with_entries() -> Node {
        Node::with_children(
            0,
            vec![
                ChildEntry::new(7, Region::new_2d(0.0, 0.0, 1.0, 1.0), Some(b"seven".to_vec())),
                ChildEntry::new(9, Region::new_2d(2.0, -1.0, 3.0, 0.5), None),
                ChildEntry::new(11, Region::new_2d(1.0, 1.0, 1.0, 1.0), Some(Vec::new())),
            ],
        )
    }

    #[test]
    fn test_node_round_trip() {
        let node = leaf_with_entries();
        let bytes = node.to_bytes().unwrap();
        let decoded = Node::from_bytes(4, &bytes).unwrap();

        assert_eq!(decoded.identifier(), Some(4));
        assert_eq!(decoded.level(), 0);
        assert_eq!(decoded.children(), node.children());
        assert_eq!(decoded.mbr(), node.mbr());
        // empty payload and no payload stay distinct
        assert_eq!(decoded.children()[1].data, None);
        assert_eq!(decoded.children()[2].data, Some(Vec::new()));
    }

    #[test]
    fn test_index_node_round_trip() {
        let node = Node::with_children(
            3,
            vec![
                ChildEntry::node_ref(1, Region::new(vec![0.0, 0.0, 0.0], vec![1.0, 2.0, 3.0])),
                ChildEntry::node_ref(2, Region::new(vec![-5.0, 0.5, 1.0], vec![0.0, 0.5, 9.0])),
            ],
        );
        let decoded = Node::from_bytes(17, &node.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_index());
        assert_eq!(decoded.level(), 3);
        assert_eq!(decoded.children(), node.children());
    }

    #[test]
    fn test_mbr_is_tight() {
        let node = leaf_with_entries();
        assert_eq!(node.mbr(), Some(Region::new_2d(0.0, -1.0, 3.0, 1.0)));
        assert_eq!(Node::new(0).mbr(), None);
        assert_eq!(node.child_index(9), Some(1));
        assert_eq!(node.child_index(8), None);
    }

    #[test]
    fn test_garbage_node_bytes_are_corrupted() {
        let result = Node::from_bytes(1, &[1, 2, 3]);
        assert!(matches!(result, Err(SpatialError::CorruptedState(_))));
    }

    #[test]
    fn test_header_level_accounting() {
        let mut header = TreeHeader::new(0, IndexConfig::default());
        assert_eq!(header.height(), 1);
        header.node_created(0);
        header.node_created(1);
        assert_eq!(header.nodes_per_level, vec![2, 1]);
        assert_eq!(header.node_count(), 3);

        header.node_deleted(1);
        assert_eq!(header.height(), 1);
        assert!(header.validate().is_ok());

        header.magic = 0;
        assert!(matches!(
            header.validate(),
            Err(SpatialError::CorruptedState(_))
        ));
    }

    #[test]
    fn test_statistics_display() {
        let mut header = TreeHeader::new(0, IndexConfig::default());
        header.data_count = 5;
        let counters = TreeCounters::default();
        TreeCounters::bump(&counters.reads);
        let stats = counters.snapshot(&header);
        let text = stats.to_string();
        assert!(text.contains("Reads: 1"));
        assert!(text.contains("Data: 5"));
        assert!(text.contains("Level 0 nodes: 1"));
    }
}
