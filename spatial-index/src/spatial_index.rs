//! Client-facing contracts of a spatial index: the index trait itself and the
//! visitor, command, comparator and query strategy callbacks it drives.

use std::fmt;

use crate::config::PropertySet;
use crate::errors::{Id, SpatialResult};
use crate::rtree::{Node, Statistics};
use crate::shape::{Point, Region, Shape};

/// An entry reported by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub id: Id,
    /// Bounding region the entry was inserted with.
    pub region: Region,
    pub payload: Option<Vec<u8>>,
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data {} {}", self.id, self.region)
    }
}

/// Receives the nodes and entries a query touches.
pub trait Visitor {
    /// A node was loaded during the traversal.
    fn visit_node(&mut self, _node: &Node) {}

    /// An entry matched the query.
    fn visit_data(&mut self, data: &Data);

    /// A group of related entries matched, e.g. a self-join pair.
    fn visit_data_batch(&mut self, _batch: &[Data]) {}
}

impl<F> Visitor for F
where
    F: FnMut(&Data),
{
    fn visit_data(&mut self, data: &Data) {
        self(data)
    }
}

/// Engine events a [`Command`] can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    NodeRead,
    NodeWrite,
    NodeDelete,
}

/// Callback invoked with the node of every event it is registered for.
pub trait Command: Send + Sync {
    fn execute(&self, node: &Node);
}

impl<F> Command for F
where
    F: Fn(&Node) + Send + Sync,
{
    fn execute(&self, node: &Node) {
        self(node)
    }
}

/// Distance function driving nearest-neighbor queries.
///
/// Both distances must never exceed the true minimum distance between the
/// query and any point inside the candidate, otherwise pruning loses results.
pub trait NearestNeighborComparator {
    /// Lower bound of the distance between `query` and anything inside `region`.
    fn minimum_distance(&self, query: &dyn Shape, region: &Region) -> f64;

    /// Distance between `query` and an entry.
    fn minimum_distance_data(&self, query: &dyn Shape, data: &Data) -> f64 {
        self.minimum_distance(query, &data.region)
    }
}

/// Euclidean minimum distance between bounding regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanComparator;

impl NearestNeighborComparator for EuclideanComparator {
    fn minimum_distance(&self, query: &dyn Shape, region: &Region) -> f64 {
        query.minimum_distance(region)
    }
}

/// Drives a custom traversal.
///
/// The index fetches the root first, then keeps fetching whatever node the
/// strategy names until it returns `None`.
pub trait QueryStrategy {
    fn next_entry(&mut self, previous: &Node) -> Option<Id>;
}

/// A spatial index over shapes tagged with identifiers.
pub trait SpatialIndex {
    /// Inserts an entry. The shape must have the index dimension.
    fn insert_data(&mut self, payload: Option<&[u8]>, shape: &dyn Shape, id: Id)
        -> SpatialResult<()>;

    /// Removes the entry with identifier `id` whose region equals the MBR of
    /// `shape`. Returns `false` and leaves the index untouched when absent.
    fn delete_data(&mut self, shape: &dyn Shape, id: Id) -> SpatialResult<bool>;

    /// Reports entries entirely contained by `shape`.
    fn contains_what_query(&self, shape: &dyn Shape, visitor: &mut dyn Visitor)
        -> SpatialResult<()>;

    /// Reports entries intersecting `shape`.
    fn intersects_with_query(
        &self,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()>;

    /// Reports entries containing `point`.
    fn point_location_query(&self, point: &Point, visitor: &mut dyn Visitor) -> SpatialResult<()>;

    /// Reports the `k` entries closest to `shape` in non-decreasing distance.
    fn nearest_neighbor_query(
        &self,
        k: usize,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()> {
        self.nearest_neighbor_query_with_comparator(k, shape, visitor, &EuclideanComparator)
    }

    fn nearest_neighbor_query_with_comparator(
        &self,
        k: usize,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
        comparator: &dyn NearestNeighborComparator,
    ) -> SpatialResult<()>;

    /// Reports every unordered pair of distinct entries that intersect each
    /// other and `shape`, one pair per `visit_data_batch` call.
    fn self_join_query(&self, shape: &dyn Shape, visitor: &mut dyn Visitor) -> SpatialResult<()>;

    fn query_strategy(&self, strategy: &mut dyn QueryStrategy) -> SpatialResult<()>;

    fn index_properties(&self) -> PropertySet;

    fn add_command(&mut self, command: Box<dyn Command>, event: CommandType);

    /// Walks the whole tree and checks its structural invariants.
    fn is_index_valid(&self) -> SpatialResult<bool>;

    fn statistics(&self) -> Statistics;
}
