//! Query traversals of the RTree.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::trace;

use super::rtree_impl::RTree;
use super::rtree_types::TreeCounters;
use crate::errors::{Id, SpatialError, SpatialResult};
use crate::shape::Shape;
use crate::spatial_index::{Data, NearestNeighborComparator, QueryStrategy, Visitor};

/// Candidate of the nearest-neighbor queue.
enum Candidate {
    Node(Id),
    Data(Data),
}

struct QueueItem {
    distance: f64,
    candidate: Candidate,
}

impl QueueItem {
    /// Nodes rank before entries at equal distance.
    fn rank(&self) -> (u8, Id) {
        match &self.candidate {
            Candidate::Node(id) => (0, *id),
            Candidate::Data(data) => (1, data.id),
        }
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    // reversed so that BinaryHeap pops the closest candidate first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.rank().cmp(&self.rank()))
    }
}

impl RTree {
    /// Depth-first range query. With `contains` only entries entirely inside
    /// `shape` are reported, otherwise every intersecting entry.
    pub(super) fn range_query(
        &self,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
        contains: bool,
    ) -> SpatialResult<()> {
        self.checked_region(shape)?;
        TreeCounters::bump(&self.counters.queries);

        let mut stack = vec![self.header.root];
        while let Some(id) = stack.pop() {
            let node = self.read_node(id)?;
            visitor.visit_node(&node);

            if node.is_leaf() {
                for child in node.children() {
                    let hit = if contains {
                        shape.contains_region(&child.region)
                    } else {
                        shape.intersects_region(&child.region)
                    };
                    if hit {
                        visitor.visit_data(&child.to_data());
                        TreeCounters::bump(&self.counters.query_results);
                    }
                }
            } else {
                // reversed so children are visited in slot order
                for child in node.children().iter().rev() {
                    if shape.intersects_region(&child.region) {
                        stack.push(child.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Best-first k nearest neighbors.
    ///
    /// Entries are reported in non-decreasing distance. At equal distance
    /// nodes are expanded before entries are reported, and entries come out
    /// by identifier.
    pub(super) fn nearest_neighbors(
        &self,
        k: usize,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
        comparator: &dyn NearestNeighborComparator,
    ) -> SpatialResult<()> {
        if k == 0 {
            return Err(SpatialError::invalid("k must be at least 1"));
        }
        self.checked_region(shape)?;
        TreeCounters::bump(&self.counters.queries);

        let mut queue = BinaryHeap::new();
        queue.push(QueueItem {
            distance: 0.0,
            candidate: Candidate::Node(self.header.root),
        });

        let mut reported = 0;
        while let Some(item) = queue.pop() {
            match item.candidate {
                Candidate::Data(data) => {
                    visitor.visit_data(&data);
                    TreeCounters::bump(&self.counters.query_results);
                    reported += 1;
                    if reported == k {
                        break;
                    }
                }
                Candidate::Node(id) => {
                    let node = self.read_node(id)?;
                    visitor.visit_node(&node);
                    for child in node.children() {
                        let item = if node.is_leaf() {
                            let data = child.to_data();
                            QueueItem {
                                distance: comparator.minimum_distance_data(shape, &data),
                                candidate: Candidate::Data(data),
                            }
                        } else {
                            QueueItem {
                                distance: comparator.minimum_distance(shape, &child.region),
                                candidate: Candidate::Node(child.id),
                            }
                        };
                        queue.push(item);
                    }
                }
            }
        }
        trace!("Nearest neighbor query reported {} of {} requested", reported, k);
        Ok(())
    }

    /// Synchronized traversal of the tree with itself.
    ///
    /// Node pairs are expanded once per unordered pair; a node paired with
    /// itself only looks at slot pairs `(i, j)` with `i <= j`, and at leaves
    /// with `i < j`.
    pub(super) fn self_join(&self, shape: &dyn Shape, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        self.checked_region(shape)?;
        TreeCounters::bump(&self.counters.queries);

        let root = self.header.root;
        let mut stack: Vec<(Id, Id)> = vec![(root, root)];
        while let Some((first_id, second_id)) = stack.pop() {
            let first = self.read_node(first_id)?;
            visitor.visit_node(&first);
            let same = first_id == second_id;
            let second = if same {
                first.clone()
            } else {
                let node = self.read_node(second_id)?;
                visitor.visit_node(&node);
                node
            };

            for (i, a) in first.children().iter().enumerate() {
                if !shape.intersects_region(&a.region) {
                    continue;
                }
                let start = match (same, first.is_leaf()) {
                    (true, true) => i + 1,
                    (true, false) => i,
                    (false, _) => 0,
                };
                for b in second.children().iter().skip(start) {
                    if !shape.intersects_region(&b.region) || !a.region.intersects(&b.region) {
                        continue;
                    }
                    if first.is_leaf() {
                        visitor.visit_data_batch(&[a.to_data(), b.to_data()]);
                        TreeCounters::bump(&self.counters.query_results);
                    } else {
                        stack.push((a.id, b.id));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetches the root, then whatever node the strategy asks for next.
    pub(super) fn run_strategy(&self, strategy: &mut dyn QueryStrategy) -> SpatialResult<()> {
        TreeCounters::bump(&self.counters.queries);
        let mut next = Some(self.header.root);
        while let Some(id) = next {
            let node = self.read_node(id)?;
            next = strategy.next_entry(&node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::IndexConfig;
    use crate::errors::{Id, SpatialError};
    use crate::rtree::{Node, RTree};
    use crate::shape::{Point, Region, Shape};
    use crate::spatial_index::{Data, NearestNeighborComparator, QueryStrategy, SpatialIndex, Visitor};
    use crate::storage::MemoryStorageManager;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        nodes: usize,
        data: Vec<Data>,
        pairs: Vec<(Id, Id)>,
    }

    impl Visitor for Recorder {
        fn visit_node(&mut self, _node: &Node) {
            self.nodes += 1;
        }

        fn visit_data(&mut self, data: &Data) {
            self.data.push(data.clone());
        }

        fn visit_data_batch(&mut self, batch: &[Data]) {
            let (a, b) = (batch[0].id, batch[1].id);
            self.pairs.push((a.min(b), a.max(b)));
        }
    }

    fn tree_with(regions: &[Region], capacity: usize) -> RTree {
        let mut tree = RTree::create(
            Arc::new(MemoryStorageManager::new()),
            IndexConfig::new().capacity(capacity),
        )
        .unwrap();
        for (id, region) in regions.iter().enumerate() {
            tree.insert_data(None, region, id as Id).unwrap();
        }
        tree
    }

    fn random_points(seed: u64, count: usize) -> Vec<Region> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let p = Point::new(vec![rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)]);
                p.mbr()
            })
            .collect()
    }

    #[test]
    fn test_intersects_and_contains_are_boundary_inclusive() {
        let tree = tree_with(
            &[
                Region::new_2d(0.0, 0.0, 1.0, 1.0),
                Region::new_2d(1.0, 1.0, 2.0, 2.0),
                Region::new_2d(3.0, 3.0, 4.0, 4.0),
            ],
            4,
        );

        let mut touching = Recorder::default();
        tree.intersects_with_query(&Region::new_2d(1.0, 1.0, 1.0, 1.0), &mut touching)
            .unwrap();
        let mut ids: Vec<Id> = touching.data.iter().map(|d| d.id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
        assert!(touching.nodes >= 1);

        let mut inside = Recorder::default();
        tree.contains_what_query(&Region::new_2d(0.0, 0.0, 2.0, 2.0), &mut inside)
            .unwrap();
        let mut ids: Vec<Id> = inside.data.iter().map(|d| d.id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_point_location() {
        let tree = tree_with(&random_points(3, 50), 4);
        let mut recorder = Recorder::default();
        let target = random_points(3, 50)[17].clone();
        tree.point_location_query(&target.center(), &mut recorder).unwrap();
        assert!(recorder.data.iter().any(|d| d.id == 17));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let tree = tree_with(&[], 4);
        let mut recorder = Recorder::default();
        let shape = Region::new(vec![0.0], vec![1.0]);
        assert!(matches!(
            tree.intersects_with_query(&shape, &mut recorder),
            Err(SpatialError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_nearest_neighbor_matches_brute_force() {
        let regions = random_points(11, 400);
        let tree = tree_with(&regions, 6);
        let query = Point::new(vec![42.0, 58.0]);

        for k in [1, 5, 37, 400, 1000] {
            let mut recorder = Recorder::default();
            tree.nearest_neighbor_query(k, &query, &mut recorder).unwrap();
            assert_eq!(recorder.data.len(), k.min(regions.len()));

            let distances: Vec<f64> = recorder
                .data
                .iter()
                .map(|d| query.minimum_distance(&d.region))
                .collect();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]));

            let mut brute: Vec<f64> = regions.iter().map(|r| query.minimum_distance(r)).collect();
            brute.sort_by(|a, b| a.total_cmp(b));
            assert_eq!(distances, brute[..distances.len()].to_vec());
        }
    }

    #[test]
    fn test_nearest_neighbor_ties_by_identifier() {
        // four entries at the same distance from the origin
        let regions = vec![
            Point::new(vec![1.0, 0.0]).mbr(),
            Point::new(vec![0.0, 1.0]).mbr(),
            Point::new(vec![-1.0, 0.0]).mbr(),
            Point::new(vec![0.0, -1.0]).mbr(),
            Point::new(vec![5.0, 5.0]).mbr(),
        ];
        let tree = tree_with(&regions, 4);
        let mut recorder = Recorder::default();
        tree.nearest_neighbor_query(3, &Point::new(vec![0.0, 0.0]), &mut recorder)
            .unwrap();
        let ids: Vec<Id> = recorder.data.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_nearest_neighbor_rejects_zero_k() {
        let tree = tree_with(&random_points(1, 5), 4);
        let mut recorder = Recorder::default();
        assert!(matches!(
            tree.nearest_neighbor_query(0, &Point::new(vec![0.0, 0.0]), &mut recorder),
            Err(SpatialError::InvalidArgument(_))
        ));
    }

    struct ManhattanComparator;

    impl NearestNeighborComparator for ManhattanComparator {
        fn minimum_distance(&self, query: &dyn Shape, region: &Region) -> f64 {
            let q = query.mbr();
            (0..q.low.len())
                .map(|d| {
                    if q.high[d] < region.low[d] {
                        region.low[d] - q.high[d]
                    } else if q.low[d] > region.high[d] {
                        q.low[d] - region.high[d]
                    } else {
                        0.0
                    }
                })
                .sum()
        }
    }

    #[test]
    fn test_nearest_neighbor_custom_comparator() {
        // (3, 3) is closer in Euclidean terms, (5.5, 0) in Manhattan terms
        let regions = vec![
            Point::new(vec![3.0, 3.0]).mbr(),
            Point::new(vec![5.5, 0.0]).mbr(),
        ];
        let tree = tree_with(&regions, 4);
        let origin = Point::new(vec![0.0, 0.0]);

        let mut euclidean = Recorder::default();
        tree.nearest_neighbor_query(1, &origin, &mut euclidean).unwrap();
        assert_eq!(euclidean.data[0].id, 0);

        let mut manhattan = Recorder::default();
        tree.nearest_neighbor_query_with_comparator(1, &origin, &mut manhattan, &ManhattanComparator)
            .unwrap();
        assert_eq!(manhattan.data[0].id, 1);
    }

    #[test]
    fn test_self_join_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(5);
        let regions: Vec<Region> = (0..150)
            .map(|_| {
                let x = rng.gen_range(0.0..50.0);
                let y = rng.gen_range(0.0..50.0);
                Region::new_2d(x, y, x + rng.gen_range(0.0..4.0), y + rng.gen_range(0.0..4.0))
            })
            .collect();
        let tree = tree_with(&regions, 5);
        let query = Region::new_2d(10.0, 10.0, 40.0, 40.0);

        let mut recorder = Recorder::default();
        tree.self_join_query(&query, &mut recorder).unwrap();

        let mut expected = BTreeSet::new();
        for i in 0..regions.len() {
            for j in i + 1..regions.len() {
                if query.intersects(&regions[i])
                    && query.intersects(&regions[j])
                    && regions[i].intersects(&regions[j])
                {
                    expected.insert((i as Id, j as Id));
                }
            }
        }

        let reported: BTreeSet<(Id, Id)> = recorder.pairs.iter().copied().collect();
        assert_eq!(reported.len(), recorder.pairs.len(), "pairs reported twice");
        assert_eq!(reported, expected);
    }

    /// Walks the leftmost path down to a leaf.
    struct LeftmostPath {
        levels: Vec<u32>,
    }

    impl QueryStrategy for LeftmostPath {
        fn next_entry(&mut self, previous: &Node) -> Option<Id> {
            self.levels.push(previous.level());
            if previous.is_leaf() {
                None
            } else {
                previous.children().first().map(|child| child.id)
            }
        }
    }

    #[test]
    fn test_query_strategy_walks_to_leaf() {
        let tree = tree_with(&random_points(8, 200), 4);
        let mut strategy = LeftmostPath { levels: Vec::new() };
        tree.query_strategy(&mut strategy).unwrap();

        let expected: Vec<u32> = (0..tree.height()).rev().collect();
        assert_eq!(strategy.levels, expected);
    }
}
