//! RTree implementation.

use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;

use super::rtree_split::split_entries;
use super::rtree_types::{ChildEntry, Node, Statistics, TreeCounters, TreeHeader};
use crate::config::{IndexConfig, PropertySet, PropertyValue, TreeVariant};
use crate::errors::{decode, encode, Id, SpatialError, SpatialResult};
use crate::shape::{Point, Region, Shape};
use crate::spatial_index::{
    Command, CommandType, NearestNeighborComparator, QueryStrategy, SpatialIndex, Visitor,
};
use crate::storage::StorageManager;

/// A disk-friendly R-tree.
///
/// The tree keeps only its header in memory. Every node is loaded from the
/// storage manager when a traversal reaches it and stored back after it
/// changes, so the storage manager (typically a buffered disk store) decides
/// how much of the tree stays resident.
///
/// ```rust
/// use std::sync::Arc;
/// use spatial_index::{IndexConfig, MemoryStorageManager, Point, RTree, Region, SpatialIndex};
///
/// let mut tree = RTree::create(Arc::new(MemoryStorageManager::new()), IndexConfig::default())?;
/// tree.insert_data(None, &Region::new_2d(0.0, 0.0, 1.0, 1.0), 1)?;
///
/// let mut found = Vec::new();
/// tree.point_location_query(&Point::new(vec![0.5, 0.5]), &mut |data: &spatial_index::Data| {
///     found.push(data.id)
/// })?;
/// assert_eq!(found, vec![1]);
/// # Ok::<(), spatial_index::SpatialError>(())
/// ```
pub struct RTree {
    pub(super) storage: Arc<dyn StorageManager>,
    pub(super) header_id: Id,
    pub(super) header: TreeHeader,
    header_dirty: bool,
    pub(super) counters: TreeCounters,
    commands: CommandRegistry,
}

impl fmt::Debug for RTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTree")
            .field("header_id", &self.header_id)
            .field("header", &self.header)
            .field("header_dirty", &self.header_dirty)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/// Commands registered per engine event.
#[derive(Default)]
struct CommandRegistry {
    node_read: Vec<Box<dyn Command>>,
    node_write: Vec<Box<dyn Command>>,
    node_delete: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    fn add(&mut self, command: Box<dyn Command>, event: CommandType) {
        self.handlers_mut(event).push(command);
    }

    fn run(&self, event: CommandType, node: &Node) {
        let handlers = match event {
            CommandType::NodeRead => &self.node_read,
            CommandType::NodeWrite => &self.node_write,
            CommandType::NodeDelete => &self.node_delete,
        };
        for handler in handlers {
            handler.execute(node);
        }
    }

    fn handlers_mut(&mut self, event: CommandType) -> &mut Vec<Box<dyn Command>> {
        match event {
            CommandType::NodeRead => &mut self.node_read,
            CommandType::NodeWrite => &mut self.node_write,
            CommandType::NodeDelete => &mut self.node_delete,
        }
    }
}

/// Location of a leaf entry: the ancestors with the slot taken in each,
/// the leaf itself and the entry position in the leaf.
struct LeafPath {
    ancestors: Vec<(Node, usize)>,
    leaf: Node,
    position: usize,
}

enum SearchStep {
    Descend(Id),
    Backtrack,
    Found(usize),
}

impl RTree {
    /// Creates an empty tree in `storage`.
    ///
    /// The tree header gets its own identifier, see [`RTree::header_id`].
    pub fn create(storage: Arc<dyn StorageManager>, config: IndexConfig) -> SpatialResult<Self> {
        config.validate()?;

        let root = Node::new(0);
        let root_id = storage.store(None, &root.to_bytes()?)?;
        let header = TreeHeader::new(root_id, config);
        let header_id = storage.store(None, &encode(&header)?)?;

        let tree = RTree {
            storage,
            header_id,
            header,
            header_dirty: false,
            counters: TreeCounters::default(),
            commands: CommandRegistry::default(),
        };
        TreeCounters::bump(&tree.counters.writes);
        debug!(
            "Created {} tree with header {} and root {}",
            tree.header.config.tree_variant, header_id, root_id
        );
        Ok(tree)
    }

    /// Opens a tree previously created in `storage`.
    ///
    /// Only the header is read. Fails with `CorruptedState` when the header
    /// bytes are malformed or describe an invalid configuration.
    pub fn load(storage: Arc<dyn StorageManager>, header_id: Id) -> SpatialResult<Self> {
        let bytes = storage.load(header_id)?;
        let header: TreeHeader = decode(&bytes)?;
        if let Err(err) = header.validate() {
            warn!("Rejecting tree header {}: {}", header_id, err);
            return Err(err);
        }
        debug!(
            "Loaded tree header {} (root {}, height {}, {} entries)",
            header_id,
            header.root,
            header.height(),
            header.data_count
        );

        Ok(RTree {
            storage,
            header_id,
            header,
            header_dirty: false,
            counters: TreeCounters::default(),
            commands: CommandRegistry::default(),
        })
    }

    /// Identifier under which the tree header is stored.
    pub fn header_id(&self) -> Id {
        self.header_id
    }

    pub fn root_id(&self) -> Id {
        self.header.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.header.config
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.header.data_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.data_count == 0
    }

    /// Number of levels, 1 for a tree whose root is a leaf.
    pub fn height(&self) -> u32 {
        self.header.height()
    }

    /// Persists the header and flushes the storage manager.
    pub fn flush(&mut self) -> SpatialResult<()> {
        if self.header_dirty {
            self.storage
                .store(Some(self.header_id), &encode(&self.header)?)?;
            self.header_dirty = false;
            trace!("Stored tree header {}", self.header_id);
        }
        self.storage.flush()
    }

    // ------------------------------------------------------------------
    // Node I/O
    // ------------------------------------------------------------------

    pub(super) fn read_node(&self, id: Id) -> SpatialResult<Node> {
        let bytes = self.storage.load(id).map_err(|err| match err {
            SpatialError::NotFound(id) => {
                SpatialError::corrupted(format!("Node {} is referenced but missing", id))
            }
            other => other,
        })?;
        let node = Node::from_bytes(id, &bytes)?;
        TreeCounters::bump(&self.counters.reads);
        self.commands.run(CommandType::NodeRead, &node);
        Ok(node)
    }

    /// Stores `node`, allocating its identifier on first store.
    fn write_node(&mut self, node: &mut Node) -> SpatialResult<Id> {
        let bytes = node.to_bytes()?;
        let id = self.storage.store(node.identifier(), &bytes)?;
        if node.identifier().is_none() {
            node.set_identifier(id);
            self.header.node_created(node.level());
            self.header_dirty = true;
        }
        TreeCounters::bump(&self.counters.writes);
        self.commands.run(CommandType::NodeWrite, node);
        Ok(id)
    }

    /// Frees a node that is no longer referenced. The tree is consistent
    /// without it, so a failed delete only leaks the array and is logged.
    fn free_node(&mut self, node: &Node) {
        let Some(id) = node.identifier() else {
            return;
        };
        self.header.node_deleted(node.level());
        self.header_dirty = true;
        self.commands.run(CommandType::NodeDelete, node);
        if let Err(err) = self.storage.delete(id) {
            warn!("Failed to free detached {}: {}", node, err);
        }
    }

    fn node_mbr(node: &Node) -> SpatialResult<Region> {
        node.mbr().ok_or_else(|| {
            SpatialError::corrupted(format!("{} has no children to bound", node))
        })
    }

    fn capacity(&self, level: u32) -> usize {
        if level == 0 {
            self.header.config.leaf_capacity
        } else {
            self.header.config.index_capacity
        }
    }

    pub(super) fn min_fanout(&self, level: u32) -> usize {
        if level == 0 {
            self.header.config.leaf_min_fanout()
        } else {
            self.header.config.index_min_fanout()
        }
    }

    /// Checks the shape against the index dimension and returns its MBR.
    pub(super) fn checked_region(&self, shape: &dyn Shape) -> SpatialResult<Region> {
        if shape.dimension() != self.header.config.dimension {
            return Err(SpatialError::invalid(format!(
                "shape has {} dimensions, the index has {}",
                shape.dimension(),
                self.header.config.dimension
            )));
        }
        let region = shape.mbr();
        if region.low.iter().chain(region.high.iter()).any(|c| c.is_nan()) {
            return Err(SpatialError::invalid("shape coordinates must not be NaN"));
        }
        Ok(region)
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Slot of the child of `node` that should receive `region`.
    fn choose_subtree(&self, node: &Node, region: &Region) -> SpatialResult<usize> {
        let children = node.children();
        if children.is_empty() {
            return Err(SpatialError::corrupted(format!(
                "{} has no subtree to descend into",
                node
            )));
        }

        // (slot, enlargement, resulting area)
        let mut ranked: Vec<(usize, f64, f64)> = children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let combined = child.region.combined(region);
                (i, combined.area() - child.region.area(), combined.area())
            })
            .collect();
        ranked.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.2.total_cmp(&b.2))
                .then(children[a.0].id.cmp(&children[b.0].id))
        });

        if self.header.config.tree_variant == TreeVariant::RStar && node.level() == 1 {
            return Ok(self.least_overlap_enlargement(children, region, &ranked));
        }

        let (_, enlargement, area) = ranked[0];
        let tied: Vec<usize> = ranked
            .iter()
            .take_while(|(_, e, a)| *e == enlargement && *a == area)
            .map(|(i, _, _)| *i)
            .collect();
        if tied.len() == 1 {
            return Ok(tied[0]);
        }

        // ties fall back to the emptier child, then to the lowest identifier
        let mut best = tied[0];
        let mut best_len = usize::MAX;
        for slot in tied {
            let len = self.read_node(children[slot].id)?.len();
            if len < best_len {
                best_len = len;
                best = slot;
            }
        }
        Ok(best)
    }

    /// R* choice among the `near_minimum_overlap_factor` least-enlargement
    /// candidates: the one whose overlap with its siblings grows least.
    fn least_overlap_enlargement(
        &self,
        children: &[ChildEntry],
        region: &Region,
        ranked: &[(usize, f64, f64)],
    ) -> usize {
        let candidates = self
            .header
            .config
            .near_minimum_overlap_factor
            .min(ranked.len());

        let mut best = ranked[0].0;
        let mut best_overlap = f64::INFINITY;
        for &(slot, _, _) in &ranked[..candidates] {
            let current = &children[slot].region;
            let enlarged = current.combined(region);
            let overlap: f64 = children
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != slot)
                .map(|(_, sibling)| {
                    enlarged.intersecting_area(&sibling.region)
                        - current.intersecting_area(&sibling.region)
                })
                .sum();
            if overlap < best_overlap {
                best_overlap = overlap;
                best = slot;
            }
        }
        best
    }

    /// Splits an overflowing node in memory and stores the new sibling.
    ///
    /// `node` keeps its identifier and is written by the caller; the returned
    /// entry references the sibling.
    fn split_node(
        &mut self,
        node: &mut Node,
        allocated: &mut Vec<Id>,
    ) -> SpatialResult<ChildEntry> {
        let level = node.level();
        let min = self.min_fanout(level);
        let (first, second) = split_entries(
            node.take_children(),
            min,
            self.header.config.tree_variant,
        );
        *node.children_mut() = first;

        let mut sibling = Node::with_children(level, second);
        let sibling_id = self.write_node(&mut sibling)?;
        allocated.push(sibling_id);
        TreeCounters::bump(&self.counters.splits);
        debug!(
            "Split {} into {} and {} entries (sibling {})",
            node,
            node.len(),
            sibling.len(),
            sibling_id
        );

        Ok(ChildEntry::node_ref(sibling_id, Self::node_mbr(&sibling)?))
    }

    /// Adds `entry` to a node at `level`, splitting and re-tightening upward.
    ///
    /// Leaf entries go in at level 0; a subtree reference whose root sits at
    /// level `l` goes in at level `l + 1`.
    ///
    /// New nodes are allocated before any existing node is overwritten. A
    /// failed allocation releases the nodes allocated so far and restores the
    /// header, so storage is left as it was.
    fn insert_at_level(&mut self, entry: ChildEntry, level: u32) -> SpatialResult<()> {
        let saved_header = self.header.clone();
        let mut allocated = Vec::new();
        let updates = match self.plan_insert(entry, level, &mut allocated) {
            Ok(updates) => updates,
            Err(err) => {
                self.release(allocated, saved_header);
                return Err(err);
            }
        };

        // parents first: a failed overwrite can duplicate entries, never drop them
        for (written, mut node) in updates.into_iter().rev().enumerate() {
            if let Err(err) = self.write_node(&mut node) {
                if written == 0 {
                    self.release(allocated, saved_header);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Applies the insertion in memory, allocating split siblings and a new
    /// root as needed. Returns the existing nodes to overwrite, leaf first.
    fn plan_insert(
        &mut self,
        entry: ChildEntry,
        level: u32,
        allocated: &mut Vec<Id>,
    ) -> SpatialResult<Vec<Node>> {
        let mut path: Vec<(Node, usize)> = Vec::new();
        let mut node = self.read_node(self.header.root)?;
        while node.level() > level {
            let slot = self.choose_subtree(&node, &entry.region)?;
            let child = self.read_node(node.children()[slot].id)?;
            path.push((node, slot));
            node = child;
        }
        if node.level() != level {
            return Err(SpatialError::corrupted(format!(
                "expected a node at level {}, reached {}",
                level, node
            )));
        }

        node.children_mut().push(entry);
        let mut updates = Vec::new();
        let mut current = node;
        loop {
            let sibling = if current.len() > self.capacity(current.level()) {
                Some(self.split_node(&mut current, allocated)?)
            } else {
                None
            };
            let current_mbr = Self::node_mbr(&current)?;

            match path.pop() {
                Some((mut parent, slot)) => {
                    let unchanged = parent.children()[slot].region == current_mbr;
                    updates.push(current);
                    if sibling.is_none() && unchanged {
                        break;
                    }
                    parent.children_mut()[slot].region = current_mbr;
                    TreeCounters::bump(&self.counters.adjustments);
                    if let Some(sibling) = sibling {
                        parent.children_mut().push(sibling);
                    }
                    current = parent;
                }
                None => {
                    if let Some(sibling) = sibling {
                        self.grow_root(&current, current_mbr, sibling, allocated)?;
                    }
                    updates.push(current);
                    break;
                }
            }
        }
        Ok(updates)
    }

    /// Undoes the allocations of an aborted insertion.
    fn release(&mut self, allocated: Vec<Id>, header: TreeHeader) {
        for id in allocated {
            if let Err(err) = self.storage.delete(id) {
                warn!("Failed to release node {} of an aborted insertion: {}", id, err);
            }
        }
        self.header = header;
    }

    fn grow_root(
        &mut self,
        old_root: &Node,
        old_mbr: Region,
        sibling: ChildEntry,
        allocated: &mut Vec<Id>,
    ) -> SpatialResult<()> {
        let old_id = old_root.identifier().ok_or_else(|| {
            SpatialError::corrupted("root split before the root was stored")
        })?;
        let mut root = Node::with_children(
            old_root.level() + 1,
            vec![ChildEntry::node_ref(old_id, old_mbr), sibling],
        );
        let root_id = self.write_node(&mut root)?;
        allocated.push(root_id);
        self.header.root = root_id;
        self.header_dirty = true;
        debug!("Root split, new root {} at level {}", root_id, root.level());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Finds the leaf holding entry `id` with exactly `region`.
    fn find_leaf(&self, region: &Region, id: Id) -> SpatialResult<Option<LeafPath>> {
        let root = self.read_node(self.header.root)?;
        // node and the next slot to try
        let mut stack: Vec<(Node, usize)> = vec![(root, 0)];

        loop {
            let step = match stack.last_mut() {
                None => return Ok(None),
                Some((node, _)) if node.is_leaf() => node
                    .children()
                    .iter()
                    .position(|child| child.id == id && child.region == *region)
                    .map_or(SearchStep::Backtrack, SearchStep::Found),
                Some((node, next)) => {
                    // an entry lies inside every ancestor MBR
                    match (*next..node.len()).find(|&i| node.children()[i].region.contains(region)) {
                        Some(slot) => {
                            *next = slot + 1;
                            SearchStep::Descend(node.children()[slot].id)
                        }
                        None => SearchStep::Backtrack,
                    }
                }
            };

            match step {
                SearchStep::Descend(child_id) => {
                    let child = self.read_node(child_id)?;
                    stack.push((child, 0));
                }
                SearchStep::Backtrack => {
                    stack.pop();
                }
                SearchStep::Found(position) => {
                    let Some((leaf, _)) = stack.pop() else {
                        return Ok(None);
                    };
                    let ancestors = stack
                        .into_iter()
                        .map(|(node, next)| (node, next - 1))
                        .collect();
                    return Ok(Some(LeafPath {
                        ancestors,
                        leaf,
                        position,
                    }));
                }
            }
        }
    }

    /// Removes underfull nodes along `ancestors` bottom-up and writes the
    /// surviving path, leaf first, so a failed write leaves at worst a loose
    /// parent MBR. Returns the detached nodes.
    fn condense(&mut self, mut ancestors: Vec<(Node, usize)>, leaf: Node) -> SpatialResult<Vec<Node>> {
        let mut removed: Vec<Node> = Vec::new();
        let mut updates: Vec<Node> = Vec::new();
        let mut node = leaf;

        while let Some((mut parent, slot)) = ancestors.pop() {
            if node.len() < self.min_fanout(node.level()) {
                parent.children_mut().remove(slot);
                debug!("Condensing underfull {}", node);
                removed.push(node);
            } else {
                parent.children_mut()[slot].region = Self::node_mbr(&node)?;
                TreeCounters::bump(&self.counters.adjustments);
                updates.push(node);
            }
            node = parent;
        }
        updates.push(node);

        for mut node in updates {
            self.write_node(&mut node)?;
        }
        Ok(removed)
    }

    /// Reinserts the children of detached nodes at their own level, frees
    /// the detached nodes and collapses a single-child root.
    fn reinsert_detached(&mut self, removed: Vec<Node>) -> SpatialResult<()> {
        let mut orphans: Vec<(ChildEntry, u32)> = removed
            .iter()
            .flat_map(|node| node.children().iter().map(move |child| (child.clone(), node.level())))
            .collect();

        // subtrees first so that leaf entries find a complete tree
        orphans.sort_by(|a, b| b.1.cmp(&a.1));
        if !orphans.is_empty() {
            trace!("Reinserting {} orphaned entries", orphans.len());
        }
        for (entry, level) in orphans {
            self.insert_at_level(entry, level)?;
        }
        for node in &removed {
            self.free_node(node);
        }

        self.collapse_root()
    }

    fn collapse_root(&mut self) -> SpatialResult<()> {
        loop {
            let root = self.read_node(self.header.root)?;
            if !(root.is_index() && root.len() == 1) {
                return Ok(());
            }
            let child_id = root.children()[0].id;
            self.header.root = child_id;
            self.header_dirty = true;
            self.free_node(&root);
            debug!("Collapsed root {} into {}", root, child_id);
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn validate_tree(&self) -> SpatialResult<bool> {
        let mut valid = true;
        let height = self.header.height();
        let mut nodes_per_level = vec![0u64; height as usize];
        let mut data_count = 0u64;

        // node id, expected level, MBR recorded by the parent
        let mut stack: Vec<(Id, u32, Option<Region>)> =
            vec![(self.header.root, height.saturating_sub(1), None)];

        while let Some((id, expected_level, recorded)) = stack.pop() {
            let node = self.read_node(id)?;
            let is_root = id == self.header.root;

            if node.level() != expected_level {
                warn!("{} found where level {} was expected", node, expected_level);
                valid = false;
            }
            if let Some(count) = nodes_per_level.get_mut(node.level() as usize) {
                *count += 1;
            }

            let max = self.capacity(node.level());
            let min = if is_root { 0 } else { self.min_fanout(node.level()) };
            if node.len() < min || node.len() > max {
                warn!("{} violates fan-out bounds [{}, {}]", node, min, max);
                valid = false;
            }

            if let Some(recorded) = recorded {
                if node.mbr().as_ref() != Some(&recorded) {
                    warn!("Parent MBR {} of {} is not tight", recorded, node);
                    valid = false;
                }
            }

            if node.is_leaf() {
                data_count += node.len() as u64;
            } else {
                for child in node.children() {
                    stack.push((child.id, node.level().saturating_sub(1), Some(child.region.clone())));
                }
            }
        }

        if nodes_per_level != self.header.nodes_per_level {
            warn!(
                "Nodes per level {:?} differ from recorded {:?}",
                nodes_per_level, self.header.nodes_per_level
            );
            valid = false;
        }
        if data_count != self.header.data_count {
            warn!(
                "Found {} entries, {} recorded",
                data_count, self.header.data_count
            );
            valid = false;
        }
        Ok(valid)
    }
}

impl SpatialIndex for RTree {
    fn insert_data(&mut self, payload: Option<&[u8]>, shape: &dyn Shape, id: Id) -> SpatialResult<()> {
        let region = self.checked_region(shape)?;
        let entry = ChildEntry::new(id, region, payload.map(|p| p.to_vec()));
        self.insert_at_level(entry, 0)?;
        self.header.data_count += 1;
        self.header_dirty = true;
        Ok(())
    }

    fn delete_data(&mut self, shape: &dyn Shape, id: Id) -> SpatialResult<bool> {
        let region = self.checked_region(shape)?;
        let Some(LeafPath {
            ancestors,
            mut leaf,
            position,
        }) = self.find_leaf(&region, id)?
        else {
            trace!("Entry {} not found for deletion", id);
            return Ok(false);
        };

        leaf.children_mut().remove(position);
        let removed = self.condense(ancestors, leaf)?;
        self.header.data_count = self.header.data_count.saturating_sub(1);
        self.header_dirty = true;
        self.reinsert_detached(removed)?;
        Ok(true)
    }

    fn contains_what_query(&self, shape: &dyn Shape, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        self.range_query(shape, visitor, true)
    }

    fn intersects_with_query(&self, shape: &dyn Shape, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        self.range_query(shape, visitor, false)
    }

    fn point_location_query(&self, point: &Point, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        self.range_query(&Region::from_point(point), visitor, false)
    }

    fn nearest_neighbor_query_with_comparator(
        &self,
        k: usize,
        shape: &dyn Shape,
        visitor: &mut dyn Visitor,
        comparator: &dyn NearestNeighborComparator,
    ) -> SpatialResult<()> {
        self.nearest_neighbors(k, shape, visitor, comparator)
    }

    fn self_join_query(&self, shape: &dyn Shape, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        self.self_join(shape, visitor)
    }

    fn query_strategy(&self, strategy: &mut dyn QueryStrategy) -> SpatialResult<()> {
        self.run_strategy(strategy)
    }

    fn index_properties(&self) -> PropertySet {
        let mut properties = self.header.config.to_properties();
        properties.set("IndexIdentifier", PropertyValue::Long(self.header_id));
        properties
    }

    fn add_command(&mut self, command: Box<dyn Command>, event: CommandType) {
        self.commands.add(command, event);
    }

    fn is_index_valid(&self) -> SpatialResult<bool> {
        self.validate_tree()
    }

    fn statistics(&self) -> Statistics {
        self.counters.snapshot(&self.header)
    }
}

impl fmt::Display for RTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index_properties())?;
        write!(f, "{}", self.statistics())
    }
}

impl Drop for RTree {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Err(err) = self.flush() {
            warn!("Failed to flush tree {} on drop: {}", self.header_id, err);
        }
    }
}
