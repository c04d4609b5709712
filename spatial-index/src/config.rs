//! Index configuration and the exported property set.

use crate::errors::{SpatialError, SpatialResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::rtree::rtree_constants::{
    DEFAULT_CAPACITY, DEFAULT_DIMENSION, DEFAULT_FILL_FACTOR, DEFAULT_NEAR_MINIMUM_OVERLAP_FACTOR,
    MIN_CAPACITY,
};

/// Split and subtree-selection heuristic used by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeVariant {
    /// Linear-cost seed picking.
    Linear,
    /// Quadratic-cost seed picking with pick-next.
    Quadratic,
    /// Margin driven axis selection and overlap driven distribution.
    RStar,
}

impl fmt::Display for TreeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeVariant::Linear => write!(f, "Linear"),
            TreeVariant::Quadratic => write!(f, "Quadratic"),
            TreeVariant::RStar => write!(f, "RStar"),
        }
    }
}

/// Configuration of an R-tree.
///
/// Built with chained setters and checked with [`IndexConfig::validate`] when
/// the tree is created. The configuration is persisted in the tree header, so
/// reopening a tree restores it.
///
/// ```rust
/// use spatial_index::{IndexConfig, TreeVariant};
///
/// let config = IndexConfig::new()
///     .dimension(3)
///     .index_capacity(32)
///     .leaf_capacity(64)
///     .tree_variant(TreeVariant::Quadratic);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimension: usize,
    pub index_capacity: usize,
    pub leaf_capacity: usize,
    pub fill_factor: f64,
    pub near_minimum_overlap_factor: usize,
    pub tree_variant: TreeVariant,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            dimension: DEFAULT_DIMENSION,
            index_capacity: DEFAULT_CAPACITY,
            leaf_capacity: DEFAULT_CAPACITY,
            fill_factor: DEFAULT_FILL_FACTOR,
            near_minimum_overlap_factor: DEFAULT_NEAR_MINIMUM_OVERLAP_FACTOR,
            tree_variant: TreeVariant::RStar,
        }
    }
}

impl IndexConfig {
    pub fn new() -> IndexConfig {
        IndexConfig::default()
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn index_capacity(mut self, capacity: usize) -> Self {
        self.index_capacity = capacity;
        self
    }

    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = capacity;
        self
    }

    /// Sets both the index and the leaf capacity.
    pub fn capacity(self, capacity: usize) -> Self {
        self.index_capacity(capacity).leaf_capacity(capacity)
    }

    pub fn fill_factor(mut self, fill_factor: f64) -> Self {
        self.fill_factor = fill_factor;
        self
    }

    pub fn near_minimum_overlap_factor(mut self, factor: usize) -> Self {
        self.near_minimum_overlap_factor = factor;
        self
    }

    pub fn tree_variant(mut self, variant: TreeVariant) -> Self {
        self.tree_variant = variant;
        self
    }

    /// Minimum fan-out of index nodes.
    pub fn index_min_fanout(&self) -> usize {
        min_fanout(self.index_capacity, self.fill_factor)
    }

    /// Minimum fan-out of leaf nodes.
    pub fn leaf_min_fanout(&self) -> usize {
        min_fanout(self.leaf_capacity, self.fill_factor)
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.dimension == 0 {
            return Err(SpatialError::invalid("dimension must be at least 1"));
        }
        if !(self.fill_factor > 0.0 && self.fill_factor < 1.0) {
            return Err(SpatialError::invalid(format!(
                "fill factor {} must lie in (0, 1)",
                self.fill_factor
            )));
        }
        for (name, capacity) in [
            ("index capacity", self.index_capacity),
            ("leaf capacity", self.leaf_capacity),
        ] {
            if capacity < MIN_CAPACITY {
                return Err(SpatialError::invalid(format!(
                    "{} {} is below the minimum of {}",
                    name, capacity, MIN_CAPACITY
                )));
            }
            let min = min_fanout(capacity, self.fill_factor);
            // Both halves of a split of capacity + 1 entries must reach min.
            if min < 1 || 2 * min > capacity + 1 {
                return Err(SpatialError::invalid(format!(
                    "{} {} with fill factor {} gives an unusable minimum fan-out of {}",
                    name, capacity, self.fill_factor, min
                )));
            }
        }
        if self.near_minimum_overlap_factor == 0 {
            return Err(SpatialError::invalid(
                "near minimum overlap factor must be at least 1",
            ));
        }
        Ok(())
    }

    /// Exports the configuration as a property set.
    pub fn to_properties(&self) -> PropertySet {
        let mut properties = PropertySet::new();
        properties.set("Dimension", PropertyValue::ULong(self.dimension as u64));
        properties.set("IndexCapacity", PropertyValue::ULong(self.index_capacity as u64));
        properties.set("LeafCapacity", PropertyValue::ULong(self.leaf_capacity as u64));
        properties.set("FillFactor", PropertyValue::Double(self.fill_factor));
        properties.set(
            "NearMinimumOverlapFactor",
            PropertyValue::ULong(self.near_minimum_overlap_factor as u64),
        );
        properties.set(
            "TreeVariant",
            PropertyValue::String(self.tree_variant.to_string()),
        );
        properties
    }
}

fn min_fanout(capacity: usize, fill_factor: f64) -> usize {
    (capacity as f64 * fill_factor).floor() as usize
}

/// A typed value in a [`PropertySet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    ULong(u64),
    Double(f64),
    String(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::ULong(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// Named, typed properties describing an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    properties: BTreeMap<String, PropertyValue>,
}

impl PropertySet {
    pub fn new() -> PropertySet {
        PropertySet::default()
    }

    pub fn set(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.properties.iter()
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.properties {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index_min_fanout(), 40);
    }

    #[test]
    fn test_small_capacity_fanout() {
        let config = IndexConfig::new().capacity(4).fill_factor(0.5);
        assert!(config.validate().is_ok());
        assert_eq!(config.leaf_min_fanout(), 2);
        assert!(IndexConfig::new().capacity(4).fill_factor(0.7).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(IndexConfig::new().dimension(0).validate().is_err());
        assert!(IndexConfig::new().capacity(2).validate().is_err());
        assert!(IndexConfig::new().fill_factor(0.0).validate().is_err());
        assert!(IndexConfig::new().fill_factor(1.0).validate().is_err());
        // 3 * 0.2 floors to 0
        assert!(IndexConfig::new().capacity(3).fill_factor(0.2).validate().is_err());
        // 100 * 0.7 = 70 and two halves of 101 entries cannot both reach 70
        assert!(IndexConfig::new().fill_factor(0.7).validate().is_err());
        assert!(IndexConfig::new()
            .near_minimum_overlap_factor(0)
            .validate()
            .is_err());
        // larger than the capacity is clamped when choosing a subtree
        assert!(IndexConfig::new()
            .capacity(10)
            .near_minimum_overlap_factor(32)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_properties_export() {
        let config = IndexConfig::new().dimension(3).leaf_capacity(50);
        let properties = config.to_properties();
        assert_eq!(properties.get("Dimension"), Some(&PropertyValue::ULong(3)));
        assert_eq!(properties.get("LeafCapacity"), Some(&PropertyValue::ULong(50)));
        assert_eq!(
            properties.get("TreeVariant"),
            Some(&PropertyValue::String("RStar".into()))
        );
    }

    #[test]
    fn test_property_set_json() {
        let properties = IndexConfig::new().to_properties();
        let json = serde_json::to_string(&properties).unwrap();
        let back: PropertySet = serde_json::from_str(&json).unwrap();
        assert_eq!(properties, back);
    }
}
