//! Victim selection for the buffered storage manager.

use std::collections::HashMap;

use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::Id;

/// Chooses which resident entry a buffer drops when it is over capacity.
///
/// The buffer reports every entry that becomes resident, every access to a
/// resident entry and every entry it drops on its own. A victim returned by
/// [`EvictionPolicy::choose_victim`] is no longer tracked by the policy.
pub trait EvictionPolicy: Send {
    /// An entry became resident.
    fn record_insert(&mut self, id: Id);

    /// A resident entry was read or overwritten.
    fn record_access(&mut self, id: Id);

    /// A resident entry was dropped by the buffer.
    fn remove(&mut self, id: Id);

    /// Selects and forgets a victim, `None` when nothing is tracked.
    fn choose_victim(&mut self) -> Option<Id>;

    /// Forgets every tracked entry.
    fn clear(&mut self);

    /// Number of tracked entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniform random choice among resident entries.
///
/// Seeded construction makes the sequence of victims reproducible.
pub struct RandomEviction {
    rng: StdRng,
    keys: Vec<Id>,
    positions: HashMap<Id, usize>,
}

impl RandomEviction {
    pub fn new(seed: u64) -> RandomEviction {
        RandomEviction {
            rng: StdRng::seed_from_u64(seed),
            keys: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn from_entropy() -> RandomEviction {
        RandomEviction {
            rng: StdRng::from_entropy(),
            keys: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn swap_remove_at(&mut self, index: usize) -> Id {
        let id = self.keys.swap_remove(index);
        self.positions.remove(&id);
        if let Some(&moved) = self.keys.get(index) {
            self.positions.insert(moved, index);
        }
        id
    }
}

impl EvictionPolicy for RandomEviction {
    fn record_insert(&mut self, id: Id) {
        if !self.positions.contains_key(&id) {
            self.positions.insert(id, self.keys.len());
            self.keys.push(id);
        }
    }

    fn record_access(&mut self, _id: Id) {}

    fn remove(&mut self, id: Id) {
        if let Some(&index) = self.positions.get(&id) {
            self.swap_remove_at(index);
        }
    }

    fn choose_victim(&mut self) -> Option<Id> {
        if self.keys.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.keys.len());
        Some(self.swap_remove_at(index))
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.positions.clear();
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Least-recently-used entry first.
pub struct LruEviction {
    order: LruCache<Id, ()>,
}

impl LruEviction {
    pub fn new() -> LruEviction {
        LruEviction {
            order: LruCache::unbounded(),
        }
    }
}

impl Default for LruEviction {
    fn default() -> Self {
        LruEviction::new()
    }
}

impl EvictionPolicy for LruEviction {
    fn record_insert(&mut self, id: Id) {
        self.order.put(id, ());
    }

    fn record_access(&mut self, id: Id) {
        self.order.promote(&id);
    }

    fn remove(&mut self, id: Id) {
        self.order.pop(&id);
    }

    fn choose_victim(&mut self) -> Option<Id> {
        self.order.pop_lru().map(|(id, _)| id)
    }

    fn clear(&mut self) {
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}
