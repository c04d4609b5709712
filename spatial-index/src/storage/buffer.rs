//! Caching decorator over any storage manager.

use std::collections::HashMap;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use super::eviction::{EvictionPolicy, RandomEviction};
use super::{Buffer, StorageManager};
use crate::errors::{Id, SpatialError, SpatialResult};

/// Default number of resident entries
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

/// Configuration of a [`BufferedStorageManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum number of resident entries.
    pub capacity: usize,
    /// Forward every store to the wrapped manager immediately.
    pub write_through: bool,
    /// Seed of the default random eviction policy; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            capacity: DEFAULT_BUFFER_CAPACITY,
            write_through: false,
            seed: None,
        }
    }
}

impl BufferConfig {
    pub fn new() -> BufferConfig {
        BufferConfig::default()
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.capacity == 0 {
            return Err(SpatialError::invalid("buffer capacity must be at least 1"));
        }
        Ok(())
    }
}

struct CachedEntry {
    data: Vec<u8>,
    dirty: bool,
}

struct BufferInner {
    entries: HashMap<Id, CachedEntry>,
    policy: Box<dyn EvictionPolicy>,
    hits: u64,
    evictions: u64,
}

/// Keeps up to `capacity` arrays of the wrapped manager in memory.
///
/// In write-back mode overwrites of resident entries only mark them dirty.
/// Dirty entries reach the wrapped manager when they are evicted, on
/// [`StorageManager::flush`], on [`Buffer::clear`] and when the buffer is
/// dropped. Allocations, and overwrites of entries that are not resident, are
/// always forwarded so that identifier assignment and `NotFound` reporting
/// stay with the wrapped manager.
///
/// All operations run under one lock, so an eviction never interleaves with
/// a load of the same identifier.
pub struct BufferedStorageManager<S: StorageManager> {
    storage: S,
    capacity: usize,
    write_through: bool,
    inner: Mutex<BufferInner>,
}

impl<S: StorageManager> BufferedStorageManager<S> {
    /// Wraps `storage` using the random eviction policy.
    pub fn new(storage: S, config: BufferConfig) -> SpatialResult<Self> {
        let policy: Box<dyn EvictionPolicy> = match config.seed {
            Some(seed) => Box::new(RandomEviction::new(seed)),
            None => Box::new(RandomEviction::from_entropy()),
        };
        Self::with_policy(storage, config, policy)
    }

    /// Wraps `storage` using a caller-supplied eviction policy.
    pub fn with_policy(
        storage: S,
        config: BufferConfig,
        policy: Box<dyn EvictionPolicy>,
    ) -> SpatialResult<Self> {
        config.validate()?;
        Ok(BufferedStorageManager {
            storage,
            capacity: config.capacity,
            write_through: config.write_through,
            inner: Mutex::new(BufferInner {
                entries: HashMap::with_capacity(config.capacity + 1),
                policy,
                hits: 0,
                evictions: 0,
            }),
        })
    }

    /// The wrapped storage manager.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_write_through(&self) -> bool {
        self.write_through
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_resident(&self, id: Id) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Number of resident entries not yet written to the wrapped manager.
    pub fn dirty_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|entry| entry.dirty)
            .count()
    }

    /// Number of entries dropped to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }

    fn cache(&self, inner: &mut BufferInner, id: Id, data: Vec<u8>, dirty: bool) {
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.data = data;
                entry.dirty = dirty;
                inner.policy.record_access(id);
            }
            None => {
                inner.entries.insert(id, CachedEntry { data, dirty });
                inner.policy.record_insert(id);
            }
        }
    }

    /// Evicts until the buffer is back within capacity.
    ///
    /// A dirty victim is written to the wrapped manager first. When that write
    /// fails the victim stays resident and the smallest clean identifier is
    /// evicted in its place; the error is only returned when every resident
    /// entry is dirty.
    fn evict_if_needed(&self, inner: &mut BufferInner) -> SpatialResult<()> {
        while inner.entries.len() > self.capacity {
            let Some(victim) = inner.policy.choose_victim() else {
                break;
            };
            let Some(entry) = inner.entries.remove(&victim) else {
                continue;
            };
            if entry.dirty {
                if let Err(err) = self.storage.store(Some(victim), &entry.data) {
                    // keep the only copy of the bytes resident
                    inner.entries.insert(victim, entry);
                    inner.policy.record_insert(victim);

                    let clean = inner
                        .entries
                        .iter()
                        .filter(|(_, entry)| !entry.dirty)
                        .map(|(id, _)| *id)
                        .min();
                    let Some(clean) = clean else {
                        return Err(err);
                    };
                    warn!(
                        "Failed to write back {}, evicting clean {} instead: {}",
                        victim, clean, err
                    );
                    inner.entries.remove(&clean);
                    inner.policy.remove(clean);
                    inner.evictions += 1;
                    continue;
                }
            }
            inner.evictions += 1;
            trace!("Evicted {} (dirty: {})", victim, entry.dirty);
        }
        Ok(())
    }

    /// Writes every dirty entry to the wrapped manager.
    ///
    /// Entries whose write fails stay dirty. All entries are attempted; the
    /// first failure is returned.
    fn flush_dirty(&self, inner: &mut BufferInner) -> SpatialResult<()> {
        let mut dirty: Vec<Id> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(id, _)| *id)
            .collect();
        dirty.sort_unstable();

        let mut failed = 0;
        let mut first_error = None;
        for id in dirty {
            if let Some(entry) = inner.entries.get_mut(&id) {
                match self.storage.store(Some(id), &entry.data) {
                    Ok(_) => entry.dirty = false,
                    Err(err) => {
                        warn!("Failed to write back {}: {}", id, err);
                        failed += 1;
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => {
                debug!("{} dirty entries could not be written back", failed);
                Err(err)
            }
            None => Ok(()),
        }
    }
}

impl<S: StorageManager> StorageManager for BufferedStorageManager<S> {
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(&id) {
            let data = entry.data.clone();
            inner.hits += 1;
            inner.policy.record_access(id);
            return Ok(data);
        }

        let data = self.storage.load(id)?;
        self.cache(&mut inner, id, data.clone(), false);
        self.evict_if_needed(&mut inner)?;
        Ok(data)
    }

    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id> {
        let mut inner = self.inner.lock();
        let id = match id {
            Some(id) if !self.write_through && inner.entries.contains_key(&id) => {
                self.cache(&mut inner, id, data.to_vec(), true);
                return Ok(id);
            }
            id => self.storage.store(id, data)?,
        };
        self.cache(&mut inner, id, data.to_vec(), false);
        self.evict_if_needed(&mut inner)?;
        Ok(id)
    }

    fn delete(&self, id: Id) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        if inner.entries.remove(&id).is_some() {
            inner.policy.remove(id);
        }
        self.storage.delete(id)
    }

    fn flush(&self) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        let written = self.flush_dirty(&mut inner);
        self.storage.flush()?;
        written
    }
}

impl<S: StorageManager> Buffer for BufferedStorageManager<S> {
    fn hits(&self) -> u64 {
        self.inner.lock().hits
    }

    /// Flushes dirty entries and drops every clean one. Entries whose write
    /// back fails stay resident and dirty.
    fn clear(&self) {
        let mut inner = self.inner.lock();
        if let Err(err) = self.flush_dirty(&mut inner) {
            warn!("Failed to flush dirty entries while clearing buffer: {}", err);
        }

        let clean: Vec<Id> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.dirty)
            .map(|(id, _)| *id)
            .collect();
        for id in &clean {
            inner.entries.remove(id);
            inner.policy.remove(*id);
        }
        debug!(
            "Cleared {} buffered entries, {} dirty entries kept",
            clean.len(),
            inner.entries.len()
        );
    }
}

impl<S: StorageManager> Drop for BufferedStorageManager<S> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Err(err) = self.flush_dirty(&mut inner) {
            warn!("Failed to flush dirty entries on drop: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_util::FlakyStorage;
    use crate::storage::{LruEviction, MemoryStorageManager};
    use std::sync::Arc;

    fn write_back(capacity: usize) -> BufferedStorageManager<Arc<MemoryStorageManager>> {
        BufferedStorageManager::new(
            Arc::new(MemoryStorageManager::new()),
            BufferConfig::new().capacity(capacity).seed(42),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BufferedStorageManager::new(
            MemoryStorageManager::new(),
            BufferConfig::new().capacity(0),
        );
        assert!(matches!(result, Err(SpatialError::InvalidArgument(_))));
    }

    #[test]
    fn test_load_hits_and_misses() {
        let backing = Arc::new(MemoryStorageManager::new());
        let id = backing.store(None, b"node").unwrap();
        let buffer =
            BufferedStorageManager::new(backing.clone(), BufferConfig::new().seed(1)).unwrap();

        assert_eq!(buffer.load(id).unwrap(), b"node");
        assert_eq!(buffer.hits(), 0);
        assert_eq!(buffer.load(id).unwrap(), b"node");
        assert_eq!(buffer.hits(), 1);
        assert!(buffer.load(99).unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_back_defers_overwrite() {
        let buffer = write_back(4);
        let id = buffer.store(None, b"v1").unwrap();
        buffer.store(Some(id), b"v2").unwrap();

        assert_eq!(buffer.dirty_count(), 1);
        assert_eq!(buffer.storage().load(id).unwrap(), b"v1");
        assert_eq!(buffer.load(id).unwrap(), b"v2");

        buffer.flush().unwrap();
        assert_eq!(buffer.dirty_count(), 0);
        assert_eq!(buffer.storage().load(id).unwrap(), b"v2");
    }

    #[test]
    fn test_write_through_forwards_immediately() {
        let buffer = BufferedStorageManager::new(
            MemoryStorageManager::new(),
            BufferConfig::new().capacity(2).write_through(true).seed(5),
        )
        .unwrap();
        let id = buffer.store(None, b"v1").unwrap();
        buffer.store(Some(id), b"v2").unwrap();
        assert_eq!(buffer.dirty_count(), 0);
        assert_eq!(buffer.storage().load(id).unwrap(), b"v2");
    }

    #[test]
    fn test_overwrite_of_missing_id_is_not_found() {
        let buffer = write_back(2);
        assert!(buffer.store(Some(12), b"x").unwrap_err().is_not_found());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let buffer = write_back(3);
        let mut ids = Vec::new();
        for i in 0..10u8 {
            ids.push(buffer.store(None, &[i]).unwrap());
            assert!(buffer.len() <= 3);
        }
        for (i, id) in ids.iter().enumerate() {
            buffer.store(Some(*id), &[i as u8, 1]).unwrap();
            assert_eq!(buffer.load(*id).unwrap(), vec![i as u8, 1]);
            assert!(buffer.len() <= 3);
        }
        assert!(buffer.evictions() > 0);
    }

    #[test]
    fn test_dirty_victim_is_flushed() {
        let buffer = write_back(2);
        let a = buffer.store(None, b"a0").unwrap();
        let b = buffer.store(None, b"b0").unwrap();
        buffer.store(Some(a), b"a1").unwrap();
        buffer.store(Some(b), b"b1").unwrap();
        assert_eq!(buffer.dirty_count(), 2);

        let c = buffer.store(None, b"c0").unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.evictions(), 1);

        let expected: [(Id, &[u8]); 3] = [(a, b"a1"), (b, b"b1"), (c, b"c0")];
        let (evicted, bytes) = expected
            .iter()
            .copied()
            .find(|(id, _)| !buffer.is_resident(*id))
            .unwrap();
        assert_eq!(buffer.storage().load(evicted).unwrap(), bytes);

        buffer.clear();
        assert!(buffer.is_empty());
        for (id, bytes) in expected {
            assert_eq!(buffer.storage().load(id).unwrap(), bytes);
        }
        assert_eq!(buffer.load(evicted).unwrap(), bytes);
    }

    fn flaky_write_back(
        capacity: usize,
    ) -> (Arc<FlakyStorage>, BufferedStorageManager<Arc<FlakyStorage>>) {
        let backing = Arc::new(FlakyStorage::new());
        let buffer = BufferedStorageManager::new(
            backing.clone(),
            BufferConfig::new().capacity(capacity).seed(17),
        )
        .unwrap();
        (backing, buffer)
    }

    #[test]
    fn test_clear_keeps_entries_that_fail_to_flush() {
        let (backing, buffer) = flaky_write_back(4);
        let a = buffer.store(None, b"a0").unwrap();
        let b = buffer.store(None, b"b0").unwrap();
        buffer.store(Some(a), b"a1").unwrap();
        buffer.store(Some(b), b"b1").unwrap();

        backing.fail_overwrites_of(a);
        buffer.clear();

        assert_eq!(backing.load(a).unwrap(), b"a0");
        assert_eq!(backing.load(b).unwrap(), b"b1");
        assert!(buffer.is_resident(a));
        assert!(!buffer.is_resident(b));
        assert_eq!(buffer.dirty_count(), 1);
        assert_eq!(buffer.load(a).unwrap(), b"a1");

        backing.heal();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(backing.load(a).unwrap(), b"a1");
    }

    #[test]
    fn test_flush_writes_every_entry_before_reporting() {
        let (backing, buffer) = flaky_write_back(4);
        let a = buffer.store(None, b"a0").unwrap();
        let b = buffer.store(None, b"b0").unwrap();
        let c = buffer.store(None, b"c0").unwrap();
        for (id, bytes) in [(a, b"a1"), (b, b"b1"), (c, b"c1")] {
            buffer.store(Some(id), bytes).unwrap();
        }

        backing.fail_overwrites_of(a);
        assert!(matches!(buffer.flush(), Err(SpatialError::Io(_))));
        assert_eq!(buffer.dirty_count(), 1);
        assert_eq!(backing.load(b).unwrap(), b"b1");
        assert_eq!(backing.load(c).unwrap(), b"c1");

        backing.heal();
        buffer.flush().unwrap();
        assert_eq!(buffer.dirty_count(), 0);
        assert_eq!(backing.load(a).unwrap(), b"a1");
    }

    #[test]
    fn test_eviction_keeps_dirty_entry_when_write_back_fails() {
        let (backing, buffer) = flaky_write_back(2);
        let a = buffer.store(None, b"a0").unwrap();
        let b = buffer.store(None, b"b0").unwrap();
        buffer.store(Some(a), b"a1").unwrap();
        buffer.store(Some(b), b"b1").unwrap();

        backing.fail_all_overwrites();
        let c = buffer.store(None, b"c0").unwrap();
        assert_eq!(buffer.len(), 2);
        assert!(buffer.is_resident(a) && buffer.is_resident(b));
        assert!(!buffer.is_resident(c));
        assert_eq!(backing.load(c).unwrap(), b"c0");

        backing.heal();
        buffer.flush().unwrap();
        assert_eq!(backing.load(a).unwrap(), b"a1");
        assert_eq!(backing.load(b).unwrap(), b"b1");
    }

    #[test]
    fn test_delete_removes_from_cache_and_backing() {
        let buffer = write_back(4);
        let id = buffer.store(None, b"x").unwrap();
        buffer.delete(id).unwrap();
        assert!(!buffer.is_resident(id));
        assert!(buffer.load(id).unwrap_err().is_not_found());
        assert!(buffer.delete(id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_lru_policy_keeps_hot_entry() {
        let buffer = BufferedStorageManager::with_policy(
            MemoryStorageManager::new(),
            BufferConfig::new().capacity(2),
            Box::new(LruEviction::new()),
        )
        .unwrap();
        let a = buffer.store(None, b"a").unwrap();
        let b = buffer.store(None, b"b").unwrap();
        buffer.load(a).unwrap();
        let _c = buffer.store(None, b"c").unwrap();
        assert!(buffer.is_resident(a));
        assert!(!buffer.is_resident(b));
    }

    #[test]
    fn test_drop_flushes_dirty_entries() {
        let backing = Arc::new(MemoryStorageManager::new());
        let id = backing.store(None, b"old").unwrap();
        {
            let buffer =
                BufferedStorageManager::new(backing.clone(), BufferConfig::new().seed(9)).unwrap();
            buffer.load(id).unwrap();
            buffer.store(Some(id), b"new").unwrap();
            assert_eq!(backing.load(id).unwrap(), b"old");
        }
        assert_eq!(backing.load(id).unwrap(), b"new");
    }
}
