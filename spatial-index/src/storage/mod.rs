//! Storage managers: the byte-array contract the tree engine is written against,
//! plus in-memory, page-based disk and buffering implementations.
//!
//! Identifiers are allocated by the manager. Passing `None` to
//! [`StorageManager::store`] asks for a fresh identifier; passing `Some(id)`
//! overwrites an existing array.

pub mod buffer;
pub mod disk_storage;
pub mod eviction;
pub mod memory_storage;
#[cfg(test)]
pub(crate) mod test_util;

pub use buffer::{BufferConfig, BufferedStorageManager};
pub use disk_storage::{DiskStorageConfig, DiskStorageManager};
pub use eviction::{EvictionPolicy, LruEviction, RandomEviction};
pub use memory_storage::MemoryStorageManager;

use crate::errors::{Id, SpatialResult};

/// Maps identifiers to byte arrays.
///
/// Every call is atomic with respect to itself. There are no cross-call
/// transactions.
pub trait StorageManager: Send + Sync {
    /// Loads the array stored under `id`.
    ///
    /// Fails with `NotFound` when nothing is associated with `id`.
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>>;

    /// Stores `data`, allocating a new identifier when `id` is `None`.
    ///
    /// Overwriting fails with `NotFound` when `id` has no association.
    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id>;

    /// Removes the array stored under `id`.
    ///
    /// Fails with `NotFound` when nothing is associated with `id`.
    fn delete(&self, id: Id) -> SpatialResult<()>;

    /// Pushes any pending state to the backing medium.
    fn flush(&self) -> SpatialResult<()> {
        Ok(())
    }
}

/// A caching storage manager.
pub trait Buffer: StorageManager {
    /// Number of loads served from the cache.
    fn hits(&self) -> u64;

    /// Flushes dirty entries and empties the cache.
    fn clear(&self);
}

impl<T: StorageManager + ?Sized> StorageManager for std::sync::Arc<T> {
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>> {
        (**self).load(id)
    }

    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id> {
        (**self).store(id, data)
    }

    fn delete(&self, id: Id) -> SpatialResult<()> {
        (**self).delete(id)
    }

    fn flush(&self) -> SpatialResult<()> {
        (**self).flush()
    }
}
