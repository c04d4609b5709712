//! In-memory storage manager.

use parking_lot::Mutex;

use super::StorageManager;
use crate::errors::{Id, SpatialError, SpatialResult};

/// Keeps byte arrays in a vector indexed by identifier.
///
/// Slots freed by [`StorageManager::delete`] are handed out again by later
/// allocations.
#[derive(Default)]
pub struct MemoryStorageManager {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    buffers: Vec<Option<Vec<u8>>>,
    empty_slots: Vec<Id>,
}

impl MemoryStorageManager {
    pub fn new() -> MemoryStorageManager {
        MemoryStorageManager::default()
    }

    /// Number of live arrays.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.buffers.len() - inner.empty_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryInner {
    fn slot(&self, id: Id) -> Option<&Vec<u8>> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.buffers.get(index))
            .and_then(|slot| slot.as_ref())
    }

    fn slot_mut(&mut self, id: Id) -> Option<&mut Option<Vec<u8>>> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.buffers.get_mut(index))
            .filter(|slot| slot.is_some())
    }
}

impl StorageManager for MemoryStorageManager {
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>> {
        self.inner
            .lock()
            .slot(id)
            .cloned()
            .ok_or(SpatialError::NotFound(id))
    }

    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id> {
        let mut inner = self.inner.lock();
        match id {
            None => {
                if let Some(reused) = inner.empty_slots.pop() {
                    inner.buffers[reused as usize] = Some(data.to_vec());
                    Ok(reused)
                } else {
                    inner.buffers.push(Some(data.to_vec()));
                    Ok((inner.buffers.len() - 1) as Id)
                }
            }
            Some(id) => {
                let slot = inner.slot_mut(id).ok_or(SpatialError::NotFound(id))?;
                *slot = Some(data.to_vec());
                Ok(id)
            }
        }
    }

    fn delete(&self, id: Id) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(id).ok_or(SpatialError::NotFound(id))?;
        *slot = None;
        inner.empty_slots.push(id);
        Ok(())
    }
}
