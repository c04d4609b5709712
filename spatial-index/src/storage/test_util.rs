//! Storage manager with switchable failures for error-path tests.

use std::collections::HashSet;
use std::io;

use parking_lot::Mutex;

use super::{MemoryStorageManager, StorageManager};
use crate::errors::{Id, SpatialError, SpatialResult};

#[derive(Default)]
struct Failures {
    /// Allocations still allowed before every further one fails.
    allocations_left: Option<usize>,
    overwrites_of: HashSet<Id>,
    all_overwrites: bool,
    deletes: bool,
}

/// In-memory storage whose stores and deletes fail on demand.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    storage: MemoryStorageManager,
    failures: Mutex<Failures>,
}

fn simulated(operation: &str) -> SpatialError {
    SpatialError::Io(io::Error::other(format!("simulated {} failure", operation)))
}

impl FlakyStorage {
    pub fn new() -> FlakyStorage {
        FlakyStorage::default()
    }

    /// Lets `count` more allocations through, then fails the rest.
    pub fn fail_allocations_after(&self, count: usize) {
        self.failures.lock().allocations_left = Some(count);
    }

    pub fn fail_overwrites_of(&self, id: Id) {
        self.failures.lock().overwrites_of.insert(id);
    }

    pub fn fail_all_overwrites(&self) {
        self.failures.lock().all_overwrites = true;
    }

    pub fn fail_deletes(&self) {
        self.failures.lock().deletes = true;
    }

    /// Clears every configured failure.
    pub fn heal(&self) {
        *self.failures.lock() = Failures::default();
    }

    /// Number of live arrays.
    pub fn len(&self) -> usize {
        self.storage.len()
    }
}

impl StorageManager for FlakyStorage {
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>> {
        self.storage.load(id)
    }

    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id> {
        {
            let mut failures = self.failures.lock();
            match id {
                None => {
                    if let Some(left) = failures.allocations_left.as_mut() {
                        if *left == 0 {
                            return Err(simulated("allocation"));
                        }
                        *left -= 1;
                    }
                }
                Some(id) => {
                    if failures.all_overwrites || failures.overwrites_of.contains(&id) {
                        return Err(simulated("overwrite"));
                    }
                }
            }
        }
        self.storage.store(id, data)
    }

    fn delete(&self, id: Id) -> SpatialResult<()> {
        if self.failures.lock().deletes {
            return Err(simulated("delete"));
        }
        self.storage.delete(id)
    }
}
