//! Page-based disk storage manager.
//!
//! A store is made of two files sharing a base name:
//! - `<base>.dat` is divided into fixed-size pages. An array that does not fit
//!   in one page is written as a chain of pages.
//! - `<base>.idx` holds the header: page size, the next never-used page, the
//!   free-page list and the identifier → page chain map.
//!
//! An identifier is the first page of its chain and never changes while the
//! array exists. The header is written by [`StorageManager::flush`] and when
//! the manager is dropped; reads and writes of array content go straight to
//! the data file.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::StorageManager;
use crate::errors::{decode, encode, Id, SpatialError, SpatialResult};

/// Magic number identifying the header file ("SIDX")
const MAGIC: u32 = 0x5349_4458;

/// Header format version
const VERSION: u32 = 1;

/// Smallest accepted page size
const MIN_PAGE_SIZE: usize = 64;

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Configuration of a new disk store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStorageConfig {
    pub page_size: usize,
}

impl Default for DiskStorageConfig {
    fn default() -> Self {
        DiskStorageConfig {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DiskStorageConfig {
    pub fn new() -> DiskStorageConfig {
        DiskStorageConfig::default()
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.page_size < MIN_PAGE_SIZE || self.page_size > u32::MAX as usize {
            return Err(SpatialError::invalid(format!(
                "page size {} must lie between {} and {} bytes",
                self.page_size,
                MIN_PAGE_SIZE,
                u32::MAX
            )));
        }
        Ok(())
    }
}

/// Location of one stored array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageChain {
    length: u64,
    pages: Vec<u64>,
}

/// Persisted form of the header.
#[derive(Debug, Serialize, Deserialize)]
struct DiskHeader {
    magic: u32,
    version: u32,
    page_size: u32,
    next_page: u64,
    free_pages: Vec<u64>,
    chains: Vec<(Id, PageChain)>,
}

impl DiskHeader {
    /// Checks that the header describes a consistent page space.
    fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::corrupted("invalid header (bad magic)"));
        }
        if self.version != VERSION {
            return Err(SpatialError::corrupted(format!(
                "unsupported header version {}",
                self.version
            )));
        }
        if (self.page_size as usize) < MIN_PAGE_SIZE {
            return Err(SpatialError::corrupted(format!(
                "invalid page size {}",
                self.page_size
            )));
        }

        let mut seen = HashSet::new();
        for &page in &self.free_pages {
            if page >= self.next_page {
                return Err(SpatialError::corrupted(format!(
                    "free page {} out of range (next page {})",
                    page, self.next_page
                )));
            }
            if !seen.insert(page) {
                return Err(SpatialError::corrupted(format!(
                    "page {} listed twice",
                    page
                )));
            }
        }

        let mut ids = HashSet::new();
        for (id, chain) in &self.chains {
            if !ids.insert(*id) {
                return Err(SpatialError::corrupted(format!("identifier {} listed twice", id)));
            }
            if chain.pages.first().map(|&p| p as Id) != Some(*id) {
                return Err(SpatialError::corrupted(format!(
                    "identifier {} does not match its first page",
                    id
                )));
            }
            let capacity = chain.pages.len() as u64 * self.page_size as u64;
            if chain.length > capacity {
                return Err(SpatialError::corrupted(format!(
                    "identifier {} claims {} bytes in {} pages",
                    id,
                    chain.length,
                    chain.pages.len()
                )));
            }
            for &page in &chain.pages {
                if page >= self.next_page {
                    return Err(SpatialError::corrupted(format!(
                        "page {} of identifier {} out of range (next page {})",
                        page, id, self.next_page
                    )));
                }
                if !seen.insert(page) {
                    return Err(SpatialError::corrupted(format!(
                        "page {} of identifier {} is used twice",
                        page, id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Stores byte arrays in chains of fixed-size pages on disk.
pub struct DiskStorageManager {
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    index_file: File,
    data_file: File,
    data_path: PathBuf,
    page_size: usize,
    next_page: u64,
    free_pages: BTreeSet<u64>,
    chains: HashMap<Id, PageChain>,
    header_dirty: bool,
}

fn file_paths(base: &Path) -> (PathBuf, PathBuf) {
    (base.with_extension("idx"), base.with_extension("dat"))
}

impl DiskStorageManager {
    /// Creates a new, empty store, truncating any existing files.
    pub fn create(base: impl AsRef<Path>, config: DiskStorageConfig) -> SpatialResult<Self> {
        config.validate()?;
        let (index_path, data_path) = file_paths(base.as_ref());
        let open = |path: &Path| {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
        };
        let index_file = open(&index_path)?;
        let data_file = open(&data_path)?;
        debug!(
            "Created disk storage at {} with page size {}",
            data_path.display(),
            config.page_size
        );

        let storage = DiskStorageManager {
            inner: Mutex::new(DiskInner {
                index_file,
                data_file,
                data_path,
                page_size: config.page_size,
                next_page: 0,
                free_pages: BTreeSet::new(),
                chains: HashMap::new(),
                header_dirty: true,
            }),
        };
        storage.flush()?;
        Ok(storage)
    }

    /// Opens an existing store, recovering the free list and identifier map
    /// from the header.
    pub fn open(base: impl AsRef<Path>) -> SpatialResult<Self> {
        let (index_path, data_path) = file_paths(base.as_ref());
        let open = |path: &Path| OpenOptions::new().read(true).write(true).open(path);
        let mut index_file = open(&index_path)?;
        let data_file = open(&data_path)?;

        let mut bytes = Vec::new();
        index_file.seek(SeekFrom::Start(0))?;
        index_file.read_to_end(&mut bytes)?;
        let header: DiskHeader = decode(&bytes)?;
        header.validate()?;
        debug!(
            "Opened disk storage at {}: {} arrays, {} free pages, next page {}",
            data_path.display(),
            header.chains.len(),
            header.free_pages.len(),
            header.next_page
        );

        Ok(DiskStorageManager {
            inner: Mutex::new(DiskInner {
                index_file,
                data_file,
                data_path,
                page_size: header.page_size as usize,
                next_page: header.next_page,
                free_pages: header.free_pages.into_iter().collect(),
                chains: header.chains.into_iter().collect(),
                header_dirty: false,
            }),
        })
    }

    pub fn page_size(&self) -> usize {
        self.inner.lock().page_size
    }

    /// Number of pages available for reuse.
    pub fn free_page_count(&self) -> usize {
        self.inner.lock().free_pages.len()
    }

    /// Total number of pages ever allocated in the data file.
    pub fn total_pages(&self) -> u64 {
        self.inner.lock().next_page
    }

    /// Number of stored arrays.
    pub fn len(&self) -> usize {
        self.inner.lock().chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiskInner {
    fn allocate_page(&mut self) -> u64 {
        if let Some(page) = self.free_pages.pop_first() {
            page
        } else {
            let page = self.next_page;
            self.next_page += 1;
            page
        }
    }

    fn pages_needed(&self, length: usize) -> usize {
        length.div_ceil(self.page_size).max(1)
    }

    fn write_chain(&mut self, pages: &[u64], data: &[u8]) -> SpatialResult<()> {
        for (page, chunk) in pages.iter().zip(data.chunks(self.page_size)) {
            self.data_file
                .seek(SeekFrom::Start(page * self.page_size as u64))?;
            self.data_file.write_all(chunk)?;
        }
        Ok(())
    }

    fn read_chain(&mut self, chain: &PageChain) -> SpatialResult<Vec<u8>> {
        let mut data = vec![0u8; chain.length as usize];
        for (page, chunk) in chain.pages.iter().zip(data.chunks_mut(self.page_size)) {
            self.data_file
                .seek(SeekFrom::Start(page * self.page_size as u64))?;
            self.data_file.read_exact(chunk)?;
        }
        Ok(data)
    }

    fn write_header(&mut self) -> SpatialResult<()> {
        let header = DiskHeader {
            magic: MAGIC,
            version: VERSION,
            page_size: self.page_size as u32,
            next_page: self.next_page,
            free_pages: self.free_pages.iter().copied().collect(),
            chains: self
                .chains
                .iter()
                .map(|(id, chain)| (*id, chain.clone()))
                .collect(),
        };
        let bytes = encode(&header)?;
        self.index_file.seek(SeekFrom::Start(0))?;
        self.index_file.write_all(&bytes)?;
        self.index_file.set_len(bytes.len() as u64)?;
        self.index_file.sync_all()?;
        self.header_dirty = false;
        Ok(())
    }
}

impl StorageManager for DiskStorageManager {
    fn load(&self, id: Id) -> SpatialResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let chain = inner
            .chains
            .get(&id)
            .cloned()
            .ok_or(SpatialError::NotFound(id))?;
        inner.read_chain(&chain)
    }

    fn store(&self, id: Option<Id>, data: &[u8]) -> SpatialResult<Id> {
        let mut inner = self.inner.lock();
        let needed = inner.pages_needed(data.len());

        // pages taken from the free list or the end of the file by this call
        let mut fresh = Vec::new();
        let (id, mut pages) = match id {
            None => {
                fresh = (0..needed).map(|_| inner.allocate_page()).collect();
                (fresh[0] as Id, fresh.clone())
            }
            Some(id) => {
                let mut pages = inner
                    .chains
                    .get(&id)
                    .map(|chain| chain.pages.clone())
                    .ok_or(SpatialError::NotFound(id))?;
                while pages.len() < needed {
                    let page = inner.allocate_page();
                    pages.push(page);
                    fresh.push(page);
                }
                (id, pages)
            }
        };
        let surplus = pages.split_off(needed);

        if let Err(err) = inner.write_chain(&pages, data) {
            warn!("Failed to store {} bytes under {}: {}", data.len(), id, err);
            inner.free_pages.extend(fresh);
            return Err(err);
        }

        trace!(
            "Stored {} bytes under {} in {} pages",
            data.len(),
            id,
            pages.len()
        );
        inner.free_pages.extend(surplus);
        inner.chains.insert(
            id,
            PageChain {
                length: data.len() as u64,
                pages,
            },
        );
        inner.header_dirty = true;
        Ok(id)
    }

    fn delete(&self, id: Id) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        let chain = inner.chains.remove(&id).ok_or(SpatialError::NotFound(id))?;
        trace!("Deleted {} and freed {} pages", id, chain.pages.len());
        inner.free_pages.extend(chain.pages);
        inner.header_dirty = true;
        Ok(())
    }

    fn flush(&self) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        inner.data_file.sync_all()?;
        if inner.header_dirty {
            inner.write_header()?;
        }
        Ok(())
    }
}

impl Drop for DiskStorageManager {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            let inner = self.inner.lock();
            warn!(
                "Failed to flush disk storage {} on drop: {}",
                inner.data_path.display(),
                err
            );
        }
    }
}
