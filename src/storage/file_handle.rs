//! # File Handle
//!
//! `FileHandle` is the single entry point columns use to reach pages. It
//! couples a storage backend with the page-range allocator:
//!
//! ```text
//! FileHandle
//! ├── storage:   RwLock<AnyStorage>     shared for reads, exclusive for writes/grow
//! └── allocator: Mutex<PageAllocator>   free-range list + bump pointer
//! ```
//!
//! ## Access Protocol
//!
//! - `optimistic_read(page, f)`: runs `f` over the page bytes under a shared
//!   lock. Zero-copy when the backend allows it, otherwise `f` sees a copy.
//! - `update_page(page, f)`: runs `f` over mutable page bytes under an
//!   exclusive lock (in-place checkpoint path).
//! - `write_page(page, bytes)`: overwrites a page; short input is zero-padded.
//!
//! Allocation never touches page contents. When an allocation pushes the bump
//! pointer past the backend's capacity the backend is grown geometrically so
//! that a run of small flushes does not remap the file each time.
//!
//! ## Persistence
//!
//! The free-range list is in-memory only. Reopening a file treats every
//! existing page as allocated; space freed before a restart is not reused.

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::driver::{AnyStorage, StorageDriver, StorageKind};
use super::freelist::PageAllocator;
use super::memory::MemoryStorage;
use super::mmap::MmapStorage;
use super::page::PageRange;
use crate::config::PAGE_SIZE;

const INITIAL_FILE_PAGES: u32 = 16;

#[derive(Debug)]
pub struct FileHandle {
    kind: StorageKind,
    storage: RwLock<AnyStorage>,
    allocator: Mutex<PageAllocator>,
}

impl FileHandle {
    /// Volatile handle whose pages live on the heap.
    pub fn in_memory() -> Self {
        Self {
            kind: StorageKind::Memory,
            storage: RwLock::new(AnyStorage::Memory(MemoryStorage::new(0))),
            allocator: Mutex::new(PageAllocator::new()),
        }
    }

    /// Creates (or truncates) a column file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let storage = MmapStorage::create(path, INITIAL_FILE_PAGES)
            .wrap_err_with(|| format!("failed to create file handle for '{}'", path.display()))?;
        debug!(path = %path.display(), "created column file");
        Ok(Self {
            kind: StorageKind::mmap(path),
            storage: RwLock::new(AnyStorage::Mmap(storage)),
            allocator: Mutex::new(PageAllocator::new()),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let storage = MmapStorage::open(path)
            .wrap_err_with(|| format!("failed to open file handle for '{}'", path.display()))?;
        let allocated = storage.page_count();
        debug!(path = %path.display(), pages = allocated, "opened column file");
        Ok(Self {
            kind: StorageKind::mmap(path),
            storage: RwLock::new(AnyStorage::Mmap(storage)),
            allocator: Mutex::new(PageAllocator::with_next_page(allocated)),
        })
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.kind.path()
    }

    pub fn is_in_memory(&self) -> bool {
        !self.kind.is_mmap()
    }

    /// Number of pages ever handed out (the logical file length).
    pub fn num_allocated_pages(&self) -> u32 {
        self.allocator.lock().next_page()
    }

    pub fn num_free_pages(&self) -> u64 {
        self.allocator.lock().free_page_count()
    }

    pub fn allocate_page_range(&self, num_pages: u32) -> Result<PageRange> {
        let (range, needed) = {
            let mut allocator = self.allocator.lock();
            let range = allocator.allocate(num_pages)?;
            (range, allocator.next_page())
        };
        if range.is_empty() {
            return Ok(range);
        }
        let capacity = self.storage.read().page_count();
        if needed > capacity {
            let mut storage = self.storage.write();
            let capacity = storage.page_count();
            if needed > capacity {
                let target = needed.max(capacity.saturating_mul(2)).max(INITIAL_FILE_PAGES);
                storage
                    .grow(target)
                    .wrap_err_with(|| format!("failed to grow storage to {} pages", target))?;
                trace!(from = capacity, to = target, "grew column file");
            }
        }
        trace!(start = range.start_page, pages = range.num_pages, "allocated page range");
        Ok(range)
    }

    pub fn free_page_range(&self, range: PageRange) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        trace!(start = range.start_page, pages = range.num_pages, "freed page range");
        self.allocator.lock().free(range)
    }

    /// Runs `f` over the bytes of `page_idx` under a shared lock.
    pub fn optimistic_read<R>(&self, page_idx: u32, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let storage = self.storage.read();
        if let Some(page) = storage.page_direct(page_idx) {
            let page = page.wrap_err_with(|| format!("failed to read page {}", page_idx))?;
            return Ok(f(page));
        }
        let mut buf = [0u8; PAGE_SIZE];
        storage
            .read_page(page_idx, &mut buf)
            .wrap_err_with(|| format!("failed to read page {}", page_idx))?;
        Ok(f(&buf))
    }

    /// Runs `f` over the mutable bytes of `page_idx` under an exclusive lock.
    pub fn update_page<R>(&self, page_idx: u32, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut storage = self.storage.write();
        if storage.supports_zero_copy() {
            if let Some(page) = storage.page_direct_mut(page_idx) {
                let page = page.wrap_err_with(|| format!("failed to update page {}", page_idx))?;
                return Ok(f(page));
            }
        }
        let mut buf = [0u8; PAGE_SIZE];
        storage
            .read_page(page_idx, &mut buf)
            .wrap_err_with(|| format!("failed to read page {} for update", page_idx))?;
        let result = f(&mut buf);
        storage
            .write_page(page_idx, &buf)
            .wrap_err_with(|| format!("failed to write page {}", page_idx))?;
        Ok(result)
    }

    /// Overwrites `page_idx` with `data`, zero-padding to a full page.
    pub fn write_page(&self, page_idx: u32, data: &[u8]) -> Result<()> {
        eyre::ensure!(
            data.len() <= PAGE_SIZE,
            "page write of {} bytes exceeds page size {}",
            data.len(),
            PAGE_SIZE
        );
        let mut buf = [0u8; PAGE_SIZE];
        buf[..data.len()].copy_from_slice(data);
        self.storage
            .write()
            .write_page(page_idx, &buf)
            .wrap_err_with(|| format!("failed to write page {}", page_idx))
    }

    pub fn prefetch(&self, range: PageRange) {
        if !range.is_empty() {
            self.storage.read().prefetch(range.start_page, range.num_pages);
        }
    }

    pub fn sync(&self) -> Result<()> {
        self.storage.read().sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocation_grows_backend() {
        let handle = FileHandle::in_memory();
        let range = handle.allocate_page_range(40).unwrap();
        assert_eq!(range, PageRange::new(0, 40));
        handle.write_page(39, &[1, 2, 3]).unwrap();
        let bytes = handle.optimistic_read(39, |p| [p[0], p[2], p[3]]).unwrap();
        assert_eq!(bytes, [1, 3, 0]);
    }

    #[test]
    fn freed_pages_are_reused() {
        let handle = FileHandle::in_memory();
        let first = handle.allocate_page_range(4).unwrap();
        handle.allocate_page_range(2).unwrap();
        handle.free_page_range(first).unwrap();
        assert_eq!(handle.num_free_pages(), 4);
        assert_eq!(handle.allocate_page_range(3).unwrap(), PageRange::new(0, 3));
        assert_eq!(handle.num_allocated_pages(), 6);
    }

    #[test]
    fn update_page_mutates_in_place() {
        let handle = FileHandle::in_memory();
        handle.allocate_page_range(1).unwrap();
        handle.update_page(0, |p| p[100] = 9).unwrap();
        assert_eq!(handle.optimistic_read(0, |p| p[100]).unwrap(), 9);
        assert!(handle.optimistic_read(500, |p| p[0]).is_err());
        assert!(handle.write_page(0, &vec![0u8; PAGE_SIZE + 1]).is_err());
    }

    #[test]
    fn file_pages_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col.data");
        {
            let handle = FileHandle::create(&path).unwrap();
            let range = handle.allocate_page_range(20).unwrap();
            handle.write_page(range.start_page + 19, &[0xAB]).unwrap();
            handle.sync().unwrap();
        }
        let handle = FileHandle::open(&path).unwrap();
        assert!(!handle.is_in_memory());
        assert!(handle.num_allocated_pages() >= 20);
        assert_eq!(handle.optimistic_read(19, |p| p[0]).unwrap(), 0xAB);
    }
}
