//! # Storage Driver Abstraction Layer
//!
//! This module provides the `StorageDriver` trait, a copy-based abstraction over
//! the page backends a `FileHandle` can sit on: a memory-mapped file for real
//! databases and a plain in-memory page vector for tests and temporary data.
//!
//! ## Copy-Based Interface
//!
//! The primary interface uses copy semantics so every backend can implement it:
//!
//! ```text
//! fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;
//! fn write_page(&mut self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()>;
//! ```
//!
//! ## Zero-Copy Bypass
//!
//! Both shipped backends keep pages addressable in process memory, so they
//! also answer `page_direct()`/`page_direct_mut()` with slices into their own
//! buffers. `FileHandle::optimistic_read` uses the direct path when it is
//! offered and falls back to copying otherwise:
//!
//! ```text
//! fn supports_zero_copy(&self) -> bool { true }
//! fn page_direct(&self, page_no: u32) -> Option<Result<&[u8]>> { Some(self.page(page_no)) }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend       | Durable | Zero-Copy | Sync Required |
//! |---------------|---------|-----------|---------------|
//! | MmapStorage   | Yes     | Yes       | msync         |
//! | MemoryStorage | No      | Yes       | no-op         |
//!
//! ## AnyStorage Enum
//!
//! `AnyStorage` is a type-erased wrapper that implements `StorageDriver`, so
//! `FileHandle` works with either backend without generics:
//!
//! ```text
//! pub enum AnyStorage {
//!     Mmap(MmapStorage),
//!     Memory(MemoryStorage),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! `StorageDriver` requires `Send`. Neither backend is internally synchronized;
//! `FileHandle` wraps the `AnyStorage` in a `parking_lot::RwLock` so readers
//! share pages while growth and page writes are exclusive.

use eyre::Result;
use std::path::PathBuf;

use super::memory::MemoryStorage;
use super::mmap::MmapStorage;
use crate::config::PAGE_SIZE;

/// Page-granular access to a column file backend.
pub trait StorageDriver: Send {
    fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes may be buffered until `sync`.
    fn write_page(&mut self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Extends the backend to `new_page_count` pages; never shrinks.
    fn grow(&mut self, new_page_count: u32) -> Result<()>;

    fn page_count(&self) -> u32;

    fn sync(&self) -> Result<()>;

    fn supports_zero_copy(&self) -> bool {
        false
    }

    /// Borrowed page bytes, or `None` when the backend can only copy.
    fn page_direct(&self, _page_no: u32) -> Option<Result<&[u8]>> {
        None
    }

    fn page_direct_mut(&mut self, _page_no: u32) -> Option<Result<&mut [u8]>> {
        None
    }

    /// Read-ahead hint for a scan over `[start_page, start_page + count)`.
    fn prefetch(&self, _start_page: u32, _count: u32) {}
}

/// Backend selection for `FileHandle::open_with`.
#[derive(Debug, Clone)]
pub enum StorageKind {
    /// Memory-mapped database file.
    Mmap {
        path: PathBuf,
    },
    /// Volatile pages held on the heap.
    Memory,
}

impl StorageKind {
    pub fn mmap<P: Into<PathBuf>>(path: P) -> Self {
        StorageKind::Mmap { path: path.into() }
    }

    pub fn is_mmap(&self) -> bool {
        matches!(self, StorageKind::Mmap { .. })
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            StorageKind::Mmap { path } => Some(path),
            StorageKind::Memory => None,
        }
    }
}

/// Type-erased storage backend that implements `StorageDriver`.
#[derive(Debug)]
pub enum AnyStorage {
    Mmap(MmapStorage),
    Memory(MemoryStorage),
}

macro_rules! delegate {
    ($self:ident, $s:ident => $body:expr) => {
        match $self {
            AnyStorage::Mmap($s) => $body,
            AnyStorage::Memory($s) => $body,
        }
    };
}

impl AnyStorage {
    pub fn is_mmap(&self) -> bool {
        matches!(self, AnyStorage::Mmap(_))
    }
}

impl StorageDriver for AnyStorage {
    fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        delegate!(self, s => s.read_page(page_no, buf))
    }

    fn write_page(&mut self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        delegate!(self, s => s.write_page(page_no, data))
    }

    fn grow(&mut self, new_page_count: u32) -> Result<()> {
        delegate!(self, s => StorageDriver::grow(s, new_page_count))
    }

    fn page_count(&self) -> u32 {
        delegate!(self, s => s.page_count())
    }

    fn sync(&self) -> Result<()> {
        delegate!(self, s => StorageDriver::sync(s))
    }

    fn supports_zero_copy(&self) -> bool {
        delegate!(self, s => s.supports_zero_copy())
    }

    fn page_direct(&self, page_no: u32) -> Option<Result<&[u8]>> {
        delegate!(self, s => s.page_direct(page_no))
    }

    fn page_direct_mut(&mut self, page_no: u32) -> Option<Result<&mut [u8]>> {
        delegate!(self, s => s.page_direct_mut(page_no))
    }

    fn prefetch(&self, start_page: u32, count: u32) {
        delegate!(self, s => s.prefetch(start_page, count))
    }
}

/// Both backends keep every page addressable in process memory, so they
/// share one implementation over their `page`/`page_mut` accessors.
macro_rules! in_process_driver {
    ($backend:ty, grow: $grow:expr, sync: $sync:expr, prefetch: $prefetch:expr) => {
        impl StorageDriver for $backend {
            fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
                buf.copy_from_slice(self.page(page_no)?);
                Ok(())
            }

            fn write_page(&mut self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
                self.page_mut(page_no)?.copy_from_slice(data);
                Ok(())
            }

            fn grow(&mut self, new_page_count: u32) -> Result<()> {
                $grow(self, new_page_count)
            }

            fn page_count(&self) -> u32 {
                <$backend>::page_count(self)
            }

            fn sync(&self) -> Result<()> {
                $sync(self)
            }

            fn supports_zero_copy(&self) -> bool {
                true
            }

            fn page_direct(&self, page_no: u32) -> Option<Result<&[u8]>> {
                Some(self.page(page_no))
            }

            fn page_direct_mut(&mut self, page_no: u32) -> Option<Result<&mut [u8]>> {
                Some(self.page_mut(page_no))
            }

            fn prefetch(&self, start_page: u32, count: u32) {
                $prefetch(self, start_page, count)
            }
        }
    };
}

in_process_driver!(
    MmapStorage,
    grow: MmapStorage::grow,
    sync: MmapStorage::sync,
    prefetch: MmapStorage::prefetch_pages
);

in_process_driver!(
    MemoryStorage,
    grow: |s: &mut MemoryStorage, pages| -> Result<()> {
        s.grow(pages);
        Ok(())
    },
    sync: |_: &MemoryStorage| -> Result<()> { Ok(()) },
    prefetch: |_: &MemoryStorage, _, _| {}
);

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn storage_kind_reports_path() {
        let kind = StorageKind::mmap("/tmp/data.col");
        assert!(kind.is_mmap());
        assert_eq!(kind.path().unwrap().to_str(), Some("/tmp/data.col"));
        assert!(StorageKind::Memory.path().is_none());
    }

    #[test]
    fn any_storage_copies_pages_through_both_backends() {
        let dir = tempdir().unwrap();
        let backends = vec![
            AnyStorage::Mmap(MmapStorage::create(dir.path().join("a.col"), 2).unwrap()),
            AnyStorage::Memory(MemoryStorage::new(2)),
        ];
        for mut storage in backends {
            let mut page = [0u8; PAGE_SIZE];
            page[7] = 0x5A;
            storage.write_page(1, &page).unwrap();

            let mut out = [0u8; PAGE_SIZE];
            storage.read_page(1, &mut out).unwrap();
            assert_eq!(out[7], 0x5A);
            assert!(storage.read_page(2, &mut out).is_err());

            storage.grow(4).unwrap();
            assert_eq!(storage.page_count(), 4);
            assert!(storage.page_direct(3).unwrap().is_ok());
        }
    }
}
