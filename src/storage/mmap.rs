//! # Memory-Mapped File Storage
//!
//! `MmapStorage` backs a durable `FileHandle`. A column file is nothing but a
//! run of fixed-size pages; chunk descriptors (`ColumnChunkMetadata`) live
//! with the node group that owns them, so no page carries a header:
//!
//! ```text
//! Offset 0:              Page 0 (PAGE_SIZE bytes)
//! Offset PAGE_SIZE:      Page 1
//! Offset 2 * PAGE_SIZE:  Page 2
//! ...
//! ```
//!
//! The file size is always a multiple of `PAGE_SIZE`.
//!
//! ## Remapping
//!
//! `grow` replaces the map, so it takes `&mut self` while `page` borrows
//! `&self`: no page slice can survive a remap. `FileHandle` keeps the storage
//! behind an `RwLock`, which carries the same rule across threads.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` annotated with the file path
//! or page number involved.

use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::PAGE_SIZE;

#[derive(Debug)]
pub struct MmapStorage {
    file: File,
    mmap: MmapMut,
    page_count: u32,
}

fn bytes_for(pages: u32) -> u64 {
    pages as u64 * PAGE_SIZE as u64
}

/// Maps the whole of `file`.
///
/// # Safety
///
/// The caller owns `file` for the lifetime of the map and no other process
/// writes to it; every access is bounds-checked against `page_count`.
unsafe fn map_file(file: &File, what: &dyn Fn() -> String) -> Result<MmapMut> {
    MmapMut::map_mut(file).wrap_err_with(|| format!("failed to memory-map {}", what()))
}

impl MmapStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open column file '{}'", path.display()))?;
        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat column file '{}'", path.display()))?
            .len();
        ensure!(
            len > 0 && len % PAGE_SIZE as u64 == 0,
            "column file '{}' has {} bytes, expected a non-zero multiple of {}",
            path.display(),
            len,
            PAGE_SIZE
        );
        // SAFETY: the file was opened read-write by this handle and column
        // files are private to one process.
        let mmap = unsafe { map_file(&file, &|| format!("'{}'", path.display()))? };
        Ok(Self {
            file,
            mmap,
            page_count: (len / PAGE_SIZE as u64) as u32,
        })
    }

    pub fn create<P: AsRef<Path>>(path: P, initial_pages: u32) -> Result<Self> {
        let path = path.as_ref();
        ensure!(initial_pages > 0, "a column file needs at least one page");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create column file '{}'", path.display()))?;
        file.set_len(bytes_for(initial_pages))
            .wrap_err_with(|| format!("failed to size '{}' to {} pages", path.display(), initial_pages))?;
        // SAFETY: freshly truncated file owned by this handle, sized to whole
        // pages above.
        let mmap = unsafe { map_file(&file, &|| format!("'{}'", path.display()))? };
        Ok(Self {
            file,
            mmap,
            page_count: initial_pages,
        })
    }

    fn byte_range(&self, page_no: u32) -> Result<Range<usize>> {
        ensure!(
            page_no < self.page_count,
            "page {} is past the end of a {}-page column file",
            page_no,
            self.page_count
        );
        let start = page_no as usize * PAGE_SIZE;
        Ok(start..start + PAGE_SIZE)
    }

    pub fn page(&self, page_no: u32) -> Result<&[u8]> {
        let range = self.byte_range(page_no)?;
        Ok(&self.mmap[range])
    }

    pub fn page_mut(&mut self, page_no: u32) -> Result<&mut [u8]> {
        let range = self.byte_range(page_no)?;
        Ok(&mut self.mmap[range])
    }

    /// Extends the file to `new_page_count` pages and remaps it. Shrinking is
    /// a no-op.
    pub fn grow(&mut self, new_page_count: u32) -> Result<()> {
        if new_page_count <= self.page_count {
            return Ok(());
        }
        self.mmap.flush().wrap_err("failed to flush column file before growing")?;
        self.file
            .set_len(bytes_for(new_page_count))
            .wrap_err_with(|| format!("failed to extend column file to {} pages", new_page_count))?;
        // SAFETY: `&mut self` rules out outstanding page borrows, and the old
        // map is replaced (and dropped) only after the file was extended.
        self.mmap = unsafe { map_file(&self.file, &|| "column file after grow".to_string())? };
        self.page_count = new_page_count;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync column file")
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn file_size(&self) -> u64 {
        bytes_for(self.page_count)
    }

    /// Hints the kernel to read ahead `[start_page, start_page + count)`.
    pub fn prefetch_pages(&self, start_page: u32, count: u32) {
        let end_page = start_page.saturating_add(count).min(self.page_count);
        if start_page >= end_page {
            return;
        }
        let offset = start_page as usize * PAGE_SIZE;
        let len = (end_page - start_page) as usize * PAGE_SIZE;
        #[cfg(unix)]
        {
            self.mmap
                .advise_range(memmap2::Advice::WillNeed, offset, len)
                .ok();
        }
        #[cfg(not(unix))]
        {
            let _ = (offset, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_fails_with_zero_pages() {
        let dir = tempdir().unwrap();
        let result = MmapStorage::create(dir.path().join("c.col"), 0);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one page"));
    }

    #[test]
    fn reopen_sees_synced_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.col");
        {
            let mut storage = MmapStorage::create(&path, 3).unwrap();
            storage.page_mut(2).unwrap()[PAGE_SIZE - 1] = 0xEF;
            storage.sync().unwrap();
        }
        let storage = MmapStorage::open(&path).unwrap();
        assert_eq!(storage.page_count(), 3);
        assert_eq!(storage.page(2).unwrap()[PAGE_SIZE - 1], 0xEF);
        assert!(storage.page(3).is_err());
    }

    #[test]
    fn grow_preserves_existing_data() {
        let dir = tempdir().unwrap();
        let mut storage = MmapStorage::create(dir.path().join("c.col"), 2).unwrap();
        storage.page_mut(1).unwrap()[0] = 0xCA;
        storage.grow(8).unwrap();
        storage.grow(4).unwrap();
        assert_eq!(storage.page_count(), 8);
        assert_eq!(storage.file_size(), 8 * PAGE_SIZE as u64);
        assert_eq!(storage.page(1).unwrap()[0], 0xCA);
        storage.prefetch_pages(6, 100);
    }

    #[test]
    fn open_rejects_partial_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.col");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();
        assert!(MmapStorage::open(&path).is_err());
    }
}
