//! Heap-backed page storage for temporary columns and tests.
//!
//! Pages are one contiguous `Vec<u8>`; growing reallocates, which is safe for
//! the same reason `MmapStorage::grow` is: it takes `&mut self`.

use eyre::{ensure, Result};

use crate::config::PAGE_SIZE;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
    page_count: u32,
}

impl MemoryStorage {
    pub fn new(initial_page_count: u32) -> Self {
        Self {
            bytes: vec![0u8; initial_page_count as usize * PAGE_SIZE],
            page_count: initial_page_count,
        }
    }

    pub fn page(&self, page_no: u32) -> Result<&[u8]> {
        ensure!(
            page_no < self.page_count,
            "page {} out of bounds (page_count={})",
            page_no,
            self.page_count
        );
        let offset = page_no as usize * PAGE_SIZE;
        Ok(&self.bytes[offset..offset + PAGE_SIZE])
    }

    pub fn page_mut(&mut self, page_no: u32) -> Result<&mut [u8]> {
        ensure!(
            page_no < self.page_count,
            "page {} out of bounds (page_count={})",
            page_no,
            self.page_count
        );
        let offset = page_no as usize * PAGE_SIZE;
        Ok(&mut self.bytes[offset..offset + PAGE_SIZE])
    }

    pub fn grow(&mut self, new_page_count: u32) {
        if new_page_count <= self.page_count {
            return;
        }
        self.bytes.resize(new_page_count as usize * PAGE_SIZE, 0);
        self.page_count = new_page_count;
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grown_pages_start_zeroed() {
        let mut storage = MemoryStorage::new(1);
        storage.page_mut(0).unwrap().fill(0xFF);
        storage.grow(3);
        assert_eq!(storage.page_count(), 3);
        assert!(storage.page(2).unwrap().iter().all(|b| *b == 0));
        assert!(storage.page(0).unwrap().iter().all(|b| *b == 0xFF));
        assert!(storage.page_mut(3).is_err());
    }
}
