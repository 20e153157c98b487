//! # Page Range Allocation
//!
//! Column chunks occupy contiguous page runs, so the allocator hands out and
//! reclaims `PageRange`s rather than single pages. Freed ranges are kept in a
//! list sorted by start page and coalesced with their neighbours; allocation
//! is first-fit over that list before bumping the end of the file.
//!
//! ```text
//! pages:  0 1 2 3 4 5 6 7 8 9 ...
//!         [used ][free ][used][free .......]   <- next_page = 10
//!                 ^                  ^
//!           free_ranges[0]     free_ranges[1]
//! ```
//!
//! An out-of-place checkpoint allocates the replacement range first and only
//! then frees the old one, so a reader still scanning the old pages never sees
//! them reused within the same checkpoint.
//!
//! ## Thread Safety
//!
//! `PageAllocator` is not synchronized; `FileHandle` keeps it behind a
//! `parking_lot::Mutex`.

use eyre::{ensure, Result};

use super::page::PageRange;

#[derive(Debug, Default)]
pub struct PageAllocator {
    free_ranges: Vec<PageRange>,
    next_page: u32,
}

impl PageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator for a file whose first `next_page` pages are all in use.
    pub fn with_next_page(next_page: u32) -> Self {
        Self {
            free_ranges: Vec::new(),
            next_page,
        }
    }

    /// One past the highest page ever handed out.
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn free_page_count(&self) -> u64 {
        self.free_ranges.iter().map(|r| r.num_pages as u64).sum()
    }

    pub fn free_ranges(&self) -> &[PageRange] {
        &self.free_ranges
    }

    pub fn allocate(&mut self, num_pages: u32) -> Result<PageRange> {
        if num_pages == 0 {
            return Ok(PageRange::empty());
        }
        if let Some(idx) = self
            .free_ranges
            .iter()
            .position(|r| r.num_pages >= num_pages)
        {
            let range = &mut self.free_ranges[idx];
            let allocated = PageRange::new(range.start_page, num_pages);
            range.start_page += num_pages;
            range.num_pages -= num_pages;
            if range.num_pages == 0 {
                self.free_ranges.remove(idx);
            }
            return Ok(allocated);
        }
        let start = self.next_page;
        self.next_page = start
            .checked_add(num_pages)
            .ok_or_else(|| eyre::eyre!("page index overflow allocating {} pages", num_pages))?;
        Ok(PageRange::new(start, num_pages))
    }

    pub fn free(&mut self, range: PageRange) -> Result<()> {
        if range.num_pages == 0 {
            return Ok(());
        }
        ensure!(
            range.end_page() <= self.next_page,
            "freeing pages [{}, {}) beyond allocated end {}",
            range.start_page,
            range.end_page(),
            self.next_page
        );
        let idx = self
            .free_ranges
            .partition_point(|r| r.start_page < range.start_page);
        if let Some(prev) = idx.checked_sub(1).map(|i| self.free_ranges[i]) {
            ensure!(
                prev.end_page() <= range.start_page,
                "double free of page {}",
                range.start_page
            );
        }
        if let Some(next) = self.free_ranges.get(idx) {
            ensure!(
                range.end_page() <= next.start_page,
                "double free of page {}",
                next.start_page
            );
        }
        self.free_ranges.insert(idx, range);

        // Coalesce with the following range, then with the preceding one.
        if idx + 1 < self.free_ranges.len()
            && self.free_ranges[idx].end_page() == self.free_ranges[idx + 1].start_page
        {
            self.free_ranges[idx].num_pages += self.free_ranges[idx + 1].num_pages;
            self.free_ranges.remove(idx + 1);
        }
        if idx > 0 && self.free_ranges[idx - 1].end_page() == self.free_ranges[idx].start_page {
            self.free_ranges[idx - 1].num_pages += self.free_ranges[idx].num_pages;
            self.free_ranges.remove(idx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_bumps_when_nothing_is_free() {
        let mut alloc = PageAllocator::new();
        assert_eq!(alloc.allocate(3).unwrap(), PageRange::new(0, 3));
        assert_eq!(alloc.allocate(2).unwrap(), PageRange::new(3, 2));
        assert_eq!(alloc.next_page(), 5);
        assert_eq!(alloc.allocate(0).unwrap().num_pages, 0);
    }

    #[test]
    fn freed_ranges_are_reused_first_fit() {
        let mut alloc = PageAllocator::with_next_page(10);
        alloc.free(PageRange::new(2, 1)).unwrap();
        alloc.free(PageRange::new(5, 4)).unwrap();
        assert_eq!(alloc.allocate(3).unwrap(), PageRange::new(5, 3));
        assert_eq!(alloc.allocate(1).unwrap(), PageRange::new(2, 1));
        assert_eq!(alloc.free_ranges(), &[PageRange::new(8, 1)]);
    }

    #[test]
    fn adjacent_frees_coalesce() {
        let mut alloc = PageAllocator::with_next_page(10);
        alloc.free(PageRange::new(0, 2)).unwrap();
        alloc.free(PageRange::new(4, 2)).unwrap();
        alloc.free(PageRange::new(2, 2)).unwrap();
        assert_eq!(alloc.free_ranges(), &[PageRange::new(0, 6)]);
        assert_eq!(alloc.free_page_count(), 6);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut alloc = PageAllocator::with_next_page(10);
        alloc.free(PageRange::new(3, 3)).unwrap();
        assert!(alloc.free(PageRange::new(4, 1)).is_err());
        assert!(alloc.free(PageRange::new(1, 3)).is_err());
        assert!(alloc.free(PageRange::new(9, 2)).is_err());
    }
}
