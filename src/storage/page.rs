//! # Page Ranges and Cursors
//!
//! A flushed chunk segment is a contiguous `PageRange`: its data pages first,
//! then (for ALP) its exception pages. Locating a value is pure arithmetic
//! over the codec's values-per-page figure:
//!
//! ```text
//! values_per_page = metadata.num_values_per_page(physical)
//!
//! offset in chunk ──┬──> page_idx          = start_page + offset / values_per_page
//!                   └──> elem_pos_in_page  = offset % values_per_page
//! ```
//!
//! A codec whose values-per-page is `u64::MAX` (CONSTANT) owns no pages; its
//! cursor always sits at `(start_page, offset)` and is never dereferenced.
//!
//! Pages carry no header or checksum: the only persisted descriptor is the
//! segment's `ColumnChunkMetadata`.

use crate::config::INVALID_PAGE_IDX;
use crate::encoding::{Deserializer, Serializer};
use eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start_page: u32,
    pub num_pages: u32,
}

impl PageRange {
    pub fn new(start_page: u32, num_pages: u32) -> Self {
        Self {
            start_page,
            num_pages,
        }
    }

    pub fn empty() -> Self {
        Self {
            start_page: INVALID_PAGE_IDX,
            num_pages: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_pages == 0
    }

    pub fn end_page(&self) -> u32 {
        self.start_page.saturating_add(self.num_pages)
    }

    /// Sub-range starting `skip` pages in.
    pub fn suffix(&self, skip: u32) -> PageRange {
        if skip >= self.num_pages {
            return PageRange::empty();
        }
        PageRange::new(self.start_page + skip, self.num_pages - skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        let start = if self.is_empty() { 0 } else { self.start_page };
        start..start + self.num_pages
    }

    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_u32(self.start_page);
        ser.write_u32(self.num_pages);
    }

    pub fn deserialize(de: &mut Deserializer<'_>) -> Result<Self> {
        Ok(Self::new(de.read_u32()?, de.read_u32()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page_idx: u32,
    pub elem_pos_in_page: u64,
}

impl PageCursor {
    pub fn new(page_idx: u32, elem_pos_in_page: u64) -> Self {
        Self {
            page_idx,
            elem_pos_in_page,
        }
    }

    /// Cursor for the value at `offset` in a segment starting at `start_page`.
    pub fn for_offset(start_page: u32, offset: u64, values_per_page: u64) -> Self {
        if values_per_page == u64::MAX || values_per_page == 0 {
            return Self::new(start_page, offset);
        }
        Self::new(
            start_page + (offset / values_per_page) as u32,
            offset % values_per_page,
        )
    }

    pub fn next_page(&mut self) {
        self.page_idx += 1;
        self.elem_pos_in_page = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_splits_offset_into_page_and_slot() {
        let cursor = PageCursor::for_offset(10, 2500, 1024);
        assert_eq!(cursor, PageCursor::new(12, 452));

        let mut cursor = PageCursor::for_offset(10, 1023, 1024);
        assert_eq!(cursor.page_idx, 10);
        cursor.next_page();
        assert_eq!(cursor, PageCursor::new(11, 0));
    }

    #[test]
    fn constant_cursor_never_moves() {
        let cursor = PageCursor::for_offset(7, 1_000_000, u64::MAX);
        assert_eq!(cursor.page_idx, 7);
    }

    #[test]
    fn range_iteration_and_suffix() {
        let range = PageRange::new(4, 3);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(range.suffix(2), PageRange::new(6, 1));
        assert!(range.suffix(3).is_empty());
        assert_eq!(PageRange::empty().iter().count(), 0);
    }
}
