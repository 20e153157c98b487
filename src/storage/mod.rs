//! # Storage Module
//!
//! The page layer under the column store. Columns never see files or mmaps;
//! they see a `FileHandle` that hands out contiguous page ranges and runs
//! closures over page bytes.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Column::flush / scan / checkpoint
//!              │
//!              ▼
//!        FileHandle ──────────────► PageAllocator (free ranges, first fit)
//!              │
//!              ▼
//!        AnyStorage (StorageDriver)
//!          ├── MmapStorage    memory-mapped column file
//!          └── MemoryStorage  heap pages (tests, temporary columns)
//! ```
//!
//! ## Page Format
//!
//! Pages are `PAGE_SIZE` bytes and carry no header. A flushed chunk segment is
//! a `PageRange` whose layout is entirely described by the segment's
//! `ColumnChunkMetadata`:
//!
//! ```text
//! start_page                                   start_page + num_pages
//! │ data page 0 │ data page 1 │ ... │ exception pages (ALP only) │
//! ```
//!
//! ## Safety Model
//!
//! Growing a mapping invalidates slices into it. Storage methods that hand out
//! slices borrow `&self`, `grow` borrows `&mut self`, and `FileHandle` keeps
//! the backend behind an `RwLock`, so no page slice can be alive across a
//! remap.
//!
//! ## Module Organization
//!
//! - `driver`: `StorageDriver` trait and the `AnyStorage` wrapper
//! - `mmap`: memory-mapped file backend
//! - `memory`: heap backend
//! - `freelist`: `PageAllocator`
//! - `page`: `PageRange` and `PageCursor` arithmetic
//! - `file_handle`: `FileHandle`

mod driver;
mod file_handle;
mod freelist;
mod memory;
mod mmap;
mod page;

pub use driver::{AnyStorage, StorageDriver, StorageKind};
pub use file_handle::FileHandle;
pub use freelist::PageAllocator;
pub use memory::MemoryStorage;
pub use mmap::MmapStorage;
pub use page::{PageCursor, PageRange};
