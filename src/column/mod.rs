//! # Column Storage
//!
//! On-disk side of a column chunk: compress-on-flush, paged reads through a
//! `ChunkState`, and the in-place vs out-of-place checkpoint decision. The
//! in-memory side lives in `crate::chunk`; versioning lives in
//! `crate::node_group`.
//!
//! ## Page Cursor Math
//!
//! Every codec reports how many values fit in one page. A value's location
//! in a segment is then
//!
//! ```text
//! page_idx         = start_page + offset / values_per_page
//! elem_pos_in_page = offset % values_per_page
//! ```
//!
//! A codec reporting `u64::MAX` (constant chunks) owns no pages; its values
//! are decoded straight from the metadata. ALP chunks keep their exception
//! records in pages after the data pages of the same range.

mod column_io;

pub use column_io::{CheckpointOutcome, ChunkState, Column};
