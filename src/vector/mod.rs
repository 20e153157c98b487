//! # Vectors
//!
//! Columnar batches that flow in and out of column chunks.
//!
//! - `null_mask`: packed null bitmaps and the unaligned bit-copy primitives
//!   shared with null and boolean chunks
//! - `selection`: which positions of a vector participate in an operation
//! - `value_vector`: typed batch of values with nested children

pub mod null_mask;
mod selection;
mod value_vector;

pub use null_mask::NullMask;
pub use selection::SelectionVector;
pub use value_vector::{ListEntry, ValueVector};
