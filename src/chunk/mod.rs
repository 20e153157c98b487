//! # Column Chunks
//!
//! In-memory columnar data for one column over a contiguous row range, plus
//! the descriptors that remain once a chunk is flushed to pages.
//!
//! ## Chunk Tree
//!
//! Every chunk is a `ColumnChunkData`; nested and variable-length types are
//! trees of them:
//!
//! ```text
//! INT64          values ─ nulls
//! STRING         indices ─ nulls ─ dictionary { string_data: UINT8, offsets: UINT64 }
//! LIST<T>        (no values) ─ nulls ─ { offsets: UINT64, sizes: UINT32, data: T }
//! STRUCT{a,b}    (no values) ─ nulls ─ [ a, b ]
//! ```
//!
//! Child chunks that can never hold nulls (offsets, sizes, dictionary bytes,
//! the null chunk itself) are created with `ColumnChunkData::without_nulls`.
//!
//! ## Residency
//!
//! | State      | Buffer | `capacity` | `metadata`                 |
//! |------------|--------|------------|----------------------------|
//! | `InMemory` | owned  | >= values  | default until flushed      |
//! | `OnDisk`   | none   | 0          | page range + codec + stats |
//!
//! `Column::flush` turns an in-memory chunk into an on-disk one; scanning an
//! on-disk chunk goes through `Column` as well.
//!
//! ## Module Organization
//!
//! - `column_chunk_data`: `ColumnChunkData`, `ChunkKind`, `ChunkBuffer`
//! - `null_chunk`: `NullChunkData`
//! - `dictionary`: `DictionaryChunk` for STRING
//! - `list_chunk`: `ListChunk` for LIST and ARRAY
//! - `metadata`: `ColumnChunkMetadata`, `ResidencyState`

mod column_chunk_data;
mod dictionary;
mod list_chunk;
mod metadata;
mod null_chunk;

pub use column_chunk_data::{ChunkBuffer, ChunkKind, ColumnChunkData, RelMultiplicity};
pub use dictionary::DictionaryChunk;
pub use list_chunk::ListChunk;
pub use metadata::{ColumnChunkMetadata, ResidencyState};
pub use null_chunk::NullChunkData;
