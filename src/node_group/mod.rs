//! # Node Groups
//!
//! A node group is a fixed-capacity batch of rows stored together across all
//! columns of a table. It is the unit of appending, versioning and
//! checkpointing.
//!
//! ```text
//! ChunkedNodeGroup (start_row, capacity)
//! ├── state: RwLock { num_rows, VersionInfo }     insert/delete versions
//! ├── ColumnChunk "id"
//! │   ├── segments: [disk seg 0][disk seg 1][memory tail]
//! │   └── UpdateInfo                              per-vector update chains
//! └── ColumnChunk "name"
//!     ├── segments: [disk seg 0][memory tail]
//!     └── UpdateInfo
//! ```
//!
//! ## Row Visibility
//!
//! A row is visible to a reader when its insert version is visible and its
//! delete version is not. Column values are the segment value overlaid with
//! the newest update visible to the reader.
//!
//! ## Lifecycle
//!
//! | Step          | Effect                                                  |
//! |---------------|---------------------------------------------------------|
//! | `append`      | rows go to each column's in-memory tail                 |
//! | `commit`      | insert/delete/update versions get the commit timestamp  |
//! | `rollback`    | versions are undone; trailing aborted rows are dropped  |
//! | `flush_as_new`| a copy with every segment on disk                       |
//! | `checkpoint`  | committed updates are folded into the segments          |
//! | `serialize`   | writes the segment descriptors and committed deletions  |
//!
//! Deleted rows are never removed physically here; they stay masked by the
//! group's versions and a reopened group still hides them.
//!
//! ## Locking
//!
//! Lock order is group state, then column segments, then update chains.
//! Scans hold the group state shared; appends and deletes hold it
//! exclusively. Checkpoint expects to be the only writer of the group.

mod chunked_node_group;
mod column_chunk;

pub use chunked_node_group::ChunkedNodeGroup;
pub use column_chunk::{CheckpointSummary, ColumnChunk};
