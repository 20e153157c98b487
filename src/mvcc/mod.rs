//! # Multi-Version Concurrency Control (MVCC)
//!
//! Snapshot isolation for the column store. Committed column data is never
//! rewritten by a transaction; instead updates, inserts and deletes are
//! recorded as versions next to the data and resolved at read time.
//!
//! ## Design Philosophy
//!
//! ### Many Readers, One Writer per Row
//!
//! - Readers never block on writers: they walk version chains under shared
//!   locks and pick the newest version visible to their snapshot.
//! - A second writer of the same row fails immediately with a
//!   `WriteConflictError` instead of waiting.
//! - Commit rewrites a transaction's versions from its id to its commit
//!   timestamp; rollback unlinks them.
//!
//! ### Versions Live Beside the Chunk
//!
//! ```text
//!   ColumnChunk (segments, on disk or in memory)
//!   +---------------------------------+
//!   | row 0 | row 1 | ... | row 2047  |   vector 0
//!   +---------------------------------+
//!        ^
//!        |  overlay at scan time
//!   UpdateInfo.heads[0] ──> [T9: rows 3]  ──> [ts 42: rows 3, 8] ──> [ts 17: rows 8]
//!
//!   ChunkedNodeGroup
//!   VersionInfo.vectors[0]: inserted Uniform(ts 5), deleted PerRow([.., ts 44, ..])
//! ```
//!
//! ## Version Numbers
//!
//! One `u64` space holds both kinds of versions:
//!
//! | Range                          | Meaning                          |
//! |--------------------------------|----------------------------------|
//! | `[0, TRANSACTION_ID_START)`    | commit timestamp (committed)     |
//! | `[TRANSACTION_ID_START, MAX)`  | transaction id (uncommitted)     |
//!
//! ## Visibility Rules
//!
//! A version V is visible to `ReadContext::Transactional { id, start_ts }` if:
//! 1. `V == id` (own uncommitted write), or
//! 2. V is a commit timestamp and `V <= start_ts`.
//!
//! `ReadContext::Direct` (checkpoint, recovery) sees every committed version
//! and nothing uncommitted.
//!
//! ## Transaction Lifecycle
//!
//! ```text
//! begin() ─────> Active ─────> commit() ─────> Committed
//!                  │                              │
//!                  │                              v
//!                  └──> rollback() ───> Aborted   └──> Versions visible
//! ```
//!
//! ## Key Structures
//!
//! - `TransactionManager`: timestamps, transaction ids, active slots, watermark
//! - `Transaction`: per-transaction handle; aborts on drop unless finished
//! - `ReadContext`: who is reading, passed by value
//! - `UpdateInfo` / `VectorUpdateInfo`: per-vector update chains of a column chunk
//! - `VersionInfo`: per-row insert and delete versions of a node group

mod errors;
pub mod transaction;
mod update_info;
mod version_info;

pub use errors::{ConstraintError, WriteConflictError};
pub use transaction::{
    is_committed_version, ReadContext, Transaction, TransactionManager, TxnId, TxnState,
    WriteCheckResult,
};
pub use update_info::{RowUpdates, UpdateInfo, VectorUpdateInfo};
pub use version_info::{VersionInfo, ABORTED_INSERT, NOT_DELETED};
