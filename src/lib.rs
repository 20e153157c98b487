//! # TurDB Column Store
//!
//! The columnar, versioned storage core of an embedded database: typed column
//! data in fixed-capacity chunks, type-specific compression, paged on-disk
//! segments, and MVCC updates layered on top without rewriting committed
//! data unless a checkpoint has to.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use turdb_colstore::column::Column;
//! use turdb_colstore::config::StorageConfig;
//! use turdb_colstore::mvcc::{ReadContext, TransactionManager};
//! use turdb_colstore::node_group::ChunkedNodeGroup;
//! use turdb_colstore::storage::FileHandle;
//! use turdb_colstore::types::{LogicalType, Value};
//! use turdb_colstore::vector::ValueVector;
//!
//! let file = Arc::new(FileHandle::create("./people.col")?);
//! let config = StorageConfig::default();
//! let columns = vec![Arc::new(Column::new("age", LogicalType::Int64, file, config))];
//! let group = ChunkedNodeGroup::new(&columns, 0, config.node_group_size(), true);
//!
//! let manager = TransactionManager::new();
//! let txn = manager.begin_txn()?;
//! let ages = ValueVector::from_values(LogicalType::Int64, &[Value::Int64(31)])?;
//! group.append(txn.read_context(), &[ages], 0, 1)?;
//! let id = txn.id();
//! txn.commit_with_finalize(|ts| {
//!     group.commit(id, ts);
//!     Ok(())
//! })?;
//! group.checkpoint()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ node_group: ChunkedNodeGroup, ColumnChunk │
//! ├─────────────────────┬────────────────────┤
//! │ mvcc: UpdateInfo,   │ column: flush,     │
//! │ VersionInfo, txns   │ scan, checkpoint   │
//! ├─────────────────────┴────────────────────┤
//! │ chunk: ColumnChunkData, Null/Dict/List    │
//! ├──────────────────────────────────────────┤
//! │ compression: constant, bitpacking, ALP    │
//! ├──────────────────────────────────────────┤
//! │ storage: FileHandle, page allocator,      │
//! │          mmap / memory backends           │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: constants and the runtime `StorageConfig`
//! - [`types`]: logical/physical types and owned values
//! - [`vector`]: null masks, selection vectors, value vectors
//! - [`encoding`]: descriptor serialization
//! - [`compression`]: codecs and compression metadata
//! - [`storage`]: paged files and page allocation
//! - [`chunk`]: in-memory column chunks
//! - [`column`]: on-disk column I/O
//! - [`mvcc`]: transactions, update chains, row versions
//! - [`node_group`]: row groups tying it all together

#[macro_use]
mod macros;

pub mod chunk;
pub mod column;
pub mod compression;
pub mod config;
pub mod encoding;
pub mod mvcc;
pub mod node_group;
pub mod storage;
pub mod types;
pub mod vector;

pub use chunk::ColumnChunkData;
pub use column::Column;
pub use config::StorageConfig;
pub use mvcc::{ReadContext, Transaction, TransactionManager};
pub use node_group::ChunkedNodeGroup;
pub use types::{LogicalType, PhysicalType, Value};
