//! # Storage Configuration Constants
//!
//! This module centralizes the compile-time constants of the columnar storage
//! layer. Constants that depend on each other are co-located and their
//! relationships are enforced with compile-time assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> integer bitpacking packs 32 values per group; a page always
//!       │   holds a whole number of groups at any bit width <= 64
//!       │
//!       └─> ALP exception pages hold PAGE_SIZE / exception_size records
//!
//! DEFAULT_VECTOR_CAPACITY (2048)
//!       │
//!       ├─> must be a multiple of 64 (null mask words never straddle vectors)
//!       │
//!       ├─> VectorUpdateInfo holds at most this many rows per version
//!       │
//!       └─> DEFAULT_NODE_GROUP_SIZE must be a multiple of it
//!
//! TRANSACTION_ID_START (2^63)
//!       │
//!       └─> every version below it is a commit timestamp, every version at
//!           or above it is an uncommitted transaction id
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `DEFAULT_VECTOR_CAPACITY % 64 == 0`
//! 2. `DEFAULT_NODE_GROUP_SIZE % DEFAULT_VECTOR_CAPACITY == 0`
//! 3. `PAGE_SIZE % 8 == 0` (bool pages are copied word by word)
//!
//! ## Usage
//!
//! ```ignore
//! use turdb_colstore::config::{PAGE_SIZE, DEFAULT_VECTOR_CAPACITY};
//! ```

// ============================================================================
// PAGE LAYOUT
// ============================================================================

/// Size of every on-disk page in bytes.
/// Column data pages carry no header: a chunk is a run of contiguous pages
/// whose only descriptor is its `ColumnChunkMetadata`.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for "no page assigned yet".
pub const INVALID_PAGE_IDX: u32 = u32::MAX;

const _: () = assert!(PAGE_SIZE % 8 == 0, "PAGE_SIZE must be word aligned");

// ============================================================================
// VECTOR AND NODE GROUP GEOMETRY
// ============================================================================

/// Number of rows in one value vector and in one MVCC version batch.
pub const DEFAULT_VECTOR_CAPACITY_LOG2: u32 = 11;
pub const DEFAULT_VECTOR_CAPACITY: u64 = 1 << DEFAULT_VECTOR_CAPACITY_LOG2;

/// Default number of rows in a node group (row group).
pub const DEFAULT_NODE_GROUP_SIZE_LOG2: u32 = 17;
pub const DEFAULT_NODE_GROUP_SIZE: u64 = 1 << DEFAULT_NODE_GROUP_SIZE_LOG2;

/// Smallest node group the runtime config accepts (one vector).
pub const MIN_NODE_GROUP_SIZE_LOG2: u32 = DEFAULT_VECTOR_CAPACITY_LOG2;

/// Largest node group the runtime config accepts.
pub const MAX_NODE_GROUP_SIZE_LOG2: u32 = 20;

const _: () = assert!(
    DEFAULT_VECTOR_CAPACITY % 64 == 0,
    "vector capacity must be a multiple of the null mask word size"
);

const _: () = assert!(
    DEFAULT_NODE_GROUP_SIZE % DEFAULT_VECTOR_CAPACITY == 0,
    "node group size must be a whole number of vectors"
);

// ============================================================================
// COMPRESSION
// ============================================================================

/// Values per integer bitpacking group. Pages hold whole groups only.
pub const BITPACKING_GROUP_SIZE: u64 = 32;

/// ALP is abandoned when more than this fraction of a chunk are exceptions.
pub const ALP_MAX_EXCEPTION_RATIO: f64 = 0.05;

/// Number of values sampled when searching for the ALP exponent/factor.
pub const ALP_SAMPLE_SIZE: usize = 256;

/// Exponent/factor pairs from the sample that are re-measured on the full
/// chunk.
pub const ALP_MAX_CANDIDATES: usize = 5;

/// Exception slots reserved on flush are `count * 3 / 2` (rounded up to a
/// page) so a later in-place update can add a few more.
pub const ALP_EXCEPTION_GROWTH_NUMERATOR: u64 = 3;
pub const ALP_EXCEPTION_GROWTH_DENOMINATOR: u64 = 2;

// ============================================================================
// CHUNK GROWTH
// ============================================================================

/// Growth factor applied when an append overflows a chunk's capacity.
pub const CHUNK_RESIZE_RATIO: f64 = 1.5;

/// Initial capacity for child data chunks of list columns.
pub const LIST_DATA_INITIAL_CAPACITY: u64 = 0;

/// In-memory size above which a rewritten chunk is flushed as several
/// on-disk segments instead of one.
pub const MAX_SEGMENT_SIZE: u64 = 64 * PAGE_SIZE as u64;

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// First transaction id. Versions `>= TRANSACTION_ID_START` are uncommitted.
pub const TRANSACTION_ID_START: u64 = 1 << 63;

/// Maximum number of concurrent transactions tracked for watermarks.
pub const MAX_CONCURRENT_TXNS: usize = 64;
