//! Typed errors callers are expected to tell apart. Both are boxed into an
//! `eyre::Report` and recovered with `Report::downcast_ref`.

use std::fmt;

use super::TxnId;

/// Two transactions wrote the same row and the later writer must abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflictError {
    pub vector_idx: u64,
    pub row_in_vector: u64,
    pub conflicting_version: TxnId,
}

impl fmt::Display for WriteConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write-write conflict on row {} of vector {} (held by version {})",
            self.row_in_vector, self.vector_idx, self.conflicting_version
        )
    }
}

impl std::error::Error for WriteConflictError {}

/// A bulk write violated a data constraint; the whole operation aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintError {
    pub offset: u64,
    pub reason: String,
}

impl ConstraintError {
    pub fn single_multiplicity(offset: u64) -> Self {
        Self {
            offset,
            reason: "row already holds a value and accepts only one".to_string(),
        }
    }
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint violated at offset {}: {}", self.offset, self.reason)
    }
}

impl std::error::Error for ConstraintError {}
