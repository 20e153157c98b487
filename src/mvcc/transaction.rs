//! # Transactions and Read Contexts
//!
//! Versions stored in update chains and insert/delete tracking are plain
//! `u64`s drawn from two disjoint ranges:
//!
//! ```text
//! 0 ........................ 2^63 ....................... u64::MAX
//! │  commit timestamps        │  uncommitted transaction ids       │
//! └───────────────────────────┴────────────────────────────────────┘
//!                      TRANSACTION_ID_START
//! ```
//!
//! A transaction writes versions stamped with its id; committing rewrites
//! them to the commit timestamp. Because ids are always larger than any
//! timestamp, an uncommitted version can never look committed.
//!
//! ## Timestamps
//!
//! `global_ts` is the timestamp of the last commit (1 at startup, the
//! bootstrap "everything loaded" point). A transaction snapshots it as its
//! `start_ts` and sees every version committed at or before it.
//!
//! Commits are serialized by `commit_lock`: the commit timestamp is
//! `global_ts + 1`, the caller's finalizer stamps versions with it, and only
//! then is `global_ts` advanced. A transaction that begins while a commit is
//! stamping still sees the previous timestamp and therefore none of the
//! half-stamped versions.
//!
//! ## Slot Array
//!
//! Active transactions occupy one of `MAX_CONCURRENT_TXNS` slots holding their
//! start timestamp (0 = free). The global watermark is the minimum over the
//! occupied slots and `global_ts`; every version committed at or before it is
//! visible to every live reader, which is what `UpdateInfo::vacuum` relies on.
//!
//! ```text
//! TransactionManager {
//!     global_ts:    AtomicU64,
//!     next_txn_id:  AtomicU64,
//!     active_slots: [AtomicU64; 64],
//!     slot_lock:    Mutex<()>,
//!     commit_lock:  Mutex<()>,
//! }
//! ```
//!
//! ## Safety Invariants
//!
//! 1. A transaction id is never reused
//! 2. Slots are released on commit/rollback (enforced via Drop)
//! 3. Watermark is always <= global_ts
//! 4. Only one transaction can hold a given slot

use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{bail, Result};
use parking_lot::Mutex;
use tracing::trace;

use crate::config::{MAX_CONCURRENT_TXNS, TRANSACTION_ID_START};

pub type TxnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    #[default]
    Active,
    Committed,
    Aborted,
}

#[inline]
pub fn is_committed_version(version: TxnId) -> bool {
    version < TRANSACTION_ID_START
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCheckResult {
    CanWrite,
    LockedByOther,
    ConcurrentModification,
}

/// Who is reading: a transaction with its snapshot, or an internal reader
/// (checkpoint, recovery) that sees every committed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadContext {
    Transactional { id: TxnId, start_ts: TxnId },
    Direct,
}

impl ReadContext {
    pub fn txn_id(&self) -> Option<TxnId> {
        match *self {
            ReadContext::Transactional { id, .. } => Some(id),
            ReadContext::Direct => None,
        }
    }

    #[inline]
    pub fn is_visible(&self, version: TxnId) -> bool {
        match *self {
            ReadContext::Transactional { id, start_ts } => {
                version == id || (is_committed_version(version) && version <= start_ts)
            }
            ReadContext::Direct => is_committed_version(version),
        }
    }

    /// Whether this context may overwrite a row last written at `version`.
    pub fn can_write(&self, version: TxnId) -> WriteCheckResult {
        match *self {
            ReadContext::Transactional { id, start_ts } => {
                if version == id {
                    WriteCheckResult::CanWrite
                } else if !is_committed_version(version) {
                    WriteCheckResult::LockedByOther
                } else if version > start_ts {
                    WriteCheckResult::ConcurrentModification
                } else {
                    WriteCheckResult::CanWrite
                }
            }
            ReadContext::Direct => {
                if is_committed_version(version) {
                    WriteCheckResult::CanWrite
                } else {
                    WriteCheckResult::LockedByOther
                }
            }
        }
    }
}

pub struct TransactionManager {
    pub(crate) global_ts: AtomicU64,
    pub(crate) next_txn_id: AtomicU64,
    pub(crate) active_slots: [AtomicU64; MAX_CONCURRENT_TXNS],
    pub(crate) slot_lock: Mutex<()>,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    #[allow(clippy::declare_interior_mutable_const)]
    pub fn new() -> Self {
        const INIT: AtomicU64 = AtomicU64::new(0);
        Self {
            global_ts: AtomicU64::new(1),
            next_txn_id: AtomicU64::new(TRANSACTION_ID_START),
            #[allow(clippy::borrow_interior_mutable_const)]
            active_slots: [INIT; MAX_CONCURRENT_TXNS],
            slot_lock: Mutex::new(()),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn begin_txn(&self) -> Result<Transaction<'_>> {
        let _guard = self.slot_lock.lock();
        let start_ts = self.global_ts.load(Ordering::SeqCst);
        for (idx, slot) in self.active_slots.iter().enumerate() {
            if slot.load(Ordering::Relaxed) == 0 {
                slot.store(start_ts, Ordering::SeqCst);
                let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
                trace!(txn = id, start_ts, slot = idx, "began transaction");
                return Ok(Transaction::new(self, id, start_ts, idx));
            }
        }
        bail!(
            "too many concurrent transactions (max {})",
            MAX_CONCURRENT_TXNS
        )
    }

    fn commit_txn<F>(&self, slot_idx: usize, finalize: F) -> Result<TxnId>
    where
        F: FnOnce(TxnId) -> Result<()>,
    {
        let _guard = self.commit_lock.lock();
        let commit_ts = self.global_ts.load(Ordering::SeqCst) + 1;
        let result = finalize(commit_ts);
        if result.is_ok() {
            self.global_ts.store(commit_ts, Ordering::SeqCst);
        }
        self.active_slots[slot_idx].store(0, Ordering::SeqCst);
        result.map(|_| commit_ts)
    }

    fn abort_txn(&self, slot_idx: usize) {
        self.active_slots[slot_idx].store(0, Ordering::SeqCst);
    }

    /// Timestamp of the last commit.
    pub fn last_commit_ts(&self) -> TxnId {
        self.global_ts.load(Ordering::SeqCst)
    }

    pub fn global_watermark(&self) -> TxnId {
        let mut min_ts = self.global_ts.load(Ordering::Relaxed);
        for slot in &self.active_slots {
            let ts = slot.load(Ordering::Relaxed);
            if ts != 0 && ts < min_ts {
                min_ts = ts;
            }
        }
        min_ts
    }

    pub fn num_active(&self) -> usize {
        self.active_slots
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != 0)
            .count()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Transaction<'a> {
    id: TxnId,
    start_ts: TxnId,
    slot_idx: usize,
    state: TxnState,
    manager: &'a TransactionManager,
    finished: bool,
}

impl<'a> Transaction<'a> {
    fn new(manager: &'a TransactionManager, id: TxnId, start_ts: TxnId, slot_idx: usize) -> Self {
        Self {
            id,
            start_ts,
            slot_idx,
            state: TxnState::Active,
            manager,
            finished: false,
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn start_ts(&self) -> TxnId {
        self.start_ts
    }

    pub fn slot_idx(&self) -> usize {
        self.slot_idx
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn read_context(&self) -> ReadContext {
        ReadContext::Transactional {
            id: self.id,
            start_ts: self.start_ts,
        }
    }

    /// Commits with nothing to stamp.
    pub fn commit(self) -> Result<TxnId> {
        self.commit_with_finalize(|_| Ok(()))
    }

    /// Commits, running `finalize(commit_ts)` to rewrite this transaction's
    /// versions before the commit becomes visible to new readers.
    pub fn commit_with_finalize<F>(mut self, finalize: F) -> Result<TxnId>
    where
        F: FnOnce(TxnId) -> Result<()>,
    {
        self.finished = true;
        let result = self.manager.commit_txn(self.slot_idx, finalize);
        self.state = if result.is_ok() {
            TxnState::Committed
        } else {
            TxnState::Aborted
        };
        if let Ok(commit_ts) = result {
            trace!(txn = self.id, commit_ts, "committed transaction");
        }
        result
    }

    pub fn rollback(self) {
        self.rollback_with_undo(|| Ok(())).ok();
    }

    pub fn rollback_with_undo<F>(mut self, undo: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let result = undo();
        self.state = TxnState::Aborted;
        self.finished = true;
        self.manager.abort_txn(self.slot_idx);
        trace!(txn = self.id, "rolled back transaction");
        result
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.abort_txn(self.slot_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_timestamps_are_disjoint() {
        let mgr = TransactionManager::new();
        let txn = mgr.begin_txn().unwrap();
        assert_eq!(txn.id(), TRANSACTION_ID_START);
        assert_eq!(txn.start_ts(), 1);
        assert!(!is_committed_version(txn.id()));
        let commit_ts = txn.commit().unwrap();
        assert_eq!(commit_ts, 2);
        assert_eq!(mgr.last_commit_ts(), 2);
    }

    #[test]
    fn visibility_follows_snapshot() {
        let ctx = ReadContext::Transactional {
            id: TRANSACTION_ID_START + 3,
            start_ts: 10,
        };
        assert!(ctx.is_visible(10));
        assert!(!ctx.is_visible(11));
        assert!(ctx.is_visible(TRANSACTION_ID_START + 3));
        assert!(!ctx.is_visible(TRANSACTION_ID_START + 4));
        assert!(ReadContext::Direct.is_visible(11));
        assert!(!ReadContext::Direct.is_visible(TRANSACTION_ID_START));
    }

    #[test]
    fn write_checks() {
        let ctx = ReadContext::Transactional {
            id: TRANSACTION_ID_START + 1,
            start_ts: 5,
        };
        assert_eq!(ctx.can_write(4), WriteCheckResult::CanWrite);
        assert_eq!(ctx.can_write(6), WriteCheckResult::ConcurrentModification);
        assert_eq!(ctx.can_write(TRANSACTION_ID_START + 2), WriteCheckResult::LockedByOther);
        assert_eq!(ctx.can_write(TRANSACTION_ID_START + 1), WriteCheckResult::CanWrite);
    }

    #[test]
    fn watermark_tracks_oldest_reader() {
        let mgr = TransactionManager::new();
        let old = mgr.begin_txn().unwrap();
        let writer = mgr.begin_txn().unwrap();
        writer.commit().unwrap();
        let writer = mgr.begin_txn().unwrap();
        writer.commit().unwrap();
        assert_eq!(mgr.last_commit_ts(), 3);
        assert_eq!(mgr.global_watermark(), 1);
        drop(old);
        assert_eq!(mgr.global_watermark(), 3);
        assert_eq!(mgr.num_active(), 0);
    }

    #[test]
    fn failed_finalize_does_not_publish() {
        let mgr = TransactionManager::new();
        let txn = mgr.begin_txn().unwrap();
        let result = txn.commit_with_finalize(|_| eyre::bail!("stamp failed"));
        assert!(result.is_err());
        assert_eq!(mgr.last_commit_ts(), 1);
        assert_eq!(mgr.num_active(), 0);
    }

    #[test]
    fn slots_are_bounded() {
        let mgr = TransactionManager::new();
        let txns: Vec<_> = (0..MAX_CONCURRENT_TXNS)
            .map(|_| mgr.begin_txn().unwrap())
            .collect();
        assert!(mgr.begin_txn().is_err());
        drop(txns);
        assert!(mgr.begin_txn().is_ok());
    }
}
