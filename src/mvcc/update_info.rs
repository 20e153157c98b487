//! # Update Chains
//!
//! `UpdateInfo` records uncommitted and committed updates of one column chunk
//! without touching the chunk itself. Rows are grouped by 2048-row vector;
//! each vector with updates has a chain of `VectorUpdateInfo` versions,
//! newest first:
//!
//! ```text
//! heads[vector]
//!     │
//!     ▼
//! ┌──────────────┐ prev ┌──────────────┐ prev ┌──────────────┐
//! │ version: T9  │─────>│ version: 42  │─────>│ version: 17  │
//! │ rows: [3]    │<─────│ rows: [3, 8] │<─────│ rows: [8]    │
//! │ values: [..] │ next │ values: [..] │ next │ values: [..] │
//! └──────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! Nodes live in an arena (`Vec` slots plus a free list) and link by index,
//! so unlinking on rollback or vacuum never fights the borrow checker and a
//! chain walk is a sequence of O(1) index hops.
//!
//! ## Reading
//!
//! Walking from the head, the first node visible to the reader that holds the
//! row supplies the value. No node holding it means the chunk's stored value
//! stands.
//!
//! ## Writing
//!
//! Before a write, every node holding the row is checked with
//! `ReadContext::can_write`; an uncommitted node of another transaction or a
//! node committed after the writer's snapshot is a write-write conflict.
//! A row the writer already updated is overwritten in its own node; otherwise
//! the row is added to the head when the head belongs to the writer, or a new
//! head is pushed.
//!
//! ## Locking
//!
//! ```text
//! chains: RwLock<Chains>        read: scans, commit stamping, in-place writes
//!                               upgradable read → write: new node, unlink
//! node:   RwLock<VectorUpdateInfo>   read while walking, write to modify
//! ```
//!
//! Writers take the upgradable lock so at most one structural change can be
//! pending while readers keep walking the chains.

use eyre::{bail, eyre, Result};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::chunk::ColumnChunkData;
use crate::config::{DEFAULT_VECTOR_CAPACITY, DEFAULT_VECTOR_CAPACITY_LOG2};
use crate::types::LogicalType;
use crate::vector::ValueVector;

use super::transaction::{is_committed_version, ReadContext, TxnId, WriteCheckResult};
use super::WriteConflictError;

/// One version of updates to one vector.
#[derive(Debug)]
pub struct VectorUpdateInfo {
    version: TxnId,
    rows: SmallVec<[u16; 32]>,
    values: ColumnChunkData,
    prev: Option<u32>,
    next: Option<u32>,
}

impl VectorUpdateInfo {
    fn new(version: TxnId, data_type: &LogicalType, enable_compression: bool) -> Self {
        Self {
            version,
            rows: SmallVec::new(),
            values: ColumnChunkData::new(data_type.clone(), 1, enable_compression),
            prev: None,
            next: None,
        }
    }

    pub fn version(&self) -> TxnId {
        self.version
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Rows of the vector this version wrote, in write order.
    pub fn rows(&self) -> &[u16] {
        &self.rows
    }

    /// New values; slot `i` belongs to `rows()[i]`.
    pub fn values(&self) -> &ColumnChunkData {
        &self.values
    }

    fn slot_of(&self, row: u16) -> Option<usize> {
        self.rows.iter().position(|&r| r == row)
    }

    fn write_row(&mut self, row: u16, src: &ValueVector, pos_in_src: u64) -> Result<()> {
        let slot = match self.slot_of(row) {
            Some(slot) => slot,
            None => {
                self.rows.push(row);
                self.rows.len() - 1
            }
        };
        self.values.write_value(src, pos_in_src, slot as u64)
    }

    fn copy_row_from(&mut self, row: u16, other: &VectorUpdateInfo, other_slot: usize) -> Result<()> {
        self.rows.push(row);
        let slot = self.rows.len() as u64 - 1;
        self.values.write_chunk(&other.values, other_slot as u64, slot, 1)
    }
}

#[derive(Debug, Default)]
struct Chains {
    heads: Vec<Option<u32>>,
    nodes: Vec<Option<RwLock<VectorUpdateInfo>>>,
    free: Vec<u32>,
}

impl Chains {
    fn head(&self, vector_idx: u64) -> Option<u32> {
        self.heads.get(vector_idx as usize).copied().flatten()
    }

    fn node(&self, idx: u32) -> Result<&RwLock<VectorUpdateInfo>> {
        self.nodes
            .get(idx as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| eyre!("update chain points at freed node {}", idx))
    }

    fn node_mut(&mut self, idx: u32) -> Result<&mut VectorUpdateInfo> {
        self.nodes
            .get_mut(idx as usize)
            .and_then(|slot| slot.as_mut())
            .map(|lock| lock.get_mut())
            .ok_or_else(|| eyre!("update chain points at freed node {}", idx))
    }

    fn insert(&mut self, node: VectorUpdateInfo) -> u32 {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = Some(RwLock::new(node));
                idx
            }
            None => {
                self.nodes.push(Some(RwLock::new(node)));
                self.nodes.len() as u32 - 1
            }
        }
    }

    fn push_head(&mut self, vector_idx: u64, mut node: VectorUpdateInfo) -> Result<u32> {
        if self.heads.len() <= vector_idx as usize {
            self.heads.resize(vector_idx as usize + 1, None);
        }
        let old_head = self.heads[vector_idx as usize];
        node.prev = old_head;
        let idx = self.insert(node);
        if let Some(old) = old_head {
            self.node_mut(old)?.next = Some(idx);
        }
        self.heads[vector_idx as usize] = Some(idx);
        Ok(idx)
    }

    fn unlink(&mut self, vector_idx: u64, idx: u32) -> Result<()> {
        let (prev, next) = {
            let node = self.node_mut(idx)?;
            (node.prev, node.next)
        };
        if let Some(p) = prev {
            self.node_mut(p)?.next = next;
        }
        match next {
            Some(n) => self.node_mut(n)?.prev = prev,
            None => self.heads[vector_idx as usize] = prev,
        }
        self.nodes[idx as usize] = None;
        self.free.push(idx);
        Ok(())
    }

    fn chain(&self, vector_idx: u64) -> Result<SmallVec<[u32; 8]>> {
        let mut out = SmallVec::new();
        let mut cur = self.head(vector_idx);
        while let Some(idx) = cur {
            out.push(idx);
            cur = self.node(idx)?.read().prev;
        }
        Ok(out)
    }
}

/// Committed-or-visible updates of a whole chunk, sorted by row.
#[derive(Debug)]
pub struct RowUpdates {
    pub offsets: Vec<u64>,
    pub values: ColumnChunkData,
}

impl RowUpdates {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn max_offset(&self) -> Option<u64> {
        self.offsets.last().copied()
    }
}

#[derive(Debug)]
pub struct UpdateInfo {
    data_type: LogicalType,
    enable_compression: bool,
    chains: RwLock<Chains>,
}

fn split_row(row_in_chunk: u64) -> (u64, u16) {
    (
        row_in_chunk >> DEFAULT_VECTOR_CAPACITY_LOG2,
        (row_in_chunk & (DEFAULT_VECTOR_CAPACITY - 1)) as u16,
    )
}

impl UpdateInfo {
    pub fn new(data_type: LogicalType, enable_compression: bool) -> Self {
        Self {
            data_type,
            enable_compression,
            chains: RwLock::new(Chains::default()),
        }
    }

    pub fn data_type(&self) -> &LogicalType {
        &self.data_type
    }

    /// Records `src[pos_in_src]` as the new value of `row_in_chunk`.
    pub fn update(
        &self,
        ctx: ReadContext,
        row_in_chunk: u64,
        src: &ValueVector,
        pos_in_src: u64,
    ) -> Result<()> {
        let Some(txn_id) = ctx.txn_id() else {
            bail!("updates require a transaction");
        };
        let (vector_idx, row) = split_row(row_in_chunk);
        let chains = self.chains.upgradable_read();

        let mut own_node = None;
        let mut cur = chains.head(vector_idx);
        while let Some(idx) = cur {
            let node = chains.node(idx)?.read();
            if node.slot_of(row).is_some() {
                if ctx.can_write(node.version) != WriteCheckResult::CanWrite {
                    return Err(WriteConflictError {
                        vector_idx,
                        row_in_vector: row as u64,
                        conflicting_version: node.version,
                    }
                    .into());
                }
                if node.version == txn_id && own_node.is_none() {
                    own_node = Some(idx);
                }
            }
            cur = node.prev;
        }

        let head_is_own = match chains.head(vector_idx) {
            Some(head) => chains.node(head)?.read().version == txn_id,
            None => false,
        };
        let target = own_node.or(if head_is_own {
            chains.head(vector_idx)
        } else {
            None
        });
        if let Some(idx) = target {
            trace!(vector_idx, row, "updated row in existing version");
            return chains.node(idx)?.write().write_row(row, src, pos_in_src);
        }

        let mut node = VectorUpdateInfo::new(txn_id, &self.data_type, self.enable_compression);
        node.write_row(row, src, pos_in_src)?;
        let mut chains = RwLockUpgradableReadGuard::upgrade(chains);
        chains.push_head(vector_idx, node)?;
        trace!(vector_idx, row, txn = txn_id, "pushed new update version");
        Ok(())
    }

    /// Overlays visible updates of `[start, start + num_rows)` (chunk row
    /// offsets) onto `out` starting at `pos_in_out`.
    pub fn scan(
        &self,
        ctx: ReadContext,
        start: u64,
        num_rows: u64,
        out: &mut ValueVector,
        pos_in_out: u64,
    ) -> Result<()> {
        if num_rows == 0 {
            return Ok(());
        }
        let chains = self.chains.read();
        let end = start + num_rows;
        let first_vector = start >> DEFAULT_VECTOR_CAPACITY_LOG2;
        let last_vector = (end - 1) >> DEFAULT_VECTOR_CAPACITY_LOG2;
        let mut seen = vec![false; num_rows as usize];
        for vector_idx in first_vector..=last_vector {
            let base = vector_idx << DEFAULT_VECTOR_CAPACITY_LOG2;
            let mut cur = chains.head(vector_idx);
            while let Some(idx) = cur {
                let node = chains.node(idx)?.read();
                if ctx.is_visible(node.version) {
                    for (slot, &row) in node.rows.iter().enumerate() {
                        let offset = base + row as u64;
                        if offset < start || offset >= end {
                            continue;
                        }
                        let i = (offset - start) as usize;
                        if !seen[i] {
                            seen[i] = true;
                            node.values.lookup(slot as u64, out, pos_in_out + i as u64)?;
                        }
                    }
                }
                cur = node.prev;
            }
        }
        Ok(())
    }

    /// Writes the visible update of `row_in_chunk` into `out[pos_in_out]`;
    /// returns false when the row has no visible update.
    pub fn lookup(
        &self,
        ctx: ReadContext,
        row_in_chunk: u64,
        out: &mut ValueVector,
        pos_in_out: u64,
    ) -> Result<bool> {
        let (vector_idx, row) = split_row(row_in_chunk);
        let chains = self.chains.read();
        let mut cur = chains.head(vector_idx);
        while let Some(idx) = cur {
            let node = chains.node(idx)?.read();
            if ctx.is_visible(node.version) {
                if let Some(slot) = node.slot_of(row) {
                    node.values.lookup(slot as u64, out, pos_in_out)?;
                    return Ok(true);
                }
            }
            cur = node.prev;
        }
        Ok(false)
    }

    /// Every row's newest update visible to `ctx`, sorted by row.
    pub fn collect_updates(&self, ctx: ReadContext) -> Result<Option<RowUpdates>> {
        let chains = self.chains.read();
        let mut picks: Vec<(u64, u32, usize)> = Vec::new();
        for vector_idx in 0..chains.heads.len() as u64 {
            let base = vector_idx << DEFAULT_VECTOR_CAPACITY_LOG2;
            let mut seen: SmallVec<[u16; 32]> = SmallVec::new();
            let mut cur = chains.head(vector_idx);
            while let Some(idx) = cur {
                let node = chains.node(idx)?.read();
                if ctx.is_visible(node.version) {
                    for (slot, &row) in node.rows.iter().enumerate() {
                        if !seen.contains(&row) {
                            seen.push(row);
                            picks.push((base + row as u64, idx, slot));
                        }
                    }
                }
                cur = node.prev;
            }
        }
        if picks.is_empty() {
            return Ok(None);
        }
        picks.sort_unstable_by_key(|&(offset, _, _)| offset);
        let mut values =
            ColumnChunkData::new(self.data_type.clone(), picks.len() as u64, self.enable_compression);
        let mut offsets = Vec::with_capacity(picks.len());
        for (offset, idx, slot) in picks {
            let node = chains.node(idx)?.read();
            values.append_chunk(&node.values, slot as u64, 1)?;
            offsets.push(offset);
        }
        Ok(Some(RowUpdates { offsets, values }))
    }

    /// Rewrites every version of `txn_id` to `commit_ts`; returns how many
    /// versions were stamped.
    pub fn commit(&self, txn_id: TxnId, commit_ts: TxnId) -> usize {
        let chains = self.chains.read();
        let mut stamped = 0;
        for lock in chains.nodes.iter().flatten() {
            let mut node = lock.write();
            if node.version == txn_id {
                node.version = commit_ts;
                stamped += 1;
            }
        }
        stamped
    }

    /// Unlinks every version of `txn_id`.
    pub fn rollback(&self, txn_id: TxnId) -> Result<usize> {
        let mut chains = self.chains.write();
        let mut removed = 0;
        for vector_idx in 0..chains.heads.len() as u64 {
            for idx in chains.chain(vector_idx)? {
                if chains.node_mut(idx)?.version == txn_id {
                    chains.unlink(vector_idx, idx)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Folds versions every live reader agrees on.
    ///
    /// Per vector, the newest version committed at or before `watermark`
    /// absorbs the rows of the run of equally old versions directly below it,
    /// which are then dropped. Rows already in the keeper win.
    pub fn vacuum(&self, watermark: TxnId) -> Result<usize> {
        let settled = |v: TxnId| is_committed_version(v) && v <= watermark;
        let mut chains = self.chains.write();
        let mut removed = 0;
        for vector_idx in 0..chains.heads.len() as u64 {
            let chain = chains.chain(vector_idx)?;
            let mut iter = chain.iter().copied();
            let keeper = loop {
                match iter.next() {
                    Some(idx) if settled(chains.node_mut(idx)?.version) => break Some(idx),
                    Some(_) => continue,
                    None => break None,
                }
            };
            let Some(keeper) = keeper else { continue };
            for older in iter {
                if !settled(chains.node_mut(older)?.version) {
                    break;
                }
                {
                    let (keep_lock, old_lock) = (chains.node(keeper)?, chains.node(older)?);
                    let mut keep = keep_lock.write();
                    let old = old_lock.read();
                    for (slot, &row) in old.rows.iter().enumerate() {
                        if keep.slot_of(row).is_none() {
                            keep.copy_row_from(row, &old, slot)?;
                        }
                    }
                }
                chains.unlink(vector_idx, older)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, watermark, "vacuumed update versions");
        }
        Ok(removed)
    }

    pub fn has_updates(&self) -> bool {
        self.chains.read().heads.iter().any(|h| h.is_some())
    }

    /// Whether any version still carries a transaction id.
    pub fn has_uncommitted(&self) -> bool {
        self.chains
            .read()
            .nodes
            .iter()
            .flatten()
            .any(|lock| !is_committed_version(lock.read().version))
    }

    /// Distinct rows with at least one version, committed or not.
    pub fn num_updated_rows(&self) -> Result<u64> {
        let chains = self.chains.read();
        let mut total = 0;
        for vector_idx in 0..chains.heads.len() as u64 {
            let mut rows: SmallVec<[u16; 32]> = SmallVec::new();
            let mut cur = chains.head(vector_idx);
            while let Some(idx) = cur {
                let node = chains.node(idx)?.read();
                for row in &node.rows {
                    if !rows.contains(row) {
                        rows.push(*row);
                    }
                }
                cur = node.prev;
            }
            total += rows.len() as u64;
        }
        Ok(total)
    }

    /// Visits the versions of one vector, newest first.
    pub fn iterate_vector_info<F>(&self, vector_idx: u64, mut f: F) -> Result<()>
    where
        F: FnMut(&VectorUpdateInfo),
    {
        let chains = self.chains.read();
        let mut cur = chains.head(vector_idx);
        while let Some(idx) = cur {
            let node = chains.node(idx)?.read();
            f(&node);
            cur = node.prev;
        }
        Ok(())
    }

    /// Drops every chain (after the updates were checkpointed).
    pub fn clear(&self) {
        *self.chains.write() = Chains::default();
    }
}
