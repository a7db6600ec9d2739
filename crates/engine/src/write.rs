//! Write path: `put`, `delete`, the merge-operand surface, and the flush of
//! frozen memtables into SSTables.
//!
//! Every mutation is appended to the WAL before the memtable sees it. When
//! the manager reports that all slots are frozen, the oldest batch is
//! drained into a new SSTable before the call returns.

use std::time::Duration;

use anyhow::Result;
use record::{MergeOp, Record, Structure};
use sstable::{SstWriteOptions, SstWriter};
use tracing::debug;

use crate::{unix_now, Engine};

/// Values must fit comfortably inside a single WAL frame.
pub const MAX_VALUE_BYTES: usize = 32 * 1024 * 1024;

impl Engine {
    /// Inserts or overwrites a point value.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.put_record(key, value, 0)
    }

    /// Like [`put`](Self::put), with the record expiring `ttl` from now.
    pub fn put_with_ttl(&mut self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = unix_now().saturating_add(ttl.as_secs());
        self.put_record(key, value, expires_at)
    }

    /// Writes a tombstone for `key`. Older values in any layer are shadowed.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.check_key(&key)?;
        let seq = self.next_seq()?;
        self.apply(Record::tombstone(key, seq))
    }

    /// Appends a merge operand for `(structure, key)`.
    pub fn merge(
        &mut self,
        structure: Structure,
        op: MergeOp,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<()> {
        self.merge_record(structure, op, key, value, 0)
    }

    /// Like [`merge`](Self::merge), with an expiry `ttl` from now.
    pub fn merge_with_ttl(
        &mut self,
        structure: Structure,
        op: MergeOp,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<()> {
        let expires_at = unix_now().saturating_add(ttl.as_secs());
        self.merge_record(structure, op, key, value, expires_at)
    }

    // Probabilistic surface: additive logs replayed at read time.

    pub fn bf_add(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::BloomFilter, MergeOp::Add, key, value)
    }

    pub fn bf_remove(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::BloomFilter, MergeOp::Remove, key, value)
    }

    pub fn cms_add(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::CountMinSketch, MergeOp::Add, key, value)
    }

    pub fn cms_remove(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::CountMinSketch, MergeOp::Remove, key, value)
    }

    pub fn hll_add(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::HyperLogLog, MergeOp::Add, key, value)
    }

    pub fn hll_remove(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.merge(Structure::HyperLogLog, MergeOp::Remove, key, value)
    }

    /// Freezes the active memtable and flushes every frozen table to disk.
    /// A no-op when nothing is staged.
    pub fn force_flush(&mut self) -> Result<()> {
        self.mem.freeze_active();
        while self.mem.frozen_count() > 0 {
            self.flush_next()?;
        }
        Ok(())
    }

    fn put_record(&mut self, key: Vec<u8>, value: Vec<u8>, expires_at: u64) -> Result<()> {
        self.check_key(&key)?;
        self.check_value(&value)?;
        let seq = self.next_seq()?;
        self.apply(Record::kv(key, value, seq).with_expiry(expires_at))
    }

    fn merge_record(
        &mut self,
        structure: Structure,
        op: MergeOp,
        key: Vec<u8>,
        value: Vec<u8>,
        expires_at: u64,
    ) -> Result<()> {
        anyhow::ensure!(structure != Structure::None, "merge requires a structure tag");
        anyhow::ensure!(
            matches!(op, MergeOp::Add | MergeOp::Remove),
            "merge op must be add or remove"
        );
        self.check_key(&key)?;
        self.check_value(&value)?;
        let seq = self.next_seq()?;
        self.apply(Record::merge(structure, op, key, value, seq).with_expiry(expires_at))
    }

    /// WAL first, then memtable; a full manager drains one batch to disk.
    fn apply(&mut self, rec: Record) -> Result<()> {
        self.wal.append(&rec)?;
        let flush_needed = self.mem.put(rec);
        if flush_needed {
            self.flush_next()?;
        }
        Ok(())
    }

    pub(crate) fn flush_next(&mut self) -> Result<()> {
        let Some(batch) = self.mem.next_flush_batch() else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let opts = SstWriteOptions {
            block_size: self.cfg.block_size,
            summary_stride: self.cfg.summary_stride,
        };
        let base = SstWriter::new(&mut self.device, opts).write(&self.sst_dir, &batch)?;
        debug!(records = batch.len(), base = %base.display(), "flushed memtable to sstable");
        Ok(())
    }

    fn next_seq(&mut self) -> Result<u64> {
        self.seq = self
            .seq
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("sequence number overflow"))?;
        Ok(self.seq)
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        // the record header, key included, must fit one block's payload
        let max = self.cfg.block_size - 64;
        anyhow::ensure!(
            key.len() <= max,
            "key too large: {} bytes (max {max} at block size {})",
            key.len(),
            self.cfg.block_size
        );
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<()> {
        anyhow::ensure!(
            value.len() <= MAX_VALUE_BYTES,
            "value too large: {} bytes (max {MAX_VALUE_BYTES})",
            value.len()
        );
        Ok(())
    }
}
