//! Read path: point lookups and the probabilistic reads that replay merge
//! operands.
//!
//! A point lookup probes the memtables first (newest data), then SSTables
//! newest-first; the first layer holding a KV record for the key decides,
//! and a tombstoned or expired hit means "absent".
//!
//! Probabilistic reads gather every live operand for `(structure, key)`
//! across all layers, order them by `(seq, op, value)`, and replay:
//! set-membership for the bloom log, a counter clamped at zero for the CMS
//! log, set-cardinality for the HLL log.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use record::{MergeOp, Record, Structure};
use sstable::SstReader;

use crate::{unix_now, Engine};

impl Engine {
    /// Latest live value for `key`, if any.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let now = unix_now();

        if let Some(rec) = self.mem.get(key) {
            if rec.tombstone || rec.is_expired(now) {
                return Ok(None);
            }
            return Ok(Some(rec.value));
        }

        let value = SstReader::new(&mut self.device).get(&self.sst_dir, key, now)?;
        Ok(value)
    }

    /// Whether the last bloom-log operation for `(key, value)` was an add.
    pub fn bf_get(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        let ops = self.collect_operands(Structure::BloomFilter, key)?;
        let mut present: HashSet<&[u8]> = HashSet::new();
        for op in &ops {
            match op.op {
                MergeOp::Add => {
                    present.insert(&op.value);
                }
                MergeOp::Remove => {
                    present.remove(op.value.as_slice());
                }
                MergeOp::None => {}
            }
        }
        Ok(present.contains(value))
    }

    /// Adds minus removes for `(key, value)` in the CMS log, clamped at 0.
    pub fn cms_get(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
        let ops = self.collect_operands(Structure::CountMinSketch, key)?;
        let mut count: u64 = 0;
        for op in ops.iter().filter(|r| r.value == value) {
            match op.op {
                MergeOp::Add => count += 1,
                MergeOp::Remove => count = count.saturating_sub(1),
                MergeOp::None => {}
            }
        }
        Ok(count)
    }

    /// Number of distinct values in the HLL log whose last operation was an
    /// add.
    pub fn hll_get(&mut self, key: &[u8]) -> Result<u64> {
        let ops = self.collect_operands(Structure::HyperLogLog, key)?;
        let mut last: HashMap<&[u8], MergeOp> = HashMap::new();
        for op in &ops {
            last.insert(&op.value, op.op);
        }
        Ok(last.values().filter(|&&op| op == MergeOp::Add).count() as u64)
    }

    /// Live operands for `(structure, key)` from memtables and every
    /// SSTable, ordered `(seq, op, value)`.
    fn collect_operands(&mut self, structure: Structure, key: &[u8]) -> Result<Vec<Record>> {
        let now = unix_now();

        let mut ops: Vec<Record> = self
            .mem
            .get_merge_operands(structure, key)
            .into_iter()
            .filter(|r| {
                matches!(r.op, MergeOp::Add | MergeOp::Remove) && !r.is_expired(now)
            })
            .collect();

        ops.extend(SstReader::new(&mut self.device).get_merge_operands(
            &self.sst_dir,
            structure,
            key,
            now,
        )?);

        ops.sort_by(record::operand_cmp);
        Ok(ops)
    }
}
