//! # Memtable — ordered in-memory staging for writes
//!
//! A memtable holds, per key, at most one latest KV record (overwritten in
//! place with byte accounting) plus an append-only list of merge operands.
//! When full it is frozen and drained into a sorted flush batch for the
//! SSTable writer.
//!
//! Three interchangeable realisations share one contract and must produce
//! the same flush output for the same input sequence:
//!
//! | Variant    | Backing                          | Character              |
//! |------------|----------------------------------|------------------------|
//! | `HashMap`  | `std::collections::HashMap`      | O(1) point ops, sorts at drain |
//! | `SkipList` | `crossbeam_skiplist::SkipMap`    | order-preserving inserts |
//! | `BTree`    | hand-rolled, minimum degree `t`  | order-preserving inserts |
//!
//! Dispatch is a sum type rather than a trait object — there is exactly one
//! call site per operation and the variant set is closed.

mod btree;
mod hashmap;
mod manager;
mod skiplist;

pub use manager::MemtableManager;

use record::Record;

use btree::BTreeMemtable;
use hashmap::HashMapMemtable;
use skiplist::SkipListMemtable;

/// Per-record contribution to the byte estimate beyond key and value:
/// tombstone + seq + expiry + tags + container overhead.
pub const RECORD_OVERHEAD_BYTES: usize = 51;

pub(crate) fn estimate_record_bytes(r: &Record) -> u64 {
    (r.key.len() + r.value.len() + RECORD_OVERHEAD_BYTES) as u64
}

/// Which realisation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemtableKind {
    HashMap,
    SkipList,
    BTree,
}

/// One memtable instance.
pub enum Memtable {
    HashMap(HashMapMemtable),
    SkipList(SkipListMemtable),
    BTree(BTreeMemtable),
}

impl Memtable {
    /// `btree_degree` is only consulted for [`MemtableKind::BTree`].
    pub fn new(kind: MemtableKind, max_entries: usize, max_bytes: u64, btree_degree: usize) -> Memtable {
        match kind {
            MemtableKind::HashMap => Memtable::HashMap(HashMapMemtable::new(max_entries, max_bytes)),
            MemtableKind::SkipList => {
                Memtable::SkipList(SkipListMemtable::new(max_entries, max_bytes))
            }
            MemtableKind::BTree => {
                Memtable::BTree(BTreeMemtable::new(max_entries, max_bytes, btree_degree))
            }
        }
    }

    /// Stages a record. A KV record replaces any existing KV for its key; a
    /// merge operand is appended to the per-key operand list.
    pub fn put(&mut self, r: Record) {
        match self {
            Memtable::HashMap(m) => m.put(r),
            Memtable::SkipList(m) => m.put(r),
            Memtable::BTree(m) => m.put(r),
        }
    }

    /// Stages a deletion: equivalent to `put` of a KV tombstone with an
    /// empty value.
    pub fn delete(&mut self, key: Vec<u8>, seq: u64) {
        self.put(Record::tombstone(key, seq));
    }

    /// Latest KV record for `key` (tombstones included — the caller decides
    /// what absence means). Merge operands are never returned.
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        match self {
            Memtable::HashMap(m) => m.get(key),
            Memtable::SkipList(m) => m.get(key),
            Memtable::BTree(m) => m.get(key),
        }
    }

    /// Operands for `(key, structure)` in insertion order.
    pub fn get_merge_operands(&self, structure: record::Structure, key: &[u8]) -> Vec<Record> {
        match self {
            Memtable::HashMap(m) => m.get_merge_operands(structure, key),
            Memtable::SkipList(m) => m.get_merge_operands(structure, key),
            Memtable::BTree(m) => m.get_merge_operands(structure, key),
        }
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_entries() || self.approx_bytes() >= self.max_bytes()
    }

    /// All records (KV + operands) in canonical flush order; the table is
    /// left empty.
    pub fn drain_sorted(&mut self) -> Vec<Record> {
        let mut out = match self {
            Memtable::HashMap(m) => m.drain(),
            Memtable::SkipList(m) => m.drain(),
            Memtable::BTree(m) => m.drain(),
        };
        out.sort_by(record::flush_cmp);
        out
    }

    /// Total staged records, merge operands included.
    pub fn len(&self) -> usize {
        match self {
            Memtable::HashMap(m) => m.len(),
            Memtable::SkipList(m) => m.len(),
            Memtable::BTree(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn approx_bytes(&self) -> u64 {
        match self {
            Memtable::HashMap(m) => m.approx_bytes(),
            Memtable::SkipList(m) => m.approx_bytes(),
            Memtable::BTree(m) => m.approx_bytes(),
        }
    }

    fn max_entries(&self) -> usize {
        match self {
            Memtable::HashMap(m) => m.max_entries,
            Memtable::SkipList(m) => m.max_entries,
            Memtable::BTree(m) => m.max_entries,
        }
    }

    fn max_bytes(&self) -> u64 {
        match self {
            Memtable::HashMap(m) => m.max_bytes,
            Memtable::SkipList(m) => m.max_bytes,
            Memtable::BTree(m) => m.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests;
