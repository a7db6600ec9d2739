//! Multi-instance rotation: one writable memtable, the rest frozen
//! read-only and queued oldest-first for flushing.

use std::collections::VecDeque;

use record::{Record, Structure};

use crate::{Memtable, MemtableKind};

/// Owns `instances` memtable slots. Writes go to the active slot; a full
/// active is frozen onto the read-only queue and a fresh active is allocated
/// if a slot is free. With every slot occupied, `put`/`delete` return
/// `flush_needed = true` and the caller is expected to drain
/// [`next_flush_batch`](MemtableManager::next_flush_batch).
pub struct MemtableManager {
    slots: Vec<Option<Memtable>>,
    active: usize,
    /// Set while the active slot sits on the read-only queue waiting for a
    /// free slot to take over as writable.
    active_frozen: bool,
    ro_queue: VecDeque<usize>,

    kind: MemtableKind,
    max_entries: usize,
    max_bytes: u64,
    btree_degree: usize,
}

impl MemtableManager {
    pub fn new(
        instances: usize,
        kind: MemtableKind,
        max_entries: usize,
        max_bytes: u64,
        btree_degree: usize,
    ) -> MemtableManager {
        assert!(instances >= 1, "memtable instances must be >= 1");

        let mut slots: Vec<Option<Memtable>> = (0..instances).map(|_| None).collect();
        slots[0] = Some(Memtable::new(kind, max_entries, max_bytes, btree_degree));

        MemtableManager {
            slots,
            active: 0,
            active_frozen: false,
            ro_queue: VecDeque::with_capacity(instances.saturating_sub(1)),
            kind,
            max_entries,
            max_bytes,
            btree_degree,
        }
    }

    /// Stages a record into the active table. Returns `true` when every slot
    /// is occupied and a flush is required to make room.
    pub fn put(&mut self, r: Record) -> bool {
        self.active_table_mut().put(r);
        self.rotate_if_needed()
    }

    /// Stages a tombstone. Same rotation contract as [`put`](Self::put).
    pub fn delete(&mut self, key: Vec<u8>, seq: u64) -> bool {
        self.active_table_mut().delete(key, seq);
        self.rotate_if_needed()
    }

    /// Latest KV across all tables: the active first, then the read-only
    /// queue newest-first, so the freshest version of a key always wins.
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        if let Some(rec) = self.active_table().get(key) {
            return Some(rec);
        }
        for &idx in self.ro_queue.iter().rev() {
            if idx == self.active {
                continue; // already probed
            }
            if let Some(rec) = self.slots[idx].as_ref().and_then(|t| t.get(key)) {
                return Some(rec);
            }
        }
        None
    }

    /// Merge operands for `(structure, key)` across all tables, oldest table
    /// first. Ordering across tables is by `seq` anyway; the oldest-first
    /// walk just keeps the common case already sorted.
    pub fn get_merge_operands(&self, structure: Structure, key: &[u8]) -> Vec<Record> {
        let mut out = Vec::new();
        for &idx in self.ro_queue.iter() {
            if let Some(table) = self.slots[idx].as_ref() {
                out.extend(table.get_merge_operands(structure, key));
            }
        }
        if !self.active_frozen {
            out.extend(self.active_table().get_merge_operands(structure, key));
        }
        out
    }

    /// Dequeues the oldest frozen table and returns its sorted contents,
    /// freeing the slot. If no writable table exists, a fresh active is
    /// installed in the freed slot.
    pub fn next_flush_batch(&mut self) -> Option<Vec<Record>> {
        let idx = self.ro_queue.pop_front()?;
        let mut table = self.slots[idx].take()?;
        let batch = table.drain_sorted();

        if self.active_frozen || self.slots[self.active].is_none() {
            self.slots[idx] = Some(Memtable::new(
                self.kind,
                self.max_entries,
                self.max_bytes,
                self.btree_degree,
            ));
            self.active = idx;
            self.active_frozen = false;
        }
        Some(batch)
    }

    /// Moves a non-empty active table onto the read-only queue so that
    /// recovery can drain the whole manager through the normal flush path.
    pub fn freeze_active(&mut self) {
        if !self.active_frozen && !self.active_table().is_empty() {
            self.ro_queue.push_back(self.active);
            self.active_frozen = true;
        }
    }

    /// Number of frozen tables waiting to flush.
    pub fn frozen_count(&self) -> usize {
        self.ro_queue.len()
    }

    pub fn active_len(&self) -> usize {
        self.active_table().len()
    }

    fn rotate_if_needed(&mut self) -> bool {
        if !self.active_table().is_full() {
            return false;
        }

        if !self.active_frozen {
            self.ro_queue.push_back(self.active);
            self.active_frozen = true;
        }

        match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(Memtable::new(
                    self.kind,
                    self.max_entries,
                    self.max_bytes,
                    self.btree_degree,
                ));
                self.active = free;
                self.active_frozen = false;
                false
            }
            None => true,
        }
    }

    fn active_table(&self) -> &Memtable {
        self.slots[self.active].as_ref().expect("active slot occupied")
    }

    fn active_table_mut(&mut self) -> &mut Memtable {
        self.slots[self.active].as_mut().expect("active slot occupied")
    }
}
