//! Hash-map realisation: O(1) point operations, ordering deferred to drain.

use std::collections::HashMap;

use record::{Record, RecordKind, Structure};

use crate::estimate_record_bytes;

pub struct HashMapMemtable {
    pub(crate) max_entries: usize,
    pub(crate) max_bytes: u64,
    kv: HashMap<Vec<u8>, Record>,
    merge_ops: HashMap<Vec<u8>, Vec<Record>>,
    entries: usize,
    bytes: u64,
}

impl HashMapMemtable {
    pub fn new(max_entries: usize, max_bytes: u64) -> HashMapMemtable {
        HashMapMemtable {
            max_entries,
            max_bytes,
            kv: HashMap::new(),
            merge_ops: HashMap::new(),
            entries: 0,
            bytes: 0,
        }
    }

    pub fn put(&mut self, r: Record) {
        if r.kind == RecordKind::MergeOperand {
            self.entries += 1;
            self.bytes += estimate_record_bytes(&r);
            self.merge_ops.entry(r.key.clone()).or_default().push(r);
            return;
        }

        if let Some(old) = self.kv.get(&r.key) {
            self.bytes -= estimate_record_bytes(old);
        } else {
            self.entries += 1;
        }
        self.bytes += estimate_record_bytes(&r);
        self.kv.insert(r.key.clone(), r);
    }

    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.kv.get(key).cloned()
    }

    pub fn get_merge_operands(&self, structure: Structure, key: &[u8]) -> Vec<Record> {
        match self.merge_ops.get(key) {
            Some(ops) => ops
                .iter()
                .filter(|r| r.structure == structure)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn approx_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn drain(&mut self) -> Vec<Record> {
        let mut out = Vec::with_capacity(self.entries);
        out.extend(self.kv.drain().map(|(_, r)| r));
        out.extend(self.merge_ops.drain().flat_map(|(_, ops)| ops));
        self.entries = 0;
        self.bytes = 0;
        out
    }
}
