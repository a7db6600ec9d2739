use record::{flush_cmp, MergeOp, Record, RecordKind, Structure};

use crate::{Memtable, MemtableKind, MemtableManager, RECORD_OVERHEAD_BYTES};

const KINDS: [MemtableKind; 3] = [
    MemtableKind::HashMap,
    MemtableKind::SkipList,
    MemtableKind::BTree,
];

fn table(kind: MemtableKind) -> Memtable {
    Memtable::new(kind, 1000, 1 << 20, 4)
}

// --------------------- common contract, all realisations ---------------------

#[test]
fn put_then_get_latest_kv() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::kv(b"k".to_vec(), b"v1".to_vec(), 1));
        m.put(Record::kv(b"k".to_vec(), b"v2".to_vec(), 2));

        let rec = m.get(b"k").unwrap();
        assert_eq!(rec.value, b"v2");
        assert_eq!(rec.seq, 2);
        assert_eq!(m.len(), 1, "KV overwrite must not add an entry ({kind:?})");
    }
}

#[test]
fn get_reflects_last_kv_operation() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::kv(b"k".to_vec(), b"v1".to_vec(), 1));
        m.delete(b"k".to_vec(), 2);
        m.put(Record::kv(b"k".to_vec(), b"v2".to_vec(), 3));
        m.delete(b"k".to_vec(), 4);

        let rec = m.get(b"k").unwrap();
        assert!(rec.tombstone, "{kind:?}");
        assert_eq!(rec.seq, 4);
        assert!(rec.value.is_empty());
    }
}

#[test]
fn merge_operands_never_returned_by_get() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::merge(
            Structure::BloomFilter,
            MergeOp::Add,
            b"set".to_vec(),
            b"x".to_vec(),
            1,
        ));
        assert!(m.get(b"set").is_none(), "{kind:?}");
    }
}

#[test]
fn operands_filtered_by_structure_in_insertion_order() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::merge(Structure::BloomFilter, MergeOp::Add, b"k".to_vec(), b"a".to_vec(), 1));
        m.put(Record::merge(Structure::CountMinSketch, MergeOp::Add, b"k".to_vec(), b"b".to_vec(), 2));
        m.put(Record::merge(Structure::BloomFilter, MergeOp::Remove, b"k".to_vec(), b"a".to_vec(), 3));

        let ops = m.get_merge_operands(Structure::BloomFilter, b"k");
        assert_eq!(ops.len(), 2, "{kind:?}");
        assert_eq!(ops[0].seq, 1);
        assert_eq!(ops[1].seq, 3);
        assert_eq!(ops[1].op, MergeOp::Remove);

        assert_eq!(m.get_merge_operands(Structure::HyperLogLog, b"k").len(), 0);
    }
}

#[test]
fn byte_accounting_follows_overwrites() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::kv(b"k".to_vec(), b"12345".to_vec(), 1));
        assert_eq!(m.approx_bytes(), (1 + 5 + RECORD_OVERHEAD_BYTES) as u64);

        m.put(Record::kv(b"k".to_vec(), b"12".to_vec(), 2));
        assert_eq!(m.approx_bytes(), (1 + 2 + RECORD_OVERHEAD_BYTES) as u64, "{kind:?}");

        m.delete(b"k".to_vec(), 3);
        assert_eq!(m.approx_bytes(), (1 + RECORD_OVERHEAD_BYTES) as u64);
    }
}

#[test]
fn is_full_by_entries_or_bytes() {
    for kind in KINDS {
        let mut m = Memtable::new(kind, 2, u64::MAX, 4);
        m.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1));
        assert!(!m.is_full());
        m.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2));
        assert!(m.is_full(), "{kind:?}");

        let mut m = Memtable::new(kind, 1000, 50, 4);
        m.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1));
        assert!(m.is_full(), "{kind:?}: 53 estimated bytes >= 50 cap");
    }
}

#[test]
fn drain_sorted_empties_and_orders() {
    for kind in KINDS {
        let mut m = table(kind);
        m.put(Record::kv(b"pear".to_vec(), b"2".to_vec(), 2));
        m.put(Record::merge(Structure::BloomFilter, MergeOp::Add, b"pear".to_vec(), b"x".to_vec(), 3));
        m.put(Record::kv(b"apple".to_vec(), b"1".to_vec(), 1));
        m.put(Record::merge(Structure::BloomFilter, MergeOp::Add, b"mango".to_vec(), b"y".to_vec(), 4));

        let batch = m.drain_sorted();
        assert_eq!(batch.len(), 4);
        assert!(batch.windows(2).all(|w| flush_cmp(&w[0], &w[1]) != std::cmp::Ordering::Greater));

        // keys ascend; the pear KV precedes the pear operand
        let keys: Vec<&[u8]> = batch.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![&b"apple"[..], b"mango", b"pear", b"pear"]);
        assert_eq!(batch[2].kind, RecordKind::Kv);
        assert_eq!(batch[3].kind, RecordKind::MergeOperand);

        // post-state: empty, not full, all lookups miss
        assert!(!m.is_full());
        assert!(m.is_empty());
        assert_eq!(m.approx_bytes(), 0);
        assert!(m.get(b"apple").is_none());
        assert!(m.get(b"pear").is_none());
        assert!(m.get_merge_operands(Structure::BloomFilter, b"mango").is_empty());
    }
}

#[test]
fn realisations_agree_on_flush_output() {
    let script: Vec<Record> = vec![
        Record::kv(b"b".to_vec(), b"1".to_vec(), 1),
        Record::merge(Structure::CountMinSketch, MergeOp::Add, b"a".to_vec(), b"v".to_vec(), 2),
        Record::kv(b"a".to_vec(), b"2".to_vec(), 3),
        Record::tombstone(b"b".to_vec(), 4),
        Record::merge(Structure::CountMinSketch, MergeOp::Remove, b"a".to_vec(), b"v".to_vec(), 5),
        Record::kv(b"c".to_vec(), b"3".to_vec(), 6),
    ];

    let mut outputs = Vec::new();
    for kind in KINDS {
        let mut m = table(kind);
        for r in &script {
            m.put(r.clone());
        }
        outputs.push(m.drain_sorted());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

// --------------------- manager ---------------------

fn manager(instances: usize, max_entries: usize) -> MemtableManager {
    MemtableManager::new(instances, MemtableKind::HashMap, max_entries, u64::MAX, 4)
}

#[test]
fn rotation_frees_into_next_slot() {
    let mut mgr = manager(2, 2);

    assert!(!mgr.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1)));
    // fills the active; a free slot exists, so no flush yet
    assert!(!mgr.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2)));
    assert_eq!(mgr.frozen_count(), 1);

    // both keys remain visible through the frozen table
    assert_eq!(mgr.get(b"a").unwrap().value, b"1");
    assert_eq!(mgr.get(b"b").unwrap().value, b"2");
}

#[test]
fn all_slots_full_signals_flush() {
    let mut mgr = manager(2, 1);

    assert!(!mgr.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1)));
    assert!(mgr.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2)));

    let batch = mgr.next_flush_batch().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].key, b"a");

    // slot freed; the next overflow rotates instead of signalling
    assert!(!mgr.put(Record::kv(b"c".to_vec(), b"3".to_vec(), 3)));
}

#[test]
fn single_instance_flushes_on_every_fill() {
    let mut mgr = manager(1, 2);

    assert!(!mgr.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1)));
    assert!(mgr.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2)));

    let batch = mgr.next_flush_batch().unwrap();
    assert_eq!(batch.len(), 2);
    // a fresh active was installed in the freed slot
    assert!(!mgr.put(Record::kv(b"c".to_vec(), b"3".to_vec(), 3)));
    assert_eq!(mgr.get(b"c").unwrap().value, b"3");
}

#[test]
fn manager_delete_writes_a_tombstone() {
    let mut mgr = manager(2, 100);

    mgr.put(Record::kv(b"k".to_vec(), b"v".to_vec(), 1));
    mgr.delete(b"k".to_vec(), 2);

    let rec = mgr.get(b"k").unwrap();
    assert!(rec.tombstone);
    assert_eq!(rec.seq, 2);
    assert!(rec.value.is_empty());
}

#[test]
fn newest_table_wins_on_get() {
    let mut mgr = manager(3, 1);

    mgr.put(Record::kv(b"k".to_vec(), b"old".to_vec(), 1));
    mgr.put(Record::kv(b"k".to_vec(), b"new".to_vec(), 2));

    // "old" is frozen, "new" is... also frozen by now; active is empty
    assert_eq!(mgr.get(b"k").unwrap().value, b"new");
}

#[test]
fn flush_batches_dequeue_oldest_first() {
    let mut mgr = manager(3, 1);

    mgr.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1));
    mgr.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2));
    mgr.put(Record::kv(b"c".to_vec(), b"3".to_vec(), 3));
    assert_eq!(mgr.frozen_count(), 3);

    assert_eq!(mgr.next_flush_batch().unwrap()[0].key, b"a");
    assert_eq!(mgr.next_flush_batch().unwrap()[0].key, b"b");
    assert_eq!(mgr.next_flush_batch().unwrap()[0].key, b"c");
    assert!(mgr.next_flush_batch().is_none());
}

#[test]
fn operands_aggregate_across_tables() {
    let mut mgr = manager(3, 1);

    mgr.put(Record::merge(Structure::HyperLogLog, MergeOp::Add, b"h".to_vec(), b"x".to_vec(), 1));
    mgr.put(Record::merge(Structure::HyperLogLog, MergeOp::Add, b"h".to_vec(), b"y".to_vec(), 2));

    let ops = mgr.get_merge_operands(Structure::HyperLogLog, b"h");
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().any(|r| r.value == b"x"));
    assert!(ops.iter().any(|r| r.value == b"y"));
}

#[test]
fn freeze_active_routes_through_flush_path() {
    let mut mgr = manager(2, 100);

    mgr.put(Record::kv(b"a".to_vec(), b"1".to_vec(), 1));
    mgr.freeze_active();
    assert_eq!(mgr.frozen_count(), 1);

    let batch = mgr.next_flush_batch().unwrap();
    assert_eq!(batch.len(), 1);
    assert!(mgr.next_flush_batch().is_none());

    // manager is writable again
    assert!(!mgr.put(Record::kv(b"b".to_vec(), b"2".to_vec(), 2)));
    assert_eq!(mgr.get(b"b").unwrap().value, b"2");
}

#[test]
fn freeze_active_on_empty_table_is_noop() {
    let mut mgr = manager(2, 100);
    mgr.freeze_active();
    assert_eq!(mgr.frozen_count(), 0);
    assert!(mgr.next_flush_batch().is_none());
}
