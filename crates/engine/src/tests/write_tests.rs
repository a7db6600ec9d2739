use super::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn put_then_get_before_any_flush() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    engine.put(b"name".to_vec(), b"alice".to_vec())?;
    assert_eq!(engine.get(b"name")?.unwrap(), b"alice");
    assert_eq!(engine.seq(), 1);
    Ok(())
}

#[test]
fn overwrite_returns_latest() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    engine.put(b"k".to_vec(), b"v1".to_vec())?;
    engine.put(b"k".to_vec(), b"v2".to_vec())?;
    assert_eq!(engine.get(b"k")?.unwrap(), b"v2");
    Ok(())
}

#[test]
fn delete_hides_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    engine.put(b"k".to_vec(), b"v".to_vec())?;
    engine.delete(b"k".to_vec())?;
    assert!(engine.get(b"k")?.is_none());

    engine.put(b"k".to_vec(), b"back".to_vec())?;
    assert_eq!(engine.get(b"k")?.unwrap(), b"back");
    Ok(())
}

#[test]
fn put_delete_alternation_tracks_last_operation() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    for round in 0..10u8 {
        engine.put(b"flip".to_vec(), vec![round])?;
        assert_eq!(engine.get(b"flip")?.unwrap(), vec![round]);
        engine.delete(b"flip".to_vec())?;
        assert!(engine.get(b"flip")?.is_none());
    }
    Ok(())
}

// Scenario: two puts with max_entries = 2 trigger a flush, and both keys
// remain readable from the SSTable.
#[test]
fn persistence_across_flush() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 2, 1);

    engine.put(b"apple".to_vec(), b"A1".to_vec())?;
    engine.put(b"banana".to_vec(), b"B1".to_vec())?;

    assert_eq!(engine.sstable_count()?, 1);
    assert_eq!(engine.get(b"apple")?.unwrap(), b"A1");
    assert_eq!(engine.get(b"banana")?.unwrap(), b"B1");
    Ok(())
}

#[test]
fn rotation_defers_flush_until_all_slots_full() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1, 3);

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    assert_eq!(engine.sstable_count()?, 0, "free slots remain");

    engine.put(b"c".to_vec(), b"3".to_vec())?;
    assert_eq!(engine.sstable_count()?, 1, "third fill drains the oldest");

    for key in [b"a", b"b", b"c"] {
        assert!(engine.get(key)?.is_some());
    }
    Ok(())
}

#[test]
fn force_flush_drains_everything() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 2);

    engine.put(b"x".to_vec(), b"1".to_vec())?;
    engine.force_flush()?;
    assert_eq!(engine.sstable_count()?, 1);
    assert_eq!(engine.get(b"x")?.unwrap(), b"1");

    // nothing staged: no new table
    engine.force_flush()?;
    assert_eq!(engine.sstable_count()?, 1);
    Ok(())
}

#[test]
fn seq_is_strictly_monotonic_across_operations() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.delete(b"a".to_vec())?;
    engine.bf_add(b"s".to_vec(), b"m".to_vec())?;
    assert_eq!(engine.seq(), 3);
    Ok(())
}

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let mut engine = engine(dir.path(), 1000, 1);

    assert!(engine.put(Vec::new(), b"v".to_vec()).is_err());
    assert!(engine.delete(Vec::new()).is_err());
    assert_eq!(engine.seq(), 0, "rejected writes must not burn seqs");
}

#[test]
fn oversized_key_is_rejected() {
    let dir = tempdir().unwrap();
    let mut engine = engine(dir.path(), 1000, 1);

    let key = vec![b'k'; 4096];
    assert!(engine.put(key, b"v".to_vec()).is_err());
}

#[test]
fn merge_requires_structure_and_direction() {
    use record::{MergeOp, Structure};

    let dir = tempdir().unwrap();
    let mut engine = engine(dir.path(), 1000, 1);

    assert!(engine
        .merge(Structure::None, MergeOp::Add, b"k".to_vec(), b"v".to_vec())
        .is_err());
    assert!(engine
        .merge(Structure::BloomFilter, MergeOp::None, b"k".to_vec(), b"v".to_vec())
        .is_err());
}

#[test]
fn single_file_mode_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = Config {
        multi_file_sstable: false,
        ..test_config(dir.path(), 1000, 1)
    };
    assert!(Engine::new(cfg, false).is_err());
}
