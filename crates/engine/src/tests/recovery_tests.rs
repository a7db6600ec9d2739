use super::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn restart_recovers_unflushed_writes_from_the_wal() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.put(b"a".to_vec(), b"1".to_vec())?;
        engine.put(b"b".to_vec(), b"2".to_vec())?;
        engine.delete(b"a".to_vec())?;
        // dropped without any flush: data lives only in the WAL
    }

    let mut engine = engine(dir.path(), 1000, 1);
    assert!(engine.get(b"a")?.is_none());
    assert_eq!(engine.get(b"b")?.unwrap(), b"2");
    Ok(())
}

#[test]
fn replay_checkpoints_into_sstables_and_truncates_the_wal() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.put(b"k".to_vec(), b"v".to_vec())?;
    }

    let engine = engine(dir.path(), 1000, 1);
    assert!(engine.sstable_count()? >= 1, "replayed state reaches disk");

    let wal_len = std::fs::metadata(dir.path().join("wal.log"))?.len();
    assert_eq!(wal_len, 0, "wal is empty after the checkpoint");
    Ok(())
}

#[test]
fn seq_resumes_above_every_recovered_record() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        for i in 0..5u8 {
            engine.put(vec![b'k', i], vec![i])?;
        }
        assert_eq!(engine.seq(), 5);
    }

    let mut engine = engine(dir.path(), 1000, 1);
    assert_eq!(engine.seq(), 5);

    engine.put(b"next".to_vec(), b"v".to_vec())?;
    assert_eq!(engine.seq(), 6);
    Ok(())
}

#[test]
fn seq_survives_an_idle_restart() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        for i in 0..5u8 {
            engine.put(vec![b'k', i], vec![i])?;
        }
    }

    // this restart checkpoints the WAL to empty and writes nothing new
    {
        let engine = engine(dir.path(), 1000, 1);
        assert_eq!(engine.seq(), 5);
    }

    // the WAL is now empty; the floor must come from the newest sstable
    let mut engine = engine(dir.path(), 1000, 1);
    assert_eq!(engine.seq(), 5);
    engine.put(b"next".to_vec(), b"v".to_vec())?;
    assert_eq!(engine.seq(), 6);
    Ok(())
}

#[test]
fn merge_operands_survive_restart() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.bf_add(b"s".to_vec(), b"x".to_vec())?;
        engine.bf_remove(b"s".to_vec(), b"x".to_vec())?;
        engine.bf_add(b"s".to_vec(), b"y".to_vec())?;
        engine.cms_add(b"c".to_vec(), b"v".to_vec())?;
    }

    let mut engine = engine(dir.path(), 1000, 1);
    assert!(!engine.bf_get(b"s", b"x")?);
    assert!(engine.bf_get(b"s", b"y")?);
    assert_eq!(engine.cms_get(b"c", b"v")?, 1);
    Ok(())
}

#[test]
fn restart_preserves_both_flushed_and_unflushed_state() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.put(b"flushed".to_vec(), b"f".to_vec())?;
        engine.force_flush()?;
        engine.put(b"pending".to_vec(), b"p".to_vec())?;
    }

    let mut engine = engine(dir.path(), 1000, 1);
    assert_eq!(engine.get(b"flushed")?.unwrap(), b"f");
    assert_eq!(engine.get(b"pending")?.unwrap(), b"p");
    Ok(())
}

#[test]
fn fresh_directory_starts_empty() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = engine(dir.path(), 1000, 1);

    assert_eq!(engine.seq(), 0);
    assert_eq!(engine.sstable_count()?, 0);
    assert!(engine.get(b"anything")?.is_none());
    Ok(())
}

#[test]
fn corrupt_wal_fails_recovery() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.put(b"k".to_vec(), b"v".to_vec())?;
    }

    // the checkpoint emptied the WAL; write a fresh record and corrupt it
    {
        let mut engine = engine(dir.path(), 1000, 1);
        engine.put(b"k2".to_vec(), b"v2".to_vec())?;
    }
    let wal_path = dir.path().join("wal.log");
    let mut bytes = std::fs::read(&wal_path)?;
    assert!(!bytes.is_empty());
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&wal_path, &bytes)?;

    assert!(Engine::new(test_config(dir.path(), 1000, 1), false).is_err());
    Ok(())
}

#[test]
fn replay_respects_memtable_limits() -> Result<()> {
    let dir = tempdir()?;

    {
        // large limits: everything stays in the WAL
        let mut engine = engine(dir.path(), 1000, 1);
        for i in 0..50u32 {
            engine.put(format!("key{i:04}").into_bytes(), vec![b'v'; 8])?;
        }
        assert_eq!(engine.sstable_count()?, 0);
    }

    // tiny limits on restart: the replay itself must rotate and flush
    let mut engine = engine(dir.path(), 4, 1);
    assert!(engine.sstable_count()? >= 12);
    for i in 0..50u32 {
        assert!(engine.get(format!("key{i:04}").as_bytes())?.is_some());
    }
    Ok(())
}
