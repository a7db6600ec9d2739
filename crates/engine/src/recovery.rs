//! Cold-start recovery: replay the WAL through the normal memtable path,
//! flush whatever remains, truncate the WAL.
//!
//! The WAL is append-only while the engine runs — with several memtable
//! instances, frozen-but-unflushed tables are durable only there, so no
//! mid-run truncation is safe. Checkpointing at startup instead bounds
//! replay work across restarts: after this function returns, every replayed
//! record lives in an SSTable and the WAL is empty.

use std::path::Path;

use anyhow::{Context, Result};
use block::BlockDevice;
use memtable::MemtableManager;
use record::Record;
use sstable::{SstReader, SstWriteOptions, SstWriter};
use tracing::info;
use wal::WalReader;

use crate::Config;

/// Replays the WAL (if present) and returns the highest sequence number
/// across the replay and the newest SSTable, so the engine's counter
/// resumes strictly above every durable record — the WAL alone is not
/// enough after an idle restart, when the checkpoint has already emptied
/// it.
pub(crate) fn replay_and_checkpoint(
    cfg: &Config,
    device: &mut BlockDevice,
    mem: &mut MemtableManager,
    wal_path: &Path,
    sst_dir: &Path,
) -> Result<u64> {
    let mut records: Vec<Record> = Vec::new();
    match WalReader::open(wal_path) {
        Ok(mut reader) => {
            reader
                .replay(|rec| records.push(rec))
                .context("wal replay failed")?;
        }
        Err(wal::WalError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(anyhow::anyhow!(e).context("failed to open wal for replay")),
    }

    let opts = SstWriteOptions {
        block_size: cfg.block_size,
        summary_stride: cfg.summary_stride,
    };

    let mut max_seq = 0u64;
    let count = records.len();
    for rec in records {
        max_seq = max_seq.max(rec.seq);
        if mem.put(rec) {
            flush_one(device, mem, sst_dir, opts)?;
        }
    }

    if count > 0 {
        // checkpoint: everything replayed goes to disk, then the log resets
        mem.freeze_active();
        while mem.frozen_count() > 0 {
            flush_one(device, mem, sst_dir, opts)?;
        }
        std::fs::File::create(wal_path).context("failed to truncate wal")?;
        info!(records = count, max_seq, "wal replay checkpointed");
    }

    let floor = SstReader::new(device).max_seq(sst_dir)?;
    Ok(max_seq.max(floor))
}

fn flush_one(
    device: &mut BlockDevice,
    mem: &mut MemtableManager,
    sst_dir: &Path,
    opts: SstWriteOptions,
) -> Result<()> {
    let Some(batch) = mem.next_flush_batch() else {
        return Ok(());
    };
    if batch.is_empty() {
        return Ok(());
    }
    SstWriter::new(device, opts).write(sst_dir, &batch)?;
    Ok(())
}
