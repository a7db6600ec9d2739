//! # Engine — the StrataKV orchestrator
//!
//! Ties the [`wal`], [`memtable`], and [`sstable`] crates into a single-node
//! embedded key-value store with merge-operand support.
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                    ENGINE                        │
//! │                                                  │
//! │ write.rs → seq += 1 → WAL append → memtable put  │
//! │               |                                  │
//! │               | (every slot frozen?)             │
//! │               v          yes                     │
//! │          flush() → new SSTable triplet           │
//! │                                                  │
//! │ read.rs → memtables (newest first)               │
//! │             → SSTables (newest first)            │
//! │           first hit wins; tombstone/expiry       │
//! │           read as absence                        │
//! │                                                  │
//! │ probabilistic reads: collect merge operands      │
//! │   from every layer, order by seq, replay         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, construction, accessors, `Debug`   |
//! | [`config`]   | JSON config with silent default substitution        |
//! | `write`      | `put`/`delete`/`merge` + the flush path             |
//! | `read`       | `get` + bloom/CMS/HLL replay reads                  |
//! | `recovery`   | WAL replay on startup, then flush + WAL truncation  |
//!
//! ## Concurrency model
//!
//! Single-threaded cooperative: every state transition runs on the caller's
//! thread, which makes `seq` a plain field and leaves the block cache as the
//! only shared mutable structure (owned by the [`block::BlockDevice`]).
//! Embeddings that want to multiplex must serialise externally.

mod config;
mod read;
mod recovery;
mod write;

pub use config::Config;

use std::path::PathBuf;

use anyhow::Result;
use block::BlockDevice;
use memtable::MemtableManager;
use wal::WalWriter;

/// The storage engine. See the crate docs for the write/read paths.
pub struct Engine {
    cfg: Config,
    device: BlockDevice,
    mem: MemtableManager,
    wal: WalWriter,
    wal_path: PathBuf,
    sst_dir: PathBuf,
    /// Monotonic, 1-based, process-local. Sole tiebreaker for duplicate keys.
    seq: u64,
    wal_sync: bool,
}

impl Engine {
    /// Builds an engine from a sanitized config, recovering state from the
    /// WAL and existing SSTables.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the data directory tree.
    /// 2. Replay the WAL through the memtable manager, flushing overflow.
    /// 3. Flush whatever the replay left in memory, then truncate the WAL.
    /// 4. Resume `seq` from the maximum seen across the replay.
    pub fn new(cfg: Config, wal_sync: bool) -> Result<Engine> {
        let cfg = cfg.sanitize();
        anyhow::ensure!(
            cfg.multi_file_sstable,
            "single-file sstable mode is not supported"
        );

        let wal_path = cfg.wal_path();
        let sst_dir = cfg.sstable_dir();
        std::fs::create_dir_all(&sst_dir)?;

        let mut device = BlockDevice::new(cfg.cache_size);
        let mut mem = MemtableManager::new(
            cfg.memtable_instances,
            cfg.memtable_kind(),
            cfg.memtable_max_entries,
            cfg.memtable_max_bytes,
            cfg.btree_degree,
        );

        let seq = recovery::replay_and_checkpoint(&cfg, &mut device, &mut mem, &wal_path, &sst_dir)?;

        let wal = WalWriter::create(&wal_path, wal_sync)?;

        Ok(Engine {
            cfg,
            device,
            mem,
            wal,
            wal_path,
            sst_dir,
            seq,
            wal_sync,
        })
    }

    /// Current sequence number (0 before the first write).
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Number of complete SSTables currently on disk.
    pub fn sstable_count(&self) -> Result<usize> {
        Ok(sstable::list_tables_newest_first(&self.sst_dir)?.len())
    }

    /// `(hits, misses)` of the block cache.
    #[must_use]
    pub fn cache_stats(&self) -> (u64, u64) {
        self.device.cache_stats()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("seq", &self.seq)
            .field("data_dir", &self.cfg.data_dir)
            .field("memtable_type", &self.cfg.memtable_type)
            .field("active_entries", &self.mem.active_len())
            .field("frozen_memtables", &self.mem.frozen_count())
            .field("wal_path", &self.wal_path)
            .field("wal_sync", &self.wal_sync)
            .field("cache_stats", &self.device.cache_stats())
            .finish()
    }
}

/// Seconds since the Unix epoch — the wall clock used for TTL assignment
/// and expiry checks.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
