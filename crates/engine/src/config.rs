//! Engine configuration.
//!
//! Loaded from a JSON file. A missing file yields the defaults; unknown
//! fields are ignored; each out-of-range value is individually reset to its
//! default — a persisted config can never prevent the engine from starting.

use std::path::{Path, PathBuf};

use memtable::MemtableKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Block size for every SSTable artifact: 4096, 8192, or 16384.
    pub block_size: usize,
    pub memtable_max_entries: usize,
    pub memtable_max_bytes: u64,
    /// One of `hashmap`, `skiplist`, `btree`.
    pub memtable_type: String,
    /// Minimum degree of the b-tree memtable.
    pub btree_degree: usize,
    /// Memtable slots: one writable plus up to N-1 frozen.
    pub memtable_instances: usize,
    /// Only the multi-file (`.data`/`.index`/`.summary`) layout is
    /// implemented; `false` is rejected at engine construction.
    pub multi_file_sstable: bool,
    /// One summary entry per `stride` consecutive index entries.
    pub summary_stride: u64,
    /// Block cache budget in bytes; 0 disables caching.
    pub cache_size: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            data_dir: PathBuf::from("data"),
            block_size: 4096,
            memtable_max_entries: 1000,
            memtable_max_bytes: 64 * 1024 * 1024,
            memtable_type: "hashmap".to_string(),
            btree_degree: 16,
            memtable_instances: 1,
            multi_file_sstable: true,
            summary_stride: 16,
            cache_size: 4 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file is absent or
    /// unparsable, then sanitizes field by field.
    pub fn load(path: &Path) -> Config {
        let cfg = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        };
        cfg.sanitize()
    }

    /// Replaces every invalid value with its default.
    pub fn sanitize(mut self) -> Config {
        let defaults = Config::default();

        if !sstable::BLOCK_SIZES.contains(&self.block_size) {
            self.block_size = defaults.block_size;
        }
        if self.memtable_max_entries == 0 {
            self.memtable_max_entries = defaults.memtable_max_entries;
        }
        if self.memtable_max_bytes == 0 {
            self.memtable_max_bytes = defaults.memtable_max_bytes;
        }
        if memtable_kind(&self.memtable_type).is_none() {
            self.memtable_type = defaults.memtable_type.clone();
        }
        if self.btree_degree < 2 {
            self.btree_degree = defaults.btree_degree;
        }
        if self.memtable_instances == 0 {
            self.memtable_instances = defaults.memtable_instances;
        }
        if self.summary_stride == 0 {
            self.summary_stride = defaults.summary_stride;
        }
        self
    }

    pub fn memtable_kind(&self) -> MemtableKind {
        memtable_kind(&self.memtable_type).unwrap_or(MemtableKind::HashMap)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    pub fn sstable_dir(&self) -> PathBuf {
        self.data_dir.join("sstable").join("level0")
    }
}

fn memtable_kind(name: &str) -> Option<MemtableKind> {
    match name {
        "hashmap" => Some(MemtableKind::HashMap),
        "skiplist" => Some(MemtableKind::SkipList),
        "btree" => Some(MemtableKind::BTree),
        _ => None,
    }
}
