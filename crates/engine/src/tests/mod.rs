mod recovery_tests;
mod write_tests;

use std::path::Path;

use crate::{Config, Engine};

/// Small limits so tests can force rotation and flushes cheaply.
pub(crate) fn test_config(data_dir: &Path, max_entries: usize, instances: usize) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        memtable_max_entries: max_entries,
        memtable_instances: instances,
        summary_stride: 2,
        cache_size: 256 * 1024,
        ..Config::default()
    }
}

pub(crate) fn engine(data_dir: &Path, max_entries: usize, instances: usize) -> Engine {
    Engine::new(test_config(data_dir, max_entries, instances), false).expect("engine")
}
