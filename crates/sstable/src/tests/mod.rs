
use std::path::{Path, PathBuf};

use block::BlockDevice;
use record::Record;
use tempfile::TempDir;

use crate::{SstWriteOptions, SstWriter};

pub(crate) const BLOCK: usize = 4096;

pub(crate) fn temp() -> TempDir {
    TempDir::new().expect("tempdir")
}

pub(crate) fn device() -> BlockDevice {
    BlockDevice::new(1 << 20)
}

pub(crate) fn opts() -> SstWriteOptions {
    SstWriteOptions {
        block_size: BLOCK,
        summary_stride: 2,
    }
}

/// Sorts into canonical flush order and writes one table.
pub(crate) fn write_table(
    device: &mut BlockDevice,
    dir: &Path,
    mut records: Vec<Record>,
) -> PathBuf {
    records.sort_by(record::flush_cmp);
    SstWriter::new(device, opts())
        .write(dir, &records)
        .expect("write sstable")
}

pub(crate) fn kv_batch(n: usize, value_len: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::kv(
                format!("key{i:06}").into_bytes(),
                vec![b'a' + (i % 26) as u8; value_len],
                i as u64 + 1,
            )
        })
        .collect()
}
