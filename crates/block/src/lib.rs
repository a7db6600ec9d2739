//! # Block — fixed-size aligned I/O with a byte-bounded LRU cache
//!
//! Every SSTable artifact is read and written in fixed-size blocks
//! (4096 / 8192 / 16384 bytes). This crate provides the device layer the
//! SSTable code sits on:
//!
//! - [`BlockDevice::read_block`] — cached read of the n-th block; short
//!   reads past EOF are zero-padded to the full block size.
//! - [`BlockDevice::write_block`] / [`BlockDevice::append_block`] — full-block
//!   writes that refresh the cache.
//! - [`BlockDevice::read_at`] — uncached exact read, used only for the
//!   8-byte file headers.
//!
//! The cache maps `(path, block_no)` to the full block and is bounded by
//! **total buffered bytes**, not entry count. File handles are scoped to a
//! single call: opened on entry, closed on every exit path.

mod cache;

pub use cache::LruCache;

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced by the block device.
#[derive(Debug, Error)]
pub enum BlockError {
    /// An underlying I/O error, surfaced verbatim.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A file whose length is not a multiple of the block size was handed
    /// to an operation that enumerates blocks.
    #[error("unaligned file size {size} for {path} (block size {block_size})")]
    Unaligned {
        path: PathBuf,
        size: u64,
        block_size: usize,
    },

    /// `write_block`/`append_block` were given a buffer that is not exactly
    /// one block long.
    #[error("bad block length {len}, expected {block_size}")]
    BadLength { len: usize, block_size: usize },
}

pub type Result<T> = std::result::Result<T, BlockError>;

/// Cache key: the file plus the block number within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub path: PathBuf,
    pub block_no: u64,
}

/// Block-granular file access with a shared read cache.
///
/// One device is owned per engine; it is the only shared mutable structure
/// between the SSTable writer and reader.
pub struct BlockDevice {
    cache: LruCache<BlockKey, Vec<u8>>,
}

impl BlockDevice {
    /// `cache_capacity_bytes` bounds the total bytes buffered by the read
    /// cache. Zero disables caching.
    pub fn new(cache_capacity_bytes: usize) -> BlockDevice {
        BlockDevice {
            cache: LruCache::new(cache_capacity_bytes),
        }
    }

    /// Reads the `block_no`-th block of `path`. A read that runs past EOF
    /// returns the bytes that exist, zero-padded to `block_size`.
    pub fn read_block(&mut self, path: &Path, block_no: u64, block_size: usize) -> Result<Vec<u8>> {
        let key = BlockKey {
            path: path.to_path_buf(),
            block_no,
        };
        if let Some(data) = self.cache.get(&key) {
            return Ok(data.clone());
        }

        let mut file = OpenOptions::new().read(true).open(path)?;
        file.seek(SeekFrom::Start(block_no * block_size as u64))?;

        let mut buf = vec![0u8; block_size];
        let mut filled = 0;
        while filled < block_size {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        // bytes past EOF stay zero

        self.cache.insert(key, buf.clone(), block_size);
        Ok(buf)
    }

    /// Writes one full block at offset `block_no * block_size`, creating the
    /// file if absent, and refreshes the cache.
    pub fn write_block(
        &mut self,
        path: &Path,
        block_no: u64,
        data: &[u8],
        block_size: usize,
    ) -> Result<()> {
        if data.len() != block_size {
            return Err(BlockError::BadLength {
                len: data.len(),
                block_size,
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)?;
        file.seek(SeekFrom::Start(block_no * block_size as u64))?;
        file.write_all(data)?;

        self.cache.insert(
            BlockKey {
                path: path.to_path_buf(),
                block_no,
            },
            data.to_vec(),
            block_size,
        );
        Ok(())
    }

    /// Appends one full block and returns its index. The file's current
    /// length must already be block-aligned.
    pub fn append_block(&mut self, path: &Path, data: &[u8], block_size: usize) -> Result<u64> {
        if data.len() != block_size {
            return Err(BlockError::BadLength {
                len: data.len(),
                block_size,
            });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let size = file.seek(SeekFrom::End(0))?;
        if size % block_size as u64 != 0 {
            return Err(BlockError::Unaligned {
                path: path.to_path_buf(),
                size,
                block_size,
            });
        }
        file.write_all(data)?;

        let block_no = size / block_size as u64;
        self.cache.insert(
            BlockKey {
                path: path.to_path_buf(),
                block_no,
            },
            data.to_vec(),
            block_size,
        );
        Ok(block_no)
    }

    /// Uncached exact read of `len` bytes at `offset`. A short read is an
    /// I/O error; the cache is neither consulted nor populated.
    pub fn read_at(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Number of whole blocks in `path`. Missing file counts as zero blocks;
    /// an unaligned length is a fatal format error.
    pub fn block_count(path: &Path, block_size: usize) -> Result<u64> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BlockError::Io(e)),
        };
        if size % block_size as u64 != 0 {
            return Err(BlockError::Unaligned {
                path: path.to_path_buf(),
                size,
                block_size,
            });
        }
        Ok(size / block_size as u64)
    }

    /// `(hits, misses)` of the read cache since construction.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }
}
