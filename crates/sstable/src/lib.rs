//! # SSTable — immutable, block-framed sorted tables
//!
//! When a memtable freezes, its sorted batch is flushed to an SSTable: a
//! triplet of write-once files sharing a base name `sst_<nanos>`, plus an
//! advisory bloom sibling.
//!
//! ## Artifact layout
//!
//! ```text
//! <dir>/sst_<nanos>.data      sorted records, prefix-compressed, fragmented
//! <dir>/sst_<nanos>.index     first key of every data block -> data block no
//! <dir>/sst_<nanos>.summary   stride, min/max key, every stride-th index entry
//! <dir>/sst_<nanos>.filter    bloom filter over the table's keys (advisory)
//! ```
//!
//! Every file is a sequence of fixed-size blocks:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ payload_len: u32 LE │ payload ... │ zero pad │ crc32: u32 LE│
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! with the CRC covering everything before it, and block 0's payload opening
//! with `magic[4] || block_size: u16 || flags: u16` (`DATA`, `INDX`, `SUMM`,
//! `FLTR`).
//!
//! Data records are prefix-compressed against the previous key (full key at
//! each block start) and fragmented across blocks when they do not fit:
//! a FIRST fragment fills the block, MIDDLE/LAST continuations carry
//! `[flags][chunk_len uvarint][chunk]`, and reassembly is byte-identical to
//! the unfragmented encoding.
//!
//! A reader only considers base names whose `.data`/`.index`/`.summary`
//! triplet is complete, newest first. Point lookups descend
//! summary → index → data; a tombstoned or expired hit means "absent", and
//! a hit in a newer table shadows all older ones.

mod format;
mod reader;
mod writer;

pub use format::{
    BLOCK_SIZES, DATA_EXT, DATA_MAGIC, FILTER_EXT, FILTER_MAGIC, INDEX_EXT, INDEX_MAGIC,
    SUMMARY_EXT, SUMMARY_MAGIC,
};
pub use reader::{list_tables_newest_first, SstReader};
pub use writer::{SstWriteOptions, SstWriter};

use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy of the SSTable layer.
///
/// Absence is not an error — lookups return `Ok(None)` / an empty vec.
/// Nothing here is retried.
#[derive(Debug, Error)]
pub enum SstError {
    /// Operating-system error, surfaced verbatim.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid bytes: bad magic, invalid payload length, varint
    /// decoding failure, out-of-range shared prefix or chunk length,
    /// fragment discipline violation, unaligned file size.
    #[error("format error: {0}")]
    Format(String),

    /// A block whose CRC does not match its contents.
    #[error("crc mismatch in {path} block {block_no}")]
    Integrity { path: PathBuf, block_no: u64 },

    /// A record header or index/summary entry that cannot fit in a single
    /// block's payload, detected at write time.
    #[error("entry of {need} bytes exceeds single-block payload capacity {cap}")]
    Capacity { need: usize, cap: usize },
}

impl From<block::BlockError> for SstError {
    fn from(err: block::BlockError) -> SstError {
        match err {
            block::BlockError::Io(e) => SstError::Io(e),
            other => SstError::Format(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SstError>;

#[cfg(test)]
mod tests;
