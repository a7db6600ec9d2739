//! SSTable writer: turns one sorted flush batch into the
//! `.data`/`.index`/`.summary`/`.filter` artifact family.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use block::BlockDevice;
use record::{Fragment, Record};

use crate::format::{
    crc_offset, encode_file_header, payload_cap, put_uvarint, shared_prefix_len, uvarint_len,
    DATA_EXT, DATA_MAGIC, FILE_HEADER_BYTES, FILTER_EXT, FILTER_MAGIC, INDEX_EXT, INDEX_MAGIC,
    PAYLOAD_LEN_BYTES, SUMMARY_EXT, SUMMARY_MAGIC,
};
use crate::{Result, SstError};

/// False-positive rate for the advisory `.filter` sibling.
const FILTER_FPR: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct SstWriteOptions {
    pub block_size: usize,
    /// One summary entry per `stride` consecutive index entries.
    pub summary_stride: u64,
}

/// Writes SSTables through a shared [`BlockDevice`].
pub struct SstWriter<'d> {
    device: &'d mut BlockDevice,
    opts: SstWriteOptions,
}

/// Where each index entry landed, for summary sampling.
struct IndexLoc {
    key: Vec<u8>,
    index_block_no: u64,
}

impl<'d> SstWriter<'d> {
    pub fn new(device: &'d mut BlockDevice, opts: SstWriteOptions) -> SstWriter<'d> {
        SstWriter { device, opts }
    }

    /// Writes `records` — already in canonical flush order — as a new table
    /// under `dir`, returning the base path (no extension).
    pub fn write(&mut self, dir: &Path, records: &[Record]) -> Result<PathBuf> {
        if records.is_empty() {
            return Err(SstError::Format("refusing to write an empty sstable".into()));
        }
        for pair in records.windows(2) {
            if record::flush_cmp(&pair[0], &pair[1]) == std::cmp::Ordering::Greater {
                return Err(SstError::Format("flush batch is not sorted".into()));
            }
        }
        if records.iter().any(|r| r.key.is_empty()) {
            return Err(SstError::Format("record with empty key".into()));
        }

        std::fs::create_dir_all(dir)?;
        let base = reserve_base_name(dir)?;

        let first_keys = self.write_data(&base.with_extension(DATA_EXT), records)?;
        let locs = self.write_index(&base.with_extension(INDEX_EXT), &first_keys)?;

        let min_key = first_keys
            .iter()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_default();
        let max_key = records.last().map(|r| r.key.clone()).unwrap_or_default();
        self.write_summary(&base.with_extension(SUMMARY_EXT), &locs, &min_key, &max_key)?;

        self.write_filter(&base.with_extension(FILTER_EXT), records)?;

        Ok(base)
    }

    /// Writes the data file. Returns, per data block, the key of the first
    /// record *starting* in that block (`None` for blocks holding only
    /// continuation fragments).
    fn write_data(&mut self, path: &Path, records: &[Record]) -> Result<Vec<Option<Vec<u8>>>> {
        let block_size = self.opts.block_size;
        let mut bw = BlockFileWriter::new(&mut *self.device, path, block_size);
        bw.write(&encode_file_header(DATA_MAGIC, block_size));

        let mut first_keys: Vec<Option<Vec<u8>>> = vec![None];
        let mut prev_key: Vec<u8> = Vec::new();

        for r in records {
            if bw.at_block_start() {
                prev_key.clear();
            }
            let (mut encoded, mut header_len) = encode_record(&prev_key, r);

            // The header (everything up to the value bytes) must start and
            // end inside one block; restart in a fresh block if it cannot.
            if header_len > bw.remaining() {
                bw.seal_and_advance()?;
                first_keys.push(None);
                prev_key.clear();
                (encoded, header_len) = encode_record(&prev_key, r);
                if header_len > payload_cap(block_size) {
                    return Err(SstError::Capacity {
                        need: header_len,
                        cap: payload_cap(block_size),
                    });
                }
            }

            let block_no = bw.block_no() as usize;
            if first_keys[block_no].is_none() {
                first_keys[block_no] = Some(r.key.clone());
            }

            if encoded.len() <= bw.remaining() {
                bw.write(&encoded);
                prev_key.clear();
                prev_key.extend_from_slice(&r.key);
                continue;
            }

            write_fragmented(&mut bw, &mut first_keys, encoded)?;
            // prefix compression resets after a fragmented record
            prev_key.clear();
        }

        let blocks = bw.finish()? as usize;
        first_keys.truncate(blocks);
        Ok(first_keys)
    }

    fn write_index(
        &mut self,
        path: &Path,
        first_keys: &[Option<Vec<u8>>],
    ) -> Result<Vec<IndexLoc>> {
        let block_size = self.opts.block_size;
        let mut bw = BlockFileWriter::new(&mut *self.device, path, block_size);
        bw.write(&encode_file_header(INDEX_MAGIC, block_size));

        let mut locs = Vec::new();
        let mut prev_key: Vec<u8> = Vec::new();

        for (block_no, first_key) in first_keys.iter().enumerate() {
            let Some(key) = first_key else {
                continue; // block holds only continuation fragments
            };

            if bw.at_block_start() {
                prev_key.clear();
            }
            let mut entry = encode_prefixed_entry(&prev_key, key, block_no as u64);
            if entry.len() > bw.remaining() {
                bw.seal_and_advance()?;
                prev_key.clear();
                entry = encode_prefixed_entry(&prev_key, key, block_no as u64);
                if entry.len() > payload_cap(block_size) {
                    return Err(SstError::Capacity {
                        need: entry.len(),
                        cap: payload_cap(block_size),
                    });
                }
            }

            locs.push(IndexLoc {
                key: key.clone(),
                index_block_no: bw.block_no(),
            });
            bw.write(&entry);
            prev_key.clear();
            prev_key.extend_from_slice(key);
        }

        bw.finish()?;
        Ok(locs)
    }

    fn write_summary(
        &mut self,
        path: &Path,
        locs: &[IndexLoc],
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<()> {
        let block_size = self.opts.block_size;
        let mut bw = BlockFileWriter::new(&mut *self.device, path, block_size);

        let mut head = Vec::with_capacity(FILE_HEADER_BYTES + 20 + min_key.len() + max_key.len());
        head.extend_from_slice(&encode_file_header(SUMMARY_MAGIC, block_size));
        put_uvarint(&mut head, self.opts.summary_stride);
        put_uvarint(&mut head, min_key.len() as u64);
        head.extend_from_slice(min_key);
        put_uvarint(&mut head, max_key.len() as u64);
        head.extend_from_slice(max_key);
        if head.len() > payload_cap(block_size) {
            return Err(SstError::Capacity {
                need: head.len(),
                cap: payload_cap(block_size),
            });
        }
        bw.write(&head);

        let mut prev_key: Vec<u8> = Vec::new();
        let stride = self.opts.summary_stride.max(1) as usize;

        for loc in locs.iter().step_by(stride) {
            if bw.at_block_start() {
                prev_key.clear();
            }
            let mut entry = encode_prefixed_entry(&prev_key, &loc.key, loc.index_block_no);
            if entry.len() > bw.remaining() {
                bw.seal_and_advance()?;
                prev_key.clear();
                entry = encode_prefixed_entry(&prev_key, &loc.key, loc.index_block_no);
                if entry.len() > payload_cap(block_size) {
                    return Err(SstError::Capacity {
                        need: entry.len(),
                        cap: payload_cap(block_size),
                    });
                }
            }
            bw.write(&entry);
            prev_key.clear();
            prev_key.extend_from_slice(&loc.key);
        }

        bw.finish()?;
        Ok(())
    }

    fn write_filter(&mut self, path: &Path, records: &[Record]) -> Result<()> {
        let block_size = self.opts.block_size;
        let filter = bloom::Filter::from_keys(
            records.iter().map(|r| r.key.as_slice()),
            records.len(),
            FILTER_FPR,
        );

        let mut bw = BlockFileWriter::new(&mut *self.device, path, block_size);
        bw.write(&encode_file_header(FILTER_MAGIC, block_size));
        bw.write_spanning(&filter.encode())?;
        bw.finish()?;
        Ok(())
    }
}

/// Base name `sst_<nanos>`. Newer tables must sort after older ones, so the
/// timestamp is floored above the newest existing table (a wall clock can
/// step backwards) and bumps until the name is free.
fn reserve_base_name(dir: &Path) -> Result<PathBuf> {
    let mut nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SstError::Format(format!("system clock before epoch: {e}")))?
        .as_nanos();

    if let Some(newest) = crate::reader::list_tables_newest_first(dir)?.first() {
        let ts: u128 = newest
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("sst_"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        nanos = nanos.max(ts + 1);
    }

    loop {
        let base = dir.join(format!("sst_{nanos}"));
        if !base.with_extension(DATA_EXT).exists() {
            return Ok(base);
        }
        nanos += 1;
    }
}

/// Writes an encoded record that does not fit the current block: a FIRST
/// fragment fills it, then maximal MIDDLE chunks, then one LAST.
fn write_fragmented(
    bw: &mut BlockFileWriter<'_>,
    first_keys: &mut Vec<Option<Vec<u8>>>,
    mut encoded: Vec<u8>,
) -> Result<()> {
    let split = bw.remaining();
    encoded[0] = Fragment::First.apply(encoded[0]);
    bw.write(&encoded[..split]);
    bw.seal_and_advance()?;
    first_keys.push(None);

    let mut rest = &encoded[split..];
    loop {
        let space = bw.remaining();
        if 1 + uvarint_len(rest.len() as u64) + rest.len() <= space {
            let mut tail = Vec::with_capacity(11 + rest.len());
            tail.push(Fragment::Last as u8);
            put_uvarint(&mut tail, rest.len() as u64);
            tail.extend_from_slice(rest);
            bw.write(&tail);
            return Ok(());
        }

        // MIDDLE: the largest chunk whose framing still fits the block
        let mut chunk = (space - 1).min(rest.len());
        while chunk > 0 && 1 + uvarint_len(chunk as u64) + chunk > space {
            chunk -= 1;
        }
        debug_assert!(chunk > 0);

        let mut mid = Vec::with_capacity(11 + chunk);
        mid.push(Fragment::Middle as u8);
        put_uvarint(&mut mid, chunk as u64);
        mid.extend_from_slice(&rest[..chunk]);
        bw.write(&mid);
        rest = &rest[chunk..];

        bw.seal_and_advance()?;
        first_keys.push(None);
    }
}

/// Encodes one record against `prev_key`. Returns the bytes and the header
/// length (everything before the value bytes).
fn encode_record(prev_key: &[u8], r: &Record) -> (Vec<u8>, usize) {
    let shared = shared_prefix_len(prev_key, &r.key);
    let suffix = &r.key[shared..];
    let value: &[u8] = if r.tombstone { &[] } else { &r.value };

    let mut buf = Vec::with_capacity(41 + suffix.len() + value.len());
    buf.push(r.flags());
    put_uvarint(&mut buf, r.expires_at);
    put_uvarint(&mut buf, shared as u64);
    put_uvarint(&mut buf, suffix.len() as u64);
    buf.extend_from_slice(suffix);
    put_uvarint(&mut buf, r.seq);
    put_uvarint(&mut buf, value.len() as u64);
    let header_len = buf.len();
    buf.extend_from_slice(value);
    (buf, header_len)
}

/// Index and summary entries share one shape:
/// `[shared][suffix_len][suffix][block_no]`, all uvarints.
fn encode_prefixed_entry(prev_key: &[u8], key: &[u8], block_no: u64) -> Vec<u8> {
    let shared = shared_prefix_len(prev_key, key);
    let suffix = &key[shared..];

    let mut buf = Vec::with_capacity(30 + suffix.len());
    put_uvarint(&mut buf, shared as u64);
    put_uvarint(&mut buf, suffix.len() as u64);
    buf.extend_from_slice(suffix);
    put_uvarint(&mut buf, block_no);
    buf
}

/// Assembles one file block by block: payload bytes accumulate in a buffer
/// sized to the block, and sealing stamps the payload length and CRC before
/// handing the block to the device.
struct BlockFileWriter<'a> {
    device: &'a mut BlockDevice,
    path: PathBuf,
    block_size: usize,
    buf: Vec<u8>,
    block_no: u64,
    pos: usize,
    sealed: u64,
}

impl<'a> BlockFileWriter<'a> {
    fn new(device: &'a mut BlockDevice, path: &Path, block_size: usize) -> BlockFileWriter<'a> {
        BlockFileWriter {
            device,
            path: path.to_path_buf(),
            block_size,
            buf: vec![0u8; block_size],
            block_no: 0,
            pos: PAYLOAD_LEN_BYTES,
            sealed: 0,
        }
    }

    fn block_no(&self) -> u64 {
        self.block_no
    }

    fn at_block_start(&self) -> bool {
        self.pos == PAYLOAD_LEN_BYTES
    }

    /// Payload bytes still available in the current block.
    fn remaining(&self) -> usize {
        crc_offset(self.block_size) - self.pos
    }

    /// Writes bytes the caller has already checked to fit the current block.
    fn write(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.remaining());
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Writes an opaque byte run, spilling across as many blocks as needed.
    fn write_spanning(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            if self.remaining() == 0 {
                self.seal_and_advance()?;
            }
            let take = bytes.len().min(self.remaining());
            let (head, tail) = bytes.split_at(take);
            self.write(head);
            bytes = tail;
        }
        Ok(())
    }

    /// Stamps payload length + CRC, appends the block, and starts a new one.
    fn seal_and_advance(&mut self) -> Result<()> {
        self.seal()?;
        self.block_no += 1;
        self.buf.iter_mut().for_each(|b| *b = 0);
        self.pos = PAYLOAD_LEN_BYTES;
        Ok(())
    }

    /// Seals the tail block and returns the total block count. A tail block
    /// holding no payload is not written.
    fn finish(mut self) -> Result<u64> {
        if self.pos > PAYLOAD_LEN_BYTES {
            self.seal()?;
        }
        Ok(self.sealed)
    }

    fn seal(&mut self) -> Result<()> {
        let payload_len = (self.pos - PAYLOAD_LEN_BYTES) as u32;
        self.buf[0..PAYLOAD_LEN_BYTES].copy_from_slice(&payload_len.to_le_bytes());

        let crc_at = crc_offset(self.block_size);
        let crc = crc32fast::hash(&self.buf[..crc_at]);
        self.buf[crc_at..].copy_from_slice(&crc.to_le_bytes());

        let appended = self
            .device
            .append_block(&self.path, &self.buf, self.block_size)?;
        debug_assert_eq!(appended, self.block_no);
        let _ = appended;
        self.sealed = self.block_no + 1;
        Ok(())
    }
}
