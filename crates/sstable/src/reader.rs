//! SSTable reader: newest-first point lookup and merge-operand scans.
//!
//! A lookup descends summary → index → data. The summary bounds the search
//! with `min_key`/`max_key` and picks the index block to start from; the
//! index picks the data block; the data walk decodes records (prefix
//! compression, fragment reassembly) until a key greater than the target
//! proves the scan done.

use std::path::{Path, PathBuf};

use block::BlockDevice;
use byteorder::{ByteOrder, LittleEndian};
use record::{Fragment, Record, RecordKind, Structure};
use tracing::debug;

use crate::format::{
    checked_len, decode_file_header, payload_cap, read_uvarint, DATA_EXT, DATA_MAGIC, FILTER_EXT,
    FILTER_MAGIC, FILE_HEADER_BYTES, INDEX_EXT, INDEX_MAGIC, PAYLOAD_LEN_BYTES, SUMMARY_EXT,
    SUMMARY_MAGIC,
};
use crate::{Result, SstError};

/// Lists table base paths under `dir`, newest first.
///
/// Only base names whose `.data`, `.index`, and `.summary` siblings all
/// exist are returned — an incomplete triplet is an interrupted flush and is
/// ignored. Ordering is by the embedded nanosecond timestamp descending,
/// ties broken by name descending.
pub fn list_tables_newest_first(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SstError::Io(e)),
    };

    let mut tables: Vec<(u128, String, PathBuf)> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(&format!(".{DATA_EXT}")) else {
            continue;
        };
        if !stem.starts_with("sst_") {
            continue;
        }
        let base = dir.join(stem);
        if !base.with_extension(INDEX_EXT).exists() || !base.with_extension(SUMMARY_EXT).exists() {
            continue;
        }
        let ts: u128 = stem["sst_".len()..].parse().unwrap_or(0);
        tables.push((ts, stem.to_string(), base));
    }

    tables.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(tables.into_iter().map(|(_, _, base)| base).collect())
}

/// How the data-walk anchor is chosen among the entries below the target.
///
/// Point lookups take the *last* entry strictly below the key. Merge-operand
/// scans take the *first*, so a duplicate run beginning in a preceding
/// block's tail is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    LastBelow,
    FirstBelow,
}

/// Reads SSTables through a shared [`BlockDevice`].
pub struct SstReader<'d> {
    device: &'d mut BlockDevice,
}

impl<'d> SstReader<'d> {
    pub fn new(device: &'d mut BlockDevice) -> SstReader<'d> {
        SstReader { device }
    }

    /// Point lookup across every table under `dir`, newest first.
    ///
    /// The first table containing a KV record for `key` decides: a live
    /// value is returned, a tombstoned or expired hit shadows everything
    /// older and yields `None`.
    pub fn get(&mut self, dir: &Path, key: &[u8], now: u64) -> Result<Option<Vec<u8>>> {
        for base in list_tables_newest_first(dir)? {
            if !self.filter_may_contain(&base, key) {
                continue;
            }
            let records = self.scan_table_for_key(&base, key, Anchor::LastBelow)?;
            let best = records
                .into_iter()
                .filter(|r| r.kind == RecordKind::Kv)
                .max_by_key(|r| r.seq);
            if let Some(rec) = best {
                if rec.tombstone || rec.is_expired(now) {
                    return Ok(None);
                }
                return Ok(Some(rec.value));
            }
        }
        Ok(None)
    }

    /// All non-expired merge operands for `(structure, key)` across every
    /// table, ordered (seq, op, value).
    pub fn get_merge_operands(
        &mut self,
        dir: &Path,
        structure: Structure,
        key: &[u8],
        now: u64,
    ) -> Result<Vec<Record>> {
        let mut ops = Vec::new();
        for base in list_tables_newest_first(dir)? {
            if !self.filter_may_contain(&base, key) {
                continue;
            }
            let records = self.scan_table_for_key(&base, key, Anchor::FirstBelow)?;
            ops.extend(records.into_iter().filter(|r| {
                r.kind == RecordKind::MergeOperand
                    && r.structure == structure
                    && matches!(r.op, record::MergeOp::Add | record::MergeOp::Remove)
                    && !r.is_expired(now)
            }));
        }
        ops.sort_by(record::operand_cmp);
        Ok(ops)
    }

    /// Every record in one table whose key equals `key`, in file order.
    fn scan_table_for_key(&mut self, base: &Path, key: &[u8], anchor: Anchor) -> Result<Vec<Record>> {
        let data_path = base.with_extension(DATA_EXT);
        let index_path = base.with_extension(INDEX_EXT);
        let summary_path = base.with_extension(SUMMARY_EXT);

        let data_hdr = read_file_header(&data_path, DATA_MAGIC)?;
        let index_hdr = read_file_header(&index_path, INDEX_MAGIC)?;
        let summary_hdr = read_file_header(&summary_path, SUMMARY_MAGIC)?;

        let summary = self.read_summary(&summary_path, summary_hdr.block_size, key)?;
        if !summary.covers(key) {
            return Ok(Vec::new());
        }

        let start_index_block = match anchor {
            Anchor::LastBelow => summary
                .entries
                .iter()
                .rev()
                .find(|e| e.key.as_slice() < key)
                .map_or(0, |e| e.block_no),
            Anchor::FirstBelow => summary
                .entries
                .iter()
                .find(|e| e.key.as_slice() < key)
                .map_or(0, |e| e.block_no),
        };

        let index_entries =
            self.read_index_entries(&index_path, index_hdr.block_size, start_index_block, key)?;

        let start_data_block = match anchor {
            Anchor::LastBelow => index_entries
                .iter()
                .rev()
                .find(|e| e.key.as_slice() < key)
                .map_or(0, |e| e.block_no),
            Anchor::FirstBelow => index_entries
                .iter()
                .find(|e| e.key.as_slice() < key)
                .map_or(0, |e| e.block_no),
        };

        let data_blocks = BlockDevice::block_count(&data_path, data_hdr.block_size)?;
        if start_data_block >= data_blocks {
            return Err(SstError::Format(format!(
                "index points at data block {start_data_block} of {data_blocks} in {}",
                data_path.display()
            )));
        }

        self.scan_data(&data_path, data_hdr.block_size, start_data_block, data_blocks, key)
    }

    /// Highest sequence number stored in the newest table under `dir`, or 0
    /// with no tables. Flush order guarantees the newest table carries the
    /// highest flushed seq, so one table bounds them all.
    pub fn max_seq(&mut self, dir: &Path) -> Result<u64> {
        let Some(base) = list_tables_newest_first(dir)?.into_iter().next() else {
            return Ok(0);
        };
        let data_path = base.with_extension(DATA_EXT);
        let hdr = read_file_header(&data_path, DATA_MAGIC)?;
        let blocks = BlockDevice::block_count(&data_path, hdr.block_size)?;

        let mut max = 0u64;
        self.walk_data(&data_path, hdr.block_size, 0, blocks, &mut |rec| {
            max = max.max(rec.seq);
            ScanStep::Continue
        })?;
        Ok(max)
    }

    /// Walks data blocks from `start_block`, collecting the records whose
    /// key matches. Stops as soon as a decoded key exceeds the target.
    fn scan_data(
        &mut self,
        path: &Path,
        block_size: usize,
        start_block: u64,
        end_block: u64,
        target: &[u8],
    ) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        self.walk_data(path, block_size, start_block, end_block, &mut |rec| {
            keep_or_stop(&mut out, rec, target)
        })?;
        Ok(out)
    }

    /// Walks data blocks from `start_block`, decoding every record (prefix
    /// compression, fragment reassembly) and feeding it to `visit` until the
    /// visitor stops the scan or the range ends.
    fn walk_data(
        &mut self,
        path: &Path,
        block_size: usize,
        start_block: u64,
        end_block: u64,
        visit: &mut dyn FnMut(Record) -> ScanStep,
    ) -> Result<()> {
        let mut prev_key: Vec<u8> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        // Fragments at the head of the anchor block belong to a record that
        // started before it; its key is below the anchor key, so the spill
        // is skipped rather than reassembled.
        let mut skipping_spill = true;

        'blocks: for block_no in start_block..end_block {
            let payload = self.read_payload(path, block_size, block_no)?;
            let mut off = 0;
            if block_no == 0 {
                decode_file_header(&payload, DATA_MAGIC)?;
                off = FILE_HEADER_BYTES;
            }

            while off < payload.len() {
                let frag = Fragment::from_flags(payload[off]);

                if !pending.is_empty() {
                    match frag {
                        Fragment::Middle | Fragment::Last => {}
                        _ => {
                            return Err(SstError::Format(format!(
                                "missing LAST fragment in {} block {block_no}",
                                path.display()
                            )))
                        }
                    }
                    off += 1;
                    let declared = read_uvarint(&payload, &mut off)?;
                    let chunk = checked_len(declared, payload.len() - off, "fragment chunk")?;
                    pending.extend_from_slice(&payload[off..off + chunk]);
                    off += chunk;

                    if frag == Fragment::Last {
                        let (rec, consumed) = decode_record(&pending, &prev_key)?;
                        if consumed != pending.len() {
                            return Err(SstError::Format(format!(
                                "reassembled fragment has {} trailing bytes in {}",
                                pending.len() - consumed,
                                path.display()
                            )));
                        }
                        pending.clear();
                        prev_key.clear();
                        prev_key.extend_from_slice(&rec.key);
                        match visit(rec) {
                            ScanStep::Continue => {}
                            ScanStep::Done => break 'blocks,
                        }
                    }
                    continue;
                }

                match frag {
                    Fragment::Full => {
                        let (rec, consumed) = decode_record(&payload[off..], &prev_key)?;
                        off += consumed;
                        skipping_spill = false;
                        prev_key.clear();
                        prev_key.extend_from_slice(&rec.key);
                        match visit(rec) {
                            ScanStep::Continue => {}
                            ScanStep::Done => break 'blocks,
                        }
                    }
                    Fragment::First => {
                        // a FIRST fragment fills the rest of the payload
                        pending.extend_from_slice(&payload[off..]);
                        off = payload.len();
                        skipping_spill = false;
                    }
                    Fragment::Middle | Fragment::Last => {
                        if !skipping_spill {
                            return Err(SstError::Format(format!(
                                "continuation fragment without FIRST in {} block {block_no}",
                                path.display()
                            )));
                        }
                        off += 1;
                        let declared = read_uvarint(&payload, &mut off)?;
                        let chunk = checked_len(declared, payload.len() - off, "spill chunk")?;
                        off += chunk;
                    }
                }
            }
        }

        if !pending.is_empty() {
            return Err(SstError::Format(format!(
                "unterminated fragmented record in {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn read_summary(&mut self, path: &Path, block_size: usize, target: &[u8]) -> Result<Summary> {
        let blocks = BlockDevice::block_count(path, block_size)?;
        if blocks == 0 {
            return Err(SstError::Format(format!("empty summary file {}", path.display())));
        }

        let payload = self.read_payload(path, block_size, 0)?;
        decode_file_header(&payload, SUMMARY_MAGIC)?;
        let mut off = FILE_HEADER_BYTES;

        let stride = read_uvarint(&payload, &mut off)?;
        if stride == 0 {
            return Err(SstError::Format(format!(
                "zero summary stride in {}",
                path.display()
            )));
        }
        let min_len = read_uvarint(&payload, &mut off)?;
        let min_len = checked_len(min_len, payload.len() - off, "summary min_key")?;
        let min_key = payload[off..off + min_len].to_vec();
        off += min_len;
        let max_len = read_uvarint(&payload, &mut off)?;
        let max_len = checked_len(max_len, payload.len() - off, "summary max_key")?;
        let max_key = payload[off..off + max_len].to_vec();
        off += max_len;

        let mut summary = Summary {
            min_key,
            max_key,
            entries: Vec::new(),
        };
        if !summary.covers(target) {
            return Ok(summary);
        }

        let mut prev_key: Vec<u8> = Vec::new();
        let mut done = decode_entries(&payload, off, target, &mut prev_key, &mut summary.entries)?;
        let mut block_no = 1;
        while !done && block_no < blocks {
            let payload = self.read_payload(path, block_size, block_no)?;
            done = decode_entries(&payload, 0, target, &mut prev_key, &mut summary.entries)?;
            block_no += 1;
        }
        Ok(summary)
    }

    fn read_index_entries(
        &mut self,
        path: &Path,
        block_size: usize,
        start_block: u64,
        target: &[u8],
    ) -> Result<Vec<Entry>> {
        let blocks = BlockDevice::block_count(path, block_size)?;
        let mut entries = Vec::new();
        let mut prev_key: Vec<u8> = Vec::new();

        for block_no in start_block..blocks {
            let payload = self.read_payload(path, block_size, block_no)?;
            let start = if block_no == 0 {
                decode_file_header(&payload, INDEX_MAGIC)?;
                FILE_HEADER_BYTES
            } else {
                0
            };
            if decode_entries(&payload, start, target, &mut prev_key, &mut entries)? {
                break;
            }
        }
        Ok(entries)
    }

    /// Verifies one block's CRC and returns its payload bytes.
    fn read_payload(&mut self, path: &Path, block_size: usize, block_no: u64) -> Result<Vec<u8>> {
        let raw = self.device.read_block(path, block_no, block_size)?;

        let stored = LittleEndian::read_u32(&raw[block_size - 4..]);
        let actual = crc32fast::hash(&raw[..block_size - 4]);
        if stored != actual {
            return Err(SstError::Integrity {
                path: path.to_path_buf(),
                block_no,
            });
        }

        let payload_len = LittleEndian::read_u32(&raw[..PAYLOAD_LEN_BYTES]) as usize;
        if payload_len > payload_cap(block_size) {
            return Err(SstError::Format(format!(
                "payload length {payload_len} exceeds capacity in {} block {block_no}",
                path.display()
            )));
        }
        Ok(raw[PAYLOAD_LEN_BYTES..PAYLOAD_LEN_BYTES + payload_len].to_vec())
    }

    /// Advisory bloom check. Any failure to load the filter means "maybe".
    fn filter_may_contain(&mut self, base: &Path, key: &[u8]) -> bool {
        match self.load_filter(&base.with_extension(FILTER_EXT)) {
            Ok(filter) => filter.may_contain(key),
            Err(e) => {
                debug!(base = %base.display(), error = %e, "filter unavailable, scanning table");
                true
            }
        }
    }

    fn load_filter(&mut self, path: &Path) -> Result<bloom::Filter> {
        let hdr = read_file_header(path, FILTER_MAGIC)?;
        let blocks = BlockDevice::block_count(path, hdr.block_size)?;

        let mut bytes = Vec::new();
        for block_no in 0..blocks {
            let payload = self.read_payload(path, hdr.block_size, block_no)?;
            let start = if block_no == 0 { FILE_HEADER_BYTES } else { 0 };
            bytes.extend_from_slice(&payload[start..]);
        }
        bloom::Filter::decode(&bytes)
            .ok_or_else(|| SstError::Format(format!("undecodable filter {}", path.display())))
    }
}

struct Summary {
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    entries: Vec<Entry>,
}

impl Summary {
    fn covers(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

struct Entry {
    key: Vec<u8>,
    block_no: u64,
}

enum ScanStep {
    Continue,
    Done,
}

fn keep_or_stop(out: &mut Vec<Record>, rec: Record, target: &[u8]) -> ScanStep {
    match rec.key.as_slice().cmp(target) {
        std::cmp::Ordering::Less => ScanStep::Continue,
        std::cmp::Ordering::Equal => {
            out.push(rec);
            ScanStep::Continue
        }
        std::cmp::Ordering::Greater => ScanStep::Done,
    }
}

/// Decodes prefix-compressed index/summary entries from `payload[start..]`,
/// appending to `entries`. Returns `true` once a key above the target proves
/// the remaining entries irrelevant.
fn decode_entries(
    payload: &[u8],
    start: usize,
    target: &[u8],
    prev_key: &mut Vec<u8>,
    entries: &mut Vec<Entry>,
) -> Result<bool> {
    let mut off = start;
    while off < payload.len() {
        let shared = read_uvarint(payload, &mut off)?;
        if shared > prev_key.len() as u64 {
            return Err(SstError::Format(format!(
                "shared prefix {shared} exceeds previous key length {}",
                prev_key.len()
            )));
        }
        let suffix_len = read_uvarint(payload, &mut off)?;
        let suffix_len = checked_len(suffix_len, payload.len() - off, "entry suffix")?;

        let mut key = prev_key[..shared as usize].to_vec();
        key.extend_from_slice(&payload[off..off + suffix_len]);
        off += suffix_len;

        let block_no = read_uvarint(payload, &mut off)?;

        prev_key.clear();
        prev_key.extend_from_slice(&key);

        if key.as_slice() > target {
            return Ok(true);
        }
        entries.push(Entry { key, block_no });
    }
    Ok(false)
}

/// Decodes one data record from `buf` against `prev_key`, returning the
/// record and the bytes consumed.
fn decode_record(buf: &[u8], prev_key: &[u8]) -> Result<(Record, usize)> {
    if buf.is_empty() {
        return Err(SstError::Format("empty record buffer".into()));
    }
    let mut off = 0;
    let flags = buf[off];
    off += 1;
    let (tombstone, kind, structure, op) = Record::unpack_flags(flags)
        .ok_or_else(|| SstError::Format(format!("invalid record flags {flags:#04x}")))?;

    let expires_at = read_uvarint(buf, &mut off)?;
    let shared = read_uvarint(buf, &mut off)?;
    if shared > prev_key.len() as u64 {
        return Err(SstError::Format(format!(
            "shared prefix {shared} exceeds previous key length {}",
            prev_key.len()
        )));
    }
    let suffix_len = read_uvarint(buf, &mut off)?;
    let suffix_len = checked_len(suffix_len, buf.len() - off, "key suffix")?;

    let mut key = prev_key[..shared as usize].to_vec();
    key.extend_from_slice(&buf[off..off + suffix_len]);
    off += suffix_len;

    let seq = read_uvarint(buf, &mut off)?;
    let value_len = read_uvarint(buf, &mut off)?;
    let value_len = checked_len(value_len, buf.len() - off, "value")?;
    let value = buf[off..off + value_len].to_vec();
    off += value_len;

    let rec = Record {
        key,
        value,
        tombstone,
        seq,
        expires_at,
        kind,
        structure,
        op,
    };
    Ok((rec, off))
}

fn read_file_header(path: &Path, magic: [u8; 4]) -> Result<crate::format::FileHeader> {
    // the 8 header bytes sit just past the block's payload_len field
    let raw = BlockDevice::read_at(path, PAYLOAD_LEN_BYTES as u64, FILE_HEADER_BYTES)?;
    decode_file_header(&raw, magic)
}
