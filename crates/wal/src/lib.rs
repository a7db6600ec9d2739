//! # WAL — Write-Ahead Log
//!
//! Durability collaborator for the StrataKV engine: every mutation is
//! appended here **before** the memtable sees it, and replay yields the
//! appended records in order.
//!
//! ## Binary record format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body: `[seq: u64][expires_at: u64][flags: u8][key_len: u32][key]
//! [val_len: u32][value]`, where `flags` is the record model's packed tag
//! byte (fragment bits zero). `record_len` includes the 4-byte CRC but not
//! itself; the CRC covers the body.
//!
//! A truncated tail record (crash mid-write) is treated as a clean EOF;
//! every fully-written record before it is still replayed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use record::Record;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or carried invalid tag bits.
    #[error("corrupt record")]
    Corrupt,
}

/// Safety cap on a single record frame; anything larger is corruption.
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Append-only WAL writer.
///
/// Records are serialized into a reusable scratch buffer, CRC-checksummed,
/// and written with a single `write_all`. With `sync = true` every append is
/// followed by `sync_all()` so the record is durable before the call
/// returns.
pub struct WalWriter {
    file: File,
    sync: bool,
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Serializes `record` and appends it to the WAL file.
    pub fn append(&mut self, record: &Record) -> Result<(), WalError> {
        self.buf.clear();

        // Reserve the 8-byte frame header (record_len + crc), filled below.
        self.buf.extend_from_slice(&[0u8; 8]);

        self.buf.write_u64::<LittleEndian>(record.seq)?;
        self.buf.write_u64::<LittleEndian>(record.expires_at)?;
        self.buf.write_u8(record.flags())?;
        self.buf.write_u32::<LittleEndian>(record.key.len() as u32)?;
        self.buf.extend_from_slice(&record.key);
        self.buf.write_u32::<LittleEndian>(record.value.len() as u32)?;
        self.buf.extend_from_slice(&record.value);

        let body = &self.buf[8..];
        let mut hasher = Crc32::new();
        hasher.update(body);
        let crc = hasher.finalize();

        let record_len = (body.len() as u64) + 4;
        if record_len > u64::from(u32::MAX) {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAL record too large",
            )));
        }

        let len_bytes = (record_len as u32).to_le_bytes();
        let crc_bytes = crc.to_le_bytes();
        self.buf[0..4].copy_from_slice(&len_bytes);
        self.buf[4..8].copy_from_slice(&crc_bytes);

        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Forces buffered data onto disk. Useful with `sync = false` when the
    /// caller wants durability at a batch boundary.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record in append order, calling `visit` for each.
    ///
    /// - Clean EOF or a truncated tail record → `Ok(())`.
    /// - CRC mismatch, invalid tag bits, or absurd lengths → `WalError::Corrupt`.
    pub fn replay<F>(&mut self, mut visit: F) -> Result<(), WalError>
    where
        F: FnMut(Record),
    {
        let mut body = Vec::with_capacity(256);

        loop {
            let record_len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };
            if record_len <= 4 || record_len > MAX_RECORD_SIZE {
                return Err(WalError::Corrupt);
            }

            let crc = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            let body_len = (record_len - 4) as usize;
            body.clear();
            body.resize(body_len, 0);
            match self.rdr.read_exact(&mut body) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Crc32::new();
            hasher.update(&body);
            if hasher.finalize() != crc {
                return Err(WalError::Corrupt);
            }

            visit(decode_body(&body)?);
        }
    }
}

fn decode_body(body: &[u8]) -> Result<Record, WalError> {
    let mut br = body;

    let seq = br.read_u64::<LittleEndian>()?;
    let expires_at = br.read_u64::<LittleEndian>()?;
    let flags = br.read_u8()?;
    let (tombstone, kind, structure, op) =
        Record::unpack_flags(flags).ok_or(WalError::Corrupt)?;

    let key_len = br.read_u32::<LittleEndian>()? as usize;
    if key_len == 0 || key_len > br.len() {
        return Err(WalError::Corrupt);
    }
    let mut key = vec![0u8; key_len];
    br.read_exact(&mut key)?;

    let val_len = br.read_u32::<LittleEndian>()? as usize;
    if val_len != br.len() {
        return Err(WalError::Corrupt);
    }
    let mut value = vec![0u8; val_len];
    br.read_exact(&mut value)?;

    Ok(Record {
        key,
        value,
        tombstone,
        seq,
        expires_at,
        kind,
        structure,
        op,
    })
}
