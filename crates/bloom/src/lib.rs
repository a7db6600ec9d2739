//! # Bloom — per-SSTable negative-lookup filter
//!
//! A bloom filter answers "might this key be in the table?" with no false
//! negatives. Each SSTable carries one in a `.filter` sibling file; a
//! negative answer lets the reader skip the whole summary → index → data
//! descent for that table.
//!
//! The filter is advisory: a missing or undecodable `.filter` file only
//! costs the fast path, never correctness.

use byteorder::{ByteOrder, LittleEndian};

/// Double hashing: `bit(i) = (h1 + i * h2) mod m`. `h1` is FNV-1a over the
/// key; `h2` is a splitmix64 remix of `h1`, which keeps the two streams
/// independent without hashing the key twice.
#[derive(Clone, PartialEq, Eq)]
pub struct Filter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl Filter {
    /// Sizes the filter for `expected_keys` at the target false-positive
    /// rate. Degenerate parameters are clamped rather than rejected — an
    /// oversized filter is only wasted bytes.
    pub fn with_capacity(expected_keys: usize, false_positive_rate: f64) -> Filter {
        let n = expected_keys.max(1) as f64;
        let p = false_positive_rate.clamp(1e-6, 0.5);

        let m = (-n * p.ln() / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil();
        let num_bits = (m as u64).max(64);
        let k = ((num_bits as f64 / n) * std::f64::consts::LN_2).round();
        let num_hashes = (k as u32).clamp(1, 16);

        Filter {
            bits: vec![0u8; num_bits.div_ceil(8) as usize],
            num_bits,
            num_hashes,
        }
    }

    /// Builds a filter over every key in `keys`.
    pub fn from_keys<'a, I>(keys: I, count: usize, false_positive_rate: f64) -> Filter
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut filter = Filter::with_capacity(count, false_positive_rate);
        for key in keys {
            filter.insert(key);
        }
        filter
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hashes(key);
        for i in 0..u64::from(self.num_hashes) {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// `false` means the key is definitely absent.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hashes(key);
        (0..u64::from(self.num_hashes)).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    /// Wire layout: `[num_bits: u64 LE][num_hashes: u32 LE][bits]`.
    /// The bit-vector length is implied by `num_bits`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; 12 + self.bits.len()];
        LittleEndian::write_u64(&mut out[0..8], self.num_bits);
        LittleEndian::write_u32(&mut out[8..12], self.num_hashes);
        out[12..].copy_from_slice(&self.bits);
        out
    }

    /// Decodes an [`encode`](Self::encode)d filter. `None` on any shape
    /// mismatch — callers treat that as "no filter".
    pub fn decode(buf: &[u8]) -> Option<Filter> {
        if buf.len() < 12 {
            return None;
        }
        let num_bits = LittleEndian::read_u64(&buf[0..8]);
        let num_hashes = LittleEndian::read_u32(&buf[8..12]);
        if num_bits == 0 || num_hashes == 0 || num_hashes > 64 {
            return None;
        }
        let byte_len = num_bits.div_ceil(8) as usize;
        if buf.len() - 12 != byte_len {
            return None;
        }
        Some(Filter {
            bits: buf[12..].to_vec(),
            num_bits,
            num_hashes,
        })
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}

fn hashes(key: &[u8]) -> (u64, u64) {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut h1 = FNV_OFFSET;
    for &b in key {
        h1 ^= u64::from(b);
        h1 = h1.wrapping_mul(FNV_PRIME);
    }
    (h1, splitmix64(h1))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests;
