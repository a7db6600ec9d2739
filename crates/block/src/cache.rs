//! Byte-bounded LRU cache for whole blocks.
//!
//! Recency is tracked with a monotonic tick per entry plus an ordered
//! tick → key map, so both touch and eviction are `O(log n)`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

struct Entry<V> {
    value: V,
    bytes: usize,
    tick: u64,
}

/// An LRU map bounded by the total byte weight of its values.
pub struct LruCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    recency: BTreeMap<u64, K>,
    capacity_bytes: usize,
    used_bytes: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity_bytes: usize) -> LruCache<K, V> {
        LruCache {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            capacity_bytes,
            used_bytes: 0,
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.touch(key);
        self.entries.get(key).map(|e| &e.value)
    }

    /// Inserts or refreshes `key`, charging `bytes` against the capacity and
    /// evicting least-recently-used entries until the budget holds. A value
    /// heavier than the whole capacity is simply not cached.
    pub fn insert(&mut self, key: K, value: V, bytes: usize) {
        if bytes > self.capacity_bytes {
            self.remove(&key);
            return;
        }

        self.remove(&key);

        self.clock += 1;
        let tick = self.clock;
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, Entry { value, bytes, tick });
        self.used_bytes += bytes;

        while self.used_bytes > self.capacity_bytes {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.used_bytes -= entry.bytes;
            }
        }
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.tick);
            self.used_bytes -= entry.bytes;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn touch(&mut self, key: &K) {
        self.clock += 1;
        let tick = self.clock;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }
}
