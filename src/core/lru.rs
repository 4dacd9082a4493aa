//! Bounded in-memory LRU cache
//!
//! Both engine caches (compiled patterns, token analysis results) are
//! instances of this structure, owned by their engine. Capacity is fixed at
//! construction; inserting past capacity evicts the least recently used
//! entry. Lookups refresh recency.

use std::collections::HashMap;
use std::hash::Hash;

/// A bounded LRU map.
///
/// Recency is tracked with a monotonically increasing tick per cache.
/// Capacities here are small (tens to hundreds), so the O(n) eviction scan
/// is not worth a linked-list structure.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (u64, V)>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    /// Look up a key, refreshing its recency on hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(key) {
            Some((stamp, value)) => {
                *stamp = tick;
                Some(value)
            }
            None => None,
        }
    }

    /// Insert a value, evicting the least recently used entry when full
    pub fn insert(&mut self, key: K, value: V) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (self.tick, value));
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries, keeping the configured capacity
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
