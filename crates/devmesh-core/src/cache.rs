//! In-memory template cache.
//!
//! Mutex-guarded LRU mapping template_hash -> template_id, shared by all
//! ingest workers in the process. A cache miss falls through to the durable
//! store; entries never expire on time, only by LRU eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 100_000;

struct Inner {
    map: HashMap<String, Entry>,
    // Recency queue with lazy invalidation: every touch pushes a new stamped
    // record; stale records are skipped at eviction and purged on compaction.
    order: VecDeque<(String, u64)>,
    tick: u64,
    capacity: usize,
}

struct Entry {
    template_id: i64,
    stamp: u64,
}

/// LRU cache for template_hash -> template_id.
pub struct TemplateCache {
    inner: Mutex<Inner>,
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                tick: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    /// Look up a template id by hash, marking the entry most recently used.
    pub fn get(&self, template_hash: &str) -> Option<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.map.get_mut(template_hash)?;
        entry.stamp = tick;
        let id = entry.template_id;
        inner.order.push_back((template_hash.to_string(), tick));
        inner.maybe_compact();
        Some(id)
    }

    /// Insert or refresh an entry, evicting the least recently used entry
    /// when at capacity.
    pub fn put(&self, template_hash: &str, template_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.map.contains_key(template_hash) && inner.map.len() >= inner.capacity {
            inner.evict_one();
        }

        inner.map.insert(
            template_hash.to_string(),
            Entry {
                template_id,
                stamp: tick,
            },
        );
        inner.order.push_back((template_hash.to_string(), tick));
        inner.maybe_compact();
    }

    /// Bulk load rows fetched from the durable store at startup.
    pub fn warm(&self, rows: &[(String, i64)]) {
        for (hash, id) in rows {
            self.put(hash, *id);
        }
        log::info!("template cache warmed with {} entries", rows.len());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }
}

impl Inner {
    fn evict_one(&mut self) {
        while let Some((hash, stamp)) = self.order.pop_front() {
            let live = self
                .map
                .get(&hash)
                .is_some_and(|entry| entry.stamp == stamp);
            if live {
                self.map.remove(&hash);
                return;
            }
        }
    }

    // Keeps the recency queue proportional to the live entry count.
    fn maybe_compact(&mut self) {
        if self.order.len() < self.map.len().saturating_mul(2).max(64) {
            return;
        }
        let map = &self.map;
        self.order
            .retain(|(hash, stamp)| map.get(hash).is_some_and(|entry| entry.stamp == *stamp));
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
