use crate::fingerprint::fingerprint;
use condeval_protocol::CacheStats;
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created: Instant,
    access_count: u64,
    last_accessed: Instant,
    /// Estimated byte size, counted against the byte budget.
    size: usize,
}

#[derive(Debug)]
struct CacheInner<T> {
    map: HashMap<u64, CacheEntry<T>>,
    /// Access order, most recently used at the front.
    order: VecDeque<u64>,
    max_items: usize,
    max_bytes: usize,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU cache keyed by the order-independent fingerprint of any
/// serializable value. Cheap to clone; clones share the same store, so
/// one instance can be injected into several engines.
#[derive(Debug)]
pub struct EvalCache<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
}

impl<T> Clone for EvalCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Serialize> EvalCache<T> {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                max_items,
                max_bytes,
                total_size: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
        }
    }

    /// Look up a cached value. A hit refreshes the entry's position in
    /// the access order and bumps its access counter.
    pub fn get<K: Serialize>(&self, key: &K) -> Option<T> {
        let hash = fingerprint(key);
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.map.get_mut(&hash) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = Instant::now();
                let value = entry.value.clone();
                inner.hits += 1;
                touch(&mut inner.order, hash);
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value. `size_hint` overrides the default
    /// JSON-length size estimate. Evicts least-recently-used entries
    /// until both the byte and item budgets hold.
    pub fn set<K: Serialize>(&self, key: &K, value: T, size_hint: Option<usize>) {
        let hash = fingerprint(key);
        let size = size_hint.unwrap_or_else(|| estimate_size(&value));
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(old) = inner.map.remove(&hash) {
            inner.total_size = inner.total_size.saturating_sub(old.size);
        }
        inner.map.insert(
            hash,
            CacheEntry {
                value,
                created: now,
                access_count: 0,
                last_accessed: now,
                size,
            },
        );
        inner.total_size += size;
        touch(&mut inner.order, hash);
        inner.evict_to_budget();
    }

    /// Remove one entry; returns whether it existed.
    pub fn delete<K: Serialize>(&self, key: &K) -> bool {
        let hash = fingerprint(key);
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.map.remove(&hash) {
            Some(entry) => {
                inner.total_size = inner.total_size.saturating_sub(entry.size);
                inner.order.retain(|h| *h != hash);
                true
            }
            None => false,
        }
    }

    /// Membership test without touching access order or counters.
    pub fn has<K: Serialize>(&self, key: &K) -> bool {
        let hash = fingerprint(key);
        self.lock().map.contains_key(&hash)
    }

    /// Drop every entry. Hit/miss/eviction counters survive a clear.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
        inner.total_size = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            total_size: inner.total_size,
            item_count: inner.map.len(),
            hit_rate: 0.0,
        };
        stats.recompute_hit_rate();
        stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<T>> {
        // A poisoned cache mutex means a panic mid-insert; the data is
        // still structurally sound, so keep serving it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> CacheInner<T> {
    fn evict_to_budget(&mut self) {
        while self.map.len() > self.max_items || self.total_size > self.max_bytes {
            let Some(oldest) = self.order.pop_back() else {
                break;
            };
            if let Some(entry) = self.map.remove(&oldest) {
                self.total_size = self.total_size.saturating_sub(entry.size);
                self.evictions += 1;
                debug!(
                    "cache evicted {oldest:016x} ({} bytes, {} accesses, age {:?}, idle {:?})",
                    entry.size,
                    entry.access_count,
                    entry.created.elapsed(),
                    entry.last_accessed.elapsed()
                );
            }
        }
    }
}

fn touch(order: &mut VecDeque<u64>, hash: u64) {
    if let Some(pos) = order.iter().position(|h| *h == hash) {
        order.remove(pos);
    }
    order.push_front(hash);
}

fn estimate_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_string(value).map_or(0, |s| s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn cache(max_items: usize, max_bytes: usize) -> EvalCache<String> {
        EvalCache::new(max_items, max_bytes)
    }

    #[test]
    fn test_get_absent_is_none() {
        let c = cache(4, 1024);
        assert_eq!(c.get(&json!({"a": "1"})), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let c = cache(4, 1024);
        let mut a = HashMap::new();
        a.insert("email", "x@y.z");
        a.insert("newsletter", "1");
        let mut b = HashMap::new();
        b.insert("newsletter", "1");
        b.insert("email", "x@y.z");

        c.set(&a, "result".to_string(), None);
        assert_eq!(c.get(&b), Some("result".to_string()));
    }

    #[test]
    fn test_item_budget_evicts_lru() {
        let c = cache(2, usize::MAX);
        c.set(&"k1", "v1".to_string(), None);
        c.set(&"k2", "v2".to_string(), None);
        c.set(&"k3", "v3".to_string(), None);

        assert!(!c.has(&"k1"));
        assert!(c.has(&"k2"));
        assert!(c.has(&"k3"));

        // A get refreshes recency, so k4 must evict k3, not k2.
        assert!(c.get(&"k2").is_some());
        c.set(&"k4", "v4".to_string(), None);
        assert!(c.has(&"k2"));
        assert!(!c.has(&"k3"));
        assert_eq!(c.stats().evictions, 2);
    }

    #[test]
    fn test_byte_budget_evicts() {
        let c = cache(100, 50);
        c.set(&"k1", "v1".to_string(), Some(30));
        c.set(&"k2", "v2".to_string(), Some(30));
        let stats = c.stats();
        assert!(stats.total_size <= 50, "total_size {}", stats.total_size);
        assert_eq!(stats.item_count, 1);
        assert!(c.has(&"k2"));
    }

    #[test]
    fn test_budgets_hold_after_any_sequence() {
        let c = cache(5, 200);
        for i in 0..50 {
            c.set(&format!("key-{i}"), format!("value-{i}"), Some(17));
        }
        let stats = c.stats();
        assert!(stats.item_count <= 5);
        assert!(stats.total_size <= 200);
    }

    #[test]
    fn test_replace_adjusts_total_size() {
        let c = cache(4, 1024);
        c.set(&"k", "small".to_string(), Some(10));
        c.set(&"k", "bigger".to_string(), Some(40));
        let stats = c.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.total_size, 40);
    }

    #[test]
    fn test_delete_and_clear() {
        let c = cache(4, 1024);
        c.set(&"k", "v".to_string(), None);
        assert!(c.delete(&"k"));
        assert!(!c.delete(&"k"));

        c.set(&"k", "v".to_string(), None);
        c.clear();
        assert_eq!(c.stats().item_count, 0);
        assert_eq!(c.stats().total_size, 0);
    }

    #[test]
    fn test_hit_rate() {
        let c = cache(4, 1024);
        c.set(&"k", "v".to_string(), None);
        assert!(c.get(&"k").is_some());
        assert!(c.get(&"missing").is_none());
        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_shared_clone_sees_writes() {
        let a = cache(4, 1024);
        let b = a.clone();
        a.set(&"k", "v".to_string(), None);
        assert_eq!(b.get(&"k"), Some("v".to_string()));
    }
}
