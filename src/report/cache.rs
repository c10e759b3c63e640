//! TTL + capacity-bounded report cache
//!
//! Eviction drops the insertion-oldest key, not the least-recently-read one.
//! This approximates LRU and matches the documented cache discipline; callers
//! that need true recency tracking should front this with their own layer.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct CacheEntry {
    data: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() <= self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

/// Shared report cache. Reads are concurrent; inserts and evictions are
/// mutually exclusive so the entry count and insertion order stay consistent.
pub struct ReportCache {
    inner: RwLock<CacheInner>,
    ttl: Duration,
    capacity: usize,
}

impl ReportCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            ttl,
            capacity,
        }
    }

    /// Fetch a fresh entry. Expired entries are removed lazily here; the
    /// caller always receives a clone, never a shared reference.
    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if entry.is_fresh() => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Stale entry: upgrade to a write lock and drop it
        let mut inner = self.inner.write();
        if inner.entries.get(key).map(|e| !e.is_fresh()).unwrap_or(false) {
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
        }
        None
    }

    /// Insert an entry, evicting the insertion-oldest key at capacity
    pub fn insert(&self, key: String, data: Value) {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        if !inner.entries.contains_key(&key) {
            inner.insertion_order.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.insertion_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        let cache = ReportCache::new(Duration::from_secs(60), 10);
        cache.insert("k".to_string(), json!({"v": 1}));
        assert_eq!(cache.get("k"), Some(json!({"v": 1})));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_ttl_expiry_is_lazy() {
        let cache = ReportCache::new(Duration::from_millis(10), 10);
        cache.insert("k".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_insertion_oldest() {
        let cache = ReportCache::new(Duration::from_secs(60), 3);
        for i in 0..3 {
            cache.insert(format!("k{}", i), json!(i));
        }
        // Reading k0 does not protect it; eviction is insertion-ordered
        assert!(cache.get("k0").is_some());
        cache.insert("k3".to_string(), json!(3));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("k0"), None);
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn test_reinsert_same_key_does_not_evict() {
        let cache = ReportCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), json!(1));
        cache.insert("b".to_string(), json!(2));
        cache.insert("a".to_string(), json!(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(3)));
        assert_eq!(cache.get("b"), Some(json!(2)));
    }
}
