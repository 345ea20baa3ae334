//! TTL cache for lookup results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::expression::CacheStats;

struct CacheEntry {
    value: Option<Value>,
    expires_at: Instant,
}

/// Lookup results keyed by `{source}:{key}`, each with its own expiry.
///
/// Expiry is checked when an entry is read; nothing sweeps in the background.
/// A cached `None` (no match) is a hit too.
#[derive(Default)]
pub struct LookupCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(source: &str, key: &str) -> String {
        format!("{source}:{key}")
    }

    /// `Some(result)` for a live entry; expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<Option<Value>> {
        {
            let guard = self.entries.read().expect("lookup cache lock poisoned");
            match guard.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.entries.write().expect("lookup cache lock poisoned");
        if guard.get(key).map_or(false, |e| e.expires_at <= Instant::now()) {
            guard.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: Option<Value>, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .expect("lookup cache lock poisoned")
            .insert(key.into(), entry);
    }

    /// The live entry for `key`, or the result of `load` stored under `key`.
    ///
    /// Misses re-check and load under the write lock, so concurrent misses
    /// call `load` once per key; other readers wait meanwhile. Errors are not
    /// cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        ttl: Duration,
        load: impl FnOnce() -> Result<Option<Value>, E>,
    ) -> Result<Option<Value>, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let mut guard = self.entries.write().expect("lookup cache lock poisoned");
        if let Some(entry) = guard.get(key).filter(|e| e.expires_at > Instant::now()) {
            return Ok(entry.value.clone());
        }
        let value = load()?;
        guard.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(value)
    }

    /// Entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lookup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn expired_entries(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .expect("lookup cache lock poisoned")
            .values()
            .filter(|e| e.expires_at <= now)
            .count()
    }

    pub fn clear(&self) {
        self.entries.write().expect("lookup cache lock poisoned").clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use serde_json::json;

    #[test]
    fn live_entries_hit() {
        let cache = LookupCache::new();
        assert_eq!(cache.get("ccy:USD"), None);
        cache.insert("ccy:USD", Some(json!({"name": "Dollar"})), Duration::from_secs(60));
        assert_eq!(cache.get("ccy:USD"), Some(Some(json!({"name": "Dollar"}))));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = LookupCache::new();
        cache.insert("ccy:EUR", Some(json!(1)), Duration::ZERO);
        assert_eq!(cache.expired_entries(), 1);
        assert_eq!(cache.get("ccy:EUR"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_misses_load_once() {
        let cache = LookupCache::new();
        let loads = AtomicUsize::new(0);
        let barrier = Barrier::new(4);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    barrier.wait();
                    let value = cache
                        .get_or_try_insert_with("ccy:GBP", Duration::from_secs(60), || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok::<_, ()>(Some(json!("Pound")))
                        })
                        .unwrap();
                    assert_eq!(value, Some(json!("Pound")));
                });
            }
        });
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let cache = LookupCache::new();
        let err = cache.get_or_try_insert_with("ccy:ERR", Duration::from_secs(60), || Err("down"));
        assert_eq!(err, Err("down"));
        assert!(cache.is_empty());
    }

    #[test]
    fn negative_results_are_cached() {
        let cache = LookupCache::new();
        cache.insert(LookupCache::key("ccy", "XXX"), None, Duration::from_secs(60));
        assert_eq!(cache.get("ccy:XXX"), Some(None));
    }
}
