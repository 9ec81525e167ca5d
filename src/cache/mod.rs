//! In-memory TTL caches for the read path.
//!
//! One [`MemoryCache`] instance exists per entity category (wired in
//! [`crate::state::AppState`]), each tuned with its own capacity and TTL.
//! Entries expire lazily on access; [`MemoryCache::size`] is the only
//! operation that proactively reclaims expired entries.

pub mod keys;

use indexmap::IndexMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded key→value cache with per-entry expiration.
///
/// Inserting a new key at capacity evicts the oldest-inserted key. Values
/// are opaque to the cache; callers typically store `Arc`-wrapped data so
/// `get` clones are cheap. All operations are infallible — a full cache
/// evicts, a missing key is a normal miss.
pub struct MemoryCache<V> {
    name: &'static str,
    entries: Mutex<IndexMap<String, CacheEntry<V>>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(name: &'static str, max_size: usize, default_ttl: Duration) -> Self {
        Self {
            name,
            entries: Mutex::new(IndexMap::new()),
            max_size,
            default_ttl,
        }
    }

    /// Look up a key, treating an expired entry as absent (and removing it).
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if Instant::now() < entry.expires_at {
            trace!(cache = self.name, key, "cache hit");
            return Some(entry.value.clone());
        }
        // shift_remove keeps insertion order intact for eviction.
        entries.shift_remove(key);
        None
    }

    /// Store a value under the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value with an explicit TTL, evicting the oldest-inserted key
    /// if a new key would push the cache past capacity.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                trace!(cache = self.name, key = %evicted, "cache evict (capacity)");
            }
        }
        trace!(cache = self.name, key = %key, "cache set");
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if entries.shift_remove(key).is_some() {
            trace!(cache = self.name, key, "cache delete");
        }
    }

    /// Whether a live (unexpired) entry exists for the key.
    pub fn has(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(key) else {
            return false;
        };
        if Instant::now() < entry.expires_at {
            return true;
        }
        entries.shift_remove(key);
        false
    }

    /// Purge every expired entry, then return the live count.
    pub fn size(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// A cached read result: a single record or a list snapshot.
///
/// Lets one cache instance per entity hold both `entity:{id}` entries and
/// `entity:all`-style list entries without a serialization round-trip.
pub enum Cached<T> {
    One(Arc<T>),
    Many(Arc<Vec<T>>),
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        match self {
            Cached::One(v) => Cached::One(Arc::clone(v)),
            Cached::Many(v) => Cached::Many(Arc::clone(v)),
        }
    }
}

impl<T> Cached<T> {
    pub fn one(value: T) -> Self {
        Cached::One(Arc::new(value))
    }

    pub fn many(values: Vec<T>) -> Self {
        Cached::Many(Arc::new(values))
    }

    pub fn as_one(&self) -> Option<Arc<T>> {
        match self {
            Cached::One(v) => Some(Arc::clone(v)),
            Cached::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<Arc<Vec<T>>> {
        match self {
            Cached::Many(v) => Some(Arc::clone(v)),
            Cached::One(_) => None,
        }
    }
}

/// Read-through composition: return the cached value for `key`, or run
/// `load`, store its result under the default TTL, and return it.
pub async fn cached<V, F>(cache: &MemoryCache<V>, key: &str, load: F) -> anyhow::Result<V>
where
    V: Clone,
    F: Future<Output = anyhow::Result<V>>,
{
    if let Some(hit) = cache.get(key) {
        return Ok(hit);
    }
    let value = load.await?;
    cache.set(key, value.clone());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn cache(max: usize, ttl: Duration) -> MemoryCache<u32> {
        MemoryCache::new("test", max, ttl)
    }

    #[test]
    fn get_returns_value_until_expiry() {
        let c = cache(10, Duration::from_millis(40));
        c.set("a", 1);
        assert_eq!(c.get("a"), Some(1));
        sleep(Duration::from_millis(60));
        assert_eq!(c.get("a"), None);
        // The stale entry was removed as a side effect of the miss.
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn set_past_capacity_evicts_oldest_inserted() {
        let c = cache(2, Duration::from_secs(60));
        c.set("a", 1);
        c.set("b", 2);
        c.set("c", 3);
        assert!(!c.has("a"));
        assert!(c.has("b"));
        assert!(c.has("c"));
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let c = cache(2, Duration::from_secs(60));
        c.set("a", 1);
        c.set("b", 2);
        c.set("a", 10);
        assert_eq!(c.get("a"), Some(10));
        assert_eq!(c.get("b"), Some(2));
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn size_stays_within_bound_under_churn() {
        let c = cache(3, Duration::from_secs(60));
        for i in 0..20 {
            c.set(format!("k{i}"), i);
            assert!(c.size() <= 3);
        }
    }

    #[test]
    fn delete_is_idempotent() {
        let c = cache(10, Duration::from_secs(60));
        c.set("a", 1);
        c.delete("a");
        c.delete("a");
        assert!(!c.has("a"));
    }

    #[test]
    fn has_expires_lazily() {
        let c = cache(10, Duration::from_millis(30));
        c.set("a", 1);
        assert!(c.has("a"));
        sleep(Duration::from_millis(50));
        assert!(!c.has("a"));
    }

    #[test]
    fn size_purges_expired_entries() {
        let c = cache(10, Duration::from_millis(30));
        c.set("a", 1);
        c.set("b", 2);
        c.set_with_ttl("c", 3, Duration::from_secs(60));
        sleep(Duration::from_millis(50));
        assert_eq!(c.size(), 1);
        assert_eq!(c.get("c"), Some(3));
    }

    #[test]
    fn explicit_ttl_overrides_default() {
        let c = cache(10, Duration::from_millis(20));
        c.set_with_ttl("a", 1, Duration::from_secs(60));
        sleep(Duration::from_millis(40));
        assert_eq!(c.get("a"), Some(1));
    }

    #[tokio::test]
    async fn cached_loads_once_then_hits() {
        let c: MemoryCache<u32> = MemoryCache::new("test", 10, Duration::from_secs(60));
        let v = cached(&c, "k", async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
        // Second call must not invoke the loader.
        let v = cached(&c, "k", async { Err(anyhow::anyhow!("loader re-run on cache hit")) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
