use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
}

/// String-keyed store whose entries expire `ttl` after they were written.
/// Expired entries are removed the moment a read notices them.
#[derive(Debug)]
pub struct TimedCache<T> {
    name: &'static str,
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T> TimedCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str, ttl: Duration) -> Option<&T> {
        self.get_at(key, ttl, Instant::now())
    }

    pub fn contains(&mut self, key: &str, ttl: Duration) -> bool {
        self.get(key, ttl).is_some()
    }

    /// Overwrites unconditionally. An empty key is ignored and reported as `false`.
    pub fn put(&mut self, key: &str, value: T) -> bool {
        self.put_at(key, value, Instant::now())
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&mut self, key: &str, ttl: Duration, now: Instant) -> Option<&T> {
        if key.is_empty() {
            return None;
        }
        let expired = now.saturating_duration_since(self.entries.get(key)?.stored_at) >= ttl;
        if expired {
            self.entries.remove(key);
            debug!(cache = self.name, key, "expired entry dropped");
            return None;
        }
        self.entries.get(key).map(|entry| &entry.data)
    }

    fn put_at(&mut self, key: &str, value: T, now: Instant) -> bool {
        if key.is_empty() {
            return false;
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                stored_at: now,
            },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn fresh_entry_is_returned() {
        let mut cache = TimedCache::new("test");
        assert!(cache.put("k", 7));
        assert_eq!(cache.get("k", TTL), Some(&7));
    }

    #[test]
    fn expired_entry_is_deleted_on_read() {
        let mut cache = TimedCache::new("test");
        let written = Instant::now();
        cache.put_at("k", 7, written);

        assert_eq!(cache.get_at("k", TTL, written + TTL - Duration::from_millis(1)), Some(&7));
        assert_eq!(cache.get_at("k", TTL, written + TTL), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get_at("k", TTL, written), None);
    }

    #[test]
    fn zero_ttl_is_always_stale() {
        let mut cache = TimedCache::new("test");
        cache.put("k", "v");
        assert_eq!(cache.get("k", Duration::ZERO), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn empty_key_is_never_stored_or_found() {
        let mut cache = TimedCache::new("test");
        assert!(!cache.put("", 1));
        assert_eq!(cache.get("", TTL), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_overwrites_and_refreshes() {
        let mut cache = TimedCache::new("test");
        let old = Instant::now();
        cache.put_at("k", 1, old);
        cache.put_at("k", 2, old + TTL);
        assert_eq!(cache.get_at("k", TTL, old + TTL + Duration::from_secs(1)), Some(&2));
    }

    #[test]
    fn invalidate_is_a_noop_when_absent() {
        let mut cache: TimedCache<u8> = TimedCache::new("test");
        assert!(!cache.invalidate("missing"));
        cache.put("k", 1);
        assert!(cache.invalidate("k"));
        assert_eq!(cache.get("k", TTL), None);
    }
}
