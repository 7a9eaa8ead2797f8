//! Time-bounded cache of GET response payloads.
//!
//! Entries are keyed by fingerprint and replaced wholesale on every store.
//! Expiry is handled by the underlying moka cache: an entry older than the
//! TTL is never returned.

use mini_moka::sync::Cache;
use serde_json::Value;
use std::time::Duration;

/// Response cache shared by every request of a client.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Value>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a payload that has not yet expired.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        self.entries.get(&fingerprint.to_string())
    }

    /// Store a payload under `fingerprint`, replacing any previous entry.
    pub fn set(&self, fingerprint: impl Into<String>, payload: Value) {
        self.entries.insert(fingerprint.into(), payload);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_fresh_before_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.set("GET:/albums/42:null:null", json!({"id": "42"}));

        assert_eq!(cache.get("GET:/albums/42:null:null"), Some(json!({"id": "42"})));
        assert_eq!(cache.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(Duration::from_millis(100));
        cache.set("k", json!(1));
        assert_eq!(cache.get("k"), Some(json!(1)));

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_set_replaces() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.set("k", json!("old"));
        cache.set("k", json!("new"));

        assert_eq!(cache.get("k"), Some(json!("new")));
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.set("a", json!(1));
        cache.set("b", json!(2));

        cache.clear();
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        let other = cache.clone();
        cache.set("k", json!(true));
        assert_eq!(other.get("k"), Some(json!(true)));
    }
}
