//! TTL cache for retrieval results.
//!
//! An explicit component rather than a process-wide singleton: the
//! retrieval engine receives a [`QueryCache`] instance, so tests can
//! substitute one with a zero TTL and observe expiry deterministically.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// How many characters of the query participate in the cache key.
/// Long queries with a shared prefix hit the same entry on purpose.
const KEY_QUERY_PREFIX: usize = 100;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache mapping a (query prefix, document id set) key to a
/// previously assembled context string.
pub struct QueryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap();
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > now {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        // Expired: drop it so the map does not grow without bound.
        self.entries.write().unwrap().remove(key);
        None
    }

    pub fn set(&self, key: &str, value: String) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().unwrap().insert(key.to_string(), entry);
    }
}

/// Cache key for a retrieval call: lowercased query prefix plus the sorted
/// document id set, hashed so keys stay short.
pub fn context_cache_key(query: &str, document_ids: &[String]) -> String {
    let prefix: String = query.to_lowercase().chars().take(KEY_QUERY_PREFIX).collect();
    let mut ids: Vec<&str> = document_ids.iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b"\x00");
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\x00");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set("k", "context".to_string());
        assert_eq!(cache.get("k"), Some("context".to_string()));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.set("k", "context".to_string());
        assert_eq!(cache.get("k"), None);
        // And the expired entry was evicted.
        assert!(cache.entries.read().unwrap().is_empty());
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = QueryCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_key_ignores_document_order() {
        let a = context_cache_key("how much", &["d1".into(), "d2".into()]);
        let b = context_cache_key("how much", &["d2".into(), "d1".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_is_case_insensitive_on_query() {
        let a = context_cache_key("Pricing Plans", &["d1".into()]);
        let b = context_cache_key("pricing plans", &["d1".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_differs_by_documents() {
        let a = context_cache_key("q", &["d1".into()]);
        let b = context_cache_key("q", &["d2".into()]);
        assert_ne!(a, b);
    }
}
