//! Short-lived in-memory caches.
//!
//! The resolver caches network reachability and release listings for a few
//! seconds to minutes. Entries carry their own expiry; every accessor has an
//! `_at` form taking the current time explicitly so tests can step the
//! clock instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A mutex-guarded map whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Look up `key` as of `now`; expired entries are evicted.
    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    cached_at: now,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Age of a live entry.
    pub fn age_at(&self, key: &K, now: DateTime<Utc>) -> Option<Duration> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| now.signed_duration_since(e.cached_at))
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
