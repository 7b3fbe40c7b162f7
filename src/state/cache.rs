//! Response cache: `{session}:{server}:{tool}:{sha256(canonical(args))}` ->
//! `{value, createdAt, expiresAt, hits}`.
//!
//! Eviction is hit-biased (ascending `(hits, createdAt)`), not recency-biased
//! like the teacher's `lru::LruCache`-backed `InjectionCache` — the ordering
//! `lru` exposes doesn't match what's called for here, so this is a plain
//! `BTreeMap` keyed by the cache key, scanned for eviction order.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::json::clone_json;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub hits: u64,
}

#[derive(Default)]
pub struct ResponseCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl ResponseCache {
    /// Returns a clone of the cached value if present and unexpired,
    /// bumping its hit counter. A transparently-cloned read never aliases
    /// the stored value.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let expired = self.entries.get(key).map(|e| e.expires_at <= now);
        match expired {
            Some(true) => {
                self.entries.remove(key);
                None
            }
            Some(false) => {
                let entry = self.entries.get_mut(key).expect("checked present above");
                entry.hits += 1;
                Some(clone_json(&entry.value))
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: String, value: Value, ttl: Duration, max_entries: usize) {
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                hits: 0,
            },
        );
        self.evict_to(max_entries);
    }

    /// Evicts entries by ascending `(hits, createdAt)` until at or under
    /// `max_entries`.
    fn evict_to(&mut self, max_entries: usize) {
        while self.entries.len() > max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.hits, e.created_at))
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Erases every entry whose key starts with `prefix` (mutation
    /// invalidation: `"{session}:{server}:"`).
    pub fn invalidate_prefix(&mut self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
