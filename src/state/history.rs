//! Last-seen results, keyed the same way as the cache, used by the delta
//! engine and by adaptive-TTL stability comparison. The raw (untransformed
//! upstream) value lives in a parallel `cache_raw:` namespace so delta
//! diffing can work from the already-compressed value while TTL widening
//! compares against what the upstream actually returned.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::json::clone_json;

const RAW_PREFIX: &str = "cache_raw:";

#[derive(Default)]
pub struct HistoryStore {
    entries: HashMap<String, Value>,
    order: VecDeque<String>,
}

impl HistoryStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(clone_json)
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(&raw_key(key)).map(clone_json)
    }

    pub fn set(&mut self, key: &str, value: Value, max_entries: usize) {
        self.put(key.to_string(), value, max_entries);
    }

    pub fn set_raw(&mut self, key: &str, value: Value, max_entries: usize) {
        self.put(raw_key(key), value, max_entries);
    }

    fn put(&mut self, key: String, value: Value, max_entries: usize) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
        self.evict_overflow(max_entries.saturating_mul(2));
    }

    fn evict_overflow(&mut self, bound: usize) {
        while self.entries.len() > bound {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Erases every normal and raw entry whose key starts with `prefix`
    /// (mirrors [`crate::state::ResponseCache::invalidate_prefix`]).
    pub fn invalidate_prefix(&mut self, prefix: &str) {
        let raw_prefix = format!("{RAW_PREFIX}{prefix}");
        self.entries
            .retain(|key, _| !key.starts_with(prefix) && !key.starts_with(&raw_prefix));
        self.order
            .retain(|key| self.entries.contains_key(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn raw_key(key: &str) -> String {
    format!("{RAW_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normal_and_raw_namespaces_are_independent() {
        let mut history = HistoryStore::default();
        history.set("k", json!({"compressed": true}), 100);
        history.set_raw("k", json!({"raw": true}), 100);
        assert_eq!(history.get("k"), Some(json!({"compressed": true})));
        assert_eq!(history.get_raw("k"), Some(json!({"raw": true})));
    }

    #[test]
    fn overflow_drops_oldest_insertion() {
        let mut history = HistoryStore::default();
        history.set("a", json!(1), 1); // bound = 2
        history.set("b", json!(2), 1);
        history.set("c", json!(3), 1);
        assert_eq!(history.len(), 2);
        assert!(history.get("a").is_none());
        assert!(history.get("b").is_some());
        assert!(history.get("c").is_some());
    }

    #[test]
    fn invalidate_prefix_clears_both_namespaces() {
        let mut history = HistoryStore::default();
        history.set("s:srv:t:x", json!(1), 100);
        history.set_raw("s:srv:t:x", json!(2), 100);
        history.invalidate_prefix("s:srv:");
        assert!(history.get("s:srv:t:x").is_none());
        assert!(history.get_raw("s:srv:t:x").is_none());
    }
}
