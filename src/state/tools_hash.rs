//! Per-scope tools-hash bookkeeping for conditional `tools/list` responses.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ToolsHashScope {
    pub last_hash: String,
    pub conditional_hits: u64,
    pub updated_at: std::time::Instant,
}

#[derive(Default)]
pub struct ToolsHashStore {
    scopes: HashMap<String, ToolsHashScope>,
}

impl ToolsHashStore {
    pub fn get(&self, scope: &str) -> Option<&ToolsHashScope> {
        self.scopes.get(scope)
    }

    /// Records a newly computed hash for `scope`. Resets `conditional_hits`
    /// when the hash actually changed; a re-stamp with the same hash (the
    /// periodic forced-refresh path) leaves the counter untouched since the
    /// caller increments it separately via [`Self::record_conditional_hit`].
    pub fn record_hash(&mut self, scope: &str, hash: String) {
        match self.scopes.get_mut(scope) {
            Some(existing) if existing.last_hash == hash => {
                existing.updated_at = std::time::Instant::now();
            }
            Some(existing) => {
                existing.last_hash = hash;
                existing.conditional_hits = 0;
                existing.updated_at = std::time::Instant::now();
            }
            None => {
                self.scopes.insert(
                    scope.to_string(),
                    ToolsHashScope {
                        last_hash: hash,
                        conditional_hits: 0,
                        updated_at: std::time::Instant::now(),
                    },
                );
            }
        }
    }

    /// Increments and returns the new `conditional_hits` count for `scope`,
    /// used to decide when a periodic forced refresh is due.
    pub fn record_conditional_hit(&mut self, scope: &str) -> u64 {
        match self.scopes.get_mut(scope) {
            Some(existing) => {
                existing.conditional_hits += 1;
                existing.conditional_hits
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_change_resets_conditional_hits() {
        let mut store = ToolsHashStore::default();
        store.record_hash("s", "sha256:a".into());
        store.record_conditional_hit("s");
        store.record_conditional_hit("s");
        assert_eq!(store.get("s").unwrap().conditional_hits, 2);

        store.record_hash("s", "sha256:b".into());
        assert_eq!(store.get("s").unwrap().conditional_hits, 0);
        assert_eq!(store.get("s").unwrap().last_hash, "sha256:b");
    }

    #[test]
    fn unknown_scope_conditional_hit_is_a_noop() {
        let mut store = ToolsHashStore::default();
        assert_eq!(store.record_conditional_hit("missing"), 0);
    }
}
