use std::time::Duration;

use serde_json::json;
use ultra_lean_mcp_proxy::state::ResponseCache;

#[test]
fn hit_biased_eviction_keeps_the_frequently_read_entry() {
    let mut cache = ResponseCache::default();
    cache.insert("s:srv:list_items:a".into(), json!({"page": 1}), Duration::from_secs(30), 2);
    cache.insert("s:srv:list_items:b".into(), json!({"page": 2}), Duration::from_secs(30), 2);

    // Read "a" a few times so it accumulates hits before the next insert
    // forces an eviction.
    for _ in 0..3 {
        cache.get("s:srv:list_items:a");
    }

    cache.insert("s:srv:list_items:c".into(), json!({"page": 3}), Duration::from_secs(30), 2);

    assert!(cache.get("s:srv:list_items:a").is_some());
    assert!(cache.get("s:srv:list_items:b").is_none());
    assert!(cache.get("s:srv:list_items:c").is_some());
}

#[test]
fn mutation_invalidation_clears_only_the_affected_scope() {
    let mut cache = ResponseCache::default();
    cache.insert("sess:srv:list_items:x".into(), json!(1), Duration::from_secs(60), 10);
    cache.insert("sess:other-srv:list_items:y".into(), json!(2), Duration::from_secs(60), 10);

    cache.invalidate_prefix("sess:srv:");

    assert!(cache.get("sess:srv:list_items:x").is_none());
    assert!(cache.get("sess:other-srv:list_items:y").is_some());
}
