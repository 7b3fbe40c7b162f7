use serde_json::json;
use ultra_lean_mcp_proxy::json::tools_hash;
use ultra_lean_mcp_proxy::state::ToolsHashStore;

#[test]
fn identical_tool_lists_hash_identically_regardless_of_key_order() {
    let a = tools_hash(&json!({"tools": [{"name": "a", "description": "d"}]}));
    let b = tools_hash(&json!({"tools": [{"description": "d", "name": "a"}]}));
    assert_eq!(a, b);

    let c = tools_hash(&json!({"tools": [{"name": "a", "description": "different"}]}));
    assert_ne!(a, c);
}

#[test]
fn scope_tracks_the_current_hash_and_a_conditional_hit_streak() {
    let mut store = ToolsHashStore::default();
    let scope = "session:server:profile";

    let first_hash = tools_hash(&json!({"tools": [{"name": "a"}]}));
    store.record_hash(scope, first_hash.clone());
    assert_eq!(store.get(scope).unwrap().last_hash, first_hash);
    assert_eq!(store.get(scope).unwrap().conditional_hits, 0);

    // Client re-sends the same tools/list request several times without the
    // catalog changing: each is a conditional hit against the same hash.
    store.record_conditional_hit(scope);
    store.record_conditional_hit(scope);
    assert_eq!(store.get(scope).unwrap().conditional_hits, 2);

    // The upstream catalog changes: the next recorded hash differs and the
    // streak resets.
    let second_hash = tools_hash(&json!({"tools": [{"name": "a"}, {"name": "b"}]}));
    assert_ne!(first_hash, second_hash);
    store.record_hash(scope, second_hash.clone());
    assert_eq!(store.get(scope).unwrap().last_hash, second_hash);
    assert_eq!(store.get(scope).unwrap().conditional_hits, 0);
}

#[test]
fn unrelated_scopes_do_not_share_hash_state() {
    let mut store = ToolsHashStore::default();
    store.record_hash("scope-a", "sha256:aaa".into());
    store.record_hash("scope-b", "sha256:bbb".into());

    assert_eq!(store.get("scope-a").unwrap().last_hash, "sha256:aaa");
    assert_eq!(store.get("scope-b").unwrap().last_hash, "sha256:bbb");
    assert!(store.get("scope-c").is_none());
}
