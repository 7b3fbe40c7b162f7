use serde_json::json;
use ultra_lean_mcp_proxy::cli::CliOverrides;
use ultra_lean_mcp_proxy::config;
use ultra_lean_mcp_proxy::pending::PendingMap;
use ultra_lean_mcp_proxy::pipeline::{on_client_message, on_upstream_message, ClientAction};
use ultra_lean_mcp_proxy::session::Session;

fn new_session() -> Session {
    let resolved = config::resolve(None, &CliOverrides::default(), &["fake-upstream".into()]).unwrap();
    Session::new(resolved, &["fake-upstream".into()])
}

#[tokio::test]
async fn tools_hash_sync_marker_only_lands_on_the_initialize_response() {
    let session = new_session();
    let pending = PendingMap::new();

    let initialize_request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "capabilities": {
                "experimental": {"ultra_lean_mcp_proxy": {"tools_hash_sync": {"version": 1}}}
            }
        },
    });
    on_client_message(&session, &pending, initialize_request).await;
    assert!(session.negotiated());

    let initialize_response = json!({"jsonrpc": "2.0", "id": 1, "result": {"serverInfo": {"name": "fake"}}});
    let forwarded = on_upstream_message(&session, &pending, initialize_response).await;
    assert_eq!(
        forwarded["result"]["_ultra_lean_mcp_proxy"]["tools_hash_sync"]["version"],
        json!(1)
    );

    let ping_request = json!({"jsonrpc": "2.0", "id": 2, "method": "ping", "params": {}});
    on_client_message(&session, &pending, ping_request).await;
    let ping_response = json!({"jsonrpc": "2.0", "id": 2, "result": {}});
    let forwarded_ping = on_upstream_message(&session, &pending, ping_response).await;
    assert!(
        forwarded_ping["result"].get("_ultra_lean_mcp_proxy").is_none(),
        "passthrough methods must never carry the negotiation marker, got: {forwarded_ping}"
    );
}

#[tokio::test]
async fn cache_mutating_tools_allows_a_mutating_result_to_be_cached() {
    let config_json = r#"{"optimizations": {"caching": {"cache_mutating_tools": true}}}"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, config_json).unwrap();
    let resolved = config::resolve(Some(&path), &CliOverrides::default(), &["fake-upstream".into()]).unwrap();
    let session = Session::new(resolved, &["fake-upstream".into()]);
    let pending = PendingMap::new();

    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "create_item", "arguments": {}}}),
    )
    .await
    {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("first call must miss the empty cache"),
    }
    on_upstream_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 1, "result": {"structuredContent": {"created": true}}}),
    )
    .await;

    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "create_item", "arguments": {}}}),
    )
    .await
    {
        ClientAction::Respond(_) => {}
        ClientAction::Forward(_) => panic!("cache_mutating_tools = true should make a repeat mutating call a cache hit"),
    }
}

#[tokio::test]
async fn result_compression_falls_back_to_content_text_when_structured_content_is_absent() {
    let config_json = r#"{"optimizations": {"result_compression": {"min_payload_bytes": 0, "min_compressibility": 0.0, "min_token_savings_abs": 0, "min_token_savings_ratio": 0.0}}}"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, config_json).unwrap();
    let resolved = config::resolve(Some(&path), &CliOverrides::default(), &["fake-upstream".into()]).unwrap();
    let session = Session::new(resolved, &["fake-upstream".into()]);
    let pending = PendingMap::new();

    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "list_items", "arguments": {}}}),
    )
    .await
    {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("first call must miss the empty cache"),
    }

    let payload = json!({"repositories": [
        {"repository_name": "alpha", "repository_id": 1},
        {"repository_name": "beta", "repository_id": 2},
        {"repository_name": "gamma", "repository_id": 3},
    ]});
    let upstream_response = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"content": [{"type": "text", "text": serde_json::to_string(&payload).unwrap()}]},
    });
    let forwarded = on_upstream_message(&session, &pending, upstream_response).await;
    assert_eq!(forwarded["result"]["structuredContent"]["compressed"], json!(true));
}

#[tokio::test]
async fn a_repeated_tools_list_request_short_circuits_once_the_hash_matches() {
    let session = new_session();
    let pending = PendingMap::new();

    let first_request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}});
    match on_client_message(&session, &pending, first_request).await {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("first tools/list request has nothing to short-circuit against"),
    }

    let upstream_response = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"tools": [{"name": "list_items", "description": "List items in a collection"}]},
    });
    let forwarded = on_upstream_message(&session, &pending, upstream_response).await;
    assert_eq!(forwarded["result"]["tools"][0]["name"], json!("list_items"));

    let hash = {
        let store = session.store.lock().await;
        store.tools_hash.get(&session.scope_key()).unwrap().last_hash.clone()
    };

    let second_request = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {"_ultra_lean_mcp_proxy": {"tools_hash_sync": {"if_none_match": hash}}},
    });
    match on_client_message(&session, &pending, second_request).await {
        ClientAction::Respond(response) => {
            assert_eq!(response["result"]["tools"], json!([]));
            assert_eq!(
                response["result"]["_ultra_lean_mcp_proxy"]["tools_hash_sync"]["not_modified"],
                json!(true)
            );
        }
        ClientAction::Forward(_) => panic!("matching hash should have been answered locally"),
    }

    assert_eq!(pending.len().await, 0, "the short-circuited request never registers as pending");
}

#[tokio::test]
async fn a_second_identical_tools_call_is_served_from_cache_as_a_delta() {
    let session = new_session();
    let pending = PendingMap::new();

    let call = |id: i64| {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": "get_item", "arguments": {"id": 1}},
        })
    };

    match on_client_message(&session, &pending, call(10)).await {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("first call must miss the empty cache"),
    }

    let upstream_response = json!({
        "jsonrpc": "2.0",
        "id": 10,
        "result": {"structuredContent": {"value": 42}},
    });
    let forwarded = on_upstream_message(&session, &pending, upstream_response).await;
    assert_eq!(forwarded["result"]["structuredContent"]["value"], json!(42));

    match on_client_message(&session, &pending, call(11)).await {
        ClientAction::Respond(response) => {
            assert!(
                response["result"]["structuredContent"]["delta"].is_object(),
                "cache hits are served as a delta envelope, got: {response}"
            );
        }
        ClientAction::Forward(_) => panic!("identical arguments should hit the response cache"),
    }

    // The cache hit never touched the pending map, so it is still empty.
    assert_eq!(pending.len().await, 0);
}

#[tokio::test]
async fn mutating_tools_are_never_cached_and_invalidate_prior_entries() {
    let session = new_session();
    let pending = PendingMap::new();

    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 20, "method": "tools/call", "params": {"name": "list_items", "arguments": {}}}),
    )
    .await
    {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("first call must miss the empty cache"),
    }
    on_upstream_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 20, "result": {"structuredContent": {"items": ["a", "b"]}}}),
    )
    .await;

    // A mutating tool call on the same scope should invalidate the entry
    // above even though its own name never matches "list_items".
    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 21, "method": "tools/call", "params": {"name": "create_item", "arguments": {"name": "c"}}}),
    )
    .await
    {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("mutating tools are never cache-eligible"),
    }
    on_upstream_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 21, "result": {"structuredContent": {"created": true}}}),
    )
    .await;

    match on_client_message(
        &session,
        &pending,
        json!({"jsonrpc": "2.0", "id": 22, "method": "tools/call", "params": {"name": "list_items", "arguments": {}}}),
    )
    .await
    {
        ClientAction::Forward(_) => {}
        ClientAction::Respond(_) => panic!("the mutation should have invalidated the cached list_items entry"),
    }
}
