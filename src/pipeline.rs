//! Interception pipeline (spec.md §4.10): per-method orchestration tying
//! the state store, the three compressors, lazy visibility, and the
//! pending-request tracker together. Each stage is kept close to a pure
//! function over `(message, context)`, per the "avoid closure-based
//! middleware chains" guidance — the only shared mutable thing is the
//! session's single store mutex.

use std::time::Duration;

use serde_json::{json, Value};

use crate::compress::{
    compress_result, create_delta, dedupe_redundant_content, DefinitionCompressor, DeltaOutcome,
    ResultCompressionOutcome,
};
use crate::json::{canonicalize, clone_json, estimate_tokens, parse_tools_hash, sha256_hex, tools_hash};
use crate::lazy;
use crate::pending::{PendingKind, PendingMap};
use crate::protocol::{
    ext_in, ext_ref, id_of, is_error_response, method_of, RequestId, METHOD_INITIALIZE,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SEARCH_TOOL_NAME,
};
use crate::session::Session;
use crate::state::HealthOutcome;

const MUTATING_VERBS: &[&str] = &[
    "create", "update", "delete", "remove", "set", "write", "insert", "patch", "post", "put",
    "merge", "upload", "commit", "navigate", "open", "close", "click", "type", "press", "select",
    "hover", "drag", "drop", "scroll", "evaluate", "execute", "goto", "reload", "back", "forward",
];

/// Result compression's source of truth is `result.structuredContent` when
/// present; failing that, spec.md §4.8 falls back to the first
/// `content[].text` item that parses as JSON.
fn structured_payload_from_content(result: &Value) -> Option<Value> {
    result.get("content").and_then(Value::as_array).and_then(|items| {
        items.iter().find_map(|item| {
            item.get("text")
                .and_then(Value::as_str)
                .and_then(|text| serde_json::from_str::<Value>(text).ok())
        })
    })
}

fn is_mutating_tool(tool_name: &str, override_flag: Option<bool>) -> bool {
    if let Some(flag) = override_flag {
        return flag;
    }
    let lower = tool_name.to_lowercase();
    MUTATING_VERBS.iter().any(|verb| lower.contains(verb))
}

/// What to do with a message the client sent us.
pub enum ClientAction {
    /// Forward this (possibly extension-stripped) message upstream.
    Forward(Value),
    /// Answer the client directly; never touches the upstream.
    Respond(Value),
}

/// Handles one line read from the client. `message` is the parsed
/// JSON-RPC object (malformed lines never reach here — the caller forwards
/// those verbatim).
pub async fn on_client_message(session: &Session, pending: &PendingMap, message: Value) -> ClientAction {
    let Some(method) = method_of(&message).map(str::to_string) else {
        return ClientAction::Forward(message);
    };
    let id = id_of(&message);

    match method.as_str() {
        METHOD_INITIALIZE => {
            let negotiated = message
                .get("params")
                .and_then(|p| p.get("capabilities"))
                .and_then(|c| c.get("experimental"))
                .and_then(|e| e.get("ultra_lean_mcp_proxy"))
                .and_then(|p| p.get("tools_hash_sync"))
                .and_then(|t| t.get("version"))
                .and_then(Value::as_u64)
                == Some(1);
            session.set_negotiated(negotiated);
            if let Some(id) = id {
                pending.insert(id, PendingKind::Initialize).await;
            }
            ClientAction::Forward(message)
        }
        METHOD_TOOLS_LIST => on_tools_list_request(session, pending, id, message).await,
        METHOD_TOOLS_CALL => on_tools_call_request(session, pending, id, message).await,
        _ => {
            if let Some(id) = id {
                pending.insert(id, PendingKind::Other).await;
            }
            ClientAction::Forward(message)
        }
    }
}

async fn on_tools_list_request(
    session: &Session,
    pending: &PendingMap,
    id: Option<RequestId>,
    message: Value,
) -> ClientAction {
    let scope = session.scope_key();
    let if_none_match = ext_ref(&message, "params")
        .and_then(|ext| ext.get("tools_hash_sync"))
        .and_then(|t| t.get("if_none_match"))
        .and_then(Value::as_str)
        .and_then(parse_tools_hash)
        .map(|hex| format!("sha256:{hex}"));

    if let Some(candidate) = &if_none_match {
        let refresh_interval = session.config.optimizations.tools_hash_sync.refresh_interval;
        let mut store = session.store.lock().await;
        let scope_state = store.tools_hash.get(&scope).cloned();
        if let Some(scope_state) = scope_state {
            if &scope_state.last_hash == candidate {
                let hit_count = store.tools_hash.record_conditional_hit(&scope);
                let due_for_refresh = refresh_interval > 0 && hit_count % refresh_interval == 0;
                if !due_for_refresh {
                    drop(store);
                    let mut result = json!({"tools": []});
                    let ext = ext_in(&mut result);
                    ext["tools_hash_sync"] = json!({"not_modified": true, "tools_hash": candidate});
                    return ClientAction::Respond(json!({
                        "jsonrpc": "2.0",
                        "id": id.map(|i| i.to_value()),
                        "result": result,
                    }));
                }
            }
        }
    }

    if let Some(id) = id {
        pending.insert(id, PendingKind::ToolsList).await;
    }
    ClientAction::Forward(message)
}

async fn on_tools_call_request(
    session: &Session,
    pending: &PendingMap,
    id: Option<RequestId>,
    message: Value,
) -> ClientAction {
    let tool_name = message
        .get("params")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = message
        .get("params")
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);

    if tool_name == SEARCH_TOOL_NAME {
        let store = session.store.lock().await;
        let catalog: Vec<Value> = store.catalog.all().iter().map(|t| t.raw.clone()).collect();
        let lazy_cfg = session.config.optimizations_for_tool(&tool_name).lazy_loading;
        drop(store);
        let result = lazy::handle_search_call(&arguments, &catalog, &lazy_cfg);
        return ClientAction::Respond(json!({
            "jsonrpc": "2.0",
            "id": id.map(|i| i.to_value()),
            "result": result,
        }));
    }

    let per_tool = session.config.optimizations_for_tool(&tool_name);
    let cache_key = format!(
        "{}:{}:{}:{}",
        session.session_id,
        session.server_id,
        tool_name,
        sha256_hex(&canonicalize(&arguments))
    );

    let mutation_override = session.config.treat_as_mutating_override(&tool_name);
    let eligible = per_tool.caching.enabled
        && (per_tool.caching.cache_mutating_tools || !is_mutating_tool(&tool_name, mutation_override));

    if eligible {
        let mut store = session.store.lock().await;
        if let Some(cached) = store.cache.get(&cache_key) {
            session.metrics.record_cache_hit();
            let previous_delta_input = store.history.get(&cache_key);
            let outcome = match previous_delta_input {
                Some(previous) => {
                    create_delta(&previous, &cached, &cache_key, &per_tool.delta_responses, &mut store.delta_counters)
                }
                None => DeltaOutcome::Full { payload: clone_json(&cached) },
            };
            store.history.set(&cache_key, clone_json(&cached), per_tool.caching.max_entries);
            drop(store);

            let delta_value = match outcome {
                DeltaOutcome::Unchanged { current_hash } => {
                    json!({"encoding": "lapc-delta-v1", "unchanged": true, "currentHash": current_hash})
                }
                DeltaOutcome::Patch { envelope } => envelope,
                DeltaOutcome::Full { payload } => payload,
            };

            return ClientAction::Respond(json!({
                "jsonrpc": "2.0",
                "id": id.map(|i| i.to_value()),
                "result": {"structuredContent": {"delta": delta_value}},
            }));
        }
        session.metrics.record_cache_miss();
    }

    if let Some(id) = id {
        pending
            .insert(
                id,
                PendingKind::ToolsCall {
                    tool_name,
                    arguments,
                    cache_key,
                },
            )
            .await;
    }
    ClientAction::Forward(message)
}

/// Handles one line read from the upstream, returning the message (after
/// any post-processing) that should be forwarded to the client.
pub async fn on_upstream_message(session: &Session, pending: &PendingMap, message: Value) -> Value {
    let Some(id) = id_of(&message) else {
        return message;
    };
    let Some(call) = pending.take(&id).await else {
        return message;
    };

    if is_error_response(&message) {
        return message;
    }

    let mut message = match call.kind {
        PendingKind::Initialize => on_initialize_response(session, message).await,
        PendingKind::Other => message,
        PendingKind::ToolsList => on_tools_list_response(session, message).await,
        PendingKind::ToolsCall {
            tool_name,
            cache_key,
            ..
        } => on_tools_call_response(session, message, &tool_name, &cache_key).await,
    };

    if session.config.proxy.stats {
        if let Some(result) = message.get_mut("result") {
            let ext = ext_in(result);
            ext["runtime_metrics"] = session.metrics.snapshot();
        }
    }

    message
}

/// `initialize` is the only response that may carry the `tools_hash_sync`
/// negotiation marker (spec.md §4.5) — every other untouched method passes
/// through via `PendingKind::Other` with no extension fields attached.
async fn on_initialize_response(session: &Session, mut message: Value) -> Value {
    if session.negotiated() {
        if let Some(result) = message.get_mut("result") {
            let ext = ext_in(result);
            ext["tools_hash_sync"] = json!({"version": 1});
        }
    }
    message
}

async fn on_tools_list_response(session: &Session, mut message: Value) -> Value {
    let Some(result) = message.get_mut("result") else {
        return message;
    };
    let Some(tools) = result.get("tools").and_then(Value::as_array).cloned() else {
        return message;
    };

    let mut compressed = tools;
    if session.config.optimizations.definition_compression.enabled {
        DefinitionCompressor::compress_tools(&mut compressed);
    }

    {
        let mut store = session.store.lock().await;
        store.catalog.replace(&compressed);
    }

    let lazy_cfg = &session.config.optimizations.lazy_loading;
    let visible = lazy::visible_tools(&compressed, lazy_cfg);

    result["tools"] = Value::Array(visible.clone());

    if session.config.optimizations.tools_hash_sync.enabled {
        let scope = session.scope_key();
        let preimage = if session.config.optimizations.tools_hash_sync.bind_server_fingerprint {
            json!({"tools": visible, "server_fingerprint": session.server_fingerprint()})
        } else {
            json!(visible)
        };
        let hash = tools_hash(&preimage);
        {
            let mut store = session.store.lock().await;
            store.tools_hash.record_hash(&scope, hash.clone());
        }
        if session.negotiated() {
            let ext = ext_in(result);
            ext["tools_hash_sync"] = json!({"not_modified": false, "tools_hash": hash});
        }
    }

    message
}

async fn on_tools_call_response(
    session: &Session,
    mut message: Value,
    tool_name: &str,
    cache_key: &str,
) -> Value {
    let Some(result) = message.get_mut("result") else {
        return message;
    };

    let raw_structured = result
        .get("structuredContent")
        .cloned()
        .or_else(|| structured_payload_from_content(result));
    let original_payload = raw_structured.clone().unwrap_or_else(|| result.clone());

    let per_tool = session.config.optimizations_for_tool(tool_name);
    let mutation_override = session.config.treat_as_mutating_override(tool_name);
    let mutating = is_mutating_tool(tool_name, mutation_override);

    if mutating {
        let prefix = format!("{}:{}:", session.session_id, session.server_id);
        let mut store = session.store.lock().await;
        store.cache.invalidate_prefix(&prefix);
        store.history.invalidate_prefix(&prefix);
    }

    let cache_eligible = per_tool.caching.enabled && (per_tool.caching.cache_mutating_tools || !mutating);

    if cache_eligible {
        let mut store = session.store.lock().await;
        let previous_raw = store.history.get_raw(cache_key);
        let unchanged = previous_raw.as_ref() == Some(&original_payload);
        let base_ttl = per_tool.caching.ttl_seconds;
        let ttl_seconds = if unchanged {
            (per_tool.caching.ttl_max).min((base_ttl as f64 * 1.5).floor() as u64)
        } else if previous_raw.is_some() {
            (per_tool.caching.ttl_min).max((base_ttl as f64 * 0.5).floor() as u64)
        } else {
            base_ttl
        }
        .clamp(per_tool.caching.ttl_min, per_tool.caching.ttl_max);

        store.history.set_raw(cache_key, clone_json(&original_payload), per_tool.caching.max_entries);
        store.cache.insert(
            cache_key.to_string(),
            clone_json(result),
            Duration::from_secs(ttl_seconds),
            per_tool.caching.max_entries,
        );
    }

    let auto_disable = &per_tool.auto_disable;
    if per_tool.result_compression.enabled {
        if let Some(structured) = raw_structured {
            let disabled = {
                let mut store = session.store.lock().await;
                auto_disable.enabled && store.health.is_disabled("result_compression", tool_name)
            };
            if !disabled {
                let mut store = session.store.lock().await;
                let outcome = compress_result(
                    &structured,
                    per_tool.result_compression.mode,
                    &per_tool.result_compression,
                    &mut store.key_dictionary,
                );
                match outcome {
                    ResultCompressionOutcome::Applied { envelope, stats: _ } => {
                        // The per-stage byte savings compress_result reports only
                        // cover the aliased data; the envelope wrapper (keys
                        // table, metadata) can eat that back. Compare what the
                        // client actually receives against the uncompressed
                        // original to get a real token delta.
                        let original_tokens = estimate_tokens(&serde_json::to_string(&structured).unwrap_or_default());
                        let shipped_tokens = estimate_tokens(&serde_json::to_string(&envelope).unwrap_or_default());
                        let health_outcome = if shipped_tokens < original_tokens {
                            HealthOutcome::Success
                        } else if shipped_tokens == original_tokens {
                            HealthOutcome::Neutral
                        } else {
                            HealthOutcome::Hurt
                        };
                        store.health.record_outcome(
                            "result_compression",
                            tool_name,
                            health_outcome,
                            auto_disable.threshold,
                            auto_disable.cooldown_requests,
                        );
                        drop(store);
                        result["structuredContent"] = envelope;
                        dedupe_redundant_content(result, &structured);
                    }
                    ResultCompressionOutcome::Skipped => {
                        store.health.record_outcome(
                            "result_compression",
                            tool_name,
                            HealthOutcome::Neutral,
                            auto_disable.threshold,
                            auto_disable.cooldown_requests,
                        );
                    }
                }
            }
        }
    }

    if per_tool.delta_responses.enabled {
        let mut store = session.store.lock().await;
        let previous = store.history.get(cache_key);
        if let Some(previous) = previous {
            let current = result.get("structuredContent").cloned().unwrap_or_else(|| result.clone());
            let outcome = create_delta(&previous, &current, cache_key, &per_tool.delta_responses, &mut store.delta_counters);
            drop(store);
            match outcome {
                DeltaOutcome::Unchanged { current_hash } => {
                    result["structuredContent"] =
                        json!({"delta": {"encoding": "lapc-delta-v1", "unchanged": true, "currentHash": current_hash}});
                }
                DeltaOutcome::Patch { envelope } => {
                    result["structuredContent"] = json!({"delta": envelope});
                }
                DeltaOutcome::Full { .. } => {}
            }
        }
    }

    if !mutating {
        let current_for_history = result.get("structuredContent").cloned().unwrap_or_else(|| result.clone());
        let mut store = session.store.lock().await;
        store.history.set(cache_key, current_for_history, per_tool.caching.max_entries);
    }

    message
}
